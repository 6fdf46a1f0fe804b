//! The receive-side reassembly and FEC recovery queue.
//!
//! Packets go in via [`AudioQueue::add_packet`] in whatever order the
//! network delivers them; decodable RTP packets come back out in strict
//! sequence order, either as a fast-path "handle the packet you just gave
//! me" signal or by draining [`AudioQueue::get_queued_packet`]. Data
//! packets missing past the FEC budget are replaced by zero-length
//! placeholders once their block times out, so the decoder can conceal
//! the loss without stalling.

mod block;


use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, warn};

use crate::packet::{
    FecShardHeader, RtpHeader, RTP_PAYLOAD_TYPE_AUDIO, RTP_PAYLOAD_TYPE_FEC, RTP_VERSION_BYTE,
};
use crate::rs::ReedSolomon;
use crate::seq::is_before_16;
use crate::{DATA_SHARDS, FEC_SHARDS, TOTAL_SHARDS};

use block::{BlockCache, BlockIdentity, FecBlock};

/// Parity matrix rows used by the streaming host's audio FEC encoder
/// (row-major, parity x data). The Cauchy rows [`ReedSolomon::new`]
/// computes do not match the host, so these replace them at queue
/// construction; recovery silently produces garbage otherwise.
pub const SENDER_PARITY_ROWS: [u8; 8] = [0x77, 0x40, 0x38, 0x0e, 0xc7, 0xa7, 0x0d, 0x6c];

/// Extra wait beyond one block's worth of audio before declaring the head
/// block lost while out-of-sequence data has been seen recently.
const OOS_WAIT_TIME_MS: u64 = 30;

/// Shards required before a block can complete. Validation mode keeps one
/// spare so recovery can be re-run against a received shard.
#[cfg(not(feature = "fec-validation"))]
const REQUIRED_SHARDS: u16 = DATA_SHARDS as u16;
#[cfg(feature = "fec-validation")]
const REQUIRED_SHARDS: u16 = DATA_SHARDS as u16 + 1;

/// Monotonic millisecond clock the queue schedules block timeouts against.
///
/// The clock is a collaborator of the queue, not something it owns; tests
/// substitute a manually advanced source.
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

/// Default wall-clock source: milliseconds since construction.
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    epoch: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Session-start configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Milliseconds of audio carried by each RTP data packet. Fixed for
    /// the queue's lifetime.
    pub audio_packet_duration_ms: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            audio_packet_duration_ms: 5,
        }
    }
}

/// Result of submitting one packet to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Packet absorbed (queued, duplicate, or dropped); nothing to do yet.
    Queued,
    /// The packet just submitted is the next one in sequence; the caller
    /// may hand it to the decoder directly without a queue round-trip.
    HandleNow,
    /// One or more packets are ready; drain [`AudioQueue::get_queued_packet`]
    /// until it returns `None`.
    PacketReady,
}

/// A packet handed back to the caller, with `custom_header_len` scratch
/// bytes reserved ahead of the payload for the caller's own framing.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    data: Vec<u8>,
    custom_header_len: usize,
}

impl QueuedPacket {
    /// Scratch prefix plus payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Mutable view of the reserved scratch prefix.
    pub fn custom_header_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.custom_header_len]
    }

    /// The RTP packet (header + audio payload). Empty for placeholders.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.custom_header_len..]
    }

    pub fn payload_len(&self) -> usize {
        self.data.len() - self.custom_header_len
    }

    /// True for a lost-packet placeholder: the sequence slot exists but
    /// carries no data, signaling the decoder to conceal the loss.
    pub fn is_placeholder(&self) -> bool {
        self.payload_len() == 0
    }
}

/// Counters describing the queue's lifetime behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueStats {
    pub data_shards_accepted: u64,
    pub fec_shards_accepted: u64,
    pub duplicates_dropped: u64,
    pub malformed_dropped: u64,
    pub blocks_recovered: u64,
    pub blocks_lost: u64,
    pub placeholders_emitted: u64,
    pub oos_events: u64,
}

/// Receive-side RTP audio reassembly and FEC recovery queue.
///
/// Owns an ordered list of in-flight FEC blocks (front = oldest base
/// sequence number) plus a small cache of freed blocks for reuse. All
/// operations are synchronous and single-threaded.
#[derive(Debug)]
pub struct AudioQueue<T: TimeSource = MonotonicTime> {
    /// In-flight blocks, sorted by ascending base sequence number.
    blocks: VecDeque<FecBlock>,
    cache: BlockCache,
    rs: ReedSolomon,
    config: QueueConfig,
    time: T,

    /// Next sequence number the consumer will receive.
    next_rtp_sequence_number: u16,
    /// Lowest base sequence still admissible; older shards are dropped.
    oldest_rtp_base_sequence_number: u16,
    /// True until the first FEC block boundary has been observed.
    synchronizing: bool,
    /// True while out-of-sequence arrivals have been seen within the last
    /// half of the sequence space; gates the block timeout policy.
    received_oos_data: bool,
    last_oos_sequence_number: u16,
    /// Latched when the host sends variable-size shards; FEC is disabled
    /// for the rest of the session and audio passes straight through.
    incompatible_server: bool,

    stats: QueueStats,
}

impl AudioQueue<MonotonicTime> {
    /// Create a queue driven by the default monotonic clock.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_time_source(config, MonotonicTime::default())
    }
}

impl<T: TimeSource> AudioQueue<T> {
    /// Create a queue with an explicit time source.
    pub fn with_time_source(config: QueueConfig, time: T) -> Self {
        let mut rs = ReedSolomon::new(DATA_SHARDS, FEC_SHARDS);
        rs.set_parity(&SENDER_PARITY_ROWS)
            .expect("parity row count matches the fixed shard geometry");

        Self {
            blocks: VecDeque::new(),
            cache: BlockCache::default(),
            rs,
            config,
            time,
            next_rtp_sequence_number: 0,
            oldest_rtp_base_sequence_number: 0,
            synchronizing: true,
            received_oos_data: false,
            last_oos_sequence_number: 0,
            incompatible_server: false,
            stats: QueueStats::default(),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// True until the first FEC block has been completed (successfully or
    /// not) after connection start.
    pub fn is_synchronizing(&self) -> bool {
        self.synchronizing
    }

    /// True once a block-size mismatch has permanently disabled FEC.
    pub fn fec_disabled(&self) -> bool {
        self.incompatible_server
    }

    /// Drop all queue state and re-enter the initial synchronizing mode.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.cache.clear();
        self.next_rtp_sequence_number = 0;
        self.oldest_rtp_base_sequence_number = 0;
        self.synchronizing = true;
        self.received_oos_data = false;
        self.last_oos_sequence_number = 0;
        self.incompatible_server = false;
        self.stats = QueueStats::default();
    }

    /// Submit one received RTP packet (audio data or parity).
    pub fn add_packet(&mut self, packet: &[u8]) -> AddResult {
        if self.incompatible_server {
            // Feed audio straight through to the decoder. Out-of-order and
            // duplicated packets go unhandled in this mode, but it only
            // affects hosts old enough to send variable-size shards.
            return match RtpHeader::parse(packet) {
                Ok(header) if header.payload_type == RTP_PAYLOAD_TYPE_AUDIO => {
                    AddResult::HandleNow
                }
                _ => AddResult::Queued,
            };
        }

        let header = match RtpHeader::parse(packet) {
            Ok(header) => header,
            Err(err) => {
                warn!(error = %err, "RTP audio packet too small");
                self.stats.malformed_dropped += 1;
                return AddResult::Queued;
            }
        };

        let Some(block_index) = self.find_or_create_block(&header, packet) else {
            return AddResult::Queued;
        };

        if header.payload_type == RTP_PAYLOAD_TYPE_AUDIO {
            let block = &mut self.blocks[block_index];
            let pos = header
                .sequence_number
                .wrapping_sub(block.base_sequence_number) as usize;
            debug_assert!(pos < DATA_SHARDS);

            if block.marks[pos] != 0 {
                let dst = &mut block.data_packets[pos];
                dst.clear();
                dst.extend_from_slice(packet);
                block.marks[pos] = 0;
                block.data_shards_received += 1;
                self.stats.data_shards_accepted += 1;
            } else {
                self.stats.duplicates_dropped += 1;
                return AddResult::Queued;
            }

            // The common case: an in-order receive of the next data shard.
            // Tell the caller to consume the packet it just handed us.
            if header.sequence_number == self.next_rtp_sequence_number {
                self.next_rtp_sequence_number = header.sequence_number.wrapping_add(1);

                let block = &mut self.blocks[block_index];
                block.next_data_packet_index += 1;

                if self.next_rtp_sequence_number
                    == block.base_sequence_number.wrapping_add(DATA_SHARDS as u16)
                {
                    debug_assert_eq!(block_index, 0);
                    debug_assert_eq!(block.next_data_packet_index as usize, DATA_SHARDS);
                    self.free_block_head();
                } else {
                    self.validate_block_state();
                }

                return AddResult::HandleNow;
            }
        } else {
            // Payload type and shard index were validated when the block
            // was looked up.
            let Ok(fec_header) = FecShardHeader::parse(&packet[RtpHeader::SIZE..]) else {
                return AddResult::Queued;
            };
            let index = fec_header.fec_shard_index as usize;
            debug_assert!(index < FEC_SHARDS);

            let block = &mut self.blocks[block_index];
            if block.marks[DATA_SHARDS + index] != 0 {
                let parity = &packet[RtpHeader::SIZE + FecShardHeader::SIZE..];
                let dst = &mut block.fec_shards[index];
                dst.clear();
                dst.extend_from_slice(parity);
                block.marks[DATA_SHARDS + index] = 0;
                block.fec_shards_received += 1;
                self.stats.fec_shards_accepted += 1;
            } else {
                self.stats.duplicates_dropped += 1;
                return AddResult::Queued;
            }
        }

        // Try to complete the block via data shards or data + parity.
        if self.complete_fec_block(block_index) {
            self.blocks[block_index].fully_reassembled = true;
        }

        if self.queue_has_packet_ready() {
            return AddResult::PacketReady;
        }

        // Not enough to proceed. Check the head block against the queue
        // constraints, but only when this packet belongs to a later block;
        // otherwise a silent audio gap would needlessly time blocks out.
        if block_index != 0 && self.enforce_queue_constraints() {
            self.stats.blocks_lost += 1;
            if let Some(head) = self.blocks.front_mut() {
                // Return whatever arrived even though there are gaps.
                head.allow_discontinuity = true;

                // If the next packet in sequence was in a block we missed
                // entirely, jump ahead to the first block we do have data
                // for rather than starving the audio device further.
                if is_before_16(self.next_rtp_sequence_number, head.base_sequence_number) {
                    self.next_rtp_sequence_number = head.base_sequence_number;
                }
            }

            self.validate_block_state();
            return AddResult::PacketReady;
        }

        AddResult::Queued
    }

    /// Pop the next packet in sequence, if any.
    ///
    /// The returned buffer reserves `custom_header_len` leading scratch
    /// bytes for the caller. A zero-length payload is a lost-packet
    /// placeholder occupying exactly one sequence slot.
    pub fn get_queued_packet(&mut self, custom_header_len: usize) -> Option<QueuedPacket> {
        self.validate_block_state();

        // Once the head block allows discontinuities, fill the sequence
        // slots of shards that never arrived with blank entries so the
        // caller can run packet loss concealment.
        let mut in_discontinuity = false;
        let mut placeholder = false;
        let mut drained = false;
        if let Some(head) = self.blocks.front_mut() {
            if head.allow_discontinuity {
                in_discontinuity = true;
                debug_assert_eq!(
                    head.base_sequence_number
                        .wrapping_add(head.next_data_packet_index),
                    self.next_rtp_sequence_number
                );
                if head.marks[head.next_data_packet_index as usize] != 0 {
                    head.next_data_packet_index += 1;
                    placeholder = true;
                }
                drained = head.next_data_packet_index as usize == DATA_SHARDS;
            }
        }
        if in_discontinuity {
            if placeholder {
                self.next_rtp_sequence_number = self.next_rtp_sequence_number.wrapping_add(1);
                self.stats.placeholders_emitted += 1;
            } else {
                debug_assert!(self.queue_has_packet_ready());
            }
            if drained {
                self.free_block_head();
            } else {
                self.validate_block_state();
            }
            if placeholder {
                return Some(QueuedPacket {
                    data: vec![0u8; custom_header_len],
                    custom_header_len,
                });
            }
        }

        if !self.queue_has_packet_ready() {
            return None;
        }

        let mut data = vec![0u8; custom_header_len];
        let mut drained = false;
        if let Some(head) = self.blocks.front_mut() {
            let index = head.next_data_packet_index as usize;
            data.extend_from_slice(&head.data_packets[index]);
            head.next_data_packet_index += 1;
            drained = head.next_data_packet_index as usize == DATA_SHARDS;
        }
        self.next_rtp_sequence_number = self.next_rtp_sequence_number.wrapping_add(1);

        if drained {
            self.free_block_head();
        } else {
            self.validate_block_state();
        }

        Some(QueuedPacket {
            data,
            custom_header_len,
        })
    }

    /// Derive the target block's identity from the packet, then find or
    /// create it. Returns `None` whenever the packet should be dropped.
    fn find_or_create_block(&mut self, header: &RtpHeader, packet: &[u8]) -> Option<usize> {
        self.validate_block_state();

        let identity = match header.payload_type {
            RTP_PAYLOAD_TYPE_AUDIO => {
                // Track out-of-sequence arrivals; the knowledge lets the
                // timeout policy give up on FEC blocks more quickly when
                // the network is delivering in order.
                if !self.synchronizing
                    && is_before_16(header.sequence_number, self.oldest_rtp_base_sequence_number)
                {
                    self.last_oos_sequence_number = header.sequence_number;
                    if !self.received_oos_data {
                        debug!(
                            seq = header.sequence_number,
                            oldest = self.oldest_rtp_base_sequence_number,
                            "leaving fast audio recovery mode after OOS audio data"
                        );
                        self.received_oos_data = true;
                        self.stats.oos_events += 1;
                    }
                } else if self.received_oos_data
                    && is_before_16(
                        self.oldest_rtp_base_sequence_number,
                        self.last_oos_sequence_number,
                    )
                {
                    // The oldest admissible base has wrapped past the last
                    // OOS arrival, i.e. more than 32767 packets have gone
                    // by without another one.
                    debug!("entering fast audio recovery mode after sequenced audio data");
                    self.received_oos_data = false;
                }

                let base_seq = (header.sequence_number / DATA_SHARDS as u16) * DATA_SHARDS as u16;
                let offset = header.sequence_number.wrapping_sub(base_seq) as u32;
                BlockIdentity {
                    payload_type: header.payload_type,
                    base_sequence_number: base_seq,
                    base_timestamp: header
                        .timestamp
                        .wrapping_sub(offset.wrapping_mul(self.config.audio_packet_duration_ms)),
                    ssrc: header.ssrc,
                    block_size: packet.len() - RtpHeader::SIZE,
                }
            }
            RTP_PAYLOAD_TYPE_FEC => {
                let fec_header = match FecShardHeader::parse(&packet[RtpHeader::SIZE..]) {
                    Ok(fec_header) => fec_header,
                    Err(err) => {
                        warn!(error = %err, "RTP audio FEC packet too small");
                        self.stats.malformed_dropped += 1;
                        return None;
                    }
                };

                // An out-of-range shard index would corrupt recovery state.
                if fec_header.fec_shard_index as usize >= FEC_SHARDS {
                    warn!(
                        index = fec_header.fec_shard_index,
                        "too many audio FEC shards"
                    );
                    self.stats.malformed_dropped += 1;
                    return None;
                }

                BlockIdentity {
                    payload_type: fec_header.payload_type,
                    base_sequence_number: fec_header.base_sequence_number,
                    base_timestamp: fec_header.base_timestamp,
                    ssrc: fec_header.ssrc,
                    block_size: packet.len() - RtpHeader::SIZE - FecShardHeader::SIZE,
                }
            }
            other => {
                warn!(payload_type = other, "invalid RTP audio payload type");
                self.stats.malformed_dropped += 1;
                return None;
            }
        };

        // First admissible packet of the session: refuse the current
        // (possibly partial) block and start at the next block boundary,
        // so a connection that opens mid-block doesn't report a spurious
        // recovery failure.
        if self.synchronizing && self.oldest_rtp_base_sequence_number == 0 {
            let next = identity
                .base_sequence_number
                .wrapping_add(DATA_SHARDS as u16);
            self.next_rtp_sequence_number = next;
            self.oldest_rtp_base_sequence_number = next;
            return None;
        }

        // Drop shards of blocks that have already been completed.
        if is_before_16(
            identity.base_sequence_number,
            self.oldest_rtp_base_sequence_number,
        ) {
            return None;
        }

        let mut insert_at = self.blocks.len();
        for (i, existing) in self.blocks.iter().enumerate() {
            if existing.base_sequence_number == identity.base_sequence_number {
                // Every shard of a block carries the same FEC header data.
                if existing.payload_type != identity.payload_type
                    || existing.base_timestamp != identity.base_timestamp
                    || existing.ssrc != identity.ssrc
                {
                    warn!(
                        base = identity.base_sequence_number,
                        "shard disagrees with its block's FEC header"
                    );
                    self.stats.malformed_dropped += 1;
                    return None;
                }

                // The block size must match to safely copy shards into it.
                if existing.block_size != identity.block_size {
                    // Old hosts send variable-size shards (and blocks on
                    // boundaries that aren't multiples of the shard
                    // count). Rather than handle that wire dialect, drop
                    // the queue to a pass-through.
                    warn!(
                        got = identity.block_size,
                        expected = existing.block_size,
                        "audio block size mismatch"
                    );
                    warn!("audio FEC disabled: host sends incompatible shard sizes");
                    self.incompatible_server = true;
                    return None;
                }

                // Late shard for a completed block.
                if existing.fully_reassembled {
                    return None;
                }
                return Some(i);
            } else if is_before_16(
                identity.base_sequence_number,
                existing.base_sequence_number,
            ) {
                // The new block goes right before this one.
                insert_at = i;
                break;
            }
        }

        let mut block = self
            .cache
            .take(identity.block_size)
            .unwrap_or_else(|| FecBlock::with_block_size(identity.block_size));
        block.reset(&identity, self.time.now_ms());
        self.blocks.insert(insert_at, block);

        self.validate_block_state();
        Some(insert_at)
    }

    /// Attempt recovery of the block at `index`. Returns true once every
    /// data shard is present (received or reconstructed).
    fn complete_fec_block(&mut self, index: usize) -> bool {
        let Self {
            blocks,
            rs,
            config,
            stats,
            ..
        } = self;
        let block = &mut blocks[index];

        if block.data_shards_received + block.fec_shards_received < REQUIRED_SHARDS {
            return false;
        }
        debug_assert!((block.data_shards_received as usize) <= DATA_SHARDS);

        // With every data shard in hand there is nothing to recover.
        #[cfg(not(feature = "fec-validation"))]
        if block.data_shards_received as usize == DATA_SHARDS {
            return true;
        }

        let received_before_recovery = block.data_shards_received;

        // Validation mode: fake a drop of one received data shard and
        // check below that recovery reproduces it exactly.
        #[cfg(feature = "fec-validation")]
        let (drop_index, dropped_original) = {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let drop_index = loop {
                let i = rng.gen_range(0..DATA_SHARDS);
                if block.marks[i] == 0 {
                    break i;
                }
            };
            let original = block.data_packets[drop_index].clone();
            block.marks[drop_index] = 1;
            block.data_shards_received -= 1;
            block.data_packets[drop_index].fill(0);
            (drop_index, original)
        };

        let base_seq = block.base_sequence_number;
        let marks = block.marks;
        let mut shards: Vec<&mut [u8]> = Vec::with_capacity(TOTAL_SHARDS);
        for data_packet in block.data_packets.iter_mut() {
            shards.push(&mut data_packet[RtpHeader::SIZE..]);
        }
        for parity in block.fec_shards.iter_mut() {
            shards.push(parity.as_mut_slice());
        }

        if let Err(err) = rs.reconstruct(&mut shards, &marks) {
            // Shard counts were checked above, so the primitive has broken
            // its contract; the block will eventually time out instead.
            warn!(base = base_seq, error = %err, "audio FEC reconstruction failed");
            return false;
        }

        // Reconstruction fills payloads only; the RTP headers of recovered
        // packets are synthesized from the block identity. The receive
        // counter tracks the cleared marks so the shard accounting stays
        // exact after recovery.
        for i in 0..DATA_SHARDS {
            if block.marks[i] == 0 {
                continue;
            }
            RtpHeader {
                flags: RTP_VERSION_BYTE,
                payload_type: block.payload_type,
                sequence_number: block.base_sequence_number.wrapping_add(i as u16),
                timestamp: block
                    .base_timestamp
                    .wrapping_add((i as u32).wrapping_mul(config.audio_packet_duration_ms)),
                ssrc: block.ssrc,
            }
            .write_to(&mut block.data_packets[i]);
            block.marks[i] = 0;
            block.data_shards_received += 1;
        }
        debug_assert_eq!(block.data_shards_received as usize, DATA_SHARDS);

        if (received_before_recovery as usize) < DATA_SHARDS {
            debug!(
                recovered = DATA_SHARDS - received_before_recovery as usize,
                base = block.base_sequence_number,
                "recovered audio data shards"
            );
            stats.blocks_recovered += 1;
        }

        #[cfg(feature = "fec-validation")]
        assert_eq!(
            block.data_packets[drop_index], dropped_original,
            "FEC validation: recovered shard differs from the original"
        );

        true
    }

    /// True when the head block's next data shard is present and is the
    /// exact packet the consumer expects.
    fn queue_has_packet_ready(&self) -> bool {
        match self.blocks.front() {
            Some(head) => {
                head.marks[head.next_data_packet_index as usize] == 0
                    && head
                        .base_sequence_number
                        .wrapping_add(head.next_data_packet_index)
                        == self.next_rtp_sequence_number
            }
            None => false,
        }
    }

    /// Decide whether the head block should be declared irrecoverably
    /// lost: either the network is delivering in order (so data from a
    /// later block means the head's stragglers are not coming), or the
    /// block has outlived the audio it carries.
    fn enforce_queue_constraints(&self) -> bool {
        let Some(head) = self.blocks.front() else {
            return false;
        };

        if !self.received_oos_data
            || self.time.now_ms().saturating_sub(head.queue_time_ms)
                > self.config.audio_packet_duration_ms as u64 * DATA_SHARDS as u64
                    + OOS_WAIT_TIME_MS
        {
            warn!(
                from = head.base_sequence_number,
                to = head.base_sequence_number.wrapping_add(DATA_SHARDS as u16 - 1),
                data = head.data_shards_received,
                fec = head.fec_shards_received,
                needed = DATA_SHARDS,
                "unable to recover audio data block"
            );
            return true;
        }

        false
    }

    /// Remove the head block, advancing the admissibility horizon past it
    /// and returning the block to the free cache.
    fn free_block_head(&mut self) {
        let Some(block) = self.blocks.pop_front() else {
            return;
        };

        self.oldest_rtp_base_sequence_number = block
            .base_sequence_number
            .wrapping_add(DATA_SHARDS as u16);

        // Completing a block, successfully or not, synchronizes us with
        // the source.
        self.synchronizing = false;

        self.validate_block_state();
        self.cache.put(block);
    }

    /// Debug-build check of the queue's global invariants.
    fn validate_block_state(&self) {
        #[cfg(debug_assertions)]
        {
            use crate::seq::is_before_32;

            // The consumer position may only trail the admissibility
            // horizon while still synchronizing.
            debug_assert!(
                !is_before_16(
                    self.next_rtp_sequence_number,
                    self.oldest_rtp_base_sequence_number
                ) || self.synchronizing
            );

            let Some(head) = self.blocks.front() else {
                return;
            };

            // The consumer must still be inside the head block (else the
            // head should have been dequeued) and the head must not
            // predate the horizon (else its shards would be dropped).
            debug_assert!(is_before_16(
                self.next_rtp_sequence_number,
                head.base_sequence_number.wrapping_add(DATA_SHARDS as u16)
            ));
            debug_assert!(!is_before_16(
                head.base_sequence_number,
                self.oldest_rtp_base_sequence_number
            ));

            let mut last: Option<&FecBlock> = None;
            for block in &self.blocks {
                let missing = block.marks.iter().filter(|&&m| m != 0).count();
                debug_assert_eq!(
                    block.data_shards_received + block.fec_shards_received,
                    (TOTAL_SHARDS - missing) as u16
                );

                if let Some(prev) = last {
                    debug_assert!(is_before_16(
                        prev.base_sequence_number,
                        block.base_sequence_number
                    ));
                    debug_assert!(is_before_32(prev.base_timestamp, block.base_timestamp));
                    debug_assert_eq!(prev.block_size, block.block_size);
                    debug_assert_eq!(prev.payload_type, block.payload_type);
                    debug_assert_eq!(prev.ssrc, block.ssrc);
                }
                last = Some(block);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[cfg(test)]
    pub(crate) fn cached_block_count(&self) -> usize {
        self.cache.len()
    }

    #[cfg(test)]
    pub(crate) fn next_sequence_number(&self) -> u16 {
        self.next_rtp_sequence_number
    }

    #[cfg(test)]
    pub(crate) fn oldest_base_sequence_number(&self) -> u16 {
        self.oldest_rtp_base_sequence_number
    }
}
