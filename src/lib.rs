//! Receive-side RTP audio reassembly and forward-error-correction queue.
//!
//! A low-latency streaming client receives two kinds of RTP packets over
//! UDP: audio data and Reed-Solomon parity. This crate reorders them,
//! recovers missing data packets from parity when possible, and hands the
//! decoder a monotonically sequenced stream of RTP packets (or explicit
//! lost-packet placeholders, so the decoder can run loss concealment).
//!
//! Every FEC block protects [`DATA_SHARDS`] consecutive audio packets with
//! [`FEC_SHARDS`] parity shards. The geometry is fixed at compile time,
//! which lets a single Reed-Solomon matrix serve the whole session.
//!
//! # Example
//!
//! ```rust
//! use audiofec::packet::{RtpHeader, RTP_PAYLOAD_TYPE_AUDIO, RTP_VERSION_BYTE};
//! use audiofec::{AddResult, AudioQueue, QueueConfig};
//!
//! let mut queue = AudioQueue::new(QueueConfig::default());
//!
//! let mut packet = RtpHeader {
//!     flags: RTP_VERSION_BYTE,
//!     payload_type: RTP_PAYLOAD_TYPE_AUDIO,
//!     sequence_number: 0,
//!     timestamp: 0,
//!     ssrc: 0x1234,
//! }
//! .to_bytes()
//! .to_vec();
//! packet.extend_from_slice(&[0u8; 64]);
//!
//! match queue.add_packet(&packet) {
//!     AddResult::HandleNow => { /* decode `packet` directly */ }
//!     AddResult::PacketReady => {
//!         while let Some(_pkt) = queue.get_queued_packet(0) { /* decode */ }
//!     }
//!     AddResult::Queued => { /* nothing to do yet */ }
//! }
//! ```

// GF(2^8) with the polynomial the host's Reed-Solomon encoder uses
// (0x11d, generator 0x02).
use gf256::gf::gf;

#[gf(polynomial = 0x11d, generator = 0x2)]
pub type Gf256;

pub mod packet;
pub mod queue;
pub mod rs;
pub mod seq;

pub use queue::{
    AddResult, AudioQueue, MonotonicTime, QueueConfig, QueueStats, QueuedPacket, TimeSource,
    SENDER_PARITY_ROWS,
};
pub use rs::ReedSolomon;

/// Number of audio data packets protected by one FEC block.
pub const DATA_SHARDS: usize = 4;

/// Number of parity shards per FEC block.
pub const FEC_SHARDS: usize = 2;

/// Total shards per FEC block.
pub const TOTAL_SHARDS: usize = DATA_SHARDS + FEC_SHARDS;

/// Maximum number of freed blocks kept for reuse.
pub const CACHED_BLOCK_LIMIT: usize = 8;

/// Error type for this crate's fallible operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Input buffer shorter than the fixed wire header it should contain.
    Truncated { len: usize, needed: usize },
    /// Parity override has the wrong length for the configured shard counts.
    InvalidParityMatrix,
    /// Fewer shards present than data shards; nothing can be reconstructed.
    InsufficientShards,
    /// The decode submatrix was not invertible.
    SingularMatrix,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Truncated { len, needed } => {
                write!(f, "packet too small: {} bytes, need {}", len, needed)
            }
            Error::InvalidParityMatrix => write!(f, "parity matrix length mismatch"),
            Error::InsufficientShards => write!(f, "insufficient shards for reconstruction"),
            Error::SingularMatrix => write!(f, "singular decode matrix"),
        }
    }
}

impl std::error::Error for Error {}

/// dst[i] ^= src[i]
/// Processed 8 bytes at a time with u64 XOR.
pub(crate) fn gf256_xor_mem(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());

    let len = dst.len();
    let chunks = len / 8;

    for i in 0..chunks {
        let base = i * 8;
        let v1 = u64::from_ne_bytes(dst[base..base + 8].try_into().unwrap());
        let v2 = u64::from_ne_bytes(src[base..base + 8].try_into().unwrap());
        dst[base..base + 8].copy_from_slice(&(v1 ^ v2).to_ne_bytes());
    }

    let base = chunks * 8;
    for i in base..len {
        dst[i] ^= src[i];
    }
}

/// dst[i] += src[i] * coeff (where + is XOR)
pub(crate) fn gf256_muladd_mem(dst: &mut [u8], src: &[u8], coeff: Gf256) {
    debug_assert_eq!(dst.len(), src.len());

    if coeff.0 == 0 {
        return;
    }
    if coeff.0 == 1 {
        gf256_xor_mem(dst, src);
        return;
    }

    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        *d ^= (coeff * Gf256(s)).0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_mem() {
        let mut dst = vec![0xffu8; 19];
        let src: Vec<u8> = (0..19).collect();
        gf256_xor_mem(&mut dst, &src);
        for (i, &b) in dst.iter().enumerate() {
            assert_eq!(b, 0xff ^ i as u8);
        }
    }

    #[test]
    fn test_muladd_identity_coeff_is_xor() {
        let mut a = vec![0x12u8; 8];
        let b = vec![0x34u8; 8];
        gf256_muladd_mem(&mut a, &b, Gf256(1));
        assert_eq!(a, vec![0x12 ^ 0x34; 8]);
    }

    #[test]
    fn test_muladd_zero_coeff_is_noop() {
        let mut a = vec![0x55u8; 8];
        let b = vec![0xaau8; 8];
        gf256_muladd_mem(&mut a, &b, Gf256(0));
        assert_eq!(a, vec![0x55; 8]);
    }

    #[test]
    fn test_field_inverse_roundtrip() {
        for v in 1..=255u8 {
            let x = Gf256(v);
            let inv = Gf256(1) / x;
            assert_eq!((x * inv).0, 1);
        }
    }
}
