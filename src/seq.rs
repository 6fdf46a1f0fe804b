//! Wraparound-aware sequence number comparisons.
//!
//! RTP sequence numbers and timestamps wrap, so ordering is defined by the
//! sign of the wrapping difference, never by naive `<`.

/// True when `a` precedes `b` in wrapping 16-bit sequence space.
#[inline]
pub fn is_before_16(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) < 0
}

/// True when `a` precedes `b` in wrapping 32-bit timestamp space.
#[inline]
pub fn is_before_32(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_ordering() {
        assert!(is_before_16(1, 2));
        assert!(!is_before_16(2, 1));
        assert!(!is_before_16(5, 5));
    }

    #[test]
    fn test_wraparound() {
        assert!(is_before_16(65535, 0));
        assert!(is_before_16(65500, 100));
        assert!(!is_before_16(100, 65500));
    }

    #[test]
    fn test_half_space_boundary() {
        // A difference of exactly half the space reads as "before".
        assert!(is_before_16(0, 32768));
        assert!(!is_before_16(0, 32769));
    }

    #[test]
    fn test_is_before_32() {
        assert!(is_before_32(u32::MAX, 0));
        assert!(is_before_32(10, 11));
        assert!(!is_before_32(11, 10));
    }
}
