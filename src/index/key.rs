use std::fmt::Debug;

/// A fixed-width, totally ordered key type an index can be built over.
///
/// Keys are stored on pages in their encoded form and decoded before any
/// comparison, so the byte encoding itself does not need to be
/// order-preserving.
pub trait IndexKey: Copy + Ord + Debug + Send + Sync + 'static {
    /// Number of bytes the encoded key occupies on a page.
    const ENCODED_LEN: usize;

    /// Writes the key into `buf`, which is exactly `ENCODED_LEN` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a key back from `buf`, which is exactly `ENCODED_LEN` bytes.
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for u32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u32::from_le_bytes(buf.try_into().expect("key buffer must be 4 bytes"))
    }
}

impl IndexKey for u64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf.try_into().expect("key buffer must be 8 bytes"))
    }
}

impl IndexKey for i64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        i64::from_le_bytes(buf.try_into().expect("key buffer must be 8 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        let mut buf = [0u8; 4];
        0xDEAD_BEEFu32.encode(&mut buf);
        assert_eq!(u32::decode(&buf), 0xDEAD_BEEF);
    }

    #[test]
    fn test_i64_round_trip_negative() {
        let mut buf = [0u8; 8];
        (-42i64).encode(&mut buf);
        assert_eq!(i64::decode(&buf), -42);
    }
}
