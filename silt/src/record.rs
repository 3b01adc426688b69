//! Fixed-width records.  Everything silt spills to disk goes through [Record]: a type with a
//! constant encoded width and infallible little-endian pack/unpack.  Streams size their
//! buffers to whole multiples of the width so no record ever straddles a buffer.

////////////////////////////////////////////// Record //////////////////////////////////////////////

/// A fixed-width, plain-old-data record.
///
/// `store` must write exactly [Record::BYTES] bytes and `load` must read exactly as many.
pub trait Record: Copy + 'static {
    const BYTES: usize;

    fn store(&self, buf: &mut [u8]);
    fn load(buf: &[u8]) -> Self;
}

impl Record for u8 {
    const BYTES: usize = 1;

    fn store(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }

    fn load(buf: &[u8]) -> Self {
        buf[0]
    }
}

impl Record for u64 {
    const BYTES: usize = 8;

    fn store(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn load(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf[..8].try_into().unwrap())
    }
}

impl Record for (u64, u64) {
    const BYTES: usize = 16;

    fn store(&self, buf: &mut [u8]) {
        self.0.store(&mut buf[..8]);
        self.1.store(&mut buf[8..16]);
    }

    fn load(buf: &[u8]) -> Self {
        (u64::load(&buf[..8]), u64::load(&buf[8..16]))
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_round_trips() {
        let mut buf = [0u8; 8];
        0xdead_beef_0102_0304u64.store(&mut buf);
        assert_eq!(0xdead_beef_0102_0304u64, u64::load(&buf));
    }

    #[test]
    fn pairs_round_trip() {
        let mut buf = [0u8; 16];
        (7u64, u64::MAX).store(&mut buf);
        assert_eq!((7u64, u64::MAX), <(u64, u64)>::load(&buf));
    }
}
