use std::io::{self, Read};

/// Big-endian bit cursor over a byte reader.
///
/// Bytes are pulled from the inner reader one at a time, only when bits from them are needed,
/// so the reader is never advanced past the last byte a caller touched.
pub struct BitReader<R> {
    inner: R,
    current: u8,
    available: u32,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        BitReader {
            inner,
            current: 0,
            available: 0,
        }
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> io::Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads `count` bits (at most 64) as an unsigned big-endian integer.
    pub fn read_bits(&mut self, count: u32) -> io::Result<u64> {
        debug_assert!(count <= 64);
        let mut remaining = count;
        let mut value = 0u64;

        while remaining > 0 {
            if self.available == 0 {
                self.current = super::read_u8(&mut self.inner)?;
                self.available = 8;
            }

            let take = remaining.min(self.available);
            let shift = self.available - take;
            let bits = (self.current >> shift) as u64 & ((1u64 << take) - 1);

            value = (value << take) | bits;
            self.available -= take;
            remaining -= take;
        }

        Ok(value)
    }

    /// Reads `count` bits (at most 32) as a two's complement signed integer.
    pub fn read_signed_bits(&mut self, count: u32) -> io::Result<i32> {
        debug_assert!((1..=32).contains(&count));
        let raw = self.read_bits(count)? as u32;
        let shift = 32 - count;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Discards the unread bits of the current byte.
    #[inline]
    pub fn align(&mut self) {
        self.available = 0;
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.available == 0
    }

    #[inline]
    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    #[inline]
    pub fn read_u16(&mut self) -> io::Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    #[inline]
    pub fn read_u32(&mut self) -> io::Result<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    /// Fills `buf` with whole bytes. Unaligned reads are assembled bit by bit.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.is_aligned() {
            return self.inner.read_exact(buf);
        }
        for byte in buf {
            *byte = self.read_u8()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
