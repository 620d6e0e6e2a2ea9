//! LSB-first bit reader for VP8L streams.

use super::api::{DecodeError, DecodeResult};

/// Reads bits least-significant first, the order the VP8L writer emits
/// them. Past the end of the data the window is padded with zeros, and
/// consuming padding is an error.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// Remaining bytes not yet loaded into `value`
    buf: &'a [u8],
    /// Bit window, next bit in the lowest position
    value: u64,
    /// Number of valid bits in `value`
    nbits: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader over `data`
    pub fn new(data: &'a [u8]) -> Self {
        let mut br = Self {
            buf: data,
            value: 0,
            nbits: 0,
        };
        br.fill();
        br
    }

    #[inline]
    fn fill(&mut self) {
        while self.nbits <= 56 {
            let Some((&byte, rest)) = self.buf.split_first() else {
                break;
            };
            self.value |= u64::from(byte) << self.nbits;
            self.nbits += 8;
            self.buf = rest;
        }
    }

    /// Next 32 bits of the stream without consuming them.
    #[inline]
    pub fn peek(&mut self) -> u32 {
        if self.nbits < 32 {
            self.fill();
        }
        self.value as u32
    }

    /// Drop `n` bits, failing if fewer are left.
    #[inline]
    pub fn consume(&mut self, n: u8) -> DecodeResult<()> {
        if n > self.nbits {
            return Err(DecodeError::BitStreamError);
        }
        self.value >>= n;
        self.nbits -= n;
        Ok(())
    }

    /// Read `n` bits (at most 32) as an unsigned value.
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> DecodeResult<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        let value = u64::from(self.peek()) & ((1u64 << n) - 1);
        self.consume(n)?;
        Ok(value as u32)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> DecodeResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Bits still available, including those already buffered.
    pub fn bits_left(&self) -> usize {
        self.nbits as usize + self.buf.len() * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first() {
        let mut br = BitReader::new(&[0b1010_0110, 0xff]);
        assert_eq!(br.read_bits(2).unwrap(), 0b10);
        assert!(br.read_bit().unwrap());
        assert_eq!(br.read_bits(5).unwrap(), 0b10100);
        assert_eq!(br.read_bits(8).unwrap(), 0xff);
        assert_eq!(br.bits_left(), 0);
    }

    #[test]
    fn test_fields_across_bytes() {
        // 0x2f, then 14 bits of 99 and 14 bits of 1.
        let mut br = BitReader::new(&[0x2f, 0x63, 0x40, 0x00, 0x00]);
        assert_eq!(br.read_bits(8).unwrap(), 0x2f);
        assert_eq!(br.read_bits(14).unwrap(), 99);
        assert_eq!(br.read_bits(14).unwrap(), 1);
    }

    #[test]
    fn test_long_stream_refills() {
        let data: alloc::vec::Vec<u8> = (0..64u8).collect();
        let mut br = BitReader::new(&data);
        for expected in 0..64u32 {
            assert_eq!(br.read_bits(8).unwrap(), expected);
        }
    }

    #[test]
    fn test_reading_past_end_fails() {
        let mut br = BitReader::new(&[0xab]);
        assert_eq!(br.read_bits(4).unwrap(), 0xb);
        assert!(matches!(br.read_bits(5), Err(DecodeError::BitStreamError)));
        // Peeking past the end sees zeros.
        assert_eq!(br.peek(), 0xa);
    }
}
