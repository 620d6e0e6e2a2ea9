//! VP8L bit writer.
//!
//! Writes bits in LSB-first order as required by VP8L format.

use alloc::vec::Vec;

use super::huffman::HuffmanTreeCode;

/// VP8L bit writer - writes bits LSB-first.
///
/// Cloning snapshots the stream, which the encoder uses to try several
/// parameter sets from the same starting point.
#[derive(Debug, Clone)]
pub struct BitWriter {
    /// Output buffer.
    buffer: Vec<u8>,
    /// Current partial byte being built.
    bits: u64,
    /// Number of bits in the partial byte (0-63).
    used: u8,
}

impl BitWriter {
    /// Create a new bit writer.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            bits: 0,
            used: 0,
        }
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(cap),
            bits: 0,
            used: 0,
        }
    }

    /// Write `n_bits` from `value` (LSB-first).
    #[inline]
    pub fn write_bits(&mut self, value: u64, n_bits: u8) {
        debug_assert!(n_bits <= 32);
        debug_assert!(n_bits == 0 || (value >> n_bits) == 0);

        self.bits |= value << self.used;
        self.used += n_bits;

        // Flush complete bytes
        while self.used >= 8 {
            self.buffer.push(self.bits as u8);
            self.bits >>= 8;
            self.used -= 8;
        }
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Write the code word of `symbol`. Zero-length codes write nothing.
    #[inline]
    pub fn write_huffman_code(&mut self, code: &HuffmanTreeCode, symbol: usize) {
        let depth = code.lengths[symbol];
        self.write_bits(code.codes[symbol] as u64, depth);
    }

    /// Write the code word of `symbol` followed by `n_bits` extra bits.
    #[inline]
    pub fn write_huffman_code_with_extra_bits(
        &mut self,
        code: &HuffmanTreeCode,
        symbol: usize,
        extra: u32,
        n_bits: u8,
    ) {
        let depth = code.lengths[symbol];
        // Prefix codes never exceed 15 bits and length extras 10 bits.
        debug_assert!(depth + n_bits <= 32);
        let value = (code.codes[symbol] as u64) | ((extra as u64) << depth);
        self.write_bits(value, depth + n_bits);
    }

    /// Flush any remaining bits (pad with zeros).
    pub fn flush(&mut self) {
        if self.used > 0 {
            self.buffer.push(self.bits as u8);
            self.bits = 0;
            self.used = 0;
        }
    }

    /// Get the output buffer (flushes first).
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.buffer
    }

    /// Discard everything written so far, keeping the allocation.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.bits = 0;
        self.used = 0;
    }

    /// Get current byte position (for size estimation).
    pub fn byte_position(&self) -> usize {
        self.buffer.len()
    }

    /// Get current bit position.
    pub fn bit_position(&self) -> usize {
        self.buffer.len() * 8 + self.used as usize
    }

    /// Borrow the internal buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_write_bits() {
        let mut w = BitWriter::new();
        // LSB first: 0b101 goes in bits 0-2, 0b11 in bits 3-4, 0b111 in bits 5-7
        w.write_bits(0b101, 3);
        w.write_bits(0b11, 2);
        w.write_bits(0b111, 3);
        w.flush();
        // = 0b111_11_101
        assert_eq!(w.buffer, &[0xFD]);
    }

    #[test]
    fn test_write_multiple_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0x12, 8);
        w.write_bits(0x34, 8);
        w.flush();
        assert_eq!(w.buffer, &[0x12, 0x34]);
    }

    #[test]
    fn test_write_14_bits() {
        let mut w = BitWriter::new();
        // Header width-1 field.
        w.write_bits(1023, 14);
        w.flush();
        assert_eq!(w.buffer, &[0xFF, 0x03]);
    }

    #[test]
    fn test_positions_and_reset() {
        let mut w = BitWriter::with_capacity(16);
        w.write_bits(0x3ff, 10);
        assert_eq!(w.byte_position(), 1);
        assert_eq!(w.bit_position(), 10);

        let snapshot = w.clone();
        w.write_bits(1, 1);
        assert_eq!(snapshot.bit_position(), 10);

        w.reset();
        assert_eq!(w.bit_position(), 0);
        assert!(w.finish().is_empty());
    }

    #[test]
    fn test_huffman_code_with_extra_bits() {
        let code = HuffmanTreeCode {
            lengths: vec![2, 0, 1],
            codes: vec![0b01, 0, 0b1],
        };
        let mut a = BitWriter::new();
        a.write_huffman_code_with_extra_bits(&code, 0, 0b110, 3);
        a.write_huffman_code(&code, 1);
        a.write_huffman_code(&code, 2);

        let mut b = BitWriter::new();
        b.write_bits(0b01, 2);
        b.write_bits(0b110, 3);
        b.write_bits(0b1, 1);
        assert_eq!(a.bit_position(), 6);
        assert_eq!(a.finish(), b.finish());
    }
}
