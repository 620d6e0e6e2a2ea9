//! Two-level Huffman decode tables.
//!
//! A root table indexed by the next `root_bits` bits resolves short codes
//! directly. Longer codes land on a root entry pointing at a second-level
//! table sized for the codes sharing that root prefix.

use alloc::vec;
use alloc::vec::Vec;

use super::api::{DecodeError, DecodeResult};
use super::bit_reader::BitReader;

/// Longest code length allowed by the format.
pub const MAX_ALLOWED_CODE_LENGTH: usize = 15;

/// Root table bits for the five symbol alphabets.
pub const HUFFMAN_TABLE_BITS: u8 = 8;

/// Root table bits for the code-length alphabet.
pub const LENGTHS_TABLE_BITS: u8 = 7;

/// One table entry: bits to consume and the symbol, or for a root entry
/// pointing at a second-level table, the total key length and the offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HuffmanCode {
    bits: u8,
    value: u16,
}

/// Decode table for one canonical Huffman code.
#[derive(Debug, Clone, Default)]
pub struct HuffmanTable {
    root_bits: u8,
    entries: Vec<HuffmanCode>,
}

impl HuffmanTable {
    /// Build a table from per-symbol code lengths.
    ///
    /// Malformed input yields an empty table: a length above 15, all lengths
    /// zero, or an over-subscribed or incomplete code. A code with a single
    /// used symbol decodes that symbol without consuming bits.
    pub fn build(root_bits: u8, code_lengths: &[u8]) -> Self {
        debug_assert!(root_bits > 0 && (root_bits as usize) <= MAX_ALLOWED_CODE_LENGTH);
        let empty = Self::default();
        let root_bits_usize = root_bits as usize;

        let mut counts = [0usize; MAX_ALLOWED_CODE_LENGTH + 1];
        for &len in code_lengths {
            if len as usize > MAX_ALLOWED_CODE_LENGTH {
                return empty;
            }
            counts[len as usize] += 1;
        }
        if counts[0] == code_lengths.len() {
            return empty;
        }

        let mut offsets = [0usize; MAX_ALLOWED_CODE_LENGTH + 1];
        for len in 1..MAX_ALLOWED_CODE_LENGTH {
            if counts[len] > 1 << len {
                return empty;
            }
            offsets[len + 1] = offsets[len] + counts[len];
        }

        // Symbols sorted by code length, then by value.
        let used = code_lengths.len() - counts[0];
        let mut sorted = vec![0u16; used];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len > 0 {
                sorted[offsets[len as usize]] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        let mut table_size = 1usize << root_bits;
        let mut entries = vec![HuffmanCode::default(); table_size];

        if used == 1 {
            replicate_value(
                &mut entries,
                1,
                table_size,
                HuffmanCode {
                    bits: 0,
                    value: sorted[0],
                },
            );
            return Self { root_bits, entries };
        }

        let mask = table_size - 1;
        let mut key = 0usize;
        let mut num_open = 1isize;
        let mut symbol = 0usize;

        let mut step = 2;
        for len in 1..=root_bits_usize {
            num_open <<= 1;
            num_open -= counts[len] as isize;
            if num_open < 0 {
                return empty;
            }
            for _ in 0..counts[len] {
                let code = HuffmanCode {
                    bits: len as u8,
                    value: sorted[symbol],
                };
                symbol += 1;
                replicate_value(&mut entries[key..], step, table_size, code);
                key = next_key(key, len);
            }
            counts[len] = 0;
            step <<= 1;
        }

        let mut low = usize::MAX;
        let mut table_pos = 0usize;
        let mut step = 2;
        for len in root_bits_usize + 1..=MAX_ALLOWED_CODE_LENGTH {
            num_open <<= 1;
            num_open -= counts[len] as isize;
            if num_open < 0 {
                return empty;
            }
            while counts[len] > 0 {
                if key & mask != low {
                    table_pos += table_size;
                    let table_bits = next_table_bit_size(&counts, len, root_bits_usize);
                    table_size = 1 << table_bits;
                    entries.resize(table_pos + table_size, HuffmanCode::default());
                    low = key & mask;
                    entries[low] = HuffmanCode {
                        bits: (table_bits + root_bits_usize) as u8,
                        value: (table_pos - low) as u16,
                    };
                }
                let code = HuffmanCode {
                    bits: (len - root_bits_usize) as u8,
                    value: sorted[symbol],
                };
                symbol += 1;
                replicate_value(
                    &mut entries[table_pos + (key >> root_bits)..],
                    step,
                    table_size,
                    code,
                );
                key = next_key(key, len);
                counts[len] -= 1;
            }
            step <<= 1;
        }

        if num_open != 0 {
            return empty;
        }
        Self { root_bits, entries }
    }

    /// Number of entries over all levels; 0 for a malformed code.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// True when construction rejected the code lengths.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode one symbol.
    #[inline]
    pub fn read_symbol(&self, br: &mut BitReader) -> DecodeResult<u16> {
        if self.entries.is_empty() {
            return Err(DecodeError::HuffmanError);
        }
        let bits = br.peek() as usize;
        let root_mask = (1usize << self.root_bits) - 1;
        let mut index = bits & root_mask;
        let mut entry = self.entries[index];
        if entry.bits > self.root_bits {
            br.consume(self.root_bits)?;
            let sub_bits = entry.bits - self.root_bits;
            index += entry.value as usize + ((bits >> self.root_bits) & ((1 << sub_bits) - 1));
            entry = self.entries[index];
        }
        br.consume(entry.bits)?;
        Ok(entry.value)
    }
}

/// Store `code` in `table[0]`, `table[step]`, ... up to `end`.
fn replicate_value(table: &mut [HuffmanCode], step: usize, mut end: usize, code: HuffmanCode) {
    debug_assert_eq!(end % step, 0);
    loop {
        end -= step;
        table[end] = code;
        if end == 0 {
            break;
        }
    }
}

/// Increment the bit-reversed `key` of length `len`.
fn next_key(key: usize, len: usize) -> usize {
    let mut step = 1 << (len - 1);
    while key & step != 0 {
        step >>= 1;
    }
    if step != 0 {
        (key & (step - 1)) + step
    } else {
        key
    }
}

/// Bits of the second-level table holding the codes of length `len` and
/// above that share one root prefix.
fn next_table_bit_size(counts: &[usize], mut len: usize, root_bits: usize) -> usize {
    let mut left = 1isize << (len - root_bits);
    while len < MAX_ALLOWED_CODE_LENGTH {
        left -= counts[len] as isize;
        if left <= 0 {
            break;
        }
        len += 1;
        left <<= 1;
    }
    len - root_bits
}
