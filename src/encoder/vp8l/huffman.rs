//! Huffman tree construction and encoding for VP8L.
//!
//! Implements length-limited canonical Huffman codes as required by the
//! VP8L bitstream, and the compressed (run-length coded) form in which
//! their code lengths are transmitted.

use alloc::vec;
use alloc::vec::Vec;

use super::bitwriter::BitWriter;
use super::types::{CODE_LENGTH_CODES, MAX_ALLOWED_CODE_LENGTH};

/// Order in which code length codes are written.
const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Depth limit of the code used to transmit code lengths.
const CODE_LENGTH_TREE_DEPTH_LIMIT: u8 = 7;

/// Largest symbol the simple (1 or 2 symbol) code form can carry.
const MAX_SIMPLE_SYMBOL: usize = 1 << 8;

/// Code lengths and bit-reversed canonical code words of one alphabet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HuffmanTreeCode {
    /// Code length per symbol, 0 for unused symbols.
    pub lengths: Vec<u8>,
    /// Code word per symbol, already reversed for LSB-first output.
    pub codes: Vec<u16>,
}

impl HuffmanTreeCode {
    /// Alphabet size.
    pub fn num_symbols(&self) -> usize {
        self.lengths.len()
    }

    /// A code with one symbol is implicit in the stream, so its symbol is
    /// written with zero bits.
    pub fn clear_if_only_one_symbol(&mut self) {
        let used = self.lengths.iter().filter(|&&l| l != 0).take(2).count();
        if used <= 1 {
            self.lengths.fill(0);
            self.codes.fill(0);
        }
    }
}

/// Token of a compressed code length sequence.
///
/// `code` is 0-15 for a literal length, 16 to repeat the previous non-zero
/// length, 17 and 18 for runs of zeros; `extra_bits` holds the repeat count
/// offset of the repeat codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HuffmanTreeToken {
    /// Code length symbol (0-18).
    pub code: u8,
    /// Extra bits value for codes 16, 17 and 18.
    pub extra_bits: u8,
}

/// Smooth a population so the resulting code lengths run-length code well.
///
/// Runs of at least 5 zeros or 7 equal non-zero counts are left alone.
/// Other stretches of similar counts (within 4 of a running average) of at
/// least 4 entries are replaced by their rounded average; all-zero stretches
/// need only 3 entries and stay zero.
pub fn optimize_huffman_for_rle(counts: &mut [u32]) {
    let n = counts.len();
    if n == 0 {
        return;
    }

    let mut length = n;
    while length > 0 && counts[length - 1] == 0 {
        length -= 1;
    }
    if length == 0 {
        return;
    }

    // Mark runs that are already good for RLE.
    let mut good_for_rle = vec![false; n];
    {
        let mut symbol = counts[0];
        let mut stride = 0usize;
        for i in 0..=length {
            if i == length || counts[i] != symbol {
                if (symbol == 0 && stride >= 5) || (symbol != 0 && stride >= 7) {
                    for k in 0..stride {
                        good_for_rle[i - k - 1] = true;
                    }
                }
                stride = 1;
                if i != length {
                    symbol = counts[i];
                }
            } else {
                stride += 1;
            }
        }
    }

    // Collapse strides of similar values to their average.
    let mut stride = 0u32;
    let mut limit = counts[0];
    let mut sum = 0u64;
    for i in 0..=length {
        if i == length
            || good_for_rle[i]
            || (i != 0 && good_for_rle[i - 1])
            || (counts[i] as i64 - limit as i64).unsigned_abs() >= 4
        {
            if stride >= 4 || (stride >= 3 && sum == 0) {
                let count = if sum == 0 {
                    0
                } else {
                    (((sum + stride as u64 / 2) / stride as u64) as u32).max(1)
                };
                for k in 0..stride as usize {
                    counts[i - k - 1] = count;
                }
            }
            stride = 0;
            sum = 0;
            limit = if i + 3 < length {
                ((counts[i] as u64
                    + counts[i + 1] as u64
                    + counts[i + 2] as u64
                    + counts[i + 3] as u64
                    + 2)
                    / 4) as u32
            } else if i < length {
                counts[i]
            } else {
                0
            };
        }
        stride += 1;
        if i != length {
            sum += counts[i] as u64;
            if stride >= 4 {
                limit = ((sum + stride as u64 / 2) / stride as u64) as u32;
            }
        }
    }
}

/// Node of the tree under construction. Leaves carry their symbol; merged
/// nodes point at their two children in the node pool.
#[derive(Debug, Clone, Copy)]
struct TreeNode {
    total_count: u32,
    value: u32,
    children: Option<(u32, u32)>,
}

/// Code lengths of a Huffman code for `histogram`, none longer than
/// `tree_depth_limit`.
///
/// Nodes are kept sorted by count descending then symbol ascending; the two
/// smallest are merged and the result re-inserted before the first node of
/// equal or smaller count. When the tree gets too deep, every count is
/// floored to a minimum that doubles until it fits.
pub fn generate_optimal_tree(histogram: &[u32], tree_depth_limit: u8) -> Vec<u8> {
    let mut bit_depths = vec![0u8; histogram.len()];
    let tree_size_orig = histogram.iter().filter(|&&c| c != 0).count();
    if tree_size_orig == 0 {
        return bit_depths;
    }
    debug_assert!(tree_size_orig <= 1 << (tree_depth_limit - 1));

    let mut tree: Vec<TreeNode> = Vec::with_capacity(tree_size_orig);
    let mut pool: Vec<TreeNode> = Vec::with_capacity(2 * tree_size_orig);
    let mut count_min = 1u32;
    loop {
        tree.clear();
        pool.clear();
        tree.extend(
            histogram
                .iter()
                .enumerate()
                .filter(|(_, &c)| c != 0)
                .map(|(symbol, &c)| TreeNode {
                    total_count: c.max(count_min),
                    value: symbol as u32,
                    children: None,
                }),
        );
        tree.sort_unstable_by(|a, b| {
            b.total_count
                .cmp(&a.total_count)
                .then(a.value.cmp(&b.value))
        });

        while tree.len() > 1 {
            let (Some(smallest), Some(next)) = (tree.pop(), tree.pop()) else {
                break;
            };
            pool.push(smallest);
            pool.push(next);
            let count = smallest.total_count + next.total_count;
            let k = tree.partition_point(|n| n.total_count > count);
            let top = pool.len() as u32;
            tree.insert(
                k,
                TreeNode {
                    total_count: count,
                    value: u32::MAX,
                    children: Some((top - 1, top - 2)),
                },
            );
        }

        if tree[0].children.is_some() {
            set_bit_depths(tree[0], &pool, &mut bit_depths);
        } else {
            bit_depths[tree[0].value as usize] = 1;
        }

        let max_depth = bit_depths.iter().copied().max().unwrap_or(0);
        if max_depth <= tree_depth_limit {
            break;
        }
        count_min *= 2;
    }
    bit_depths
}

fn set_bit_depths(root: TreeNode, pool: &[TreeNode], bit_depths: &mut [u8]) {
    let mut stack = vec![(root, 0u8)];
    while let Some((node, level)) = stack.pop() {
        match node.children {
            Some((left, right)) => {
                let next = level.saturating_add(1);
                stack.push((pool[left as usize], next));
                stack.push((pool[right as usize], next));
            }
            None => bit_depths[node.value as usize] = level,
        }
    }
}

/// Bit-reversed canonical code words for `lengths`.
pub fn convert_bit_depths_to_symbols(lengths: &[u8]) -> Vec<u16> {
    let max = MAX_ALLOWED_CODE_LENGTH as usize;
    let mut depth_count = [0u32; MAX_ALLOWED_CODE_LENGTH as usize + 1];
    for &len in lengths {
        depth_count[len as usize] += 1;
    }
    depth_count[0] = 0;

    let mut next_code = [0u32; MAX_ALLOWED_CODE_LENGTH as usize + 1];
    let mut code = 0u32;
    for bits in 1..=max {
        code = (code + depth_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let c = next_code[len as usize];
            next_code[len as usize] += 1;
            reverse_bits(len as u32, c) as u16
        })
        .collect()
}

/// Reverse the low `num_bits` bits of `bits`.
fn reverse_bits(num_bits: u32, bits: u32) -> u32 {
    const REVERSED_BITS: [u8; 16] = [
        0x0, 0x8, 0x4, 0xc, 0x2, 0xa, 0x6, 0xe, 0x1, 0x9, 0x5, 0xd, 0x3, 0xb, 0x7, 0xf,
    ];

    let mut retval = 0u32;
    let mut b = bits;
    let mut i = 0;
    while i < num_bits {
        i += 4;
        retval |= (REVERSED_BITS[(b & 0xf) as usize] as u32) << (16 - i);
        b >>= 4;
    }
    retval >> (16 - num_bits)
}

/// Huffman code of `histogram` after RLE smoothing, lengths capped at
/// `tree_depth_limit`.
pub fn create_huffman_tree(histogram: &[u32], tree_depth_limit: u8) -> HuffmanTreeCode {
    let mut counts = histogram.to_vec();
    optimize_huffman_for_rle(&mut counts);
    let lengths = generate_optimal_tree(&counts, tree_depth_limit);
    let codes = convert_bit_depths_to_symbols(&lengths);
    HuffmanTreeCode { lengths, codes }
}

/// Run-length tokens of a code length sequence. The "previous length" that
/// code 16 repeats starts at 8.
pub fn create_compressed_huffman_tree(lengths: &[u8]) -> Vec<HuffmanTreeToken> {
    let n = lengths.len();
    let mut tokens = Vec::with_capacity(n);
    let mut prev_value = 8u8;
    let mut i = 0;
    while i < n {
        let value = lengths[i];
        let mut k = i + 1;
        while k < n && lengths[k] == value {
            k += 1;
        }
        let runs = k - i;
        if value == 0 {
            code_repeated_zeros(runs, &mut tokens);
        } else {
            code_repeated_values(runs, &mut tokens, value, prev_value);
            prev_value = value;
        }
        i += runs;
    }
    tokens
}

fn code_repeated_zeros(mut repetitions: usize, tokens: &mut Vec<HuffmanTreeToken>) {
    while repetitions >= 1 {
        if repetitions < 3 {
            for _ in 0..repetitions {
                tokens.push(HuffmanTreeToken {
                    code: 0,
                    extra_bits: 0,
                });
            }
            break;
        } else if repetitions < 11 {
            tokens.push(HuffmanTreeToken {
                code: 17,
                extra_bits: (repetitions - 3) as u8,
            });
            break;
        } else if repetitions < 139 {
            tokens.push(HuffmanTreeToken {
                code: 18,
                extra_bits: (repetitions - 11) as u8,
            });
            break;
        } else {
            // 138 zeros
            tokens.push(HuffmanTreeToken {
                code: 18,
                extra_bits: 0x7f,
            });
            repetitions -= 138;
        }
    }
}

fn code_repeated_values(
    mut repetitions: usize,
    tokens: &mut Vec<HuffmanTreeToken>,
    value: u8,
    prev_value: u8,
) {
    if value != prev_value {
        tokens.push(HuffmanTreeToken {
            code: value,
            extra_bits: 0,
        });
        repetitions -= 1;
    }
    while repetitions >= 1 {
        if repetitions < 3 {
            for _ in 0..repetitions {
                tokens.push(HuffmanTreeToken {
                    code: value,
                    extra_bits: 0,
                });
            }
            break;
        } else if repetitions < 7 {
            tokens.push(HuffmanTreeToken {
                code: 16,
                extra_bits: (repetitions - 3) as u8,
            });
            break;
        } else {
            // repeat 6 times
            tokens.push(HuffmanTreeToken {
                code: 16,
                extra_bits: 3,
            });
            repetitions -= 6;
        }
    }
}

/// Write `code` to the stream.
///
/// Empty codes use the minimal simple form (one 1-bit symbol 0). Codes with
/// one or two symbols below 256 use the simple form; everything else is sent
/// as run-length coded lengths.
pub fn store_huffman_code(w: &mut BitWriter, code: &HuffmanTreeCode) {
    let mut count = 0usize;
    let mut symbols = [0usize; 2];
    for (i, &len) in code.lengths.iter().enumerate() {
        if len != 0 {
            if count < 2 {
                symbols[count] = i;
            }
            count += 1;
            if count > 2 {
                break;
            }
        }
    }

    if count == 0 {
        // simple marker, one symbol, 1-bit symbol, symbol 0
        w.write_bits(0x01, 4);
    } else if count <= 2 && symbols[0] < MAX_SIMPLE_SYMBOL && symbols[1] < MAX_SIMPLE_SYMBOL {
        w.write_bit(true);
        w.write_bits((count - 1) as u64, 1);
        if symbols[0] <= 1 {
            w.write_bit(false);
            w.write_bits(symbols[0] as u64, 1);
        } else {
            w.write_bit(true);
            w.write_bits(symbols[0] as u64, 8);
        }
        if count == 2 {
            w.write_bits(symbols[1] as u64, 8);
        }
    } else {
        store_full_huffman_code(w, code);
    }
}

fn store_full_huffman_code(w: &mut BitWriter, code: &HuffmanTreeCode) {
    w.write_bit(false);

    let tokens = create_compressed_huffman_tree(&code.lengths);
    let mut histogram = [0u32; CODE_LENGTH_CODES];
    for token in &tokens {
        histogram[token.code as usize] += 1;
    }
    let mut length_code = create_huffman_tree(&histogram, CODE_LENGTH_TREE_DEPTH_LIMIT);

    // Lengths of the code length code, trailing zeros dropped.
    let mut codes_to_store = CODE_LENGTH_CODES;
    while codes_to_store > 4 && length_code.lengths[CODE_LENGTH_CODE_ORDER[codes_to_store - 1]] == 0
    {
        codes_to_store -= 1;
    }
    w.write_bits((codes_to_store - 4) as u64, 4);
    for &order_idx in CODE_LENGTH_CODE_ORDER[..codes_to_store].iter() {
        w.write_bits(length_code.lengths[order_idx] as u64, 3);
    }

    length_code.clear_if_only_one_symbol();

    let num_tokens = tokens.len();
    let mut trimmed_length = num_tokens;
    let mut trailing_zero_bits = 0u32;
    for token in tokens.iter().rev() {
        let ix = token.code as usize;
        if ix != 0 && ix != 17 && ix != 18 {
            break;
        }
        trimmed_length -= 1;
        trailing_zero_bits += length_code.lengths[ix] as u32;
        if ix == 17 {
            trailing_zero_bits += 3;
        } else if ix == 18 {
            trailing_zero_bits += 7;
        }
    }

    let write_trimmed_length = trimmed_length > 1 && trailing_zero_bits > 12;
    let length = if write_trimmed_length {
        trimmed_length
    } else {
        num_tokens
    };

    w.write_bit(write_trimmed_length);
    if write_trimmed_length {
        if trimmed_length == 2 {
            // nbitpairs=1, trimmed_length=2
            w.write_bits(0, 3 + 2);
        } else {
            let nbits = 31 - ((trimmed_length - 2) as u32).leading_zeros();
            let nbitpairs = nbits / 2 + 1;
            w.write_bits((nbitpairs - 1) as u64, 3);
            w.write_bits((trimmed_length - 2) as u64, (nbitpairs * 2) as u8);
        }
    }

    for token in &tokens[..length] {
        let ix = token.code as usize;
        match ix {
            16 => w.write_huffman_code_with_extra_bits(&length_code, ix, token.extra_bits as u32, 2),
            17 => w.write_huffman_code_with_extra_bits(&length_code, ix, token.extra_bits as u32, 3),
            18 => w.write_huffman_code_with_extra_bits(&length_code, ix, token.extra_bits as u32, 7),
            _ => w.write_huffman_code(&length_code, ix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8]) -> u32 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u32 << (15 - l))
            .sum()
    }

    #[test]
    fn test_16_equal_symbols() {
        let mut freq = vec![0u32; 256];
        for f in freq[..16].iter_mut() {
            *f = 16;
        }
        let lengths = generate_optimal_tree(&freq, 15);
        assert!(lengths[..16].iter().all(|&l| l == 4));
        assert!(lengths[16..].iter().all(|&l| l == 0));
    }

    #[test]
    fn test_single_and_pair() {
        let lengths = generate_optimal_tree(&[0, 0, 100, 0, 0], 15);
        assert_eq!(lengths, vec![0, 0, 1, 0, 0]);

        let lengths = generate_optimal_tree(&[100, 1, 0, 0], 15);
        assert_eq!(lengths, vec![1, 1, 0, 0]);

        assert_eq!(generate_optimal_tree(&[0, 0, 0], 15), vec![0, 0, 0]);
    }

    #[test]
    fn test_skewed_order() {
        let lengths = generate_optimal_tree(&[1, 10, 100, 1000], 15);
        assert!(lengths[3] <= lengths[2]);
        assert!(lengths[2] <= lengths[1]);
        assert!(lengths[1] <= lengths[0]);
        assert_eq!(kraft_sum(&lengths), 1 << 15);
    }

    #[test]
    fn test_depth_limit_is_respected() {
        // Fibonacci counts want a maximally deep tree.
        let mut freq = vec![0u32; 20];
        let (mut a, mut b) = (1u32, 1u32);
        for f in freq.iter_mut() {
            *f = a;
            let next = a + b;
            a = b;
            b = next;
        }
        assert!(generate_optimal_tree(&freq, 15).iter().any(|&l| l > 7));

        let lengths = generate_optimal_tree(&freq, 7);
        assert!(lengths.iter().all(|&l| (1..=7).contains(&l)));
        assert_eq!(kraft_sum(&lengths), 1 << 15);
    }

    #[test]
    fn test_kraft_equality_on_noise() {
        let mut seed = 7u32;
        let freq: Vec<u32> = (0..280)
            .map(|i| {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                if i % 7 == 3 {
                    0
                } else {
                    (seed >> 20) + 1
                }
            })
            .collect();
        let code = create_huffman_tree(&freq, 15);
        assert_eq!(kraft_sum(&code.lengths), 1 << 15);
        assert!(code.lengths.iter().all(|&l| l <= 15));
    }

    #[test]
    fn test_canonical_codes() {
        let codes = convert_bit_depths_to_symbols(&[2, 2, 3, 3, 0]);
        // Canonical 00, 01, 100, 101 reversed for LSB-first output.
        assert_eq!(codes, vec![0b00, 0b10, 0b001, 0b101, 0]);
    }

    #[test]
    fn test_optimize_for_rle() {
        // Similar counts collapse to their average.
        let mut counts = [10u32, 11, 9, 10, 12, 0, 0, 0];
        optimize_huffman_for_rle(&mut counts);
        assert_eq!(&counts[..5], &[10, 10, 10, 10, 10]);

        // Long zero runs stay untouched.
        let mut counts = [5u32, 0, 0, 0, 0, 0, 0, 40];
        let orig = counts;
        optimize_huffman_for_rle(&mut counts);
        assert_eq!(counts, orig);

        let mut zeros = [0u32; 10];
        optimize_huffman_for_rle(&mut zeros);
        assert_eq!(zeros, [0; 10]);
    }

    /// Expand tokens back to code lengths.
    fn expand_tokens(tokens: &[HuffmanTreeToken]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut prev = 8u8;
        for t in tokens {
            match t.code {
                0..=15 => {
                    out.push(t.code);
                    if t.code != 0 {
                        prev = t.code;
                    }
                }
                16 => out.extend(core::iter::repeat(prev).take(3 + t.extra_bits as usize)),
                17 => out.extend(core::iter::repeat(0).take(3 + t.extra_bits as usize)),
                _ => out.extend(core::iter::repeat(0).take(11 + t.extra_bits as usize)),
            }
        }
        out
    }

    #[test]
    fn test_compressed_tree_tokens() {
        let mut lengths = vec![8u8; 5];
        lengths.extend([0; 200]);
        lengths.extend([3, 3, 3, 3, 3, 3, 3, 3, 0, 0, 5]);
        let tokens = create_compressed_huffman_tree(&lengths);
        // The leading 8s reuse the initial previous length.
        assert_eq!(tokens[0], HuffmanTreeToken { code: 16, extra_bits: 2 });
        assert_eq!(expand_tokens(&tokens), lengths);
        assert!(tokens.len() < 15);
    }

    #[test]
    fn test_clear_if_only_one_symbol() {
        let mut code = create_huffman_tree(&[0, 0, 7, 0], 15);
        assert_eq!(code.lengths[2], 1);
        code.clear_if_only_one_symbol();
        assert!(code.lengths.iter().all(|&l| l == 0));

        let mut code = create_huffman_tree(&[1, 0, 7, 0], 15);
        code.clear_if_only_one_symbol();
        assert_eq!(code.lengths, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_store_small_codes() {
        let mut w = BitWriter::new();
        store_huffman_code(&mut w, &create_huffman_tree(&[0u32; 256], 15));
        assert_eq!(w.bit_position(), 4);
        assert_eq!(w.finish(), vec![0x01]);

        let mut hist = [0u32; 256];
        hist[5] = 3;
        let mut w = BitWriter::new();
        store_huffman_code(&mut w, &create_huffman_tree(&hist, 15));
        // marker, one symbol, 8-bit symbol flag, symbol 5
        assert_eq!(w.bit_position(), 11);
        assert_eq!(w.finish(), vec![45, 0]);

        hist[1] = 9;
        let mut w = BitWriter::new();
        store_huffman_code(&mut w, &create_huffman_tree(&hist, 15));
        assert_eq!(w.bit_position(), 1 + 1 + 1 + 1 + 8);
    }

    #[test]
    fn test_store_full_code_for_large_symbol() {
        // A lone symbol above 255 cannot use the simple form.
        let mut hist = vec![0u32; 280];
        hist[270] = 4;
        let mut w = BitWriter::new();
        store_huffman_code(&mut w, &create_huffman_tree(&hist, 15));
        assert!(w.bit_position() > 12);
        assert_eq!(w.buffer()[0] & 1, 0);
    }
}
