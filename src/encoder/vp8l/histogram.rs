//! Histogram building and manipulation for VP8L encoding.
//!
//! Histograms track symbol frequencies for Huffman code construction, and
//! carry the cost estimates the clusterer uses to decide which ones to merge.

use alloc::vec;
use alloc::vec::Vec;

use super::backward_refs::distance_to_plane_code;
use super::entropy::{
    combined_entropy_unrefined, entropy_unrefined, extra_cost, extra_cost_combined,
    population_cost, BitEntropy, Streaks,
};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, literal_alphabet_size, BackwardRefs, PixOrCopy,
    ALPHABET_SIZE_ALPHA, ALPHABET_SIZE_BLUE, ALPHABET_SIZE_DISTANCE, ALPHABET_SIZE_RED,
    NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// VP8L histogram for a single Huffman code group.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Green channel + length codes + cache codes (256 + 24 + cache_size).
    pub literal: Vec<u32>,
    /// Red channel (256).
    pub red: [u32; ALPHABET_SIZE_RED],
    /// Blue channel (256).
    pub blue: [u32; ALPHABET_SIZE_BLUE],
    /// Alpha channel (256).
    pub alpha: [u32; ALPHABET_SIZE_ALPHA],
    /// Distance codes (40).
    pub distance: [u32; ALPHABET_SIZE_DISTANCE],
    /// Cache bits (0 = no cache).
    pub cache_bits: u8,
    /// Estimated total bits, refreshed by [`Histogram::update_cost`].
    pub bit_cost: f64,
    /// Green/length part of `bit_cost`.
    pub literal_cost: f64,
    /// Red part of `bit_cost`.
    pub red_cost: f64,
    /// Blue part of `bit_cost`.
    pub blue_cost: f64,
    /// Whether each of the five tables has a non-zero entry.
    pub is_used: [bool; 5],
    /// `(a << 24) | (r << 16) | b` when alpha, red and blue each hold a
    /// single symbol.
    pub trivial_symbol: Option<u32>,
}

impl Histogram {
    /// Create a new histogram with the given cache bits.
    pub fn new(cache_bits: u8) -> Self {
        Self {
            literal: vec![0; literal_alphabet_size(cache_bits)],
            red: [0; ALPHABET_SIZE_RED],
            blue: [0; ALPHABET_SIZE_BLUE],
            alpha: [0; ALPHABET_SIZE_ALPHA],
            distance: [0; ALPHABET_SIZE_DISTANCE],
            cache_bits,
            bit_cost: 0.0,
            literal_cost: 0.0,
            red_cost: 0.0,
            blue_cost: 0.0,
            is_used: [false; 5],
            trivial_symbol: None,
        }
    }

    /// Clear all counts and costs.
    pub fn clear(&mut self) {
        self.literal.fill(0);
        self.red.fill(0);
        self.blue.fill(0);
        self.alpha.fill(0);
        self.distance.fill(0);
        self.bit_cost = 0.0;
        self.literal_cost = 0.0;
        self.red_cost = 0.0;
        self.blue_cost = 0.0;
        self.is_used = [false; 5];
        self.trivial_symbol = None;
    }

    /// Size of the green/length/cache alphabet.
    #[inline]
    pub fn num_codes(&self) -> usize {
        self.literal.len()
    }

    /// Add a literal ARGB pixel.
    #[inline]
    pub fn add_literal(&mut self, argb: u32) {
        self.literal[argb_green(argb) as usize] += 1;
        self.red[argb_red(argb) as usize] += 1;
        self.blue[argb_blue(argb) as usize] += 1;
        self.alpha[argb_alpha(argb) as usize] += 1;
    }

    /// Add a cache index.
    #[inline]
    pub fn add_cache_idx(&mut self, idx: u16) {
        let code = NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize;
        debug_assert!(code < self.literal.len());
        self.literal[code] += 1;
    }

    /// Add a backward reference with an already-mapped distance code.
    #[inline]
    pub fn add_copy(&mut self, len: u16, dist_code: u32) {
        let len_code = prefix_encode(len as u32).code;
        let dist_prefix = prefix_encode(dist_code).code;
        self.literal[NUM_LITERAL_CODES + len_code as usize] += 1;
        self.distance[dist_prefix as usize] += 1;
    }

    /// Add a token, using its distance as is.
    #[inline]
    pub fn add_token(&mut self, token: &PixOrCopy) {
        match *token {
            PixOrCopy::Literal(argb) => self.add_literal(argb),
            PixOrCopy::CacheIdx(idx) => self.add_cache_idx(idx),
            PixOrCopy::Copy { len, dist } => self.add_copy(len, dist),
        }
    }

    /// Add a token whose copy distance is still linear, counting it under
    /// its plane code.
    #[inline]
    pub fn add_token_plane(&mut self, token: &PixOrCopy, xsize: usize) {
        match *token {
            PixOrCopy::Copy { len, dist } => {
                self.add_copy(len, distance_to_plane_code(xsize, dist as usize))
            }
            _ => self.add_token(token),
        }
    }

    /// Build histogram from backward references.
    pub fn from_refs(refs: &BackwardRefs, cache_bits: u8) -> Self {
        let mut h = Self::new(cache_bits);
        for token in refs.iter() {
            h.add_token(token);
        }
        h
    }

    /// Build histogram from references with linear distances, counted as
    /// plane codes.
    pub fn from_refs_with_plane_codes(refs: &BackwardRefs, cache_bits: u8, xsize: usize) -> Self {
        let mut h = Self::new(cache_bits);
        for token in refs.iter() {
            h.add_token_plane(token, xsize);
        }
        h
    }

    /// Whether no token was added.
    pub fn is_empty(&self) -> bool {
        self.literal.iter().all(|&c| c == 0) && self.distance.iter().all(|&c| c == 0)
    }

    /// Estimated bits to code every token counted here.
    pub fn estimate_bits(&self) -> f64 {
        population_cost(&self.literal).bits
            + population_cost(&self.red).bits
            + population_cost(&self.blue).bits
            + population_cost(&self.alpha).bits
            + population_cost(&self.distance).bits
            + extra_cost(&self.literal[NUM_LITERAL_CODES..NUM_LITERAL_CODES + NUM_LENGTH_CODES])
            + extra_cost(&self.distance)
    }

    /// Refresh the cached costs, `is_used` flags and trivial symbol.
    pub fn update_cost(&mut self) {
        let alpha = population_cost(&self.alpha);
        let distance = population_cost(&self.distance);
        let literal = population_cost(&self.literal);
        let red = population_cost(&self.red);
        let blue = population_cost(&self.blue);

        self.is_used = [
            literal.is_used,
            red.is_used,
            blue.is_used,
            alpha.is_used,
            distance.is_used,
        ];
        self.literal_cost = literal.bits
            + extra_cost(&self.literal[NUM_LITERAL_CODES..NUM_LITERAL_CODES + NUM_LENGTH_CODES]);
        self.red_cost = red.bits;
        self.blue_cost = blue.bits;
        let distance_cost = distance.bits + extra_cost(&self.distance);
        self.bit_cost =
            self.literal_cost + self.red_cost + self.blue_cost + alpha.bits + distance_cost;

        self.trivial_symbol = match (alpha.trivial_symbol, red.trivial_symbol, blue.trivial_symbol)
        {
            (Some(a), Some(r), Some(b)) => Some((a << 24) | (r << 16) | b),
            _ => None,
        };
    }

    /// Cost of `self + other`, starting from `cost_initial`. Returns `None`
    /// as soon as the running cost exceeds `cost_threshold`.
    pub fn combined_entropy(
        &self,
        other: &Histogram,
        cost_threshold: f64,
        cost_initial: f64,
    ) -> Option<f64> {
        let within = |cost: f64| (cost <= cost_threshold).then_some(cost);

        let mut cost = cost_initial;
        cost += combined_table_entropy(
            &self.literal,
            &other.literal,
            self.is_used[0],
            other.is_used[0],
            false,
        );
        cost += extra_cost_combined(
            &self.literal[NUM_LITERAL_CODES..NUM_LITERAL_CODES + NUM_LENGTH_CODES],
            &other.literal[NUM_LITERAL_CODES..NUM_LITERAL_CODES + NUM_LENGTH_CODES],
        );
        cost = within(cost)?;

        // Histograms of palettized images put their one color at either end
        // of the red, blue and alpha tables.
        let trivial_at_end = match (self.trivial_symbol, other.trivial_symbol) {
            (Some(a), Some(b)) if a == b => {
                let extreme = |v: u32| v == 0 || v == 0xff;
                extreme((a >> 24) & 0xff) && extreme((a >> 16) & 0xff) && extreme(a & 0xff)
            }
            _ => false,
        };

        cost += combined_table_entropy(
            &self.red,
            &other.red,
            self.is_used[1],
            other.is_used[1],
            trivial_at_end,
        );
        cost = within(cost)?;
        cost += combined_table_entropy(
            &self.blue,
            &other.blue,
            self.is_used[2],
            other.is_used[2],
            trivial_at_end,
        );
        cost = within(cost)?;
        cost += combined_table_entropy(
            &self.alpha,
            &other.alpha,
            self.is_used[3],
            other.is_used[3],
            trivial_at_end,
        );
        cost = within(cost)?;
        cost += combined_table_entropy(
            &self.distance,
            &other.distance,
            self.is_used[4],
            other.is_used[4],
            false,
        );
        cost = within(cost)?;
        cost += extra_cost_combined(&self.distance, &other.distance);
        within(cost)
    }

    /// Evaluate merging `self` and `other`. When the merged cost stays below
    /// `threshold + bit_cost(self) + bit_cost(other)`, `out` receives the sum
    /// (with its `bit_cost` set). Returns the cost change of the merge, which
    /// is at least `threshold` when nothing was written.
    pub fn add_eval(&self, other: &Histogram, threshold: f64, out: &mut Histogram) -> f64 {
        let sum_cost = self.bit_cost + other.bit_cost;
        let threshold = threshold + sum_cost;
        match self.combined_entropy(other, threshold, 0.0) {
            Some(cost) => {
                out.clone_from(self);
                out.add(other);
                out.bit_cost = cost;
                cost - sum_cost
            }
            None => threshold - sum_cost,
        }
    }

    /// Cost increase of adding `other` into `self`, capped at `threshold`.
    pub fn add_thresh(&self, other: &Histogram, threshold: f64) -> f64 {
        let cost_initial = -self.bit_cost;
        self.combined_entropy(other, threshold, cost_initial)
            .unwrap_or(threshold)
    }

    /// Merge another histogram into this one.
    pub fn add(&mut self, other: &Histogram) {
        debug_assert_eq!(self.cache_bits, other.cache_bits);
        add_counts(&mut self.literal, &other.literal);
        add_counts(&mut self.red, &other.red);
        add_counts(&mut self.blue, &other.blue);
        add_counts(&mut self.alpha, &other.alpha);
        add_counts(&mut self.distance, &other.distance);
        for (a, b) in self.is_used.iter_mut().zip(other.is_used) {
            *a |= b;
        }
        if self.trivial_symbol != other.trivial_symbol {
            self.trivial_symbol = None;
        }
    }

    /// Total number of tokens counted.
    pub fn token_count(&self) -> u64 {
        // Every token adds exactly one green/length/cache symbol.
        self.literal.iter().map(|&c| c as u64).sum()
    }
}

#[inline]
fn add_counts(dst: &mut [u32], src: &[u32]) {
    for (a, b) in dst.iter_mut().zip(src) {
        *a += b;
    }
}

/// Population cost of the element-wise sum of two tables.
fn combined_table_entropy(
    x: &[u32],
    y: &[u32],
    is_x_used: bool,
    is_y_used: bool,
    trivial_at_end: bool,
) -> f64 {
    if trivial_at_end {
        // A single non-zero value at one end followed by zeros: entropy is 0,
        // only the code-length cost remains.
        let mut stats = Streaks::default();
        stats.streaks[1][0] = 1;
        stats.counts[0] = 1;
        stats.streaks[0][1] = x.len() as u32 - 1;
        return stats.final_huffman_cost();
    }

    let (entropy, stats) = match (is_x_used, is_y_used) {
        (true, true) => combined_entropy_unrefined(x, y),
        (true, false) => entropy_unrefined(x),
        (false, true) => entropy_unrefined(y),
        (false, false) => (BitEntropy::default(), Streaks::all_zero(x.len())),
    };
    entropy.refine() + stats.final_huffman_cost()
}

/// Prefix symbol of a length or distance, with its extra bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixCode {
    /// Prefix symbol (0-39).
    pub code: u8,
    /// Number of extra bits following the symbol.
    pub extra_bits: u8,
    /// Value of the extra bits.
    pub extra_value: u32,
}

/// Prefix-encode a length or distance code (VP8L's `PrefixEncode`).
///
/// Values 1..=4 map to symbols 0..=3 without extra bits; larger values use
/// the two highest bits of `value - 1` for the symbol. 0 is treated as 1.
#[inline]
pub fn prefix_encode(value: u32) -> PrefixCode {
    if value <= 4 {
        return PrefixCode {
            code: value.saturating_sub(1) as u8,
            extra_bits: 0,
            extra_value: 0,
        };
    }
    let dist = value - 1;
    let highest_bit = 31 - dist.leading_zeros();
    let second_highest_bit = (dist >> (highest_bit - 1)) & 1;
    let extra_bits = highest_bit - 1;
    PrefixCode {
        code: (2 * highest_bit + second_highest_bit) as u8,
        extra_bits: extra_bits as u8,
        extra_value: dist & ((1 << extra_bits) - 1),
    }
}

/// Number of extra bits that follow a prefix symbol.
#[inline]
pub fn prefix_extra_bits(code: u8) -> u8 {
    if code < 4 {
        0
    } else {
        (code >> 1) - 1
    }
}

/// Inverse of [`prefix_encode`].
#[inline]
pub fn prefix_decode(code: u8, extra_value: u32) -> u32 {
    if code < 4 {
        return code as u32 + 1;
    }
    let extra_bits = prefix_extra_bits(code);
    let offset = (2 + (code as u32 & 1)) << extra_bits;
    offset + extra_value + 1
}
