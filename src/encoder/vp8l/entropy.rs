//! Entropy calculation for VP8L encoding.
//!
//! Estimates the bit cost of Huffman-coding a population: a refined Shannon
//! entropy, plus the cost of transmitting the code lengths themselves,
//! approximated from the runs ("streaks") of zero and non-zero counts.

/// `v * log2(v)`, 0 for 0.
#[inline]
pub fn fast_slog2(v: u64) -> f64 {
    if v == 0 {
        return 0.0;
    }
    let f = v as f64;
    f * libm::log2(f)
}

/// `log2(v)`, 0 for 0.
#[inline]
pub fn fast_log2(v: u64) -> f64 {
    if v == 0 {
        return 0.0;
    }
    libm::log2(v as f64)
}

/// Running entropy statistics of a population.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitEntropy {
    /// `slog2(sum) - sum(slog2(count))`.
    pub entropy: f64,
    /// Sum of the population.
    pub sum: u64,
    /// Number of non-zero entries.
    pub nonzeros: u32,
    /// Largest entry.
    pub max_val: u64,
    /// Index of the last non-zero entry.
    pub nonzero_code: u32,
}

/// Zero / non-zero run statistics of a population.
///
/// Index 0 is for runs of zeros, 1 for runs of non-zero values; the second
/// index of `streaks` separates runs of at most 3 from longer ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Streaks {
    /// Number of runs longer than 3.
    pub counts: [u32; 2],
    /// Total length of short and long runs.
    pub streaks: [[u32; 2]; 2],
}

impl BitEntropy {
    /// Plain entropy statistics of `population`, ignoring runs.
    pub fn from_population(population: &[u32]) -> Self {
        let mut e = Self::default();
        for (i, &count) in population.iter().enumerate() {
            if count != 0 {
                let count = count as u64;
                e.sum += count;
                e.nonzero_code = i as u32;
                e.nonzeros += 1;
                e.entropy -= fast_slog2(count);
                e.max_val = e.max_val.max(count);
            }
        }
        e.entropy += fast_slog2(e.sum);
        e
    }

    /// Account for `streak` consecutive entries equal to `val` starting at `start`.
    #[inline]
    fn add_streak(&mut self, stats: &mut Streaks, val: u64, streak: u32, start: usize) {
        if val != 0 {
            self.sum += val * streak as u64;
            self.nonzeros += streak;
            self.nonzero_code = start as u32;
            self.entropy -= fast_slog2(val) * streak as f64;
            self.max_val = self.max_val.max(val);
        }
        let nz = (val != 0) as usize;
        let long = (streak > 3) as usize;
        stats.counts[nz] += long as u32;
        stats.streaks[nz][long] += streak;
    }

    /// Huffman coding cannot beat one bit per symbol when there are few
    /// distinct symbols, so blend the entropy toward that bound.
    pub fn refine(&self) -> f64 {
        let mix = if self.nonzeros < 5 {
            if self.nonzeros <= 1 {
                return 0.0;
            }
            // Two symbols become a 1-bit code; a little entropy is mixed in
            // so that clustering still tells distributions apart.
            if self.nonzeros == 2 {
                return 0.99 * self.sum as f64 + 0.01 * self.entropy;
            }
            if self.nonzeros == 3 {
                0.95
            } else {
                0.7
            }
        } else {
            0.627
        };

        let min_limit = 2.0 * self.sum as f64 - self.max_val as f64;
        let min_limit = mix * min_limit + (1.0 - mix) * self.entropy;
        if self.entropy < min_limit {
            min_limit
        } else {
            self.entropy
        }
    }
}

impl Streaks {
    /// Statistics of an all-zero population of `length` entries.
    pub fn all_zero(length: usize) -> Self {
        let mut s = Self::default();
        s.counts[0] = 1;
        s.streaks[0][(length > 3) as usize] = length as u32;
        s
    }

    /// Approximate cost of storing the code lengths.
    pub fn final_huffman_cost(&self) -> f64 {
        // Code lengths of the code length code, minus a small bias since
        // they are rarely stored in full.
        let mut retval = CODE_LENGTH_CODES_COST - 9.1;
        // Long zero runs are cheap with repeat codes.
        retval += self.counts[0] as f64 * 1.5625 + 0.234375 * self.streaks[0][1] as f64;
        retval += self.counts[1] as f64 * 2.578125 + 0.703125 * self.streaks[1][1] as f64;
        retval += 1.796875 * self.streaks[0][0] as f64;
        retval += 3.28125 * self.streaks[1][0] as f64;
        retval
    }
}

const CODE_LENGTH_CODES_COST: f64 = (super::types::CODE_LENGTH_CODES * 3) as f64;

/// Entropy and streak statistics of one population.
pub fn entropy_unrefined(x: &[u32]) -> (BitEntropy, Streaks) {
    entropy_unrefined_with(x.len(), |i| x[i] as u64)
}

/// Entropy and streak statistics of the element-wise sum of two populations.
pub fn combined_entropy_unrefined(x: &[u32], y: &[u32]) -> (BitEntropy, Streaks) {
    debug_assert_eq!(x.len(), y.len());
    entropy_unrefined_with(x.len(), |i| x[i] as u64 + y[i] as u64)
}

#[inline]
fn entropy_unrefined_with(length: usize, value: impl Fn(usize) -> u64) -> (BitEntropy, Streaks) {
    let mut e = BitEntropy::default();
    let mut stats = Streaks::default();
    if length == 0 {
        return (e, stats);
    }
    let mut i_prev = 0usize;
    let mut x_prev = value(0);
    for i in 1..length {
        let x = value(i);
        if x != x_prev {
            e.add_streak(&mut stats, x_prev, (i - i_prev) as u32, i_prev);
            x_prev = x;
            i_prev = i;
        }
    }
    e.add_streak(&mut stats, x_prev, (length - i_prev) as u32, i_prev);
    e.entropy += fast_slog2(e.sum);
    (e, stats)
}

/// Estimated cost of a population and its trivial symbol, if any.
#[derive(Debug, Clone, Copy)]
pub struct PopulationCost {
    /// Estimated bits.
    pub bits: f64,
    /// The only non-zero symbol, when there is exactly one.
    pub trivial_symbol: Option<u32>,
    /// Whether any entry is non-zero.
    pub is_used: bool,
}

/// Estimated bits to Huffman-code `population`, header included.
pub fn population_cost(population: &[u32]) -> PopulationCost {
    let (e, stats) = entropy_unrefined(population);
    PopulationCost {
        bits: e.refine() + stats.final_huffman_cost(),
        trivial_symbol: (e.nonzeros == 1).then_some(e.nonzero_code),
        is_used: stats.streaks[1][0] != 0 || stats.streaks[1][1] != 0,
    }
}

/// Extra bits of a prefix-coded population (lengths or distances).
pub fn extra_cost(population: &[u32]) -> f64 {
    let length = population.len();
    let mut cost = 0.0;
    for i in 2..length.saturating_sub(2) {
        cost += (i >> 1) as f64 * population[i + 2] as f64;
    }
    cost
}

/// [`extra_cost`] of the element-wise sum of two populations.
pub fn extra_cost_combined(x: &[u32], y: &[u32]) -> f64 {
    let length = x.len();
    let mut cost = 0.0;
    for i in 2..length.saturating_sub(2) {
        let xy = x[i + 2] as f64 + y[i + 2] as f64;
        cost += (i >> 1) as f64 * xy;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_log2() {
        assert_eq!(fast_log2(0), 0.0);
        assert!((fast_log2(8) - 3.0).abs() < 1e-12);
        assert!((fast_slog2(4) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_refine_few_symbols() {
        assert_eq!(BitEntropy::from_population(&[0, 0, 9, 0]).refine(), 0.0);

        // Two equally likely symbols: one bit each.
        let e = BitEntropy::from_population(&[10, 10]);
        assert!((e.entropy - 20.0).abs() < 1e-9);
        assert!((e.refine() - 20.0).abs() < 1e-9);

        // Very skewed pair: entropy is tiny but Huffman still needs a bit.
        let e = BitEntropy::from_population(&[1000, 1]);
        assert!(e.entropy < 20.0);
        assert!(e.refine() > 990.0);
    }

    #[test]
    fn test_refine_never_below_entropy() {
        for pop in [
            &[5u32, 3, 1, 1, 1, 7][..],
            &[1, 2, 3],
            &[100, 1, 1, 1],
            &[4, 4, 4, 4, 4, 4, 4, 4],
        ] {
            let e = BitEntropy::from_population(pop);
            assert!(e.refine() >= e.entropy - 1e-9);
        }
    }

    #[test]
    fn test_streaks() {
        let (e, s) = entropy_unrefined(&[0, 0, 0, 0, 0, 3, 3, 1, 0, 0]);
        assert_eq!(e.sum, 7);
        assert_eq!(e.nonzeros, 3);
        assert_eq!(e.max_val, 3);
        assert_eq!(e.nonzero_code, 7);
        // zeros: one run of 5 (long) and one of 2 (short)
        assert_eq!(s.counts[0], 1);
        assert_eq!(s.streaks[0], [2, 5]);
        // non-zero runs: [3,3] and [1], both short
        assert_eq!(s.counts[1], 0);
        assert_eq!(s.streaks[1], [3, 0]);
    }

    #[test]
    fn test_combined_matches_sum() {
        let x = [1u32, 0, 4, 4, 0, 0, 0, 9];
        let y = [0u32, 2, 0, 1, 0, 0, 3, 0];
        let sum: alloc::vec::Vec<u32> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        let (e1, s1) = combined_entropy_unrefined(&x, &y);
        let (e2, s2) = entropy_unrefined(&sum);
        assert!((e1.entropy - e2.entropy).abs() < 1e-9);
        assert_eq!(s1.streaks, s2.streaks);
        assert_eq!(s1.counts, s2.counts);
        assert!((extra_cost_combined(&x, &y) - extra_cost(&sum)).abs() < 1e-9);
    }

    #[test]
    fn test_population_cost_trivial() {
        let mut pop = [0u32; 256];
        pop[200] = 50;
        let c = population_cost(&pop);
        assert_eq!(c.trivial_symbol, Some(200));
        assert!(c.is_used);

        let c = population_cost(&[0u32; 40]);
        assert_eq!(c.trivial_symbol, None);
        assert!(!c.is_used);
        let zero_cost = Streaks::all_zero(40).final_huffman_cost();
        assert!((c.bits - zero_cost).abs() < 1e-9);
    }

    #[test]
    fn test_extra_cost() {
        // Codes 4 and 5 carry one extra bit, 6 and 7 two.
        let mut pop = [0u32; 40];
        pop[4] = 3;
        pop[7] = 2;
        assert_eq!(extra_cost(&pop), 3.0 + 4.0);
    }
}
