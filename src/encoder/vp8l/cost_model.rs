//! Cost model and optimal parsing for VP8L backward references.
//!
//! Implements a Zopfli-like cost-based optimizer (TraceBackwards) that
//! improves greedy LZ77 by recomputing optimal literal/copy decisions
//! using dynamic programming with per-symbol bit costs.
//!
//! Uses an interval-based cost manager matching libwebp's
//! `BackwardReferencesHashChainDistanceOnly` for efficient O(n) processing
//! instead of the naive O(n * max_match_len) approach.

use alloc::vec;
use alloc::vec::Vec;

use super::backward_refs::distance_to_plane_code;
use super::color_cache::ColorCache;
use super::hash_chain::HashChain;
use super::histogram::{prefix_encode, Histogram};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, BackwardRefs, PixOrCopy, MAX_LENGTH,
    NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// Fixed-point precision for entropy (matches libwebp LOG_2_PRECISION_BITS).
pub const LOG_2_PRECISION_BITS: u32 = 23;

/// Max active intervals before serializing (matches libwebp).
const COST_CACHE_INTERVAL_SIZE_MAX: usize = 500;

/// Intervals shorter than this are applied directly instead of being tracked.
const SKIP_DISTANCE: usize = 10;

/// Compute log2(v) in fixed-point (matching libwebp's VP8LFastLog2).
/// Returns 0 for v == 0 or v == 1.
fn fast_log2(v: u32) -> u32 {
    if v <= 1 {
        return 0;
    }
    (libm::log2(v as f64) * (1u64 << LOG_2_PRECISION_BITS) as f64) as u32
}

/// Rounding division matching libwebp's DivRound.
#[inline]
fn div_round(a: i64, b: i64) -> i64 {
    if (a < 0) == (b < 0) {
        (a + b / 2) / b
    } else {
        (a - b / 2) / b
    }
}

/// Convert histogram population counts to per-symbol bit cost estimates.
///
/// Each output[i] = FastLog2(sum) - FastLog2(counts[i]); all zero when at
/// most one symbol is used.
fn counts_to_bit_estimates(counts: &[u32]) -> Vec<u32> {
    let n = counts.len();
    let nonzeros = counts.iter().filter(|&&c| c > 0).count();
    if nonzeros <= 1 {
        return vec![0u32; n];
    }

    let total: u32 = counts.iter().sum();
    let logsum = fast_log2(total);
    counts
        .iter()
        .map(|&count| logsum.saturating_sub(fast_log2(count)))
        .collect()
}

/// Per-symbol bit cost model built from histogram statistics.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Green/literal/length costs (256 + 24 + cache).
    literal: Vec<u32>,
    /// Red channel costs (256).
    red: Vec<u32>,
    /// Blue channel costs (256).
    blue: Vec<u32>,
    /// Alpha channel costs (256).
    alpha: Vec<u32>,
    /// Distance costs (40).
    distance: Vec<u32>,
}

impl CostModel {
    /// Build cost model from the histogram of `refs` (linear distances),
    /// counting copies under their plane codes.
    pub fn build(xsize: usize, cache_bits: u8, refs: &BackwardRefs) -> Self {
        let histo = Histogram::from_refs_with_plane_codes(refs, cache_bits, xsize);

        Self {
            literal: counts_to_bit_estimates(&histo.literal),
            red: counts_to_bit_estimates(&histo.red),
            blue: counts_to_bit_estimates(&histo.blue),
            alpha: counts_to_bit_estimates(&histo.alpha),
            distance: counts_to_bit_estimates(&histo.distance),
        }
    }

    /// Cost of encoding a literal ARGB pixel.
    #[inline]
    pub fn literal_cost(&self, argb: u32) -> i64 {
        let a = argb_alpha(argb) as usize;
        let r = argb_red(argb) as usize;
        let g = argb_green(argb) as usize;
        let b = argb_blue(argb) as usize;
        self.alpha[a] as i64 + self.red[r] as i64 + self.literal[g] as i64 + self.blue[b] as i64
    }

    /// Cost of encoding a color cache index.
    #[inline]
    pub fn cache_cost(&self, idx: u16) -> i64 {
        let literal_idx = NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize;
        debug_assert!(literal_idx < self.literal.len());
        self.literal[literal_idx] as i64
    }

    /// Cost of encoding a copy length.
    #[inline]
    pub fn length_cost(&self, length: u32) -> i64 {
        let prefix = prefix_encode(length);
        self.literal[NUM_LITERAL_CODES + prefix.code as usize] as i64
            + ((prefix.extra_bits as i64) << LOG_2_PRECISION_BITS)
    }

    /// Cost of encoding a distance (plane) code.
    #[inline]
    pub fn distance_cost(&self, dist_code: u32) -> i64 {
        let prefix = prefix_encode(dist_code);
        self.distance[prefix.code as usize] as i64
            + ((prefix.extra_bits as i64) << LOG_2_PRECISION_BITS)
    }
}

// ---------------------------------------------------------------------------
// CostManager and interval handling
// ---------------------------------------------------------------------------

/// A cost interval tracking the minimum cost contribution from a single
/// source position over a range of target pixels.
///
/// Uses index-based doubly-linked list instead of raw pointers.
#[derive(Debug, Clone)]
struct CostInterval {
    cost: i64,
    start: usize,
    end: usize, // exclusive
    index: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Run of consecutive lengths sharing one cached cost.
#[derive(Debug, Clone)]
struct CostCacheInterval {
    cost: i64,
    start: usize,
    end: usize, // exclusive
}

/// Interval-based cost manager matching libwebp's CostManager.
///
/// Maintains a sorted linked list of non-overlapping cost intervals
/// to efficiently track optimal paths without iterating over all copy
/// lengths for every pixel.
struct CostManager {
    /// Pool of interval nodes (index-based linked list).
    intervals: Vec<CostInterval>,
    /// Head of the active interval list (index into `intervals`).
    head: Option<usize>,
    /// Free slot indices for reuse.
    free_slots: Vec<usize>,
    /// Number of active intervals.
    count: usize,
    /// Pre-grouped length cost intervals.
    cache_intervals: Vec<CostCacheInterval>,
    /// Per-length costs: cost_cache[k] = length cost of k.
    cost_cache: Vec<i64>,
    /// Minimum cost to reach each pixel.
    costs: Vec<i64>,
    /// Step size at each pixel (1 = literal, >=2 = copy length).
    dist_array: Vec<u16>,
}

impl CostManager {
    /// Initialize the cost manager for a given pixel count and cost model.
    fn new(pix_count: usize, cost_model: &CostModel) -> Self {
        let cost_cache_size = pix_count.min(MAX_LENGTH);

        // k = 0 codes like a length of 1.
        let cost_cache: Vec<i64> = (0..cost_cache_size)
            .map(|k| cost_model.length_cost(k as u32))
            .collect();

        // Group consecutive lengths with the same cost.
        let mut cache_intervals = Vec::with_capacity(32);
        if let Some(&first) = cost_cache.first() {
            let mut cur_start = 0;
            let mut cur_cost = first;
            for (i, &c) in cost_cache.iter().enumerate().skip(1) {
                if c != cur_cost {
                    cache_intervals.push(CostCacheInterval {
                        cost: cur_cost,
                        start: cur_start,
                        end: i,
                    });
                    cur_start = i;
                    cur_cost = c;
                }
            }
            cache_intervals.push(CostCacheInterval {
                cost: cur_cost,
                start: cur_start,
                end: cost_cache_size,
            });
        }

        Self {
            intervals: Vec::with_capacity(64),
            head: None,
            free_slots: Vec::new(),
            count: 0,
            cache_intervals,
            cost_cache,
            costs: vec![i64::MAX; pix_count],
            dist_array: vec![0u16; pix_count],
        }
    }

    /// Allocate or reuse an interval slot, returning its index.
    fn alloc_interval(&mut self, cost: i64, start: usize, end: usize, index: usize) -> usize {
        let node = CostInterval {
            cost,
            start,
            end,
            index,
            prev: None,
            next: None,
        };
        if let Some(slot) = self.free_slots.pop() {
            self.intervals[slot] = node;
            slot
        } else {
            self.intervals.push(node);
            self.intervals.len() - 1
        }
    }

    /// Update cost at pixel `i` if `cost` is better, recording `position`
    /// as the source.
    #[inline]
    fn update_cost(&mut self, i: usize, position: usize, cost: i64) {
        let k = i - position;
        debug_assert!(k < MAX_LENGTH);
        if self.costs[i] > cost {
            self.costs[i] = cost;
            self.dist_array[i] = (k + 1) as u16;
        }
    }

    /// Update cost for all pixels in [start, end) from a single source.
    fn update_cost_per_interval(&mut self, start: usize, end: usize, position: usize, cost: i64) {
        for i in start..end {
            self.update_cost(i, position, cost);
        }
    }

    /// Connect `prev_slot` and `next_slot` in the linked list.
    fn connect(&mut self, prev_slot: Option<usize>, next_slot: Option<usize>) {
        match prev_slot {
            Some(p) => self.intervals[p].next = next_slot,
            None => self.head = next_slot,
        }
        if let Some(n) = next_slot {
            self.intervals[n].prev = prev_slot;
        }
    }

    /// Remove an interval from the active list and recycle it.
    fn pop_interval(&mut self, slot: usize) {
        let prev = self.intervals[slot].prev;
        let next = self.intervals[slot].next;
        self.connect(prev, next);
        self.free_slots.push(slot);
        self.count -= 1;
    }

    /// Link the unlinked `new_slot` into the sorted list, searching from
    /// `hint` (or the head).
    fn position_orphan(&mut self, new_slot: usize, hint: Option<usize>) {
        let new_start = self.intervals[new_slot].start;
        let mut prev = hint.or(self.head);

        while let Some(p) = prev {
            if new_start >= self.intervals[p].start {
                break;
            }
            prev = self.intervals[p].prev;
        }

        while let Some(p) = prev {
            match self.intervals[p].next {
                Some(nxt) if self.intervals[nxt].start < new_start => prev = Some(nxt),
                _ => break,
            }
        }

        let after = match prev {
            Some(p) => self.intervals[p].next,
            None => self.head,
        };
        self.connect(Some(new_slot), after);
        self.connect(prev, Some(new_slot));
    }

    /// Insert an interval [start, end) into the sorted list. If we've hit
    /// the max interval count, serialize directly to costs instead.
    fn insert_interval(
        &mut self,
        hint: Option<usize>,
        cost: i64,
        position: usize,
        start: usize,
        end: usize,
    ) {
        if start >= end {
            return;
        }
        if self.count >= COST_CACHE_INTERVAL_SIZE_MAX {
            self.update_cost_per_interval(start, end, position, cost);
            return;
        }

        let new_slot = self.alloc_interval(cost, start, end, position);
        self.position_orphan(new_slot, hint);
        self.count += 1;
    }

    /// Push a new interval contribution from `position` covering `len` pixels.
    /// Handles splitting, merging, and removing existing intervals as needed.
    fn push_interval(&mut self, distance_cost: i64, position: usize, len: usize) {
        if len < SKIP_DISTANCE {
            for j in position..position + len {
                let k = j - position;
                let cost_tmp = distance_cost + self.cost_cache[k];
                if self.costs[j] > cost_tmp {
                    self.costs[j] = cost_tmp;
                    self.dist_array[j] = (k + 1) as u16;
                }
            }
            return;
        }

        let mut interval = self.head;

        for ci_idx in 0..self.cache_intervals.len() {
            let ci_start = self.cache_intervals[ci_idx].start;
            if ci_start >= len {
                break;
            }
            let ci_end = self.cache_intervals[ci_idx].end.min(len);
            let cost = distance_cost + self.cache_intervals[ci_idx].cost;

            // The new interval covers [start, end) with this cost.
            let mut start = position + ci_start;
            let end = position + ci_end;

            while let Some(slot) = interval {
                let CostInterval {
                    cost: int_cost,
                    start: int_start,
                    end: int_end,
                    index: int_index,
                    next: next_slot,
                    ..
                } = self.intervals[slot];
                if int_start >= end {
                    break;
                }

                if start >= int_end {
                    interval = next_slot;
                    continue;
                }

                if cost >= int_cost {
                    // Existing interval is better: keep our part before it
                    // and resume after it.
                    self.insert_interval(Some(slot), cost, position, start, int_start);
                    start = int_end;
                    if start >= end {
                        break;
                    }
                    interval = next_slot;
                    continue;
                }

                if start <= int_start {
                    if int_end <= end {
                        // Fully covered by the new interval.
                        self.pop_interval(slot);
                    } else {
                        self.intervals[slot].start = end;
                        break;
                    }
                } else if end < int_end {
                    // Existing interval contains the new one: split it.
                    self.intervals[slot].end = start;
                    self.insert_interval(Some(slot), int_cost, int_index, end, int_end);
                    interval = self.intervals[slot].next;
                    break;
                } else {
                    self.intervals[slot].end = start;
                }

                interval = next_slot;
            }

            self.insert_interval(interval, cost, position, start, end);
        }
    }

    /// Update cost at pixel `i` from all active intervals overlapping it.
    /// If `do_clean`, remove intervals that end before `i`.
    fn update_cost_at_index(&mut self, i: usize, do_clean: bool) {
        let mut current = self.head;
        while let Some(slot) = current {
            let interval = &self.intervals[slot];
            if interval.start > i {
                break;
            }
            let next = interval.next;
            if interval.end <= i {
                if do_clean {
                    self.pop_interval(slot);
                }
            } else {
                let (index, cost) = (interval.index, interval.cost);
                self.update_cost(i, index, cost);
            }
            current = next;
        }
    }

    /// Walk the arrival lengths back from the last pixel.
    fn trace_backwards(&self) -> Vec<u16> {
        let mut path = Vec::new();
        let mut cur = self.dist_array.len();
        while cur > 0 {
            let step = self.dist_array[cur - 1].max(1);
            path.push(step);
            cur = cur.saturating_sub(step as usize);
        }
        path.reverse();
        path
    }
}

/// Replace `refs` with the cost-optimal parse of `argb`.
///
/// The cost model is derived from `initial_refs` (linear distances). Copies
/// only ever use the match recorded in `hash_chain` at their start position.
/// The output carries linear distances.
pub fn trace_backwards_optimize(
    argb: &[u32],
    xsize: usize,
    cache_bits: u8,
    hash_chain: &HashChain,
    initial_refs: &BackwardRefs,
    refs: &mut BackwardRefs,
) {
    let pix_count = argb.len();
    if pix_count < 2 {
        follow_chosen_path(argb, cache_bits, hash_chain, &vec![1u16; pix_count], refs);
        return;
    }

    let cost_model = CostModel::build(xsize, cache_bits, initial_refs);
    let mut manager = CostManager::new(pix_count, &cost_model);
    let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));

    add_single_literal_cost(argb, &cost_model, &mut cache, 0, 0, &mut manager);

    // State for the constant-offset shortcut.
    let mut offset_prev: Option<usize> = None;
    let mut len_prev: usize = 0;
    let mut offset_cost: i64 = 0;
    let mut first_offset_is_constant = false;
    let mut reach: usize = 0;

    for i in 1..pix_count {
        let prev_cost = manager.costs[i - 1];
        let offset = hash_chain.offset(i);
        let len = hash_chain.length(i);

        add_single_literal_cost(argb, &cost_model, &mut cache, i, prev_cost, &mut manager);

        if len >= 2 {
            if offset_prev != Some(offset) {
                offset_cost = cost_model.distance_cost(distance_to_plane_code(xsize, offset));
                first_offset_is_constant = true;
                manager.push_interval(prev_cost + offset_cost, i, len);
            } else {
                // Runs of pixels sharing an offset only contribute through
                // the last one of the run that the previous push reaches.
                if first_offset_is_constant {
                    reach = i - 1 + len_prev - 1;
                    first_offset_is_constant = false;
                }

                if i + len - 1 > reach {
                    let mut j = i;
                    while j <= reach && j + 1 < pix_count {
                        if hash_chain.offset(j + 1) != offset {
                            break;
                        }
                        j += 1;
                    }
                    let len_j = hash_chain.length(j);

                    manager.update_cost_at_index(j - 1, false);
                    manager.update_cost_at_index(j, false);

                    manager.push_interval(manager.costs[j - 1] + offset_cost, j, len_j);
                    reach = j + len_j - 1;
                }
            }
        }

        manager.update_cost_at_index(i, true);
        offset_prev = Some(offset);
        len_prev = len;
    }

    let path = manager.trace_backwards();
    follow_chosen_path(argb, cache_bits, hash_chain, &path, refs);
}

/// Emit the tokens of a chosen path: steps of 1 are literals (or cache
/// hits), longer steps are copies at the hash chain offset.
fn follow_chosen_path(
    argb: &[u32],
    cache_bits: u8,
    hash_chain: &HashChain,
    path: &[u16],
    refs: &mut BackwardRefs,
) {
    refs.clear();
    let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));

    let mut i = 0;
    for &step in path {
        let step = step as usize;
        if step == 1 {
            let argb_val = argb[i];
            match cache.as_mut() {
                Some(c) => match c.lookup(argb_val) {
                    Some(idx) => refs.push(PixOrCopy::CacheIdx(idx)),
                    None => {
                        c.insert(argb_val);
                        refs.push(PixOrCopy::Literal(argb_val));
                    }
                },
                None => refs.push(PixOrCopy::Literal(argb_val)),
            }
        } else {
            refs.push(PixOrCopy::copy(step, hash_chain.offset(i)));
            if let Some(c) = cache.as_mut() {
                for &p in &argb[i..i + step] {
                    c.insert(p);
                }
            }
        }
        i += step;
    }
}

/// Try adding a literal (or cache hit) at position idx with cost tracking.
/// Matches libwebp's AddSingleLiteralWithCostModel.
#[inline]
fn add_single_literal_cost(
    argb: &[u32],
    cost_model: &CostModel,
    cache: &mut Option<ColorCache>,
    idx: usize,
    prev_cost: i64,
    manager: &mut CostManager,
) {
    let color = argb[idx];
    let hit = cache.as_ref().and_then(|c| c.lookup(color));
    let cost_val = match hit {
        Some(cache_idx) => prev_cost + div_round(cost_model.cache_cost(cache_idx) * 68, 100),
        None => {
            if let Some(c) = cache.as_mut() {
                c.insert(color);
            }
            prev_cost + div_round(cost_model.literal_cost(color) * 82, 100)
        }
    };

    if cost_val < manager.costs[idx] {
        manager.costs[idx] = cost_val;
        manager.dist_array[idx] = 1;
    }
}
