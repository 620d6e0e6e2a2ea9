//! Meta-Huffman clustering for spatially-varying codes.
//!
//! The image is split into `1 << histo_bits` square tiles, each gets the
//! histogram of the tokens that start inside it, and similar histograms are
//! merged until merging no longer pays. Every tile then points at one of the
//! surviving clusters, and each cluster becomes one group of five Huffman
//! codes.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use log::debug;

use super::histogram::Histogram;
use super::types::{subsample_size, BackwardRefs};

/// Symbol of a tile without any token.
pub const INVALID_HISTOGRAM_SYMBOL: u16 = 0xffff;

/// Partitions per dominant cost when binning histograms.
const NUM_PARTITIONS: usize = 4;
/// Number of entropy bins (literal x red x blue partitions).
const BIN_SIZE: usize = NUM_PARTITIONS * NUM_PARTITIONS * NUM_PARTITIONS;
/// Cluster count below which the greedy pass takes over, at quality 100.
const MAX_HISTO_GREEDY: usize = 100;
/// Size of the pair queue used by the stochastic pass.
const HISTO_QUEUE_SIZE: usize = 9;
/// Failed trivial-preserving merges tolerated per bin before merging anyway.
const MAX_COMBINE_FAILURES: u16 = 32;

/// Cluster the tile histograms of `refs` and assign each tile a cluster.
///
/// Returns the cluster histograms and one symbol per tile (row-major over
/// the `subsample_size(width, histo_bits)` by `subsample_size(height,
/// histo_bits)` tile grid). Every symbol indexes the returned vector and
/// every cluster is used by at least one tile.
pub fn get_histo_image_symbols(
    width: usize,
    height: usize,
    refs: &BackwardRefs,
    quality: u8,
    histo_bits: u8,
    cache_bits: u8,
) -> (Vec<Histogram>, Vec<u16>) {
    let histo_xsize = subsample_size(width as u32, histo_bits) as usize;
    let histo_ysize = subsample_size(height as u32, histo_bits) as usize;
    let num_tiles = histo_xsize * histo_ysize;

    let orig = build_tile_histograms(width, histo_bits, histo_xsize, num_tiles, refs, cache_bits);
    let mut symbols = vec![INVALID_HISTOGRAM_SYMBOL; num_tiles];
    let mut set = HistogramSet::copy_and_analyze(&orig, &mut symbols);
    let num_clusters = set.num_used;

    if set.num_used > 2 * BIN_SIZE && quality < 100 {
        let factor = combine_cost_factor(num_tiles, quality);
        let bin_map = analyze_entropy_bins(&set);
        let mut cluster_mappings: Vec<u16> = (0..num_clusters as u16).collect();
        combine_entropy_bins(&mut set, &symbols, &mut cluster_mappings, &bin_map, factor, cache_bits);
        optimize_histogram_symbols(&mut cluster_mappings, &mut symbols);
        debug!(
            "entropy-bin combine: {} -> {} histograms",
            num_clusters, set.num_used
        );
    }

    let x = quality as f64 / 100.0;
    let threshold_size = (1.0 + x * x * x * (MAX_HISTO_GREEDY - 1) as f64) as usize;
    let mut rng = Lehmer::new();
    if combine_stochastic(&mut set, threshold_size, &mut rng) {
        set.remove_empty();
        combine_greedy(&mut set);
    }

    set.remove_empty();
    let mut clusters = set.into_histograms();
    remap(&orig, &mut clusters, &mut symbols);
    let clusters = drop_unused_clusters(clusters, &mut symbols);

    debug!(
        "histogram clustering: {} tiles, {} non-empty, {} clusters",
        num_tiles,
        num_clusters,
        clusters.len()
    );
    (clusters, symbols)
}

/// Histogram of the tokens starting in each tile, `None` for empty tiles.
fn build_tile_histograms(
    width: usize,
    histo_bits: u8,
    histo_xsize: usize,
    num_tiles: usize,
    refs: &BackwardRefs,
    cache_bits: u8,
) -> Vec<Option<Histogram>> {
    let mut tiles = vec![Histogram::new(cache_bits); num_tiles];
    let (mut x, mut y) = (0usize, 0usize);
    for token in refs.iter() {
        let ix = (y >> histo_bits) * histo_xsize + (x >> histo_bits);
        tiles[ix].add_token(token);
        x += token.len();
        while x >= width {
            x -= width;
            y += 1;
        }
    }

    tiles
        .into_iter()
        .map(|mut h| {
            h.update_cost();
            h.is_used.iter().any(|&u| u).then_some(h)
        })
        .collect()
}

/// Working set of clusters. Merged-away clusters leave a `None` slot.
struct HistogramSet {
    histograms: Vec<Option<Histogram>>,
    num_used: usize,
}

impl HistogramSet {
    /// Copy the non-empty tiles and number them in order.
    fn copy_and_analyze(orig: &[Option<Histogram>], symbols: &mut [u16]) -> Self {
        let mut cluster_id = 0u16;
        let histograms: Vec<Option<Histogram>> = orig
            .iter()
            .zip(symbols.iter_mut())
            .map(|(tile, symbol)| {
                let h = tile.clone()?;
                *symbol = cluster_id;
                cluster_id += 1;
                Some(h)
            })
            .collect();
        Self {
            num_used: cluster_id as usize,
            histograms,
        }
    }

    fn remove(&mut self, idx: usize) -> Option<Histogram> {
        let h = self.histograms[idx].take();
        if h.is_some() {
            self.num_used -= 1;
        }
        h
    }

    /// Fold `idx2` into `idx1`, whose combined cost is `cost_combo`.
    fn merge(&mut self, idx1: usize, idx2: usize, cost_combo: f64) {
        let Some(h2) = self.remove(idx2) else {
            return;
        };
        if let Some(h1) = self.histograms[idx1].as_mut() {
            h1.add(&h2);
            h1.bit_cost = cost_combo;
        }
    }

    fn remove_empty(&mut self) {
        self.histograms.retain(Option::is_some);
    }

    fn into_histograms(self) -> Vec<Histogram> {
        self.histograms.into_iter().flatten().collect()
    }
}

fn combine_cost_factor(histo_size: usize, quality: u8) -> f64 {
    let mut factor = 0.16;
    if quality < 90 {
        if histo_size > 256 {
            factor /= 2.0;
        }
        if histo_size > 512 {
            factor /= 2.0;
        }
        if histo_size > 1024 {
            factor /= 2.0;
        }
    }
    if quality <= 50 {
        factor /= 2.0;
    }
    factor
}

/// Min and max of the literal, red and blue costs over a set.
#[derive(Debug, Clone, Copy)]
struct DominantCostRange {
    literal: (f64, f64),
    red: (f64, f64),
    blue: (f64, f64),
}

impl DominantCostRange {
    fn new() -> Self {
        let empty = (f64::MAX, 0.0);
        Self {
            literal: empty,
            red: empty,
            blue: empty,
        }
    }

    fn update(&mut self, h: &Histogram) {
        let widen = |r: &mut (f64, f64), v: f64| {
            r.0 = r.0.min(v);
            r.1 = r.1.max(v);
        };
        widen(&mut self.literal, h.literal_cost);
        widen(&mut self.red, h.red_cost);
        widen(&mut self.blue, h.blue_cost);
    }

    fn bin_index(&self, h: &Histogram) -> usize {
        let mut bin_id = bin_id_for_entropy(self.literal, h.literal_cost);
        bin_id = bin_id * NUM_PARTITIONS + bin_id_for_entropy(self.red, h.red_cost);
        bin_id = bin_id * NUM_PARTITIONS + bin_id_for_entropy(self.blue, h.blue_cost);
        debug_assert!(bin_id < BIN_SIZE);
        bin_id
    }
}

fn bin_id_for_entropy((min, max): (f64, f64), val: f64) -> usize {
    let range = max - min;
    if range > 0.0 {
        ((NUM_PARTITIONS as f64 - 1e-6) * (val - min) / range) as usize
    } else {
        0
    }
}

/// Entropy bin of every slot; empty slots get bin 0 and are never read.
fn analyze_entropy_bins(set: &HistogramSet) -> Vec<u16> {
    let mut range = DominantCostRange::new();
    for h in set.histograms.iter().flatten() {
        range.update(h);
    }
    set.histograms
        .iter()
        .map(|h| h.as_ref().map_or(0, |h| range.bin_index(h) as u16))
        .collect()
}

/// Merge each histogram into the first one of its bin when that saves at
/// least `factor` of its own cost.
fn combine_entropy_bins(
    set: &mut HistogramSet,
    clusters: &[u16],
    cluster_mappings: &mut [u16],
    bin_map: &[u16],
    factor: f64,
    cache_bits: u8,
) {
    #[derive(Clone, Copy)]
    struct BinInfo {
        first: Option<usize>,
        num_combine_failures: u16,
    }
    let mut bins = [BinInfo {
        first: None,
        num_combine_failures: 0,
    }; BIN_SIZE];
    let mut combo = Histogram::new(cache_bits);

    for idx in 0..set.histograms.len() {
        let Some(h) = set.histograms[idx].as_ref() else {
            continue;
        };
        let bin = &mut bins[bin_map[idx] as usize];
        let Some(first) = bin.first else {
            bin.first = Some(idx);
            continue;
        };
        let Some(first_h) = set.histograms[first].as_ref() else {
            continue;
        };

        let bit_cost_thresh = -h.bit_cost * factor;
        let cost_diff = first_h.add_eval(h, bit_cost_thresh, &mut combo);
        if cost_diff >= bit_cost_thresh {
            continue;
        }
        // Only merge into a trivial result or between two non-trivial
        // histograms, unless the bin keeps refusing.
        let try_combine = combo.trivial_symbol.is_some()
            || (h.trivial_symbol.is_none() && first_h.trivial_symbol.is_none());
        if try_combine || bin.num_combine_failures >= MAX_COMBINE_FAILURES {
            if let Some(slot) = set.histograms[first].as_mut() {
                mem::swap(slot, &mut combo);
            }
            set.remove(idx);
            cluster_mappings[clusters[idx] as usize] = clusters[first];
        } else {
            bin.num_combine_failures += 1;
        }
    }
}

/// Resolve chains of cluster mappings and renumber the tile symbols to
/// consecutive ids in order of appearance. Cluster 0 keeps id 0.
fn optimize_histogram_symbols(cluster_mappings: &mut [u16], symbols: &mut [u16]) {
    let mut do_continue = true;
    while do_continue {
        do_continue = false;
        for i in 0..cluster_mappings.len() {
            let mut k = cluster_mappings[i] as usize;
            while k != cluster_mappings[k] as usize {
                cluster_mappings[k] = cluster_mappings[cluster_mappings[k] as usize];
                k = cluster_mappings[k] as usize;
            }
            if k != cluster_mappings[i] as usize {
                do_continue = true;
                cluster_mappings[i] = k as u16;
            }
        }
    }

    debug_assert!(cluster_mappings.first().map_or(true, |&c| c == 0));
    let mut renumbered = vec![0u16; cluster_mappings.len()];
    let mut cluster_max = 0u16;
    for symbol in symbols.iter_mut() {
        if *symbol == INVALID_HISTOGRAM_SYMBOL {
            continue;
        }
        let cluster = cluster_mappings[*symbol as usize] as usize;
        if cluster > 0 && renumbered[cluster] == 0 {
            cluster_max += 1;
            renumbered[cluster] = cluster_max;
        }
        *symbol = renumbered[cluster];
    }
}

/// Lehmer (Park-Miller) generator driving the stochastic pass.
#[derive(Debug, Clone, Copy)]
struct Lehmer(u32);

impl Lehmer {
    fn new() -> Self {
        Self(1)
    }

    fn next(&mut self) -> u32 {
        self.0 = ((self.0 as u64 * 48271) % 2_147_483_647) as u32;
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct HistogramPair {
    idx1: usize,
    idx2: usize,
    cost_diff: f64,
    cost_combo: f64,
}

/// Bounded list of candidate merges; the best one is kept at the front.
struct HistoQueue {
    pairs: Vec<HistogramPair>,
    max_size: usize,
}

impl HistoQueue {
    fn new(max_size: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(max_size),
            max_size,
        }
    }

    fn is_full(&self) -> bool {
        self.pairs.len() == self.max_size
    }

    fn best_cost(&self) -> f64 {
        self.pairs.first().map_or(0.0, |p| p.cost_diff)
    }

    fn pop_pair(&mut self, i: usize) {
        self.pairs.swap_remove(i);
    }

    fn update_head(&mut self, i: usize) {
        if self.pairs[i].cost_diff < self.pairs[0].cost_diff {
            self.pairs.swap(0, i);
        }
    }

    /// Queue the merge of `idx1` and `idx2` if it beats `threshold`.
    /// Returns its cost change, or 0 when it was not queued.
    fn push(
        &mut self,
        histograms: &[Option<Histogram>],
        idx1: usize,
        idx2: usize,
        threshold: f64,
    ) -> f64 {
        if self.is_full() {
            return 0.0;
        }
        debug_assert!(threshold <= 0.0);
        let (idx1, idx2) = if idx1 > idx2 { (idx2, idx1) } else { (idx1, idx2) };
        let mut pair = HistogramPair {
            idx1,
            idx2,
            cost_diff: 0.0,
            cost_combo: 0.0,
        };
        update_pair(histograms, &mut pair, threshold);
        if pair.cost_diff >= threshold {
            return 0.0;
        }
        self.pairs.push(pair);
        self.update_head(self.pairs.len() - 1);
        pair.cost_diff
    }
}

/// Evaluate a pair. Pairs whose merged cost exceeds the sum of both costs
/// plus `threshold` get `cost_diff = threshold`.
fn update_pair(histograms: &[Option<Histogram>], pair: &mut HistogramPair, threshold: f64) {
    let (Some(h1), Some(h2)) = (&histograms[pair.idx1], &histograms[pair.idx2]) else {
        pair.cost_combo = 0.0;
        pair.cost_diff = threshold;
        return;
    };
    let sum_cost = h1.bit_cost + h2.bit_cost;
    match h1.combined_entropy(h2, sum_cost + threshold, 0.0) {
        Some(cost) => {
            pair.cost_combo = cost;
            pair.cost_diff = cost - sum_cost;
        }
        None => {
            pair.cost_combo = 0.0;
            pair.cost_diff = threshold;
        }
    }
}

/// Merge randomly sampled pairs while that lowers the total cost. Returns
/// whether few enough clusters remain for the greedy pass.
fn combine_stochastic(set: &mut HistogramSet, min_cluster_size: usize, rng: &mut Lehmer) -> bool {
    if set.num_used < min_cluster_size {
        return true;
    }

    let outer_iters = set.num_used;
    let num_tries_no_success = outer_iters / 2;
    let mut tries_with_no_success = 0usize;
    let mut queue = HistoQueue::new(HISTO_QUEUE_SIZE);
    // Slot index of every live histogram, ascending.
    let mut mappings: Vec<usize> = (0..set.histograms.len())
        .filter(|&i| set.histograms[i].is_some())
        .collect();

    let mut iter = 0;
    while iter < outer_iters && set.num_used >= min_cluster_size {
        tries_with_no_success += 1;
        if tries_with_no_success >= num_tries_no_success {
            break;
        }
        iter += 1;

        let num_used = set.num_used;
        let mut best_cost = queue.best_cost();
        if num_used >= 2 {
            let rand_range = ((num_used - 1) * num_used) as u64;
            for _ in 0..num_used / 2 {
                let tmp = rng.next() as u64 % rand_range;
                let idx1 = (tmp / (num_used as u64 - 1)) as usize;
                let mut idx2 = (tmp % (num_used as u64 - 1)) as usize;
                if idx2 >= idx1 {
                    idx2 += 1;
                }
                let curr_cost =
                    queue.push(&set.histograms, mappings[idx1], mappings[idx2], best_cost);
                if curr_cost < 0.0 {
                    best_cost = curr_cost;
                    if queue.is_full() {
                        break;
                    }
                }
            }
        }

        let Some(&best) = queue.pairs.first() else {
            continue;
        };
        if let Ok(pos) = mappings.binary_search(&best.idx2) {
            mappings.remove(pos);
        }
        set.merge(best.idx1, best.idx2, best.cost_combo);

        // Pairs touching either merged index now refer to idx1.
        let mut j = 0;
        while j < queue.pairs.len() {
            let mut p = queue.pairs[j];
            let is_idx1_best = p.idx1 == best.idx1 || p.idx1 == best.idx2;
            let is_idx2_best = p.idx2 == best.idx1 || p.idx2 == best.idx2;
            if is_idx1_best && is_idx2_best {
                queue.pop_pair(j);
                continue;
            }
            let mut do_eval = false;
            if is_idx1_best {
                p.idx1 = best.idx1;
                do_eval = true;
            } else if is_idx2_best {
                p.idx2 = best.idx1;
                do_eval = true;
            }
            if p.idx1 > p.idx2 {
                mem::swap(&mut p.idx1, &mut p.idx2);
            }
            if do_eval {
                update_pair(&set.histograms, &mut p, 0.0);
                if p.cost_diff >= 0.0 {
                    queue.pop_pair(j);
                    continue;
                }
            }
            queue.pairs[j] = p;
            queue.update_head(j);
            j += 1;
        }
        tries_with_no_success = 0;
    }
    set.num_used <= min_cluster_size
}

/// Repeatedly merge the best pair among all remaining ones while any merge
/// lowers the total cost.
fn combine_greedy(set: &mut HistogramSet) {
    let size = set.histograms.len();
    let mut queue = HistoQueue::new(size * size);
    for i in 0..size {
        if set.histograms[i].is_none() {
            continue;
        }
        for j in i + 1..size {
            if set.histograms[j].is_some() {
                queue.push(&set.histograms, i, j, 0.0);
            }
        }
    }

    while let Some(&best) = queue.pairs.first() {
        set.merge(best.idx1, best.idx2, best.cost_combo);

        let mut i = 0;
        while i < queue.pairs.len() {
            let p = queue.pairs[i];
            if p.idx1 == best.idx1
                || p.idx2 == best.idx1
                || p.idx1 == best.idx2
                || p.idx2 == best.idx2
            {
                queue.pop_pair(i);
            } else {
                queue.update_head(i);
                i += 1;
            }
        }

        for i in 0..size {
            if i != best.idx1 && set.histograms[i].is_some() {
                queue.push(&set.histograms, best.idx1, i, 0.0);
            }
        }
    }
}

/// Point every tile at its cheapest cluster, then rebuild the clusters from
/// the tiles assigned to them.
fn remap(orig: &[Option<Histogram>], clusters: &mut [Histogram], symbols: &mut [u16]) {
    if clusters.len() > 1 {
        for i in 0..orig.len() {
            let Some(tile) = orig[i].as_ref() else {
                // Repeating the previous symbol keeps the histogram image
                // cheap to code.
                symbols[i] = if i > 0 { symbols[i - 1] } else { 0 };
                continue;
            };
            let mut best_out = 0;
            let mut best_bits = f64::MAX;
            for (k, cluster) in clusters.iter().enumerate() {
                let cur_bits = cluster.add_thresh(tile, best_bits);
                if k == 0 || cur_bits < best_bits {
                    best_bits = cur_bits;
                    best_out = k;
                }
            }
            symbols[i] = best_out as u16;
        }
    } else {
        symbols.fill(0);
    }

    for cluster in clusters.iter_mut() {
        cluster.clear();
    }
    for (tile, &symbol) in orig.iter().zip(symbols.iter()) {
        if let Some(tile) = tile {
            clusters[symbol as usize].add(tile);
        }
    }
}

/// Remove clusters no tile points at and close the gaps in the numbering.
fn drop_unused_clusters(clusters: Vec<Histogram>, symbols: &mut [u16]) -> Vec<Histogram> {
    let mut used = vec![false; clusters.len()];
    for &s in symbols.iter() {
        used[s as usize] = true;
    }
    let mut new_index = vec![0u16; clusters.len()];
    let mut kept = Vec::with_capacity(clusters.len());
    for (k, cluster) in clusters.into_iter().enumerate() {
        if used[k] {
            new_index[k] = kept.len() as u16;
            kept.push(cluster);
        }
    }
    for s in symbols.iter_mut() {
        *s = new_index[*s as usize];
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::vp8l::types::{make_argb, PixOrCopy};

    fn literal_refs(pixels: &[u32]) -> BackwardRefs {
        let mut refs = BackwardRefs::with_capacity(pixels.len());
        for &p in pixels {
            refs.push(PixOrCopy::Literal(p));
        }
        refs
    }

    fn lcg_image(width: usize, height: usize, seed: u32) -> Vec<u32> {
        let mut s = seed;
        (0..width * height)
            .map(|i| {
                s = s.wrapping_mul(1103515245).wrapping_add(12345);
                let x = i % width;
                // Left half noisy, right half a narrow palette.
                if x < width / 2 {
                    s >> 8 | 0xff00_0000
                } else {
                    make_argb(255, (s >> 28) as u8, 40, 200)
                }
            })
            .collect()
    }

    fn check_invariants(clusters: &[Histogram], symbols: &[u16], refs: &BackwardRefs) {
        assert!(!clusters.is_empty());
        assert!(symbols.iter().all(|&s| (s as usize) < clusters.len()));
        let total: u64 = clusters.iter().map(Histogram::token_count).sum();
        assert_eq!(total, refs.len() as u64);
        for k in 0..clusters.len() {
            assert!(symbols.contains(&(k as u16)), "cluster {k} unused");
        }
    }

    #[test]
    fn test_lehmer_sequence() {
        let mut rng = Lehmer::new();
        assert_eq!(rng.next(), 48271);
        assert_eq!(rng.next(), 182_605_794);
    }

    #[test]
    fn test_cost_factor() {
        assert_eq!(combine_cost_factor(100, 95), 0.16);
        assert_eq!(combine_cost_factor(600, 95), 0.16);
        assert_eq!(combine_cost_factor(600, 75), 0.04);
        assert_eq!(combine_cost_factor(2000, 40), 0.01);
    }

    #[test]
    fn test_bin_id_for_entropy() {
        assert_eq!(bin_id_for_entropy((1.0, 1.0), 1.0), 0);
        assert_eq!(bin_id_for_entropy((0.0, 8.0), 0.0), 0);
        assert_eq!(bin_id_for_entropy((0.0, 8.0), 5.0), 2);
        assert_eq!(bin_id_for_entropy((0.0, 8.0), 8.0), 3);
    }

    #[test]
    fn test_optimize_histogram_symbols() {
        // 3 -> 2 -> 1 -> 0 collapses to a single cluster.
        let mut mappings = [0u16, 0, 1, 2];
        let mut symbols = [0u16, 1, 2, 3];
        optimize_histogram_symbols(&mut mappings, &mut symbols);
        assert_eq!(mappings, [0, 0, 0, 0]);
        assert_eq!(symbols, [0, 0, 0, 0]);

        let mut mappings = [0u16, 1, 1, 3];
        let mut symbols = [0u16, 1, 2, INVALID_HISTOGRAM_SYMBOL, 3];
        optimize_histogram_symbols(&mut mappings, &mut symbols);
        assert_eq!(symbols, [0, 1, 1, INVALID_HISTOGRAM_SYMBOL, 2]);
    }

    #[test]
    fn test_uniform_image_single_cluster() {
        let pixels = vec![0xff10_2030u32; 32 * 32];
        let refs = literal_refs(&pixels);
        let (clusters, symbols) = get_histo_image_symbols(32, 32, &refs, 75, 2, 0);
        assert_eq!(symbols.len(), 64);
        assert_eq!(clusters.len(), 1);
        check_invariants(&clusters, &symbols, &refs);
    }

    #[test]
    fn test_empty_tile_inherits_previous_symbol() {
        // One literal, then a copy covering every other pixel: the second
        // tile never starts a token.
        let mut refs = BackwardRefs::with_capacity(2);
        refs.push(PixOrCopy::Literal(0xff00_0000));
        refs.push(PixOrCopy::copy(31, 1));
        let (clusters, symbols) = get_histo_image_symbols(8, 4, &refs, 90, 2, 0);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[1], symbols[0]);
        assert_eq!(clusters.len(), 1);
        check_invariants(&clusters, &symbols, &refs);
    }

    #[test]
    fn test_clustering_conserves_tokens() {
        for quality in [0u8, 50, 75, 100] {
            let pixels = lcg_image(64, 64, 17);
            let refs = literal_refs(&pixels);
            let (clusters, symbols) = get_histo_image_symbols(64, 64, &refs, quality, 3, 0);
            assert_eq!(symbols.len(), 64);
            assert!(clusters.len() <= 64);
            check_invariants(&clusters, &symbols, &refs);
        }
    }

    #[test]
    fn test_entropy_bin_path() {
        // 256 tiles exceeds the bin threshold.
        let pixels = lcg_image(64, 64, 99);
        let refs = literal_refs(&pixels);
        let (clusters, symbols) = get_histo_image_symbols(64, 64, &refs, 50, 2, 0);
        assert_eq!(symbols.len(), 256);
        assert!(clusters.len() < 256);
        check_invariants(&clusters, &symbols, &refs);
    }

    #[test]
    fn test_different_halves_split() {
        // Tiles on the left and right differ a lot; at top quality they must
        // not all share one code.
        let pixels = lcg_image(64, 64, 5);
        let refs = literal_refs(&pixels);
        let (clusters, symbols) = get_histo_image_symbols(64, 64, &refs, 100, 4, 0);
        assert!(clusters.len() >= 2);
        // Left and right tiles of the first row.
        assert_ne!(symbols[0], symbols[3]);
    }
}
