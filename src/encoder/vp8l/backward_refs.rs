//! Backward reference search.
//!
//! Converts image pixels into a stream of literals, color cache hits and
//! LZ77 backward references. Several parsings are tried (hash chain greedy,
//! RLE, 2D box) and the cheapest one, optionally refined by the optimal
//! parse of [`super::cost_model`], is kept.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use log::{debug, trace};

use super::color_cache::{color_cache_key, ColorCache};
use super::cost_model::trace_backwards_optimize;
use super::hash_chain::{find_match_length, max_find_copy_length, HashChain};
use super::histogram::{prefix_encode, Histogram};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, BackwardRefs, Lz77Strategies, PixOrCopy,
    MAX_COLOR_CACHE_BITS, MAX_LENGTH, MIN_LENGTH, NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// Distance code lookup table for 2D neighborhood.
/// Maps distance codes 1-120 to (xoffset, yoffset) pairs.
#[rustfmt::skip]
const DISTANCE_MAP: [(i8, i8); 120] = [
    (0, 1),  (1, 0),  (1, 1),  (-1, 1), (0, 2),  (2, 0),  (1, 2),  (-1, 2),
    (2, 1),  (-2, 1), (2, 2),  (-2, 2), (0, 3),  (3, 0),  (1, 3),  (-1, 3),
    (3, 1),  (-3, 1), (2, 3),  (-2, 3), (3, 2),  (-3, 2), (0, 4),  (4, 0),
    (1, 4),  (-1, 4), (4, 1),  (-4, 1), (3, 3),  (-3, 3), (2, 4),  (-2, 4),
    (4, 2),  (-4, 2), (0, 5),  (3, 4),  (-3, 4), (4, 3),  (-4, 3), (5, 0),
    (1, 5),  (-1, 5), (5, 1),  (-5, 1), (2, 5),  (-2, 5), (5, 2),  (-5, 2),
    (4, 4),  (-4, 4), (3, 5),  (-3, 5), (5, 3),  (-5, 3), (0, 6),  (6, 0),
    (1, 6),  (-1, 6), (6, 1),  (-6, 1), (2, 6),  (-2, 6), (6, 2),  (-6, 2),
    (4, 5),  (-4, 5), (5, 4),  (-5, 4), (3, 6),  (-3, 6), (6, 3),  (-6, 3),
    (0, 7),  (7, 0),  (1, 7),  (-1, 7), (5, 5),  (-5, 5), (7, 1),  (-7, 1),
    (4, 6),  (-4, 6), (6, 4),  (-6, 4), (2, 7),  (-2, 7), (7, 2),  (-7, 2),
    (3, 7),  (-3, 7), (7, 3),  (-7, 3), (5, 6),  (-5, 6), (6, 5),  (-6, 5),
    (8, 0),  (4, 7),  (-4, 7), (7, 4),  (-7, 4), (8, 1),  (8, 2),  (6, 6),
    (-6, 6), (8, 3),  (5, 7),  (-5, 7), (7, 5),  (-7, 5), (8, 4),  (6, 7),
    (-6, 7), (7, 6),  (-7, 6), (8, 5),  (7, 7),  (-7, 7), (8, 6),  (8, 7)
];

/// Reverse lookup table: given (yoffset * 16 + 8 - xoffset), get distance code.
/// Only valid for xoffset in [0, 8] and yoffset in [0, 7].
#[rustfmt::skip]
const PLANE_TO_CODE_LUT: [u8; 128] = [
    96,  73,  55,  39,  23, 13, 5,  1,  255, 255, 255, 255, 255, 255, 255, 255,
    101, 78,  58,  42,  26, 16, 8,  2,  0,   3,   9,   17,  27,  43,  59,  79,
    102, 86,  62,  46,  32, 20, 10, 6,  4,   7,   11,  21,  33,  47,  63,  87,
    105, 90,  70,  52,  37, 28, 18, 14, 12,  15,  19,  29,  38,  53,  71,  91,
    110, 99,  82,  66,  48, 35, 30, 24, 22,  25,  31,  36,  49,  67,  83,  100,
    115, 108, 94,  76,  64, 50, 44, 40, 34,  41,  45,  51,  65,  77,  95,  109,
    118, 113, 103, 92,  80, 68, 60, 56, 54,  57,  61,  69,  81,  93,  104, 114,
    119, 116, 111, 106, 97, 88, 84, 74, 72,  75,  85,  89,  98,  107, 112, 117
];

/// Number of plane codes the box search considers.
const WINDOW_OFFSETS_SIZE_MAX: usize = 32;

/// Convert linear distance to distance code.
pub fn distance_to_plane_code(xsize: usize, dist: usize) -> u32 {
    let yoffset = dist / xsize;
    let xoffset = dist - yoffset * xsize;

    if xoffset <= 8 && yoffset < 8 {
        u32::from(PLANE_TO_CODE_LUT[yoffset * 16 + 8 - xoffset]) + 1
    } else if xoffset + 8 > xsize && yoffset < 7 {
        u32::from(PLANE_TO_CODE_LUT[(yoffset + 1) * 16 + 8 + (xsize - xoffset)]) + 1
    } else {
        (dist + 120) as u32
    }
}

/// Convert distance code back to linear distance.
pub fn plane_code_to_distance(xsize: usize, code: usize) -> usize {
    if code > 120 {
        code - 120
    } else if code == 0 {
        0
    } else {
        let (xoff, yoff) = DISTANCE_MAP[code - 1];
        let dist = xoff as i64 + yoff as i64 * xsize as i64;
        if dist < 1 {
            1
        } else {
            dist as usize
        }
    }
}

/// Outcome of [`get_backward_references`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackwardRefsResult {
    /// Color cache size the tokens were produced with.
    pub cache_bits: u8,
    /// Estimated bits of the tokens, measured before the plane-code remap.
    pub bit_cost: f64,
    /// Parsing that produced them.
    pub strategy: Lz77Strategies,
}

/// Reusable buffers for the reference search.
#[derive(Debug, Default)]
pub struct RefsScratch {
    /// Best tokens so far; the result after a search.
    best: BackwardRefs,
    /// Candidate tokens.
    worst: BackwardRefs,
    /// Matches restricted to the box neighborhood.
    box_chain: HashChain,
}

impl RefsScratch {
    /// Scratch sized for `pix_count` pixels.
    pub fn with_capacity(pix_count: usize) -> Self {
        Self {
            best: BackwardRefs::with_capacity(pix_count),
            worst: BackwardRefs::with_capacity(pix_count),
            box_chain: HashChain::default(),
        }
    }

    /// Tokens of the last search.
    pub fn refs(&self) -> &BackwardRefs {
        &self.best
    }

    /// Release the tokens of the last search.
    pub fn take_refs(&mut self) -> BackwardRefs {
        mem::take(&mut self.best)
    }
}

/// Compute the backward references of `argb`, leaving them in
/// `scratch.refs()` with plane-code distances.
///
/// `hash_chain` must have been filled for `argb` with the same `width`.
#[allow(clippy::too_many_arguments)]
pub fn get_backward_references(
    width: usize,
    height: usize,
    argb: &[u32],
    quality: u8,
    strategies: Lz77Strategies,
    cache_bits_max: u8,
    hash_chain: &HashChain,
    scratch: &mut RefsScratch,
) -> BackwardRefsResult {
    debug_assert_eq!(argb.len(), width * height);
    let strategies = if strategies.is_empty() {
        Lz77Strategies::STANDARD
    } else {
        strategies
    };
    let RefsScratch {
        best,
        worst,
        box_chain,
    } = scratch;

    let mut result: Option<BackwardRefsResult> = None;
    for strategy in strategies.iter() {
        if strategy == Lz77Strategies::RLE {
            backward_references_rle(width, argb, worst);
        } else if strategy == Lz77Strategies::BOX {
            backward_references_lz77_box(width, argb, hash_chain, box_chain, worst);
        } else {
            backward_references_lz77(argb, hash_chain, worst);
        }

        let cache_bits = calculate_best_cache_size(argb, quality, worst, cache_bits_max);
        if cache_bits > 0 {
            backward_refs_with_local_cache(argb, cache_bits, worst);
        }
        let bit_cost = Histogram::from_refs(worst, cache_bits).estimate_bits();
        trace!("lz77 strategy {strategy:?}: cache_bits={cache_bits} bits={bit_cost:.0}");

        if result.map_or(true, |r| bit_cost < r.bit_cost) {
            mem::swap(best, worst);
            result = Some(BackwardRefsResult {
                cache_bits,
                bit_cost,
                strategy,
            });
        }
    }
    let mut result = result.unwrap_or(BackwardRefsResult {
        cache_bits: 0,
        bit_cost: 0.0,
        strategy: Lz77Strategies::STANDARD,
    });

    // The optimal parse is costly; only refine hash-chain based parsings.
    let refinable = result.strategy == Lz77Strategies::STANDARD
        || result.strategy == Lz77Strategies::BOX;
    if refinable && quality >= 25 {
        let chain: &HashChain = if result.strategy == Lz77Strategies::STANDARD {
            hash_chain
        } else {
            &*box_chain
        };
        trace_backwards_optimize(argb, width, result.cache_bits, chain, best, worst);
        let bit_cost = Histogram::from_refs(worst, result.cache_bits).estimate_bits();
        trace!(
            "optimal parse: bits={bit_cost:.0} vs {:.0}",
            result.bit_cost
        );
        if bit_cost < result.bit_cost {
            mem::swap(best, worst);
            result.bit_cost = bit_cost;
        }
    }

    apply_2d_locality(width, best);
    debug!(
        "backward refs: {:?}, cache_bits={}, {} tokens, ~{:.0} bits",
        result.strategy,
        result.cache_bits,
        best.len(),
        result.bit_cost
    );
    result
}

/// Greedy LZ77 over `hash_chain`, with one step of lookahead: the copy at
/// `i` is shortened when that lets the match starting where it ends reach
/// further.
pub fn backward_references_lz77(argb: &[u32], hash_chain: &HashChain, refs: &mut BackwardRefs) {
    refs.clear();
    let pix_count = argb.len();
    let mut i = 0;
    while i < pix_count {
        let offset = hash_chain.offset(i);
        let mut len = hash_chain.length(i);
        if len >= MIN_LENGTH {
            let j_max = if i + len >= pix_count {
                pix_count - 1
            } else {
                i + len
            };
            let mut max_reach = 0;
            for j in i + 1..=j_max {
                let len_j = hash_chain.length(j);
                let reach = j + if len_j >= MIN_LENGTH { len_j } else { 1 };
                if reach > max_reach {
                    len = j - i;
                    max_reach = reach;
                    if max_reach >= pix_count {
                        break;
                    }
                }
            }
        } else {
            len = 1;
        }

        if len == 1 {
            refs.push(PixOrCopy::Literal(argb[i]));
        } else {
            refs.push(PixOrCopy::copy(len, offset));
        }
        i += len;
    }
}

/// Runs of the previous pixel or of the row above.
pub fn backward_references_rle(xsize: usize, argb: &[u32], refs: &mut BackwardRefs) {
    refs.clear();
    let pix_count = argb.len();
    if pix_count == 0 {
        return;
    }
    refs.push(PixOrCopy::Literal(argb[0]));
    let mut i = 1;
    while i < pix_count {
        let max_len = max_find_copy_length(pix_count - i);
        let rle_len = find_match_length(&argb[i..], &argb[i - 1..], 0, max_len);
        let prev_row_len = if i < xsize {
            0
        } else {
            find_match_length(&argb[i..], &argb[i - xsize..], 0, max_len)
        };
        if rle_len >= prev_row_len && rle_len >= MIN_LENGTH {
            refs.push(PixOrCopy::copy(rle_len, 1));
            i += rle_len;
        } else if prev_row_len >= MIN_LENGTH {
            refs.push(PixOrCopy::copy(prev_row_len, xsize));
            i += prev_row_len;
        } else {
            refs.push(PixOrCopy::Literal(argb[i]));
            i += 1;
        }
    }
}

/// Offsets of the small neighborhood searched by the box parsing, ordered by
/// plane code, and the subset that the previous pixel cannot reach by
/// shifting one of them.
fn box_window_offsets(xsize: usize) -> (Vec<usize>, Vec<usize>) {
    let mut by_code = [0usize; WINDOW_OFFSETS_SIZE_MAX];
    for y in 0..=6i64 {
        for x in -6..=6i64 {
            let offset = y * xsize as i64 + x;
            if offset <= 0 {
                continue;
            }
            let plane_code = distance_to_plane_code(xsize, offset as usize) as usize - 1;
            if plane_code >= WINDOW_OFFSETS_SIZE_MAX {
                continue;
            }
            by_code[plane_code] = offset as usize;
        }
    }
    // Narrow images do not reach every plane code.
    let offsets: Vec<usize> = by_code.into_iter().filter(|&o| o != 0).collect();
    let offsets_new = offsets
        .iter()
        .copied()
        .filter(|&o| !offsets.iter().any(|&other| o == other + 1))
        .collect();
    (offsets, offsets_new)
}

/// LZ77 restricted to a small 2D neighborhood: fills `box_chain` with the
/// best neighborhood match per pixel, then runs the greedy parse over it.
pub fn backward_references_lz77_box(
    xsize: usize,
    argb: &[u32],
    hash_chain_best: &HashChain,
    box_chain: &mut HashChain,
    refs: &mut BackwardRefs,
) {
    let pix_count = argb.len();
    box_chain.reset(pix_count);
    if pix_count < 2 {
        backward_references_lz77(argb, box_chain, refs);
        return;
    }

    // counts[i]: how many times argb[i] repeats from i on, capped.
    let mut counts = vec![0u16; pix_count];
    counts[pix_count - 1] = 1;
    for i in (0..pix_count - 1).rev() {
        counts[i] = if argb[i] == argb[i + 1] {
            counts[i + 1] + (counts[i + 1] as usize != MAX_LENGTH) as u16
        } else {
            1
        };
    }

    let (window_offsets, window_offsets_new) = box_window_offsets(xsize);

    let mut best_offset_prev = 0usize;
    let mut best_length_prev = 0usize;
    for i in 1..pix_count {
        let mut best_length = hash_chain_best.length(i);
        let mut best_offset = 0;
        let mut do_compute = true;

        if best_length >= MAX_LENGTH {
            // A maximal match already inside the window cannot be improved.
            best_offset = hash_chain_best.offset(i);
            do_compute = !window_offsets.contains(&best_offset);
        }
        if do_compute {
            let use_prev = best_length_prev > 1 && best_length_prev < MAX_LENGTH;
            let candidates = if use_prev {
                &window_offsets_new
            } else {
                &window_offsets
            };
            best_length = if use_prev { best_length_prev - 1 } else { 0 };
            best_offset = if use_prev { best_offset_prev } else { 0 };

            for &offset in candidates {
                if offset > i || argb[i - offset] != argb[i] {
                    continue;
                }
                // The match length is the sum of the shared run lengths.
                let mut j_offset = i - offset;
                let mut j = i;
                let mut curr_length = 0usize;
                loop {
                    let counts_j_offset = counts[j_offset] as usize;
                    let counts_j = counts[j] as usize;
                    if counts_j_offset != counts_j {
                        curr_length += counts_j_offset.min(counts_j);
                        break;
                    }
                    curr_length += counts_j_offset;
                    j_offset += counts_j_offset;
                    j += counts_j_offset;
                    if curr_length > MAX_LENGTH || j >= pix_count || argb[j_offset] != argb[j] {
                        break;
                    }
                }
                if best_length < curr_length {
                    best_offset = offset;
                    if curr_length >= MAX_LENGTH {
                        best_length = MAX_LENGTH;
                        break;
                    }
                    best_length = curr_length;
                }
            }
        }

        debug_assert!(i + best_length <= pix_count);
        if best_length <= MIN_LENGTH {
            box_chain.store(i, 0, 0);
            best_offset_prev = 0;
            best_length_prev = 0;
        } else {
            box_chain.store(i, best_offset, best_length);
            best_offset_prev = best_offset;
            best_length_prev = best_length;
        }
    }

    backward_references_lz77(argb, box_chain, refs);
}

/// Pick the color cache size (0 to `cache_bits_max`) under which `refs`
/// (built without a cache) would cost the fewest bits.
///
/// One histogram per size is filled in a single pass; the keys of the
/// smaller caches are derived from the key of the largest one.
pub fn calculate_best_cache_size(
    argb: &[u32],
    quality: u8,
    refs: &BackwardRefs,
    cache_bits_max: u8,
) -> u8 {
    let cache_bits_max = if quality <= 25 {
        0
    } else {
        cache_bits_max.min(MAX_COLOR_CACHE_BITS)
    };
    if cache_bits_max == 0 {
        return 0;
    }
    let max = cache_bits_max as usize;

    let mut histos: Vec<Histogram> = (0..=cache_bits_max).map(Histogram::new).collect();
    // Index 0 is unused: no cache.
    let mut caches: Vec<ColorCache> = (0..=cache_bits_max)
        .map(|bits| ColorCache::new(bits.max(1)))
        .collect();

    let mut pos = 0usize;
    for token in refs.iter() {
        match *token {
            PixOrCopy::Copy { len, .. } => {
                // Distance and extra bits do not depend on the cache size;
                // only the length prefix shares the green table.
                let code = NUM_LITERAL_CODES + prefix_encode(len as u32).code as usize;
                for h in histos.iter_mut() {
                    h.literal[code] += 1;
                }
                let mut argb_prev = argb[pos] ^ 0xffff_ffff;
                for &pix in &argb[pos..pos + len as usize] {
                    if pix != argb_prev {
                        let mut key = color_cache_key(pix, cache_bits_max);
                        for cache in caches[1..].iter_mut().rev() {
                            cache.set(key, pix);
                            key >>= 1;
                        }
                        argb_prev = pix;
                    }
                }
                pos += len as usize;
            }
            _ => {
                let pix = argb[pos];
                let (a, r, g, b) = (
                    argb_alpha(pix) as usize,
                    argb_red(pix) as usize,
                    argb_green(pix) as usize,
                    argb_blue(pix) as usize,
                );
                histos[0].add_literal(pix);
                let mut key = color_cache_key(pix, cache_bits_max);
                for i in (1..=max).rev() {
                    let h = &mut histos[i];
                    if caches[i].get(key as u16) == pix {
                        h.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + key] += 1;
                    } else {
                        caches[i].set(key, pix);
                        h.blue[b] += 1;
                        h.literal[g] += 1;
                        h.red[r] += 1;
                        h.alpha[a] += 1;
                    }
                    key >>= 1;
                }
                pos += 1;
            }
        }
    }

    let mut best_bits = 0u8;
    let mut entropy_min = f64::MAX;
    for (i, h) in histos.iter().enumerate() {
        let entropy = h.estimate_bits();
        if i == 0 || entropy < entropy_min {
            entropy_min = entropy;
            best_bits = i as u8;
        }
    }
    best_bits
}

/// Turn literals of cache-free `refs` into cache hits where possible.
pub fn backward_refs_with_local_cache(argb: &[u32], cache_bits: u8, refs: &mut BackwardRefs) {
    let mut cache = ColorCache::new(cache_bits);
    let mut pos = 0usize;
    for token in refs.tokens.iter_mut() {
        match *token {
            PixOrCopy::Literal(argb_literal) => {
                match cache.lookup(argb_literal) {
                    Some(idx) => *token = PixOrCopy::CacheIdx(idx),
                    None => cache.insert(argb_literal),
                }
                pos += 1;
            }
            PixOrCopy::Copy { len, .. } => {
                for &pix in &argb[pos..pos + len as usize] {
                    cache.insert(pix);
                }
                pos += len as usize;
            }
            PixOrCopy::CacheIdx(_) => {
                debug_assert!(false, "refs already use a color cache");
                pos += 1;
            }
        }
    }
}

/// Rewrite copy distances as plane codes.
pub fn apply_2d_locality(xsize: usize, refs: &mut BackwardRefs) {
    for token in refs.tokens.iter_mut() {
        if let PixOrCopy::Copy { dist, .. } = token {
            *dist = distance_to_plane_code(xsize, *dist as usize);
        }
    }
}
