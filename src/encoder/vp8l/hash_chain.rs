//! Hash chain for LZ77 backward reference finding.
//!
//! Uses libwebp's hash function and chain structure for finding matches.
//! One chain is allocated per encode session and refilled for every image
//! (main image, histogram sub-image), so [`HashChain::fill`] reuses buffers.

use alloc::vec;
use alloc::vec::Vec;

use super::types::{Vp8lQuality, HASH_BITS, HASH_SIZE, MAX_LENGTH, MAX_LENGTH_BITS};

/// Hash multipliers for two-pixel hashing (from libwebp).
const HASH_MULT_HI: u32 = 0xc6a4a793;
const HASH_MULT_LO: u32 = 0x5bd1e996;

/// Candidates at least this long end the chain walk.
const GOOD_ENOUGH_LENGTH: usize = 256;

const LENGTH_MASK: u32 = (1 << MAX_LENGTH_BITS) - 1;

/// Hash two adjacent pixels to get a bucket index.
#[inline]
fn hash_pix_pair(p0: u32, p1: u32) -> usize {
    let key = p1
        .wrapping_mul(HASH_MULT_HI)
        .wrapping_add(p0.wrapping_mul(HASH_MULT_LO));
    (key >> (32 - HASH_BITS)) as usize
}

/// Best backward match per pixel.
#[derive(Debug, Default)]
pub struct HashChain {
    /// For each pixel: (offset << MAX_LENGTH_BITS) | length
    /// offset = distance to best match, length = best match length
    offset_length: Vec<u32>,
    /// Scratch: previous position with the same hash, per pixel.
    chain: Vec<i32>,
    /// Scratch: most recent position per hash bucket.
    hash_to_first: Vec<i32>,
}

impl HashChain {
    /// Chain with room for `size` pixels.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            offset_length: Vec::with_capacity(size),
            chain: Vec::new(),
            hash_to_first: Vec::new(),
        }
    }

    /// Number of positions covered by the last fill.
    pub fn size(&self) -> usize {
        self.offset_length.len()
    }

    /// Clear and resize to `size` positions, all without a match.
    pub fn reset(&mut self, size: usize) {
        self.offset_length.clear();
        self.offset_length.resize(size, 0);
    }

    /// Record a match directly.
    #[inline]
    pub fn store(&mut self, pos: usize, offset: usize, length: usize) {
        debug_assert!(length <= MAX_LENGTH);
        self.offset_length[pos] = ((offset as u32) << MAX_LENGTH_BITS) | length as u32;
    }

    /// Build the chain for `argb` (`width` pixels per row).
    pub fn fill(&mut self, argb: &[u32], quality: u8, width: usize) {
        let size = argb.len();
        self.reset(size);
        if size <= 2 {
            return;
        }

        let budget = Vp8lQuality { quality, method: 0 };
        let iter_max = budget.max_iters() as i32;
        let window_size = budget.window_size(width);

        self.hash_to_first.clear();
        self.hash_to_first.resize(HASH_SIZE, -1);
        self.chain.clear();
        self.chain.resize(size, -1);
        let chain = &mut self.chain;
        let hash_to_first = &mut self.hash_to_first;

        // Link every position to the previous one with the same hash.
        let mut pos = 0usize;
        let mut argb_comp = argb[0] == argb[1];
        while pos < size - 2 {
            let argb_comp_next = argb[pos + 1] == argb[pos + 2];
            if argb_comp && argb_comp_next {
                // Runs are keyed by (color, remaining run length).
                let color = argb[pos];
                let mut len = 1usize;
                while pos + len + 2 < size && argb[pos + len + 2] == color {
                    len += 1;
                }
                if len > MAX_LENGTH {
                    // The head of a long run keeps no predecessor; it is
                    // covered by the distance-1 check below.
                    pos += len - MAX_LENGTH;
                    len = MAX_LENGTH;
                }
                while len > 0 {
                    let hash = hash_pix_pair(color, len as u32);
                    chain[pos] = hash_to_first[hash];
                    hash_to_first[hash] = pos as i32;
                    pos += 1;
                    len -= 1;
                }
                argb_comp = false;
            } else {
                let hash = hash_pix_pair(argb[pos], argb[pos + 1]);
                chain[pos] = hash_to_first[hash];
                hash_to_first[hash] = pos as i32;
                pos += 1;
                argb_comp = argb_comp_next;
            }
        }
        // Penultimate pixel.
        chain[pos] = hash_to_first[hash_pix_pair(argb[pos], argb[pos + 1])];

        // Best match per position, walking backwards so that a match can be
        // propagated to the positions on its left.
        let offset_length = &mut self.offset_length;
        let mut base_pos = size - 2;
        while base_pos > 0 {
            let max_len = max_find_copy_length(size - 1 - base_pos);
            let argb_start = &argb[base_pos..];
            let mut iter = iter_max;
            let mut best_len = 0usize;
            let mut best_dist = 0usize;
            let min_pos = base_pos.saturating_sub(window_size) as i32;
            let length_max = max_len.min(GOOD_ENOUGH_LENGTH);

            // Heuristic: try row above
            if base_pos >= width {
                let curr_len =
                    find_match_length(&argb[base_pos - width..], argb_start, best_len, max_len);
                if curr_len > best_len {
                    best_len = curr_len;
                    best_dist = width;
                }
                iter -= 1;
            }

            // Heuristic: try previous pixel
            let curr_len = find_match_length(&argb[base_pos - 1..], argb_start, best_len, max_len);
            if curr_len > best_len {
                best_len = curr_len;
                best_dist = 1;
            }
            iter -= 1;

            // Follow hash chain unless the match is already maximal.
            if best_len < MAX_LENGTH {
                let mut pos = chain[base_pos];
                let mut best_argb = argb_start[best_len];
                while pos >= min_pos {
                    iter -= 1;
                    if iter <= 0 {
                        break;
                    }
                    let p = pos as usize;
                    pos = chain[p];

                    // Quick rejection: the candidate must at least beat best_len.
                    if argb[p + best_len] != best_argb {
                        continue;
                    }

                    let curr_len = vector_mismatch(&argb[p..], argb_start, max_len);
                    if curr_len > best_len {
                        best_len = curr_len;
                        best_dist = base_pos - p;
                        best_argb = argb_start[best_len];
                        if best_len >= length_max {
                            break;
                        }
                    }
                }
            }

            // Store the match and extend it to the left while pixels agree.
            let mut max_base_pos = base_pos;
            loop {
                debug_assert!(best_len <= MAX_LENGTH);
                offset_length[base_pos] =
                    ((best_dist as u32) << MAX_LENGTH_BITS) | best_len as u32;
                base_pos -= 1;
                if best_dist == 0 || base_pos == 0 {
                    break;
                }
                if base_pos < best_dist || argb[base_pos - best_dist] != argb[base_pos] {
                    break;
                }
                // A capped match further right already covers this position.
                if best_len == MAX_LENGTH && best_dist != 1 && base_pos + MAX_LENGTH < max_base_pos
                {
                    break;
                }
                if best_len < MAX_LENGTH {
                    best_len += 1;
                    max_base_pos = base_pos;
                }
            }
        }
    }

    /// Get the best match distance at a position.
    #[inline]
    pub fn offset(&self, pos: usize) -> usize {
        (self.offset_length[pos] >> MAX_LENGTH_BITS) as usize
    }

    /// Get the best match length at a position.
    #[inline]
    pub fn length(&self, pos: usize) -> usize {
        (self.offset_length[pos] & LENGTH_MASK) as usize
    }
}

/// Limit copy length.
#[inline]
pub(crate) fn max_find_copy_length(len: usize) -> usize {
    len.min(MAX_LENGTH)
}

/// Length of the common prefix, or 0 when it cannot exceed `best_len`.
#[inline]
pub(crate) fn find_match_length(
    array1: &[u32],
    array2: &[u32],
    best_len: usize,
    max_len: usize,
) -> usize {
    if array1.len() <= best_len || array2.len() <= best_len {
        return 0;
    }
    if array1[best_len] != array2[best_len] {
        return 0;
    }
    vector_mismatch(array1, array2, max_len)
}

/// Find first mismatch position (or max_len if all match).
#[inline]
pub(crate) fn vector_mismatch(a: &[u32], b: &[u32], max_len: usize) -> usize {
    let len = a.len().min(b.len()).min(max_len);
    a[..len]
        .iter()
        .zip(&b[..len])
        .position(|(x, y)| x != y)
        .unwrap_or(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u64, colors: u32) -> Vec<u32> {
        let mut s = seed;
        (0..n)
            .map(|_| {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
                0xff00_0000 | ((s >> 33) as u32 % colors)
            })
            .collect()
    }

    fn assert_matches_valid(argb: &[u32], chain: &HashChain) {
        for p in 0..argb.len() {
            let len = chain.length(p);
            assert!(len <= MAX_LENGTH);
            if len > 0 {
                let off = chain.offset(p);
                assert!(off >= 1 && off <= p, "offset {off} at {p}");
                assert!(p + len <= argb.len());
                assert_eq!(argb[p..p + len], argb[p - off..p - off + len], "at {p}");
            }
        }
    }

    #[test]
    fn test_hash_deterministic() {
        let h1 = hash_pix_pair(0xFF112233, 0xFF445566);
        let h2 = hash_pix_pair(0xFF112233, 0xFF445566);
        assert_eq!(h1, h2);
        assert!(h1 < HASH_SIZE);
    }

    #[test]
    fn test_hash_chain_simple() {
        let pixels = vec![0xFF000000u32; 100];
        let mut chain = HashChain::default();
        chain.fill(&pixels, 75, 10);

        assert!(chain.length(50) > 0);
        assert_eq!(chain.length(0), 0);
        assert_eq!(chain.length(99), 0);
        assert_matches_valid(&pixels, &chain);
    }

    #[test]
    fn test_left_extension_reaches_start() {
        // A repeated block: every position of the second copy points one
        // period back, including those found only by extension.
        let block: Vec<u32> = (0..16).map(|i| 0xff00_0000 | (i * 7919)).collect();
        let mut pixels = block.clone();
        pixels.extend_from_slice(&block);
        pixels.push(0xffff_ffff);
        let mut chain = HashChain::default();
        chain.fill(&pixels, 90, 33);
        // The last pixel before the sentinel cannot start a match.
        for p in 16..31 {
            assert_eq!(chain.offset(p), 16, "at {p}");
            assert_eq!(chain.length(p), 32 - p);
        }
        assert_matches_valid(&pixels, &chain);
    }

    #[test]
    fn test_long_runs_are_capped() {
        let pixels = vec![0xff12_3456u32; MAX_LENGTH * 3];
        let mut chain = HashChain::default();
        chain.fill(&pixels, 100, 64);
        assert_eq!(chain.length(1), MAX_LENGTH);
        assert_matches_valid(&pixels, &chain);
    }

    #[test]
    fn test_matches_are_valid_on_noise() {
        for (quality, colors) in [(0, 4), (30, 16), (75, 3), (100, 64)] {
            let pixels = noise(3000, quality as u64 + 1, colors);
            let mut chain = HashChain::default();
            chain.fill(&pixels, quality, 50);
            assert_matches_valid(&pixels, &chain);
        }
    }

    #[test]
    fn test_refill_reuses_buffers() {
        let mut chain = HashChain::default();
        chain.fill(&noise(500, 3, 5), 75, 20);
        let small = vec![0xff00_00ffu32; 6];
        chain.fill(&small, 75, 3);
        assert_eq!(chain.size(), 6);
        assert_matches_valid(&small, &chain);
    }

    #[test]
    fn test_tiny_inputs() {
        let mut chain = HashChain::default();
        chain.fill(&[7, 7], 75, 2);
        assert_eq!(chain.size(), 2);
        assert_eq!(chain.length(0), 0);
        assert_eq!(chain.length(1), 0);
    }

    #[test]
    fn test_vector_mismatch() {
        let a = [1, 2, 3, 4, 5];
        let b = [1, 2, 3, 9, 5];
        assert_eq!(vector_mismatch(&a, &b, 10), 3);

        let c = [1, 2, 3, 4, 5];
        let d = [1, 2, 3, 4, 5];
        assert_eq!(vector_mismatch(&c, &d, 10), 5);
        assert_eq!(vector_mismatch(&c, &d, 2), 2);
    }
}
