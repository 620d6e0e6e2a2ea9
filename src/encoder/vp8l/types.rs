//! Core data structures for VP8L encoding.

use alloc::vec::Vec;
use core::ops::BitOr;

use super::backward_refs::plane_code_to_distance;
use super::color_cache::ColorCache;

/// Bits of the pixel-pair hash (matching libwebp).
pub const HASH_BITS: u32 = 18;
/// Number of hash buckets.
pub const HASH_SIZE: usize = 1 << HASH_BITS;
/// Bits of a packed hash chain entry holding the match length.
pub const MAX_LENGTH_BITS: u32 = 12;
/// Bits of the largest LZ77 window.
pub const WINDOW_SIZE_BITS: u32 = 20;
/// Maximum match length (4095).
pub const MAX_LENGTH: usize = (1 << MAX_LENGTH_BITS) - 1;
/// Maximum window size (1M - 120 for 2D codes).
pub const WINDOW_SIZE: usize = (1 << WINDOW_SIZE_BITS) - 120;
/// Minimum profitable match length.
pub const MIN_LENGTH: usize = 4;

/// Number of literal symbols per channel.
pub const NUM_LITERAL_CODES: usize = 256;
/// Number of length prefix codes following the green literals.
pub const NUM_LENGTH_CODES: usize = 24;
/// Number of distance codes.
pub const NUM_DISTANCE_CODES: usize = 40;
/// Size of the code length alphabet.
pub const CODE_LENGTH_CODES: usize = 19;
/// Longest Huffman code allowed by the format.
pub const MAX_ALLOWED_CODE_LENGTH: usize = 15;

/// Largest color cache the bitstream can signal.
pub const MAX_COLOR_CACHE_BITS: u8 = 11;
/// Largest color cache the encoder searches by default (libwebp's limit).
pub const DEFAULT_MAX_CACHE_BITS: u8 = 10;

/// Green/length alphabet size without a color cache (280).
pub const ALPHABET_SIZE_GREEN: usize = NUM_LITERAL_CODES + NUM_LENGTH_CODES;
/// Red alphabet size.
pub const ALPHABET_SIZE_RED: usize = 256;
/// Blue alphabet size.
pub const ALPHABET_SIZE_BLUE: usize = 256;
/// Alpha alphabet size.
pub const ALPHABET_SIZE_ALPHA: usize = 256;
/// Distance alphabet size.
pub const ALPHABET_SIZE_DISTANCE: usize = NUM_DISTANCE_CODES;

/// Size of the green/length/cache alphabet for a given cache size.
#[inline]
pub const fn literal_alphabet_size(cache_bits: u8) -> usize {
    ALPHABET_SIZE_GREEN + if cache_bits > 0 { 1 << cache_bits } else { 0 }
}

/// Encoder quality/speed tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8lQuality {
    /// Quality level 0-100.
    pub quality: u8,
    /// Method 0-6 (speed/quality tradeoff).
    pub method: u8,
}

impl Default for Vp8lQuality {
    fn default() -> Self {
        Self {
            quality: 75,
            method: 4,
        }
    }
}

impl Vp8lQuality {
    /// Maximum hash chain iterations based on quality.
    pub fn max_iters(&self) -> usize {
        8 + (self.quality as usize * self.quality as usize) / 128
    }

    /// Window size based on quality.
    pub fn window_size(&self, width: usize) -> usize {
        let max = if self.quality > 75 {
            WINDOW_SIZE
        } else if self.quality > 50 {
            width << 8
        } else if self.quality > 25 {
            width << 6
        } else {
            width << 4
        };
        max.min(WINDOW_SIZE)
    }
}

/// Set of LZ77 parsing strategies tried by the backward reference search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lz77Strategies(u8);

impl Lz77Strategies {
    /// Hash-chain greedy parsing, refined by the optimal parse.
    pub const STANDARD: Self = Self(1);
    /// Runs of the previous pixel or the pixel above.
    pub const RLE: Self = Self(2);
    /// Matches restricted to a small 2D neighborhood.
    pub const BOX: Self = Self(4);

    /// Strategies in the order they are evaluated.
    pub const ALL: [Self; 3] = [Self::STANDARD, Self::RLE, Self::BOX];

    /// No strategy.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every strategy in `other` is part of `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Whether no strategy is selected.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the selected strategies in evaluation order.
    pub fn iter(self) -> impl Iterator<Item = Lz77Strategies> {
        Self::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl BitOr for Lz77Strategies {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// VP8L encoder configuration.
#[derive(Debug, Clone)]
pub struct Vp8lConfig {
    /// Quality and method settings.
    pub quality: Vp8lQuality,
    /// Color cache bits maximum. `None` searches up to 10 bits, `Some(0)`
    /// disables the cache, `Some(n)` searches up to `n` (at most 11).
    pub cache_bits: Option<u8>,
    /// Use meta-Huffman (spatially-varying codes).
    pub use_meta_huffman: bool,
    /// Histogram tile bits (2-9). `None` derives them from method and size.
    pub histogram_bits: Option<u8>,
    /// LZ77 strategies to try. `None` derives them from method and quality.
    pub lz77: Option<Lz77Strategies>,
    /// Also encode without the color cache and keep the smaller stream.
    pub try_no_cache: bool,
}

impl Default for Vp8lConfig {
    fn default() -> Self {
        Self {
            quality: Vp8lQuality::default(),
            cache_bits: None,
            use_meta_huffman: true,
            histogram_bits: None,
            lz77: None,
            try_no_cache: false,
        }
    }
}

impl Vp8lConfig {
    /// Configuration with the given quality (0-100) and method (0-6).
    pub fn new(quality: u8, method: u8) -> Self {
        Self {
            quality: Vp8lQuality {
                quality: quality.min(100),
                method: method.min(6),
            },
            ..Self::default()
        }
    }

    /// Set the color cache search limit (0 disables the cache).
    #[must_use]
    pub fn with_cache_bits(mut self, bits: u8) -> Self {
        self.cache_bits = Some(bits.min(MAX_COLOR_CACHE_BITS));
        self
    }

    /// Enable or disable spatially-varying codes.
    #[must_use]
    pub fn with_meta_huffman(mut self, enable: bool) -> Self {
        self.use_meta_huffman = enable;
        self
    }

    /// Set the histogram tile bits (clamped to 2-9).
    #[must_use]
    pub fn with_histogram_bits(mut self, bits: u8) -> Self {
        self.histogram_bits = Some(bits.clamp(2, 9));
        self
    }

    /// Restrict the LZ77 strategies tried on the main image.
    #[must_use]
    pub fn with_lz77(mut self, strategies: Lz77Strategies) -> Self {
        self.lz77 = Some(strategies);
        self
    }

    /// Also try encoding without the color cache.
    #[must_use]
    pub fn with_try_no_cache(mut self, enable: bool) -> Self {
        self.try_no_cache = enable;
        self
    }

    /// Upper bound for the color cache search.
    pub fn max_cache_bits(&self) -> u8 {
        self.cache_bits
            .unwrap_or(DEFAULT_MAX_CACHE_BITS)
            .min(MAX_COLOR_CACHE_BITS)
    }

    /// Strategies for the main image.
    pub fn lz77_strategies(&self) -> Lz77Strategies {
        if let Some(s) = self.lz77.filter(|s| !s.is_empty()) {
            return s;
        }
        let mut s = Lz77Strategies::STANDARD | Lz77Strategies::RLE;
        if self.quality.method >= 5 && self.quality.quality >= 75 {
            s = s | Lz77Strategies::BOX;
        }
        s
    }

    /// Cache sizes to try, in order. The smaller resulting stream wins.
    pub fn trial_cache_bits(&self) -> Vec<u8> {
        let max = self.max_cache_bits();
        if max > 0 && (self.try_no_cache || self.quality.method >= 5) {
            alloc::vec![max, 0]
        } else {
            alloc::vec![max]
        }
    }
}

/// A pixel or copy operation in the backward reference stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixOrCopy {
    /// Literal ARGB pixel value.
    Literal(u32),
    /// Color cache index (0-2047 depending on cache_bits).
    CacheIdx(u16),
    /// Backward reference copy.
    Copy {
        /// Copy length (1-4095).
        len: u16,
        /// Linear distance, or a plane code once 2D locality has been applied.
        dist: u32,
    },
}

impl PixOrCopy {
    /// Create a backward reference copy.
    #[inline]
    pub fn copy(len: usize, dist: usize) -> Self {
        debug_assert!((1..=MAX_LENGTH).contains(&len));
        Self::Copy {
            len: len as u16,
            dist: dist as u32,
        }
    }

    /// Is this a copy?
    #[inline]
    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Copy { .. })
    }

    /// Number of pixels covered by this token.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Copy { len, .. } => *len as usize,
            _ => 1,
        }
    }
}

/// Backward reference storage.
#[derive(Debug, Clone, Default)]
pub struct BackwardRefs {
    /// Tokens (pixels or copies).
    pub tokens: Vec<PixOrCopy>,
}

impl BackwardRefs {
    /// Create with capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(cap),
        }
    }

    /// Add a token.
    #[inline]
    pub fn push(&mut self, token: PixOrCopy) {
        self.tokens.push(token);
    }

    /// Clear all tokens, keeping the allocation.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Is empty?
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over tokens.
    pub fn iter(&self) -> impl Iterator<Item = &PixOrCopy> {
        self.tokens.iter()
    }

    /// Total number of pixels covered by the tokens.
    pub fn pixel_count(&self) -> usize {
        self.tokens.iter().map(PixOrCopy::len).sum()
    }

    /// Rebuild the pixels from tokens whose copies carry linear distances.
    pub fn replay_linear(&self, cache_bits: u8) -> Option<Vec<u32>> {
        self.replay_with(cache_bits, |dist| dist)
    }

    /// Rebuild the pixels from tokens whose copies carry plane codes.
    pub fn replay_plane_codes(&self, xsize: usize, cache_bits: u8) -> Option<Vec<u32>> {
        self.replay_with(cache_bits, |code| plane_code_to_distance(xsize, code))
    }

    /// Decoder-side replay: every produced pixel is inserted in the cache once,
    /// in stream order. Returns `None` on an out-of-range distance or index.
    fn replay_with(&self, cache_bits: u8, to_distance: impl Fn(usize) -> usize) -> Option<Vec<u32>> {
        let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));
        let mut out: Vec<u32> = Vec::with_capacity(self.pixel_count());
        for token in &self.tokens {
            let start = out.len();
            match *token {
                PixOrCopy::Literal(argb) => out.push(argb),
                PixOrCopy::CacheIdx(idx) => {
                    let cache = cache.as_ref()?;
                    if idx as usize >= cache.size() {
                        return None;
                    }
                    out.push(cache.get(idx));
                }
                PixOrCopy::Copy { len, dist } => {
                    let dist = to_distance(dist as usize);
                    if dist == 0 || dist > out.len() {
                        return None;
                    }
                    for _ in 0..len {
                        out.push(out[out.len() - dist]);
                    }
                }
            }
            if let Some(cache) = cache.as_mut() {
                for &argb in &out[start..] {
                    cache.insert(argb);
                }
            }
        }
        Some(out)
    }
}

/// Alpha channel of a packed ARGB pixel.
#[inline]
pub const fn argb_alpha(argb: u32) -> u8 {
    (argb >> 24) as u8
}

/// Red channel.
#[inline]
pub const fn argb_red(argb: u32) -> u8 {
    (argb >> 16) as u8
}

/// Green channel.
#[inline]
pub const fn argb_green(argb: u32) -> u8 {
    (argb >> 8) as u8
}

/// Blue channel.
#[inline]
pub const fn argb_blue(argb: u32) -> u8 {
    argb as u8
}

/// Pack channels into `0xAARRGGBB`.
#[inline]
pub const fn make_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Subsample size calculation (ceiling division).
#[inline]
pub const fn subsample_size(size: u32, bits: u8) -> u32 {
    (size + (1 << bits) - 1) >> bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_budgets() {
        let q = Vp8lQuality {
            quality: 100,
            method: 4,
        };
        assert_eq!(q.max_iters(), 8 + 10000 / 128);
        assert_eq!(q.window_size(64), WINDOW_SIZE);

        let q = Vp8lQuality {
            quality: 10,
            method: 4,
        };
        assert_eq!(q.max_iters(), 8);
        assert_eq!(q.window_size(64), 64 << 4);
    }

    #[test]
    fn test_strategy_set() {
        let s = Lz77Strategies::STANDARD | Lz77Strategies::BOX;
        assert!(s.contains(Lz77Strategies::STANDARD));
        assert!(!s.contains(Lz77Strategies::RLE));
        let order: Vec<_> = s.iter().collect();
        assert_eq!(order, [Lz77Strategies::STANDARD, Lz77Strategies::BOX]);
        assert!(Lz77Strategies::empty().is_empty());
    }

    #[test]
    fn test_config_derivations() {
        let cfg = Vp8lConfig::new(80, 6);
        assert!(cfg.lz77_strategies().contains(Lz77Strategies::BOX));
        assert_eq!(cfg.trial_cache_bits(), [10, 0]);

        let cfg = Vp8lConfig {
            cache_bits: Some(0),
            ..Vp8lConfig::new(50, 2)
        };
        assert_eq!(cfg.trial_cache_bits(), [0]);
        assert!(!cfg.lz77_strategies().contains(Lz77Strategies::BOX));
    }

    #[test]
    fn test_replay_linear_with_cache() {
        let a = 0xff10_2030;
        let b = 0xff40_5060;
        let mut refs = BackwardRefs::default();
        refs.push(PixOrCopy::Literal(a));
        refs.push(PixOrCopy::Literal(b));
        refs.push(PixOrCopy::copy(4, 2));
        let mut cache = ColorCache::new(4);
        cache.insert(a);
        let idx = cache.lookup(a).unwrap();
        refs.push(PixOrCopy::CacheIdx(idx));

        let pixels = refs.replay_linear(4).unwrap();
        assert_eq!(pixels, [a, b, a, b, a, b, a]);
        assert_eq!(refs.pixel_count(), 7);
    }

    #[test]
    fn test_replay_rejects_bad_distance() {
        let mut refs = BackwardRefs::default();
        refs.push(PixOrCopy::Literal(1));
        refs.push(PixOrCopy::copy(2, 5));
        assert!(refs.replay_linear(0).is_none());
    }
}
