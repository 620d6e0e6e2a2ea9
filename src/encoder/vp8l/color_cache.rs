//! Color cache for VP8L encoding.
//!
//! The color cache stores recently used colors and allows referencing them
//! by index instead of encoding the full ARGB value. Encoder and decoder must
//! insert the same pixels in the same order for indices to agree.

use alloc::vec;
use alloc::vec::Vec;

/// Color cache hash multiplier (must match decoder exactly).
const COLOR_CACHE_MULT: u32 = 0x1e35a7bd;

/// Slot of `argb` in a cache of `1 << bits` entries.
#[inline]
pub fn color_cache_key(argb: u32, bits: u8) -> usize {
    (COLOR_CACHE_MULT.wrapping_mul(argb) >> (32 - bits as u32)) as usize
}

/// Color cache for encoding.
#[derive(Debug, Clone)]
pub struct ColorCache {
    /// Cache entries (ARGB values).
    colors: Vec<u32>,
    /// Number of bits (1-11).
    bits: u8,
}

impl ColorCache {
    /// Create a new color cache with the given number of bits.
    /// `bits` must be in range 1-11.
    pub fn new(bits: u8) -> Self {
        debug_assert!((1..=11).contains(&bits));
        Self {
            colors: vec![0; 1 << bits],
            bits,
        }
    }

    /// Get the cache size.
    #[inline]
    pub fn size(&self) -> usize {
        self.colors.len()
    }

    /// Insert a color into the cache, overwriting its slot.
    #[inline]
    pub fn insert(&mut self, argb: u32) {
        let idx = color_cache_key(argb, self.bits);
        self.colors[idx] = argb;
    }

    /// Slot index holding exactly `argb`, if any.
    #[inline]
    pub fn lookup(&self, argb: u32) -> Option<u16> {
        let idx = color_cache_key(argb, self.bits);
        (self.colors[idx] == argb).then_some(idx as u16)
    }

    /// Get the color at a given index.
    #[inline]
    pub fn get(&self, idx: u16) -> u32 {
        self.colors[idx as usize]
    }

    /// Store `argb` at a precomputed slot.
    #[inline]
    pub fn set(&mut self, idx: usize, argb: u32) {
        self.colors[idx] = argb;
    }
}
