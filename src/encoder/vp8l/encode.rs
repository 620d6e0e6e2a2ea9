//! Main VP8L encoder implementation.
//!
//! Writes a transform-free VP8L image stream: header, color cache
//! parameters, optional meta-Huffman image, the Huffman codes of every
//! histogram group and finally the tokens.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use log::{debug, trace};

use super::backward_refs::{get_backward_references, BackwardRefsResult, RefsScratch};
use super::bitwriter::BitWriter;
use super::hash_chain::HashChain;
use super::histogram::{prefix_encode, Histogram};
use super::huffman::{create_huffman_tree, store_huffman_code, HuffmanTreeCode};
use super::meta_huffman::get_histo_image_symbols;
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, make_argb, subsample_size, BackwardRefs,
    Lz77Strategies, PixOrCopy, Vp8lConfig, MAX_ALLOWED_CODE_LENGTH, NUM_LENGTH_CODES,
    NUM_LITERAL_CODES,
};
use crate::encoder::api::{EncodeError, EncodeResult};

/// VP8L signature byte.
pub const VP8L_MAGIC: u8 = 0x2f;
/// Only version 0 is defined.
const VP8L_VERSION: u64 = 0;
/// Largest width or height the 14-bit header fields can express.
pub const MAX_DIMENSION: u32 = 1 << 14;

/// Maximum number of histogram tiles (matching libwebp's MAX_HUFF_IMAGE_SIZE).
const MAX_HUFF_IMAGE_SIZE: usize = 2600;
/// Min/max Huffman bits range (3 bits in the stream, range [2, 9]).
const MIN_HUFFMAN_BITS: u8 = 2;
const MAX_HUFFMAN_BITS: u8 = 9; // 2 + (1 << 3) - 1

/// Five codes per histogram group: green/length/cache, red, blue, alpha,
/// distance.
type GroupCodes = [HuffmanTreeCode; 5];

/// Encode an image using VP8L lossless compression.
///
/// `pixels` holds RGBA (`has_alpha`) or RGB bytes, row-major. The output is
/// a bare VP8L stream starting with the signature byte.
pub fn encode_vp8l(
    pixels: &[u8],
    width: u32,
    height: u32,
    has_alpha: bool,
    config: &Vp8lConfig,
) -> EncodeResult<Vec<u8>> {
    check_dimensions(width, height)?;

    let bpp = if has_alpha { 4 } else { 3 };
    let expected_len = width as usize * height as usize * bpp;
    if pixels.len() != expected_len {
        return Err(EncodeError::InvalidBufferSize(alloc::format!(
            "expected {} bytes, got {}",
            expected_len,
            pixels.len()
        )));
    }

    let argb: Vec<u32> = if has_alpha {
        pixels
            .chunks_exact(4)
            .map(|p| make_argb(p[3], p[0], p[1], p[2]))
            .collect()
    } else {
        pixels
            .chunks_exact(3)
            .map(|p| make_argb(255, p[0], p[1], p[2]))
            .collect()
    };

    let mut session = EncodeSession::new();
    Ok(session.encode(&argb, width as usize, height as usize, config))
}

/// Encode packed `0xAARRGGBB` pixels using VP8L lossless compression.
pub fn encode_argb(
    argb: &[u32],
    width: u32,
    height: u32,
    config: &Vp8lConfig,
) -> EncodeResult<Vec<u8>> {
    EncodeSession::new().encode_argb(argb, width, height, config)
}

fn check_dimensions(width: u32, height: u32) -> EncodeResult<()> {
    if width == 0 || width > MAX_DIMENSION || height == 0 || height > MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions);
    }
    Ok(())
}

/// Scratch memory of the encoder, reusable across images.
///
/// Holds the hash chain and the reference buffers shared by the trial
/// configurations and by the histogram image sub-encode.
#[derive(Debug, Default)]
pub struct EncodeSession {
    hash_chain: HashChain,
    scratch: RefsScratch,
}

impl EncodeSession {
    /// Empty session; buffers grow on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode packed `0xAARRGGBB` pixels into a VP8L stream.
    pub fn encode_argb(
        &mut self,
        argb: &[u32],
        width: u32,
        height: u32,
        config: &Vp8lConfig,
    ) -> EncodeResult<Vec<u8>> {
        check_dimensions(width, height)?;
        let expected_len = width as usize * height as usize;
        if argb.len() != expected_len {
            return Err(EncodeError::InvalidBufferSize(alloc::format!(
                "expected {} pixels, got {}",
                expected_len,
                argb.len()
            )));
        }
        Ok(self.encode(argb, width as usize, height as usize, config))
    }

    fn encode(&mut self, argb: &[u32], width: usize, height: usize, config: &Vp8lConfig) -> Vec<u8> {
        let has_alpha = argb.iter().any(|&p| argb_alpha(p) != 0xff);
        let mut writer = BitWriter::with_capacity(argb.len());
        write_image_header(&mut writer, width, height, has_alpha);
        // No transforms.
        writer.write_bit(false);

        let best = self.encode_image_internal(&writer, argb, width, height, config);
        best.finish()
    }

    /// Try every cache configuration on top of `header` and return the
    /// writer holding the smallest stream.
    fn encode_image_internal(
        &mut self,
        header: &BitWriter,
        argb: &[u32],
        width: usize,
        height: usize,
        config: &Vp8lConfig,
    ) -> BitWriter {
        let quality = config.quality.quality;
        let strategies = config.lz77_strategies();
        let histo_bits = match config.histogram_bits {
            Some(bits) => clamp_histo_bits(width, height, bits),
            None => get_histo_bits(config.quality.method, width, height),
        };
        debug!(
            "vp8l encode {}x{}: q={} m={} histo_bits={} strategies={:?}",
            width, height, quality, config.quality.method, histo_bits, strategies
        );

        // Every trial's references are computed before anything is written:
        // the histogram image sub-encode refills the hash chain.
        self.hash_chain.fill(argb, quality, width);
        let mut trials: Vec<(BackwardRefs, BackwardRefsResult)> = Vec::new();
        for cache_bits_max in config.trial_cache_bits() {
            if cache_bits_max == 0 && trials.iter().any(|(_, r)| r.cache_bits == 0) {
                continue;
            }
            let result = get_backward_references(
                width,
                height,
                argb,
                quality,
                strategies,
                cache_bits_max,
                &self.hash_chain,
                &mut self.scratch,
            );
            trials.push((self.scratch.take_refs(), result));
        }

        let mut best: Option<BitWriter> = None;
        let mut candidate = header.clone();
        for (refs, result) in &trials {
            candidate.clone_from(header);
            self.write_image_data(
                &mut candidate,
                refs,
                result.cache_bits,
                width,
                height,
                histo_bits,
                quality,
                config.use_meta_huffman,
            );
            trace!(
                "trial cache_bits={}: {} bytes",
                result.cache_bits,
                candidate.byte_position()
            );
            match best.as_mut() {
                Some(b) if candidate.bit_position() >= b.bit_position() => {}
                Some(b) => mem::swap(b, &mut candidate),
                None => best = Some(candidate.clone()),
            }
        }
        best.unwrap_or(candidate)
    }

    /// Cache parameters, meta-Huffman image, codes and tokens of one image.
    #[allow(clippy::too_many_arguments)]
    fn write_image_data(
        &mut self,
        writer: &mut BitWriter,
        refs: &BackwardRefs,
        cache_bits: u8,
        width: usize,
        height: usize,
        histo_bits: u8,
        quality: u8,
        use_meta_huffman: bool,
    ) {
        let (histograms, symbols) = if use_meta_huffman {
            get_histo_image_symbols(width, height, refs, quality, histo_bits, cache_bits)
        } else {
            (vec![Histogram::from_refs(refs, cache_bits)], vec![0])
        };
        let mut codes: Vec<GroupCodes> = histograms.iter().map(huffman_group).collect();

        if cache_bits > 0 {
            writer.write_bit(true);
            writer.write_bits(cache_bits as u64, 4);
        } else {
            writer.write_bit(false);
        }

        let write_histogram_image = histograms.len() > 1;
        writer.write_bit(write_histogram_image);
        if write_histogram_image {
            writer.write_bits((histo_bits - 2) as u64, 3);
            let histogram_argb: Vec<u32> = symbols.iter().map(|&s| (s as u32) << 8).collect();
            self.encode_image_no_huffman(
                writer,
                &histogram_argb,
                subsample_size(width as u32, histo_bits) as usize,
                subsample_size(height as u32, histo_bits) as usize,
                quality,
            );
        }

        store_group_codes(writer, &mut codes);
        let tile_bits = if write_histogram_image { histo_bits } else { 0 };
        store_image_to_bitmask(writer, width, tile_bits, refs, &symbols, &codes);
    }

    /// Encode a sub-image (the histogram image) with a single code group,
    /// no color cache and no meta-Huffman image.
    pub(crate) fn encode_image_no_huffman(
        &mut self,
        writer: &mut BitWriter,
        argb: &[u32],
        width: usize,
        height: usize,
        quality: u8,
    ) {
        self.hash_chain.fill(argb, quality, width);
        get_backward_references(
            width,
            height,
            argb,
            quality,
            Lz77Strategies::STANDARD | Lz77Strategies::RLE,
            0,
            &self.hash_chain,
            &mut self.scratch,
        );
        let refs = self.scratch.refs();
        let histogram = Histogram::from_refs(refs, 0);
        let mut codes = vec![huffman_group(&histogram)];

        // No color cache.
        writer.write_bit(false);
        store_group_codes(writer, &mut codes);
        store_image_to_bitmask(writer, width, 0, refs, &[0], &codes);
    }
}

fn write_image_header(writer: &mut BitWriter, width: usize, height: usize, has_alpha: bool) {
    writer.write_bits(VP8L_MAGIC as u64, 8);
    writer.write_bits((width - 1) as u64, 14);
    writer.write_bits((height - 1) as u64, 14);
    writer.write_bit(has_alpha);
    writer.write_bits(VP8L_VERSION, 3);
}

fn huffman_group(h: &Histogram) -> GroupCodes {
    let limit = MAX_ALLOWED_CODE_LENGTH as u8;
    [
        create_huffman_tree(&h.literal, limit),
        create_huffman_tree(&h.red, limit),
        create_huffman_tree(&h.blue, limit),
        create_huffman_tree(&h.alpha, limit),
        create_huffman_tree(&h.distance, limit),
    ]
}

/// Write every code, then drop the code words of single-symbol codes: the
/// decoder reads those symbols without consuming bits.
fn store_group_codes(writer: &mut BitWriter, codes: &mut [GroupCodes]) {
    for group in codes.iter_mut() {
        for code in group.iter_mut() {
            store_huffman_code(writer, code);
            code.clear_if_only_one_symbol();
        }
    }
}

/// Write the tokens, each with the codes of the tile it starts in.
fn store_image_to_bitmask(
    writer: &mut BitWriter,
    width: usize,
    histo_bits: u8,
    refs: &BackwardRefs,
    symbols: &[u16],
    codes: &[GroupCodes],
) {
    let histo_xsize = if histo_bits > 0 {
        subsample_size(width as u32, histo_bits) as usize
    } else {
        1
    };
    let (mut x, mut y) = (0usize, 0usize);
    for token in refs.iter() {
        let group = if histo_bits == 0 {
            symbols[0]
        } else {
            symbols[(y >> histo_bits) * histo_xsize + (x >> histo_bits)]
        };
        let codes = &codes[group as usize];

        match *token {
            PixOrCopy::Literal(argb) => {
                writer.write_huffman_code(&codes[0], argb_green(argb) as usize);
                writer.write_huffman_code(&codes[1], argb_red(argb) as usize);
                writer.write_huffman_code(&codes[2], argb_blue(argb) as usize);
                writer.write_huffman_code(&codes[3], argb_alpha(argb) as usize);
            }
            PixOrCopy::CacheIdx(idx) => {
                let symbol = NUM_LITERAL_CODES + NUM_LENGTH_CODES + idx as usize;
                writer.write_huffman_code(&codes[0], symbol);
            }
            PixOrCopy::Copy { len, dist } => {
                let length = prefix_encode(len as u32);
                writer.write_huffman_code_with_extra_bits(
                    &codes[0],
                    NUM_LITERAL_CODES + length.code as usize,
                    length.extra_value,
                    length.extra_bits,
                );
                // Distance extras reach 18 bits; written separately from
                // the code word.
                let distance = prefix_encode(dist);
                writer.write_huffman_code(&codes[4], distance.code as usize);
                writer.write_bits(distance.extra_value as u64, distance.extra_bits);
            }
        }

        x += token.len();
        while x >= width {
            x -= width;
            y += 1;
        }
    }
}

/// Histogram tile bits for `method`: smaller tiles for slower methods,
/// grown until the histogram image has at most 2600 tiles.
pub fn get_histo_bits(method: u8, width: usize, height: usize) -> u8 {
    let mut histo_bits = 7u8.saturating_sub(method);
    while tile_count(width, height, histo_bits) > MAX_HUFF_IMAGE_SIZE {
        histo_bits += 1;
    }
    histo_bits.clamp(MIN_HUFFMAN_BITS, MAX_HUFFMAN_BITS)
}

/// Explicit tile bits, raised until every tile symbol fits in 16 bits.
fn clamp_histo_bits(width: usize, height: usize, bits: u8) -> u8 {
    let mut bits = bits.clamp(MIN_HUFFMAN_BITS, MAX_HUFFMAN_BITS);
    while bits < MAX_HUFFMAN_BITS && tile_count(width, height, bits) >= 0xffff {
        bits += 1;
    }
    bits
}

fn tile_count(width: usize, height: usize, bits: u8) -> usize {
    subsample_size(width as u32, bits) as usize * subsample_size(height as u32, bits) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histo_bits() {
        assert_eq!(get_histo_bits(4, 100, 100), 3);
        assert_eq!(get_histo_bits(6, 1000, 1000), 5);
        assert_eq!(get_histo_bits(0, 16, 16), 7);
        assert_eq!(get_histo_bits(6, 1, 1), 2);
        // 256 x 256 tiles at 6 bits would overflow the 16-bit symbols.
        assert_eq!(clamp_histo_bits(16384, 16384, 2), 7);
        assert_eq!(clamp_histo_bits(64, 64, 12), 9);
    }

    #[test]
    fn test_header_layout() {
        let mut w = BitWriter::new();
        write_image_header(&mut w, 3, 2, true);
        assert_eq!(w.bit_position(), 40);
        let bytes = w.finish();
        assert_eq!(bytes[0], VP8L_MAGIC);
        // width-1 = 2 in the low bits of the next 14.
        assert_eq!(bytes[1], 2);
        // height-1 = 1 starts at bit 14 of the fields.
        assert_eq!(bytes[2] >> 6, 1);
        // alpha hint is bit 28 past the signature.
        assert_eq!((bytes[4] >> 4) & 1, 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let cfg = Vp8lConfig::default();
        assert!(matches!(
            encode_vp8l(&[], 0, 1, true, &cfg),
            Err(EncodeError::InvalidDimensions)
        ));
        assert!(matches!(
            encode_vp8l(&[0; 12], 2, 2, true, &cfg),
            Err(EncodeError::InvalidBufferSize(_))
        ));
        assert!(matches!(
            encode_argb(&[0; 3], 2, 2, &cfg),
            Err(EncodeError::InvalidBufferSize(_))
        ));
        assert!(matches!(
            encode_argb(&[0; 1], MAX_DIMENSION + 1, 1, &cfg),
            Err(EncodeError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_single_pixel_stream() {
        let out = encode_argb(&[0xff11_2233], 1, 1, &Vp8lConfig::default()).unwrap();
        assert_eq!(out[0], VP8L_MAGIC);
        assert!(out.len() < 32);
    }

    fn references(argb: &[u32], width: usize, height: usize) -> (BackwardRefs, u8) {
        let mut chain = HashChain::default();
        chain.fill(argb, 75, width);
        let mut scratch = RefsScratch::default();
        let result = get_backward_references(
            width,
            height,
            argb,
            75,
            Lz77Strategies::STANDARD | Lz77Strategies::RLE,
            10,
            &chain,
            &mut scratch,
        );
        (scratch.take_refs(), result.cache_bits)
    }

    fn lcg_noise(n: usize, seed: u32) -> Vec<u32> {
        let mut s = seed;
        (0..n)
            .map(|_| {
                s = s.wrapping_mul(1103515245).wrapping_add(12345);
                let hi = s >> 16;
                s = s.wrapping_mul(1103515245).wrapping_add(12345);
                0xff00_0000 | ((hi << 8) & 0xff_ff00) | ((s >> 16) & 0xff)
            })
            .collect()
    }

    #[test]
    fn test_solid_2x2() {
        let argb = [0xff40_8020u32; 4];
        let (refs, cache_bits) = references(&argb, 2, 2);
        assert_eq!(cache_bits, 0);
        assert!(matches!(refs.tokens[0], PixOrCopy::Literal(0xff40_8020)));
        assert!(refs.len() <= 4);
        assert_eq!(refs.replay_plane_codes(2, 0).unwrap(), argb);

        let out = encode_argb(&argb, 2, 2, &Vp8lConfig::default()).unwrap();
        // Cache flag follows the 40 header bits and the transform bit.
        assert_eq!((out[5] >> 1) & 1, 0);
        assert!(out.len() <= 24);
    }

    #[test]
    fn test_three_stripes_use_few_tokens() {
        let colors = [0xff10_2030u32, 0xffa0_b0c0, 0x8040_4040];
        let argb: Vec<u32> = (0..256).map(|i| colors[(i / 16) * 3 / 16]).collect();
        let (refs, cache_bits) = references(&argb, 16, 16);
        assert!(refs.len() <= 24, "{} tokens", refs.len());
        assert_eq!(refs.pixel_count(), 256);
        assert_eq!(refs.replay_plane_codes(16, cache_bits).unwrap(), argb);
    }

    #[test]
    fn test_noise_is_literal_dominated() {
        let (w, h) = (64usize, 64usize);
        let argb = lcg_noise(w * h, 3);
        let (refs, cache_bits) = references(&argb, w, h);
        let literals = refs
            .iter()
            .filter(|t| matches!(t, PixOrCopy::Literal(_)))
            .count();
        assert!(literals * 100 >= refs.len() * 99);
        assert_eq!(refs.replay_plane_codes(w, cache_bits).unwrap(), argb);

        // Spatially uniform statistics collapse into very few codes.
        let histo_bits = get_histo_bits(4, w, h);
        let (clusters, symbols) =
            get_histo_image_symbols(w, h, &refs, 75, histo_bits, cache_bits);
        assert_eq!(symbols.len(), tile_count(w, h, histo_bits));
        assert!(clusters.len() <= 4, "{} clusters", clusters.len());
    }

    #[test]
    fn test_session_reuse_is_deterministic() {
        let argb: Vec<u32> = (0..32 * 8).map(|i| 0xff00_0000 | (i % 7) * 0x10203).collect();
        let cfg = Vp8lConfig::new(75, 6);
        let mut session = EncodeSession::new();
        let a = session.encode_argb(&argb, 32, 8, &cfg).unwrap();
        let b = session.encode_argb(&argb, 32, 8, &cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, encode_argb(&argb, 32, 8, &cfg).unwrap());
    }
}
