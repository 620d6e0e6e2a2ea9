//! Decoding of transform-free VP8L image streams.
//!
//! Handles the color cache, meta-Huffman (entropy image) groups and
//! backward references with plane-code distances. Streams that declare a
//! transform are rejected.

use alloc::vec;
use alloc::vec::Vec;

use super::api::{DecodeError, DecodeResult};
use super::bit_reader::BitReader;
use super::huffman::{HuffmanTable, HUFFMAN_TABLE_BITS, LENGTHS_TABLE_BITS};
use crate::encoder::vp8l::backward_refs::plane_code_to_distance;
use crate::encoder::vp8l::color_cache::ColorCache;
use crate::encoder::vp8l::histogram::{prefix_decode, prefix_extra_bits};
use crate::encoder::vp8l::types::{
    make_argb, subsample_size, CODE_LENGTH_CODES, MAX_COLOR_CACHE_BITS, NUM_DISTANCE_CODES,
    NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

const VP8L_MAGIC: u8 = 0x2f;

/// Order in which the code-length code lengths are stored.
const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Code lengths below this are literal lengths; 16-18 are repeat codes.
const CODE_LENGTH_LITERALS: u16 = 16;
/// Length repeated by code 16 before any non-zero length was seen.
const DEFAULT_CODE_LENGTH: u8 = 8;
const CODE_LENGTH_EXTRA_BITS: [u8; 3] = [2, 3, 7];
const CODE_LENGTH_REPEAT_OFFSETS: [usize; 3] = [3, 3, 11];

/// The five codes of one histogram group.
#[derive(Debug)]
struct HuffmanGroup {
    green: HuffmanTable,
    red: HuffmanTable,
    blue: HuffmanTable,
    alpha: HuffmanTable,
    distance: HuffmanTable,
}

/// Code groups of one image level and the tile map selecting among them.
#[derive(Debug)]
struct HuffmanMetadata {
    /// Tile size bits; 0 with a single group.
    huffman_bits: u8,
    huffman_xsize: usize,
    /// Group index per tile.
    huffman_image: Vec<u16>,
    groups: Vec<HuffmanGroup>,
}

impl HuffmanMetadata {
    #[inline]
    fn group_for(&self, x: usize, y: usize) -> &HuffmanGroup {
        if self.huffman_image.is_empty() {
            &self.groups[0]
        } else {
            let tile = (y >> self.huffman_bits) * self.huffman_xsize + (x >> self.huffman_bits);
            &self.groups[self.huffman_image[tile] as usize]
        }
    }
}

/// Decoder for a bare VP8L stream (starting with the 0x2f signature).
#[derive(Debug)]
pub struct LosslessDecoder<'a> {
    br: BitReader<'a>,
    width: u32,
    height: u32,
    has_alpha: bool,
}

impl<'a> LosslessDecoder<'a> {
    /// Read the stream header.
    pub fn new(data: &'a [u8]) -> DecodeResult<Self> {
        let mut br = BitReader::new(data);
        let signature = br.read_bits(8)? as u8;
        if signature != VP8L_MAGIC {
            return Err(DecodeError::LosslessSignatureInvalid(signature));
        }
        let width = br.read_bits(14)? + 1;
        let height = br.read_bits(14)? + 1;
        let has_alpha = br.read_bit()?;
        let version = br.read_bits(3)? as u8;
        if version != 0 {
            return Err(DecodeError::VersionNumberInvalid(version));
        }
        Ok(Self {
            br,
            width,
            height,
            has_alpha,
        })
    }

    /// Image width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The header's alpha hint.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Decode the pixels as packed `0xAARRGGBB`.
    pub fn decode(mut self) -> DecodeResult<Vec<u32>> {
        if self.br.read_bit()? {
            return Err(DecodeError::UnsupportedTransform);
        }
        let (width, height) = (self.width as usize, self.height as usize);
        width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .ok_or(DecodeError::ImageTooLarge)?;
        self.decode_image_stream(width, height, true)
    }

    /// Decode one entropy-coded image: the main image when `is_level0`,
    /// otherwise a sub-image such as the histogram image.
    fn decode_image_stream(
        &mut self,
        xsize: usize,
        ysize: usize,
        is_level0: bool,
    ) -> DecodeResult<Vec<u32>> {
        let cache_bits = if self.br.read_bit()? {
            let bits = self.br.read_bits(4)? as u8;
            if !(1..=MAX_COLOR_CACHE_BITS).contains(&bits) {
                return Err(DecodeError::InvalidColorCacheBits(bits));
            }
            bits
        } else {
            0
        };

        let metadata = self.read_huffman_codes(xsize, ysize, cache_bits, is_level0)?;
        self.decode_image_data(xsize, ysize, cache_bits, &metadata)
    }

    fn read_huffman_codes(
        &mut self,
        xsize: usize,
        ysize: usize,
        cache_bits: u8,
        allow_recursion: bool,
    ) -> DecodeResult<HuffmanMetadata> {
        let mut huffman_bits = 0;
        let mut huffman_xsize = 0;
        let mut huffman_image = Vec::new();
        let mut num_groups = 1;

        if allow_recursion && self.br.read_bit()? {
            huffman_bits = self.br.read_bits(3)? as u8 + 2;
            huffman_xsize = subsample_size(xsize as u32, huffman_bits) as usize;
            let huffman_ysize = subsample_size(ysize as u32, huffman_bits) as usize;
            let image = self.decode_image_stream(huffman_xsize, huffman_ysize, false)?;
            huffman_image = image.iter().map(|&p| ((p >> 8) & 0xffff) as u16).collect();
            num_groups = huffman_image.iter().map(|&g| g as usize + 1).max().unwrap_or(1);
        }

        let cache_size = if cache_bits > 0 { 1usize << cache_bits } else { 0 };
        let green_size = NUM_LITERAL_CODES + NUM_LENGTH_CODES + cache_size;
        let mut groups = Vec::with_capacity(num_groups);
        for _ in 0..num_groups {
            groups.push(HuffmanGroup {
                green: self.read_huffman_code(green_size)?,
                red: self.read_huffman_code(NUM_LITERAL_CODES)?,
                blue: self.read_huffman_code(NUM_LITERAL_CODES)?,
                alpha: self.read_huffman_code(NUM_LITERAL_CODES)?,
                distance: self.read_huffman_code(NUM_DISTANCE_CODES)?,
            });
        }

        Ok(HuffmanMetadata {
            huffman_bits,
            huffman_xsize,
            huffman_image,
            groups,
        })
    }

    fn read_huffman_code(&mut self, alphabet_size: usize) -> DecodeResult<HuffmanTable> {
        let mut code_lengths = vec![0u8; alphabet_size];

        if self.br.read_bit()? {
            // Simple code: one or two symbols below 256.
            let num_symbols = self.br.read_bits(1)? + 1;
            let first_bits = if self.br.read_bit()? { 8 } else { 1 };
            let first = self.br.read_bits(first_bits)? as usize;
            *code_lengths.get_mut(first).ok_or(DecodeError::HuffmanError)? = 1;
            if num_symbols == 2 {
                let second = self.br.read_bits(8)? as usize;
                *code_lengths.get_mut(second).ok_or(DecodeError::HuffmanError)? = 1;
            }
        } else {
            let num_codes = self.br.read_bits(4)? as usize + 4;
            let mut code_length_code_lengths = [0u8; CODE_LENGTH_CODES];
            for &slot in CODE_LENGTH_CODE_ORDER.iter().take(num_codes) {
                code_length_code_lengths[slot] = self.br.read_bits(3)? as u8;
            }
            self.read_code_lengths(&code_length_code_lengths, &mut code_lengths)?;
        }

        let table = HuffmanTable::build(HUFFMAN_TABLE_BITS, &code_lengths);
        if table.is_empty() {
            return Err(DecodeError::HuffmanError);
        }
        Ok(table)
    }

    fn read_code_lengths(
        &mut self,
        code_length_code_lengths: &[u8],
        code_lengths: &mut [u8],
    ) -> DecodeResult<()> {
        let table = HuffmanTable::build(LENGTHS_TABLE_BITS, code_length_code_lengths);
        if table.is_empty() {
            return Err(DecodeError::HuffmanError);
        }

        let num_symbols = code_lengths.len();
        let mut max_symbol = if self.br.read_bit()? {
            let length_nbits = 2 + 2 * self.br.read_bits(3)? as u8;
            let max_symbol = 2 + self.br.read_bits(length_nbits)? as usize;
            if max_symbol > num_symbols {
                return Err(DecodeError::HuffmanError);
            }
            max_symbol
        } else {
            num_symbols
        };

        let mut symbol = 0;
        let mut prev_code_len = DEFAULT_CODE_LENGTH;
        while symbol < num_symbols {
            if max_symbol == 0 {
                break;
            }
            max_symbol -= 1;

            let code_len = table.read_symbol(&mut self.br)?;
            if code_len < CODE_LENGTH_LITERALS {
                code_lengths[symbol] = code_len as u8;
                symbol += 1;
                if code_len != 0 {
                    prev_code_len = code_len as u8;
                }
            } else {
                let slot = (code_len - CODE_LENGTH_LITERALS) as usize;
                let repeat = self.br.read_bits(CODE_LENGTH_EXTRA_BITS[slot])? as usize
                    + CODE_LENGTH_REPEAT_OFFSETS[slot];
                if symbol + repeat > num_symbols {
                    return Err(DecodeError::HuffmanError);
                }
                let length = if code_len == 16 { prev_code_len } else { 0 };
                code_lengths[symbol..symbol + repeat].fill(length);
                symbol += repeat;
            }
        }
        Ok(())
    }

    fn decode_image_data(
        &mut self,
        width: usize,
        height: usize,
        cache_bits: u8,
        metadata: &HuffmanMetadata,
    ) -> DecodeResult<Vec<u32>> {
        let total = width * height;
        let mut data = vec![0u32; total];
        let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));
        let color_cache_start = (NUM_LITERAL_CODES + NUM_LENGTH_CODES) as u16;

        let (mut x, mut y) = (0usize, 0usize);
        let mut pos = 0usize;
        while pos < total {
            let group = metadata.group_for(x, y);
            let code = group.green.read_symbol(&mut self.br)?;
            let advance = if code < NUM_LITERAL_CODES as u16 {
                let red = group.red.read_symbol(&mut self.br)? as u8;
                let blue = group.blue.read_symbol(&mut self.br)? as u8;
                let alpha = group.alpha.read_symbol(&mut self.br)? as u8;
                data[pos] = make_argb(alpha, red, code as u8, blue);
                1
            } else if code < color_cache_start {
                let length_code = (code - NUM_LITERAL_CODES as u16) as u8;
                let length = self.read_prefix_value(length_code)? as usize;
                let dist_code = group.distance.read_symbol(&mut self.br)? as u8;
                let dist_plane = self.read_prefix_value(dist_code)? as usize;
                let dist = plane_code_to_distance(width, dist_plane);
                if dist > pos || pos + length > total {
                    return Err(DecodeError::BitStreamError);
                }
                for i in pos..pos + length {
                    data[i] = data[i - dist];
                }
                length
            } else {
                let index = code - color_cache_start;
                let cache = cache.as_ref().ok_or(DecodeError::BitStreamError)?;
                if index as usize >= cache.size() {
                    return Err(DecodeError::BitStreamError);
                }
                data[pos] = cache.get(index);
                1
            };

            if let Some(cache) = cache.as_mut() {
                for &argb in &data[pos..pos + advance] {
                    cache.insert(argb);
                }
            }
            pos += advance;
            x += advance;
            while x >= width {
                x -= width;
                y += 1;
            }
        }
        Ok(data)
    }

    fn read_prefix_value(&mut self, code: u8) -> DecodeResult<u32> {
        let extra = self.br.read_bits(prefix_extra_bits(code))?;
        Ok(prefix_decode(code, extra))
    }
}
