use alloc::vec::Vec;
use thiserror::Error;

use super::lossless::LosslessDecoder;

/// Errors that can occur when attempting to decode a VP8L stream
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Signature of 0x2f not found
    #[error("Invalid lossless signature: {0:x?}")]
    LosslessSignatureInvalid(u8),

    /// Version Number was not zero
    #[error("Invalid lossless version number: {0}")]
    VersionNumberInvalid(u8),

    /// Invalid color cache bits
    #[error("Invalid color cache bits: {0}")]
    InvalidColorCacheBits(u8),

    /// An invalid Huffman code was encountered
    #[error("Invalid Huffman code")]
    HuffmanError,

    /// The bitstream was somehow corrupt
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// The stream declares a transform, which this decoder does not apply
    #[error("Unsupported transform")]
    UnsupportedTransform,

    /// Image is too large for the platform's pointer size
    #[error("Image too large")]
    ImageTooLarge,
}

/// Result type alias for decoding.
pub type DecodeResult<T> = core::result::Result<T, DecodeError>;

/// Decode a VP8L stream to packed `0xAARRGGBB` pixels.
///
/// Returns the pixels and dimensions.
///
/// # Example
///
/// ```rust
/// use zenvp8l::{decode_vp8l, encode_argb, Vp8lConfig};
///
/// let argb = vec![0xff00_80ffu32; 4 * 4];
/// let stream = encode_argb(&argb, 4, 4, &Vp8lConfig::default())?;
/// let (pixels, width, height) = decode_vp8l(&stream)?;
/// assert_eq!((width, height), (4, 4));
/// assert_eq!(pixels, argb);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn decode_vp8l(data: &[u8]) -> DecodeResult<(Vec<u32>, u32, u32)> {
    let decoder = LosslessDecoder::new(data)?;
    let (width, height) = decoder.dimensions();
    let argb = decoder.decode()?;
    Ok((argb, width, height))
}

/// Decode a VP8L stream to RGBA bytes.
///
/// Returns the decoded pixels and dimensions.
pub fn decode_rgba(data: &[u8]) -> DecodeResult<(Vec<u8>, u32, u32)> {
    let (argb, width, height) = decode_vp8l(data)?;
    let mut rgba = Vec::with_capacity(argb.len() * 4);
    for p in argb {
        rgba.extend_from_slice(&[(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8]);
    }
    Ok((rgba, width, height))
}

/// Decode a VP8L stream to RGB bytes, dropping alpha.
pub fn decode_rgb(data: &[u8]) -> DecodeResult<(Vec<u8>, u32, u32)> {
    let (argb, width, height) = decode_vp8l(data)?;
    let mut rgb = Vec::with_capacity(argb.len() * 3);
    for p in argb {
        rgb.extend_from_slice(&[(p >> 16) as u8, (p >> 8) as u8, p as u8]);
    }
    Ok((rgb, width, height))
}
