//! VP8L decoder implementation
//!
//! Decodes transform-free VP8L streams: the color cache, meta-Huffman
//! groups and backward references are supported, transforms are not.

mod api;
/// LSB-first bit reader
pub mod bit_reader;
/// Two-level Huffman decode tables
pub mod huffman;
mod lossless;

// Re-export public API
pub use api::{decode_rgb, decode_rgba, decode_vp8l, DecodeError, DecodeResult};
pub use lossless::LosslessDecoder;
