//! VP8L Lossless Compression
//!
//! This crate implements the compression core of the VP8L (lossless WebP)
//! format: hash-chain LZ77 match finding, cost-model optimal parsing with a
//! color cache, per-tile histogram clustering and length-limited canonical
//! Huffman coding. A transform-free VP8L decoder is included to read the
//! produced streams back.
//!
//! # Features
//!
//! - `std` (default): Implement `std::error::Error` through the standard library.
//!
//! # no_std Support
//!
//! Encoding and decoding work in `no_std` environments (requires `alloc`):
//! ```toml
//! [dependencies]
//! zenvp8l = { version = "...", default-features = false }
//! ```
//!
//! # Encoding
//!
//! ```rust
//! use zenvp8l::{encode_vp8l, Vp8lConfig};
//!
//! let rgba_data = vec![255u8; 4 * 4 * 4]; // 4x4 RGBA image
//! let config = Vp8lConfig::new(75, 4).with_cache_bits(4);
//! let stream = encode_vp8l(&rgba_data, 4, 4, true, &config)?;
//! # Ok::<(), zenvp8l::EncodeError>(())
//! ```
//!
//! Reuse an [`EncodeSession`] to keep the hash chain and reference buffers
//! across images.
//!
//! # Decoding
//!
//! ```rust
//! # let stream = zenvp8l::encode_argb(&[0xff00_00ff; 4], 2, 2, &Default::default()).unwrap();
//! let (pixels, width, height) = zenvp8l::decode_rgba(&stream)?;
//! # Ok::<(), zenvp8l::DecodeError>(())
//! ```
//!
//! # Logging
//!
//! Encoder decisions are reported through the [`log`] facade at `debug`
//! and `trace` level. No logger is installed by this crate.
//!
//! [`log`]: https://docs.rs/log

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

// Core modules
pub mod decoder;
pub mod encoder;

// Re-export decoder public API
pub use decoder::{
    decode_rgb, decode_rgba, decode_vp8l, DecodeError, DecodeResult, LosslessDecoder,
};

// Re-export encoder public API
pub use encoder::{
    encode_argb, encode_vp8l, EncodeError, EncodeResult, EncodeSession, Lz77Strategies,
    Vp8lConfig, Vp8lQuality,
};
