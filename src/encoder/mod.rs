//! VP8L lossless encoder

mod api;
/// VP8L (lossless) compression core
pub mod vp8l;

// Re-export public API
pub use api::{EncodeError, EncodeResult};
pub use vp8l::{encode_argb, encode_vp8l, EncodeSession, Lz77Strategies, Vp8lConfig, Vp8lQuality};
