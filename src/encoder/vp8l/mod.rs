//! VP8L (Lossless WebP) compression core.
//!
//! Implements the entropy-coding side of the VP8L lossless format as
//! specified in:
//! <https://developers.google.com/speed/webp/docs/webp_lossless_bitstream_specification>
//!
//! Pixels go through [`hash_chain`] match finding and
//! [`backward_refs::get_backward_references`] (with the [`cost_model`]
//! optimal parse and the [`color_cache`]) to become a token stream. Per-tile
//! [`histogram`]s of the tokens are clustered by [`meta_huffman`], and each
//! cluster becomes a group of [`huffman`] codes written by [`encode`].

pub mod backward_refs;
pub mod bitwriter;
pub mod color_cache;
pub mod cost_model;
pub mod encode;
pub mod entropy;
pub mod hash_chain;
pub mod histogram;
pub mod huffman;
pub mod meta_huffman;
pub mod types;

pub use encode::{encode_argb, encode_vp8l, EncodeSession};
pub use types::{Lz77Strategies, Vp8lConfig, Vp8lQuality};
