//! Encoder error types.

use alloc::string::String;
use thiserror::Error;

/// Error that can occur during encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The image dimensions are not allowed by the VP8L format.
    #[error("Invalid dimensions")]
    InvalidDimensions,

    /// The input buffer does not match the dimensions.
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),
}

/// Result type alias for encoding.
pub type EncodeResult<T> = core::result::Result<T, EncodeError>;
