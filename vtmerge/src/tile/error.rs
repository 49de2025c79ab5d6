//! Error types for tile decoding and assembly.

use thiserror::Error;

/// Result type for tile operations.
pub type TileResult<T> = Result<T, TileError>;

/// Errors raised while decoding or re-encoding vector tiles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    /// The protobuf envelope could not be parsed.
    #[error("malformed tile: {0}")]
    Decode(String),

    /// A geometry command stream was truncated or inconsistent.
    #[error("malformed geometry in layer '{layer}': {reason}")]
    Geometry { layer: String, reason: String },

    /// A tag pair referenced a key or value outside the layer dictionary.
    #[error("malformed tags in layer '{layer}': {reason}")]
    Tags { layer: String, reason: String },

    /// The feature declared a geometry kind this gateway does not handle.
    #[error("unsupported geometry type {0}")]
    UnsupportedGeometry(i32),
}

impl From<prost::DecodeError> for TileError {
    fn from(e: prost::DecodeError) -> Self {
        TileError::Decode(e.to_string())
    }
}
