//! Request-scoped merge failures.

use thiserror::Error;

use crate::source::SourceError;
use crate::tile::TileError;

/// Why a merge request failed. None of these affect other requests.
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    /// No dataset is configured under this id for the request host.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// A source could not be reached or read.
    #[error("source {source_name} unavailable: {reason}")]
    UpstreamUnavailable {
        source_name: String,
        status: Option<u16>,
        reason: String,
    },

    /// A source returned bytes that are not a valid tile.
    #[error("source {source_name} returned an undecodable tile: {reason}")]
    DecodeFailure { source_name: String, reason: String },

    /// A source returned a geometry kind this gateway does not know.
    #[error("source {source_name} returned unsupported geometry type {geom_type}")]
    UnsupportedGeometry { source_name: String, geom_type: i32 },
}

impl MergeError {
    /// Attributes a source failure to the named source.
    pub fn from_source(source_name: &str, err: SourceError) -> Self {
        match err {
            SourceError::Unavailable { status, reason } => MergeError::UpstreamUnavailable {
                source_name: source_name.to_string(),
                status,
                reason,
            },
            SourceError::Decode(e) => Self::from_tile(source_name, e),
            SourceError::InvalidConfig(reason) => MergeError::UpstreamUnavailable {
                source_name: source_name.to_string(),
                status: None,
                reason,
            },
        }
    }

    /// Attributes a decode failure to the named source.
    pub fn from_tile(source_name: &str, err: TileError) -> Self {
        match err {
            TileError::UnsupportedGeometry(geom_type) => MergeError::UnsupportedGeometry {
                source_name: source_name.to_string(),
                geom_type,
            },
            other => MergeError::DecodeFailure {
                source_name: source_name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
