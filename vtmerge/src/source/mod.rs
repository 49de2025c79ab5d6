//! Upstream tile sources.
//!
//! A merge reads from two sources per dataset, a *full* basemap and a
//! *partial* curated overlay. Both implement [`TileSource`]:
//!
//! - [`XyzSource`] - HTTP URL template
//! - [`TileJsonSource`] - HTTP, template discovered from a TileJSON document
//! - [`MbtilesSource`] - local SQLite archive
//!
//! Sources are shared by every in-flight request and must tolerate
//! concurrent calls. Retry and timeout policy belongs to them, not to the
//! merge.
//!
//! # Factory
//!
//! ```ignore
//! use vtmerge::source::{HttpFetcher, SourceFactory, SourceSpec};
//!
//! let factory = SourceFactory::new(HttpFetcher::new()?);
//! let source = factory.create("basemap", &spec).await?;
//! ```

mod factory;
mod http;
mod mbtiles;
mod tilejson;
mod xyz;

pub use factory::{SourceFactory, SourceSpec};
pub use http::{forwardable_headers, HttpFetcher};
pub use mbtiles::MbtilesSource;
pub use tilejson::TileJsonSource;
pub use xyz::XyzSource;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::coord::TileCoord;
use crate::tile::{TileError, VectorTile};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A TileJSON-style metadata document.
pub type TileJson = Map<String, JsonValue>;

/// Errors reported by sources.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Network or storage failure. Carries the upstream HTTP status if any.
    #[error("{reason}")]
    Unavailable { status: Option<u16>, reason: String },

    /// The upstream returned bytes that are not a vector tile.
    #[error(transparent)]
    Decode(#[from] TileError),

    /// The source could not be set up from its configuration.
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),
}

impl SourceError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            status: None,
            reason: reason.into(),
        }
    }
}

/// Per-request values forwarded unmodified to every upstream fetch.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Inbound request headers.
    pub headers: HeaderMap,
    /// Inbound query string, without the leading `?`.
    pub query: Option<String>,
}

impl RequestContext {
    pub fn new(headers: HeaderMap, query: Option<String>) -> Self {
        let query = query.filter(|q| !q.is_empty());
        Self { headers, query }
    }
}

/// A tile as returned by a source: decoded model plus the exact bytes.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub tile: VectorTile,
    pub raw: Bytes,
}

impl FetchedTile {
    /// Decodes uncompressed tile bytes.
    pub fn decode(raw: Bytes) -> Result<Self, TileError> {
        let tile = VectorTile::decode(&raw)?;
        Ok(Self { tile, raw })
    }
}

/// A source of vector tiles and their metadata.
pub trait TileSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetches one tile.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(tile))` if the source has a tile at `coord`
    /// - `Ok(None)` if it has none (not an error)
    /// - `Err(_)` on transport, storage or decode failure
    fn tile<'a>(
        &'a self,
        coord: TileCoord,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<FetchedTile>, SourceError>>;

    /// Fetches the source's metadata document. Absent keys are simply missing.
    fn tile_metadata<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, Result<TileJson, SourceError>>;
}
