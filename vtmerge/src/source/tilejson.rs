//! TileJSON-described tile source.

use tracing::info;

use super::http::HttpFetcher;
use super::xyz::XyzSource;
use super::{BoxFuture, FetchedTile, RequestContext, SourceError, TileJson, TileSource};
use crate::coord::TileCoord;

/// Fetches tiles from the first template advertised by a TileJSON document.
///
/// The document is read once, at connection time, and is served as this
/// source's metadata afterwards.
#[derive(Debug, Clone)]
pub struct TileJsonSource {
    document: TileJson,
    tiles: XyzSource,
}

impl TileJsonSource {
    /// Fetches the TileJSON document and prepares the tile template.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in logs and errors
    /// * `tilejson_url` - Where to read the document
    /// * `tile_url` - Optional scheme and host replacing the template's own
    /// * `http` - Shared HTTP client
    pub async fn connect(
        name: impl Into<String>,
        tilejson_url: &str,
        tile_url: Option<&str>,
        http: HttpFetcher,
    ) -> Result<Self, SourceError> {
        let name = name.into();
        let document = http.get_json(tilejson_url, &RequestContext::default()).await?;
        let source = Self::from_document(name, document, tile_url, http)?;
        info!(
            source = %source.tiles.name(),
            template = %source.tiles.template(),
            "Connected TileJSON source"
        );
        Ok(source)
    }

    /// Builds the source from an already fetched document.
    pub fn from_document(
        name: impl Into<String>,
        document: TileJson,
        tile_url: Option<&str>,
        http: HttpFetcher,
    ) -> Result<Self, SourceError> {
        let name = name.into();
        let template = document
            .get("tiles")
            .and_then(|t| t.get(0))
            .and_then(|t| t.as_str())
            .ok_or_else(|| SourceError::InvalidConfig(format!("TileJSON for {} has no tiles", name)))?;

        let template = match tile_url {
            Some(base) => rebase(template, base),
            None => template.to_string(),
        };

        Ok(Self {
            document,
            tiles: XyzSource::new(name, template, http)?,
        })
    }

    pub fn template(&self) -> &str {
        self.tiles.template()
    }
}

/// Replaces a URL's scheme and authority with `base`, keeping the path.
fn rebase(template: &str, base: &str) -> String {
    let path_start = template
        .find("://")
        .and_then(|scheme_end| {
            let after = scheme_end + 3;
            template[after..].find('/').map(|i| after + i)
        })
        .unwrap_or(template.len());
    format!("{}{}", base.trim_end_matches('/'), &template[path_start..])
}

impl TileSource for TileJsonSource {
    fn name(&self) -> &str {
        self.tiles.name()
    }

    fn tile<'a>(
        &'a self,
        coord: TileCoord,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<FetchedTile>, SourceError>> {
        Box::pin(self.tiles.fetch(coord, ctx))
    }

    fn tile_metadata<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, Result<TileJson, SourceError>> {
        Box::pin(async move { Ok(self.document.clone()) })
    }
}
