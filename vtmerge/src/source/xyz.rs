//! URL-template tile source.

use tracing::debug;

use super::http::{inflate, HttpFetcher};
use super::{BoxFuture, FetchedTile, RequestContext, SourceError, TileJson, TileSource};
use crate::coord::TileCoord;

/// Fetches tiles from an `{z}/{x}/{y}` URL template.
///
/// Metadata is empty: an XYZ endpoint has no descriptive document.
#[derive(Debug, Clone)]
pub struct XyzSource {
    name: String,
    template: String,
    http: HttpFetcher,
}

impl XyzSource {
    /// Creates a source from a URL template.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in logs and errors
    /// * `template` - URL containing `{z}`, `{x}` and `{y}` placeholders
    /// * `http` - Shared HTTP client
    pub fn new(name: impl Into<String>, template: impl Into<String>, http: HttpFetcher) -> Result<Self, SourceError> {
        let template = template.into();
        if !["{z}", "{x}", "{y}"].iter().all(|p| template.contains(p)) {
            return Err(SourceError::InvalidConfig(format!(
                "tile URL template {} lacks {{z}}, {{x}} or {{y}}",
                template
            )));
        }
        Ok(Self {
            name: name.into(),
            template,
            http,
        })
    }

    /// The URL template in use.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expands the template for one tile.
    pub fn tile_url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    pub(crate) async fn fetch(
        &self,
        coord: TileCoord,
        ctx: &RequestContext,
    ) -> Result<Option<FetchedTile>, SourceError> {
        let url = self.tile_url(coord);
        let Some(body) = self.http.get(&url, ctx).await? else {
            debug!(source = %self.name, tile = %coord, "No upstream tile");
            return Ok(None);
        };
        Ok(Some(FetchedTile::decode(inflate(body)?)?))
    }
}

impl TileSource for XyzSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile<'a>(
        &'a self,
        coord: TileCoord,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<FetchedTile>, SourceError>> {
        Box::pin(self.fetch(coord, ctx))
    }

    fn tile_metadata<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, Result<TileJson, SourceError>> {
        Box::pin(async { Ok(TileJson::new()) })
    }
}
