//! Builds sources from configuration entries.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::http::HttpFetcher;
use super::mbtiles::MbtilesSource;
use super::tilejson::TileJsonSource;
use super::xyz::XyzSource;
use super::{SourceError, TileSource};

/// One source entry as written in the configuration file.
///
/// Exactly one of `tilejson_url`, `xyz_url` or `mbtiles` must be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    /// TileJSON document describing the tiles.
    pub tilejson_url: Option<String>,
    /// Scheme and host replacing the ones in the TileJSON template.
    pub tile_url: Option<String>,
    /// Direct `{z}/{x}/{y}` URL template.
    pub xyz_url: Option<String>,
    /// Local MBTiles archive.
    pub mbtiles: Option<PathBuf>,
}

/// Creates sources sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct SourceFactory {
    http: HttpFetcher,
}

impl SourceFactory {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    /// Connects the source described by `spec`.
    ///
    /// TileJSON sources fetch their document here, so an unreachable
    /// upstream fails at startup rather than on the first request.
    pub async fn create(&self, name: &str, spec: &SourceSpec) -> Result<Arc<dyn TileSource>, SourceError> {
        match (&spec.tilejson_url, &spec.xyz_url, &spec.mbtiles) {
            (Some(tilejson_url), None, None) => {
                let source = TileJsonSource::connect(
                    name,
                    tilejson_url,
                    spec.tile_url.as_deref(),
                    self.http.clone(),
                )
                .await?;
                Ok(Arc::new(source))
            }
            (None, Some(xyz_url), None) => {
                Ok(Arc::new(XyzSource::new(name, xyz_url.clone(), self.http.clone())?))
            }
            (None, None, Some(path)) => Ok(Arc::new(MbtilesSource::open(name, path)?)),
            (None, None, None) => Err(SourceError::InvalidConfig(format!(
                "source {} needs one of tilejson_url, xyz_url or mbtiles",
                name
            ))),
            _ => Err(SourceError::InvalidConfig(format!(
                "source {} sets more than one of tilejson_url, xyz_url and mbtiles",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SourceFactory {
        SourceFactory::new(HttpFetcher::new().unwrap())
    }

    #[tokio::test]
    async fn test_create_xyz() {
        let spec = SourceSpec {
            xyz_url: Some("http://localhost:8080/{z}/{x}/{y}.pbf".to_string()),
            ..Default::default()
        };
        let source = factory().create("partial", &spec).await.unwrap();
        assert_eq!(source.name(), "partial");
    }

    #[tokio::test]
    async fn test_create_requires_one_kind() {
        let err = factory().create("full", &SourceSpec::default()).await.err().unwrap();
        assert!(matches!(err, SourceError::InvalidConfig(_)));

        let spec = SourceSpec {
            xyz_url: Some("http://a/{z}/{x}/{y}".to_string()),
            mbtiles: Some(PathBuf::from("tiles.mbtiles")),
            ..Default::default()
        };
        let err = factory().create("full", &spec).await.err().unwrap();
        assert!(matches!(err, SourceError::InvalidConfig(_)));
    }

    #[test]
    fn test_spec_from_yaml() {
        let spec: SourceSpec = serde_yaml::from_str(
            "tilejson_url: https://example.com/tiles.json\ntile_url: http://internal:3000\n",
        )
        .unwrap();
        assert_eq!(spec.tilejson_url.as_deref(), Some("https://example.com/tiles.json"));
        assert_eq!(spec.tile_url.as_deref(), Some("http://internal:3000"));
        assert!(spec.mbtiles.is_none());
    }

    #[test]
    fn test_spec_rejects_unknown_keys() {
        assert!(serde_yaml::from_str::<SourceSpec>("pmtiles: a.pmtiles\n").is_err());
    }
}
