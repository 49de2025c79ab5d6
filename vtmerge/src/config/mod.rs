//! Gateway configuration.
//!
//! The YAML file ([`ConfigFile`]) is turned into one immutable
//! [`GatewayConfig`] at startup: sources connected, boundary polygons
//! projected, class lists loaded. Requests only ever read it.

mod error;
mod file;

pub use error::ConfigError;
pub use file::{ConfigFile, DatasetSection, LayerSection, OutputSection, ServerSection, SourcePair};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::classify::{parse_classes, ClassPrefix, LayerRule};
use crate::geofence::Geofence;
use crate::merge::MergeConfig;
use crate::source::{HttpFetcher, SourceFactory};

/// Configuration file used when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "CONFIG";

/// Runtime configuration shared by every request.
#[derive(Clone, Default)]
pub struct GatewayConfig {
    public_base_path: String,
    public_tile_url_prefixes: Vec<String>,
    /// Datasets by request host, then by id.
    hosts: HashMap<String, BTreeMap<String, Arc<MergeConfig>>>,
}

impl GatewayConfig {
    /// An empty configuration with the given public addressing.
    pub fn new(public_base_path: impl Into<String>, public_tile_url_prefixes: Vec<String>) -> Self {
        Self {
            public_base_path: public_base_path.into(),
            public_tile_url_prefixes,
            hosts: HashMap::new(),
        }
    }

    /// Serves a dataset under `id` on each of `hosts`.
    pub fn with_dataset<H, S>(mut self, id: impl Into<String>, hosts: H, dataset: MergeConfig) -> Self
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let dataset = Arc::new(dataset);
        for host in hosts {
            self.hosts
                .entry(host.into())
                .or_default()
                .insert(id.clone(), Arc::clone(&dataset));
        }
        self
    }

    /// Reads the file at `path` and builds the runtime configuration.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = ConfigFile::load(path)?;
        let http = HttpFetcher::new().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_file(&file, &SourceFactory::new(http)).await
    }

    /// Builds the runtime configuration from a parsed file.
    ///
    /// Connects every source; an unreachable TileJSON upstream fails here.
    pub async fn from_file(file: &ConfigFile, factory: &SourceFactory) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            file.public_base_path(),
            file.server.public_tile_url_prefixes.clone(),
        );

        for (id, section) in &file.sources {
            let dataset = build_dataset(id, section, factory).await?;
            config = config.with_dataset(id.clone(), section.hosts.iter().cloned(), dataset);
        }

        info!(
            datasets = file.sources.len(),
            hosts = config.hosts.len(),
            "Gateway configuration loaded"
        );
        Ok(config)
    }

    /// Looks a dataset up by request host and id.
    pub fn dataset(&self, host: &str, id: &str) -> Option<&Arc<MergeConfig>> {
        self.hosts.get(host).and_then(|datasets| datasets.get(id))
    }

    /// Request hosts with at least one dataset, sorted.
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }

    /// Ids of the datasets served on a host, sorted, or `None` for an unknown host.
    pub fn dataset_ids(&self, host: &str) -> Option<impl Iterator<Item = &str> + '_> {
        self.hosts
            .get(host)
            .map(|datasets| datasets.keys().map(String::as_str))
    }

    /// Path prefix under which the gateway is exposed, without trailing slash.
    pub fn public_base_path(&self) -> &str {
        &self.public_base_path
    }

    pub fn public_tile_url_prefixes(&self) -> &[String] {
        &self.public_tile_url_prefixes
    }
}

async fn build_dataset(
    id: &str,
    section: &DatasetSection,
    factory: &SourceFactory,
) -> Result<MergeConfig, ConfigError> {
    if section.hosts.is_empty() {
        return Err(ConfigError::Invalid(format!("dataset '{}' has no hosts", id)));
    }

    let source_error = |source| ConfigError::Source {
        dataset: id.to_string(),
        source,
    };
    let full = factory
        .create(&format!("{}.full", id), &section.sources.full)
        .await
        .map_err(source_error)?;
    let partial = factory
        .create(&format!("{}.partial", id), &section.sources.partial)
        .await
        .map_err(source_error)?;

    let mut dataset = MergeConfig::new(full, partial).with_min_zoom(section.output.min_zoom);

    if let Some(polygon) = &section.polygon {
        let fence = Geofence::from_path(polygon).map_err(|source| ConfigError::Geofence {
            dataset: id.to_string(),
            source,
        })?;
        dataset = dataset.with_geofence(fence);
    }

    for (layer, rule) in &section.merge_layers {
        let rule = match rule {
            None => LayerRule::disabled(),
            Some(rule) => {
                if rule.rank.cell_size <= 0 {
                    return Err(ConfigError::Invalid(format!(
                        "dataset '{}' layer '{}': rank cell_size must be positive, got {}",
                        id, layer, rule.rank.cell_size
                    )));
                }
                let classes = match &rule.classes {
                    Some(path) => load_classes(id, layer, path)?,
                    None => Vec::new(),
                };
                LayerRule::new(rule.fields.clone(), classes)
                    .map_err(|e| ConfigError::classes(id, layer, e))?
                    .with_rank(rule.rank.clone())
            }
        };
        dataset = dataset.with_layer(layer.clone(), rule);
    }

    info!(
        dataset = %id,
        hosts = ?section.hosts,
        min_zoom = dataset.min_zoom,
        geofence = dataset.geofence.is_some(),
        layers = dataset.layers.len(),
        "Dataset ready"
    );
    Ok(dataset)
}

fn load_classes(dataset: &str, layer: &str, path: &Path) -> Result<Vec<ClassPrefix>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let document: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ConfigError::classes(dataset, layer, e))?;
    parse_classes(&document).map_err(|e| ConfigError::classes(dataset, layer, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::File::create(dir.join(name))
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
    }

    fn factory() -> SourceFactory {
        SourceFactory::new(HttpFetcher::new().unwrap())
    }

    const CONFIG: &str = r#"
server:
  public_base_path: /gw
sources:
  city:
    hosts: [localhost, maps.example.com]
    sources:
      full: { xyz_url: "http://full.internal/{z}/{x}/{y}.pbf" }
      partial: { xyz_url: "http://partial.internal/{z}/{x}/{y}.pbf" }
    output: { min_zoom: 14 }
    polygon: boundary.geojson
    merge_layers:
      poi:
        fields: [superclass, class]
        classes: classes.json
      transportation: ~
"#;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yaml", CONFIG);
        write(
            dir.path(),
            "boundary.geojson",
            r#"{"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}"#,
        );
        write(dir.path(), "classes.json", r#"[["shop"], ["amenity", "cafe"]]"#);
        dir
    }

    #[tokio::test]
    async fn test_from_file_builds_datasets() {
        let dir = fixture();
        let file = ConfigFile::load(dir.path().join("config.yaml")).unwrap();
        let config = GatewayConfig::from_file(&file, &factory()).await.unwrap();

        assert_eq!(config.public_base_path(), "/gw");
        let city = config.dataset("maps.example.com", "city").unwrap();
        assert_eq!(city.min_zoom, 14);
        assert!(city.geofence.is_some());
        assert_eq!(city.layers["poi"].classes.len(), 2);
        assert!(!city.layers["transportation"].is_enabled());
        assert_eq!(city.full.name(), "city.full");

        // Same dataset instance on every host
        assert!(Arc::ptr_eq(city, config.dataset("localhost", "city").unwrap()));
        assert!(config.dataset("other.host", "city").is_none());
        assert_eq!(config.dataset_ids("localhost").unwrap().collect::<Vec<_>>(), vec!["city"]);
        assert!(config.dataset_ids("other.host").is_none());
        assert_eq!(config.hosts(), vec!["localhost", "maps.example.com"]);
    }

    #[tokio::test]
    async fn test_bad_classes_file() {
        let dir = fixture();
        write(dir.path(), "classes.json", r#"{"shop": true}"#);
        let file = ConfigFile::load(dir.path().join("config.yaml")).unwrap();
        let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
        assert!(matches!(err, ConfigError::Classes { ref layer, .. } if layer == "poi"));
    }

    #[tokio::test]
    async fn test_prefix_longer_than_fields() {
        let dir = fixture();
        write(dir.path(), "classes.json", r#"[["a", "b", "c"]]"#);
        let file = ConfigFile::load(dir.path().join("config.yaml")).unwrap();
        let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
        assert!(matches!(err, ConfigError::Classes { .. }));
    }

    #[tokio::test]
    async fn test_missing_polygon() {
        let dir = fixture();
        fs::remove_file(dir.path().join("boundary.geojson")).unwrap();
        let file = ConfigFile::load(dir.path().join("config.yaml")).unwrap();
        let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
        assert!(matches!(err, ConfigError::Geofence { .. }));
    }

    #[tokio::test]
    async fn test_dataset_without_hosts() {
        let file = ConfigFile::from_yaml_str(
            "sources:\n  d:\n    hosts: []\n    sources:\n      full: {xyz_url: 'http://a/{z}/{x}/{y}'}\n      partial: {xyz_url: 'http://b/{z}/{x}/{y}'}\n",
        )
        .unwrap();
        let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_non_positive_cell_size() {
        for cell_size in ["0", "-100"] {
            let dir = fixture();
            let yaml = CONFIG.replace(
                "classes: classes.json",
                &format!("classes: classes.json\n        rank: {{ cell_size: {} }}", cell_size),
            );
            write(dir.path(), "config.yaml", &yaml);
            let file = ConfigFile::load(dir.path().join("config.yaml")).unwrap();
            let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
            assert!(
                matches!(err, ConfigError::Invalid(ref msg) if msg.contains("cell_size")),
                "cell_size {} accepted",
                cell_size
            );
        }
    }

    #[tokio::test]
    async fn test_bad_source() {
        let file = ConfigFile::from_yaml_str(
            "sources:\n  d:\n    hosts: [h]\n    sources:\n      full: {xyz_url: 'http://a/tiles'}\n      partial: {xyz_url: 'http://b/{z}/{x}/{y}'}\n",
        )
        .unwrap();
        let err = GatewayConfig::from_file(&file, &factory()).await.err().unwrap();
        assert!(matches!(err, ConfigError::Source { ref dataset, .. } if dataset == "d"));
    }
}
