//! YAML configuration file model.
//!
//! ```yaml
//! server:
//!   public_base_path: /tiles
//!   public_tile_url_prefixes: [a., b.]
//! sources:
//!   city:
//!     hosts: [localhost]
//!     sources:
//!       full: { tilejson_url: "https://example.com/tiles.json" }
//!       partial: { mbtiles: overlay.mbtiles }
//!     output: { min_zoom: 14 }
//!     polygon: boundary.geojson
//!     merge_layers:
//!       poi:
//!         fields: [superclass, class, subclass]
//!         classes: classes.json
//!       transportation: ~
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;
use crate::rank::RankConfig;
use crate::source::SourceSpec;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    /// Datasets by id.
    pub sources: BTreeMap<String, DatasetSection>,
}

/// Public addressing of the gateway.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Path prefix under which the gateway is exposed.
    pub public_base_path: Option<String>,
    /// Host prefixes, one tile URL per prefix (e.g. `a.`, `b.`).
    pub public_tile_url_prefixes: Vec<String>,
}

/// One merged dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSection {
    /// Request hosts this dataset is served on.
    pub hosts: Vec<String>,
    pub sources: SourcePair,
    #[serde(default)]
    pub output: OutputSection,
    /// GeoJSON boundary of the partial source's authority.
    pub polygon: Option<PathBuf>,
    /// Merge rule per layer; `~` leaves the layer to the full source.
    #[serde(default)]
    pub merge_layers: BTreeMap<String, Option<LayerSection>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePair {
    pub full: SourceSpec,
    pub partial: SourceSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub min_zoom: u8,
}

/// Merge rule for one layer as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSection {
    /// Classification fields, most general first.
    #[serde(default)]
    pub fields: Vec<String>,
    /// JSON file holding the class prefixes.
    pub classes: Option<PathBuf>,
    #[serde(default)]
    pub rank: RankConfig,
}

impl ConfigFile {
    /// Parses a YAML document. Relative paths are left as written.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(ConfigError::Parse)
    }

    /// Reads a configuration file, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Public base path without a trailing slash.
    pub fn public_base_path(&self) -> &str {
        self.server
            .public_base_path
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/')
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for dataset in self.sources.values_mut() {
            if let Some(polygon) = dataset.polygon.as_mut() {
                resolve(polygon);
            }
            for spec in [&mut dataset.sources.full, &mut dataset.sources.partial] {
                if let Some(mbtiles) = spec.mbtiles.as_mut() {
                    resolve(mbtiles);
                }
            }
            for layer in dataset.merge_layers.values_mut().flatten() {
                if let Some(classes) = layer.classes.as_mut() {
                    resolve(classes);
                }
            }
        }
    }
}
