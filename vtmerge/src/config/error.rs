//! Configuration error types.

use std::fmt;
use std::path::PathBuf;

use crate::geofence::GeofenceError;
use crate::source::SourceError;

/// Errors that prevent the gateway from starting.
#[derive(Debug)]
pub enum ConfigError {
    /// A file named by the configuration could not be read.
    Io { path: PathBuf, source: std::io::Error },

    /// The YAML document does not match the configuration schema.
    Parse(serde_yaml::Error),

    /// A dataset's full or partial source could not be set up.
    Source { dataset: String, source: SourceError },

    /// A dataset's boundary polygon is unusable.
    Geofence { dataset: String, source: GeofenceError },

    /// A layer's class list file is unusable.
    Classes {
        dataset: String,
        layer: String,
        reason: String,
    },

    /// The configuration is well-formed but inconsistent.
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn classes(dataset: &str, layer: &str, reason: impl fmt::Display) -> Self {
        ConfigError::Classes {
            dataset: dataset.to_string(),
            layer: layer.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => {
                write!(f, "Invalid configuration: {}", e)
            }
            ConfigError::Source { dataset, source } => {
                write!(f, "Dataset '{}': source error: {}", dataset, source)
            }
            ConfigError::Geofence { dataset, source } => {
                write!(f, "Dataset '{}': polygon error: {}", dataset, source)
            }
            ConfigError::Classes {
                dataset,
                layer,
                reason,
            } => {
                write!(f, "Dataset '{}', layer '{}': classes error: {}", dataset, layer, reason)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Source { source, .. } => Some(source),
            ConfigError::Geofence { source, .. } => Some(source),
            ConfigError::Classes { .. } => None,
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}
