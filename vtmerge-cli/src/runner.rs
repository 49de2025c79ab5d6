//! CLI runner for common setup.
//!
//! Owns the logging guard so that the log file stays open for as long as
//! the command runs.

use std::path::Path;

use tracing::info;
use vtmerge::config::GatewayConfig;
use vtmerge::logging::{init_logging, LoggingGuard, DEFAULT_LOG_FILE};

use crate::error::CliError;

/// Runner that manages the CLI lifecycle.
pub struct CliRunner {
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
}

impl CliRunner {
    /// Initializes logging into `log_dir`.
    pub fn new(log_dir: &Path) -> Result<Self, CliError> {
        let logging_guard = init_logging(log_dir, DEFAULT_LOG_FILE)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;
        Ok(Self { logging_guard })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("vtmerge v{}", vtmerge::VERSION);
        info!("vtmerge CLI: {} command", command);
    }

    /// Loads the configuration and connects every dataset's sources.
    pub async fn load_config(&self, path: &Path) -> Result<GatewayConfig, CliError> {
        info!(path = %path.display(), "Loading configuration");
        Ok(GatewayConfig::load(path).await?)
    }
}
