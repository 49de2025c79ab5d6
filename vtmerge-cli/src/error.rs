//! CLI error handling with user-friendly messages.

use std::fmt;
use std::net::SocketAddr;
use std::process;

use vtmerge::config::ConfigError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// The configuration could not be loaded or its sources connected
    Config(ConfigError),
    /// The HTTP server failed to bind or stopped with an error
    Serve { addr: SocketAddr, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an error message and a non-zero code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigError::Io { .. }) => {
                eprintln!();
                eprintln!("Pass the configuration file with --config or the CONFIG environment variable.");
            }
            CliError::Serve { error, .. } if error.kind() == std::io::ErrorKind::AddrInUse => {
                eprintln!();
                eprintln!("Another process is listening on that address; choose one with --bind.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Serve { addr, error } => write!(f, "Server on {} failed: {}", addr, error),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Serve { error, .. } => Some(error),
            CliError::LoggingInit(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}
