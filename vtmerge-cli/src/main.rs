//! vtmerge CLI - Command-line interface
//!
//! Runs the vector tile merging gateway, or checks a configuration file.

mod commands;
mod error;
mod runner;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vtmerge::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
use vtmerge::logging::DEFAULT_LOG_DIR;

use commands::{check, serve};

#[derive(Parser)]
#[command(name = "vtmerge")]
#[command(version = vtmerge::VERSION)]
#[command(about = "Merge a curated vector tile source into a basemap, on the fly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the merging gateway
    Serve {
        /// Configuration file
        #[arg(long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,

        /// Directory for the log file
        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,
    },
    /// Load a configuration, connect its sources and print a summary
    Check {
        /// Configuration file
        #[arg(long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            config,
            bind,
            log_dir,
        } => {
            serve::run(serve::ServeArgs {
                config,
                bind,
                log_dir,
            })
            .await
        }
        Commands::Check { config } => check::run(check::CheckArgs { config }).await,
    };

    if let Err(e) = result {
        e.exit();
    }
}
