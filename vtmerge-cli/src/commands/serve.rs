//! Serve command - run the merging gateway over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use vtmerge::server;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub config: PathBuf,
    pub bind: SocketAddr,
    pub log_dir: PathBuf,
}

/// Run the serve command until ctrl-c.
pub async fn run(args: ServeArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(&args.log_dir)?;
    runner.log_startup("serve");

    let config = Arc::new(runner.load_config(&args.config).await?);

    server::serve(config, args.bind, shutdown_signal())
        .await
        .map_err(|error| CliError::Serve {
            addr: args.bind,
            error,
        })?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested, draining connections"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for ctrl-c, stopping");
        }
    }
}
