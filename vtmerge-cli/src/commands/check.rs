//! Check command - load a configuration the way `serve` would and report it.

use std::path::PathBuf;

use vtmerge::config::GatewayConfig;

use crate::error::CliError;

/// Arguments for the check command.
pub struct CheckArgs {
    pub config: PathBuf,
}

/// Run the check command.
///
/// Sources are connected, so an unreachable TileJSON upstream is reported
/// here rather than at serve time.
pub async fn run(args: CheckArgs) -> Result<(), CliError> {
    let config = GatewayConfig::load(&args.config).await?;
    print!("{}", describe(&config));
    Ok(())
}

fn describe(config: &GatewayConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("vtmerge v{}\n", vtmerge::VERSION));
    if !config.public_base_path().is_empty() {
        out.push_str(&format!("Public base path: {}\n", config.public_base_path()));
    }
    if !config.public_tile_url_prefixes().is_empty() {
        out.push_str(&format!(
            "Tile URL prefixes: {}\n",
            config.public_tile_url_prefixes().join(", ")
        ));
    }

    for host in config.hosts() {
        out.push_str(&format!("\n{}\n", host));
        for id in config.dataset_ids(host).into_iter().flatten() {
            let Some(dataset) = config.dataset(host, id) else {
                continue;
            };
            let layers: Vec<String> = dataset
                .layers
                .iter()
                .map(|(name, rule)| {
                    if rule.is_enabled() {
                        format!("{} ({} classes)", name, rule.classes.len())
                    } else {
                        format!("{} (full only)", name)
                    }
                })
                .collect();
            out.push_str(&format!(
                "  {}: {} + {}, min zoom {}, {}\n",
                id,
                dataset.full.name(),
                dataset.partial.name(),
                dataset.min_zoom,
                if dataset.geofence.is_some() {
                    "polygon"
                } else {
                    "no polygon"
                }
            ));
            if !layers.is_empty() {
                out.push_str(&format!("    layers: {}\n", layers.join(", ")));
            }
        }
    }
    out
}
