//! vtmerge - Vector tile merging gateway
//!
//! Serves Mapbox Vector Tiles built on the fly from two upstreams: a
//! complete basemap (the *full* source) and a curated overlay (the
//! *partial* source). Inside a dataset's boundary polygon, features of the
//! configured classes are taken from the overlay instead of the basemap;
//! everything else is passed through untouched.
//!
//! # High-Level API
//!
//! ```ignore
//! use vtmerge::config::GatewayConfig;
//! use vtmerge::server;
//!
//! let config = GatewayConfig::load("config.yaml").await?;
//! server::serve(Arc::new(config), "0.0.0.0:8000".parse()?, shutdown).await?;
//! ```
//!
//! The merge itself is available without HTTP through [`merge::merge_tile`].

pub mod classify;
pub mod config;
pub mod coord;
pub mod geofence;
pub mod logging;
pub mod merge;
pub mod rank;
pub mod server;
pub mod source;
pub mod tile;

/// Version of the vtmerge library and CLI.
///
/// Defined in the workspace `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
