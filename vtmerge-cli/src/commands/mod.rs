//! CLI command implementations.
//!
//! - [`serve`] - Run the merging gateway
//! - [`check`] - Validate a configuration and connect its sources

pub mod check;
pub mod serve;
