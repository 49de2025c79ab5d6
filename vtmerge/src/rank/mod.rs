//! Spatial ranking of clustered point features.
//!
//! Features are bucketed by their first coordinate on a coarse grid. Inside a
//! bucket they are ordered by display zoom, then priority, and numbered from
//! zero into a rank attribute, so a renderer can reveal lower ranked points
//! progressively without clustering on the client.

use std::collections::HashMap;

use serde::Deserialize;

use crate::tile::{AttributeValue, Feature, TilePoint};

/// Grid cell edge in tile units.
pub const DEFAULT_CELL_SIZE: i32 = 100;

/// Zoom assumed for features without a zoom attribute.
pub const DEFAULT_ZOOM: f64 = 18.0;

/// Priority assumed for features without a priority attribute.
pub const DEFAULT_PRIORITY: f64 = 9999.0;

/// Attribute names and defaults used by [`rank`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Attribute holding the zoom at which a feature should appear.
    pub zoom_field: String,
    /// Attribute holding the feature's priority (lower first).
    pub priority_field: String,
    /// Attribute written with the computed rank.
    pub rank_field: String,
    pub default_zoom: f64,
    pub default_priority: f64,
    pub cell_size: i32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            zoom_field: "zoom".to_string(),
            priority_field: "priority".to_string(),
            rank_field: "rank".to_string(),
            default_zoom: DEFAULT_ZOOM,
            default_priority: DEFAULT_PRIORITY,
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

/// Grid cell of a point, rounding each axis to the nearest cell.
///
/// Cell sizes below one are treated as one. Works in i64 so that points at
/// the edges of the i32 range still land in their own cell.
#[inline]
pub fn cell_of(point: TilePoint, cell_size: i32) -> (i64, i64) {
    let size = i64::from(cell_size.max(1));
    let half = size / 2;
    (
        (i64::from(point.x) + half).div_euclid(size),
        (i64::from(point.y) + half).div_euclid(size),
    )
}

/// Writes a zero-based rank into every feature, per grid cell.
///
/// Only the rank attribute is touched. Ties keep input order. Features
/// without any coordinate are left unranked.
pub fn rank(features: &mut [Feature], config: &RankConfig) {
    let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, feature) in features.iter().enumerate() {
        if let Some(point) = feature.geometry.first_point() {
            cells
                .entry(cell_of(point, config.cell_size))
                .or_default()
                .push(i);
        }
    }

    let sort_keys: Vec<(f64, f64)> = features
        .iter()
        .map(|f| {
            let numeric = |field: &str, default: f64| {
                f.attributes
                    .get(field)
                    .and_then(AttributeValue::as_f64)
                    .unwrap_or(default)
            };
            (
                numeric(&config.zoom_field, config.default_zoom),
                numeric(&config.priority_field, config.default_priority),
            )
        })
        .collect();

    for mut members in cells.into_values() {
        members.sort_by(|&a, &b| {
            let (za, pa) = sort_keys[a];
            let (zb, pb) = sort_keys[b];
            za.total_cmp(&zb).then(pa.total_cmp(&pb))
        });
        for (position, index) in members.into_iter().enumerate() {
            features[index]
                .attributes
                .set(config.rank_field.clone(), AttributeValue::Int(position as i64));
        }
    }
}
