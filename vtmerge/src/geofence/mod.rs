//! Geofence evaluation.
//!
//! A [`Geofence`] is the area where the partial source is authoritative. It
//! is built once from a geographic boundary, reprojected to Web Mercator, and
//! then only answers containment questions:
//!
//! - whole-tile tests, which let a merge skip per-feature work entirely
//! - per-point tests on tile-local coordinates, the costly path
//!
//! # Example
//!
//! ```
//! use vtmerge::coord::TileCoord;
//! use vtmerge::geofence::Geofence;
//!
//! let fence = Geofence::from_geojson(&serde_json::json!({
//!     "type": "Polygon",
//!     "coordinates": [[[-10, -10], [10, -10], [10, 10], [-10, 10], [-10, -10]]]
//! })).unwrap();
//!
//! assert!(fence.tile_disjoint(&TileCoord::new(4, 0, 0)));
//! let inside = fence.point_predicate(&TileCoord::new(1, 1, 1));
//! assert!(inside.contains(10, 10));
//! ```

mod boundary;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Rect, Relate};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::coord::TileCoord;
use crate::tile::DEFAULT_EXTENT;

/// Errors raised while building a geofence.
#[derive(Debug, Error)]
pub enum GeofenceError {
    /// The boundary file could not be read.
    #[error("failed to read boundary: {0}")]
    Io(#[from] std::io::Error),

    /// The boundary file is not JSON.
    #[error("boundary is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is JSON but not usable GeoJSON.
    #[error("invalid boundary: {0}")]
    Invalid(String),

    /// The document holds a geometry that is not a polygon.
    #[error("boundary geometry must be polygonal, found {0}")]
    UnsupportedGeometry(String),

    /// The document holds no polygon at all.
    #[error("boundary contains no polygon")]
    Empty,
}

/// Immutable multi-polygon in Web Mercator meters.
#[derive(Debug, Clone)]
pub struct Geofence {
    polygon: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
}

impl Geofence {
    /// Builds a geofence from polygons already in Web Mercator meters.
    pub fn from_projected(polygon: MultiPolygon<f64>) -> Self {
        let bbox = polygon.bounding_rect();
        Self { polygon, bbox }
    }

    /// Builds a geofence from a GeoJSON document in WGS84 degrees.
    pub fn from_geojson(document: &JsonValue) -> Result<Self, GeofenceError> {
        boundary::parse_boundary(document).map(Self::from_projected)
    }

    /// Reads a GeoJSON boundary.
    pub fn from_reader(reader: impl Read) -> Result<Self, GeofenceError> {
        let document: JsonValue = serde_json::from_reader(reader)?;
        Self::from_geojson(&document)
    }

    /// Reads a GeoJSON boundary file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GeofenceError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// True if the tile's bounding box does not touch the geofence.
    pub fn tile_disjoint(&self, coord: &TileCoord) -> bool {
        let tile = tile_rect(coord);
        match &self.bbox {
            Some(bbox) if !rects_overlap(bbox, &tile) => true,
            None => true,
            _ => !self.polygon.relate(&tile.to_polygon()).is_intersects(),
        }
    }

    /// True if the tile's bounding box lies entirely inside the geofence.
    pub fn tile_fully_inside(&self, coord: &TileCoord) -> bool {
        let tile = tile_rect(coord);
        match &self.bbox {
            Some(bbox) if rect_contains(bbox, &tile) => {
                self.polygon.relate(&tile.to_polygon()).is_contains()
            }
            _ => false,
        }
    }

    /// Point test for a tile with the default grid extent.
    pub fn point_predicate(&self, coord: &TileCoord) -> PointPredicate<'_> {
        self.point_predicate_with_extent(coord, DEFAULT_EXTENT)
    }

    /// Point test mapping tile-local grid positions into the geofence projection.
    ///
    /// # Arguments
    ///
    /// * `coord` - Tile the positions belong to
    /// * `extent` - Grid units per tile edge
    pub fn point_predicate_with_extent(&self, coord: &TileCoord, extent: u32) -> PointPredicate<'_> {
        PointPredicate {
            fence: self,
            coord: *coord,
            extent: extent.max(1),
        }
    }

    fn contains_meters(&self, c: Coord<f64>) -> bool {
        match &self.bbox {
            Some(bbox) if point_in_rect(bbox, c) => self.polygon.contains(&c),
            _ => false,
        }
    }
}

/// Containment test bound to one tile.
#[derive(Debug, Clone, Copy)]
pub struct PointPredicate<'a> {
    fence: &'a Geofence,
    coord: TileCoord,
    extent: u32,
}

impl PointPredicate<'_> {
    /// True if the tile-local position lies strictly inside the geofence.
    #[inline]
    pub fn contains(&self, local_x: i32, local_y: i32) -> bool {
        let (x, y) = self
            .coord
            .local_to_meters(f64::from(local_x), f64::from(local_y), self.extent);
        self.fence.contains_meters(Coord { x, y })
    }
}

fn tile_rect(coord: &TileCoord) -> Rect<f64> {
    let (min_x, min_y, max_x, max_y) = coord.bounds_meters();
    Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

fn point_in_rect(rect: &Rect<f64>, c: Coord<f64>) -> bool {
    rect.min().x <= c.x && c.x <= rect.max().x && rect.min().y <= c.y && c.y <= rect.max().y
}
