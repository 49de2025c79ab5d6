//! Tile coordinate module
//!
//! Provides the `z/x/y` tile address used by every request and the Web
//! Mercator (EPSG:3857) conversions needed to relate a tile to a geofence
//! expressed in projected meters.

use std::f64::consts::PI;
use std::fmt;

use thiserror::Error;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 30;

/// Half the Web Mercator world width in meters (EPSG:3857 origin shift).
pub const ORIGIN_SHIFT: f64 = 20_037_508.342_789_244;

/// Earth radius used by the spherical Web Mercator projection, in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.051_128_78;

/// Errors produced when validating tile coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level above [`MAX_ZOOM`].
    #[error("invalid zoom level {0} (max {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Column or row outside `0..2^zoom`.
    #[error("tile {x}/{y} out of range for zoom {zoom}")]
    OutOfRange { zoom: u8, x: u32, y: u32 },
}

/// Address of a map tile in the XYZ scheme.
///
/// Rows increase southward, as served by slippy-map endpoints. Archive
/// backends using the TMS convention convert with [`TileCoord::tms_y`].
///
/// # Example
///
/// ```
/// use vtmerge::coord::TileCoord;
///
/// let coord = TileCoord::new(14, 8185, 5447);
/// assert_eq!(coord.to_string(), "14/8185/5447");
/// assert_eq!(coord.tms_y(), (1 << 14) - 1 - 5447);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,
    /// Column, increasing eastward
    pub x: u32,
    /// Row, increasing southward
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate without range validation.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Create a tile coordinate, rejecting addresses outside the zoom's grid.
    pub fn checked(z: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if z > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(z));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(CoordError::OutOfRange { zoom: z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// Row in the TMS convention (origin at the south edge).
    #[inline]
    pub fn tms_y(&self) -> u32 {
        let n = 1u64 << self.z;
        (n - 1 - u64::from(self.y)) as u32
    }

    /// Edge length of this tile in projected meters.
    #[inline]
    pub fn size_meters(&self) -> f64 {
        2.0 * ORIGIN_SHIFT / 2.0_f64.powi(i32::from(self.z))
    }

    /// Projected bounds of the tile as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds_meters(&self) -> (f64, f64, f64, f64) {
        let size = self.size_meters();
        let min_x = f64::from(self.x) * size - ORIGIN_SHIFT;
        let max_y = ORIGIN_SHIFT - f64::from(self.y) * size;
        (min_x, max_y - size, min_x + size, max_y)
    }

    /// Projects a tile-local grid position to EPSG:3857 meters.
    ///
    /// # Arguments
    ///
    /// * `local_x` - Column inside the tile grid, 0 at the west edge
    /// * `local_y` - Row inside the tile grid, 0 at the north edge
    /// * `extent` - Grid units per tile edge (usually 4096)
    #[inline]
    pub fn local_to_meters(&self, local_x: f64, local_y: f64, extent: u32) -> (f64, f64) {
        let (min_x, _, _, max_y) = self.bounds_meters();
        let unit = self.size_meters() / f64::from(extent);
        (min_x + local_x * unit, max_y - local_y * unit)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Projects geographic coordinates (degrees) to Web Mercator meters.
///
/// Latitudes beyond the projection's limit are clamped to [`MAX_LAT`].
#[inline]
pub fn lon_lat_to_meters(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LAT, MAX_LAT);
    let x = lon * ORIGIN_SHIFT / 180.0;
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_accepts_grid_corners() {
        assert!(TileCoord::checked(0, 0, 0).is_ok());
        assert!(TileCoord::checked(3, 7, 7).is_ok());
    }

    #[test]
    fn test_checked_rejects_out_of_range() {
        let err = TileCoord::checked(3, 8, 0).unwrap_err();
        assert!(matches!(err, CoordError::OutOfRange { zoom: 3, .. }));
        assert!(matches!(
            TileCoord::checked(31, 0, 0),
            Err(CoordError::InvalidZoom(31))
        ));
    }

    #[test]
    fn test_tms_flip() {
        assert_eq!(TileCoord::new(0, 0, 0).tms_y(), 0);
        assert_eq!(TileCoord::new(2, 1, 0).tms_y(), 3);
        assert_eq!(TileCoord::new(2, 1, 3).tms_y(), 0);
    }

    #[test]
    fn test_world_tile_bounds() {
        let (min_x, min_y, max_x, max_y) = TileCoord::new(0, 0, 0).bounds_meters();
        assert!((min_x + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((min_y + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_y - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_one_quadrants() {
        // North-west quadrant
        let (min_x, min_y, max_x, max_y) = TileCoord::new(1, 0, 0).bounds_meters();
        assert!((min_x + ORIGIN_SHIFT).abs() < 1e-6);
        assert!(min_y.abs() < 1e-6);
        assert!(max_x.abs() < 1e-6);
        assert!((max_y - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_local_to_meters_corners() {
        let coord = TileCoord::new(1, 1, 1);
        let (x, y) = coord.local_to_meters(0.0, 0.0, 4096);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);

        let (x, y) = coord.local_to_meters(4096.0, 4096.0, 4096);
        assert!((x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!((y + ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_lon_lat_projection() {
        let (x, y) = lon_lat_to_meters(0.0, 0.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);

        let (x, y) = lon_lat_to_meters(180.0, MAX_LAT);
        assert!((x - ORIGIN_SHIFT).abs() < 1e-3);
        assert!((y - ORIGIN_SHIFT).abs() < 1.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(TileCoord::new(12, 2048, 1361).to_string(), "12/2048/1361");
    }
}
