//! GeoJSON boundary parsing.
//!
//! Accepts a `Polygon`, a `MultiPolygon`, a `Feature` carrying one, or a
//! `FeatureCollection`/`GeometryCollection` of them, in WGS84 degrees, and
//! returns the union of their polygons projected to Web Mercator meters.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value as JsonValue;

use super::GeofenceError;
use crate::coord::lon_lat_to_meters;

/// Projects every polygon found in a GeoJSON document.
pub(crate) fn parse_boundary(document: &JsonValue) -> Result<MultiPolygon<f64>, GeofenceError> {
    let mut polygons = Vec::new();
    collect(document, &mut polygons)?;
    if polygons.is_empty() {
        return Err(GeofenceError::Empty);
    }
    Ok(MultiPolygon::new(polygons))
}

fn collect(node: &JsonValue, out: &mut Vec<Polygon<f64>>) -> Result<(), GeofenceError> {
    let kind = node
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| GeofenceError::Invalid("object without a \"type\"".to_string()))?;

    match kind {
        "FeatureCollection" => {
            for feature in array(node, "features")? {
                collect(feature, out)?;
            }
        }
        "Feature" => {
            let geometry = node
                .get("geometry")
                .ok_or_else(|| GeofenceError::Invalid("feature without geometry".to_string()))?;
            if !geometry.is_null() {
                collect(geometry, out)?;
            }
        }
        "GeometryCollection" => {
            for geometry in array(node, "geometries")? {
                collect(geometry, out)?;
            }
        }
        "Polygon" => out.push(polygon(node.get("coordinates"))?),
        "MultiPolygon" => {
            for rings in array(node, "coordinates")? {
                out.push(polygon(Some(rings))?);
            }
        }
        other => return Err(GeofenceError::UnsupportedGeometry(other.to_string())),
    }
    Ok(())
}

fn array<'a>(node: &'a JsonValue, field: &str) -> Result<&'a Vec<JsonValue>, GeofenceError> {
    node.get(field)
        .and_then(JsonValue::as_array)
        .ok_or_else(|| GeofenceError::Invalid(format!("missing array \"{}\"", field)))
}

fn polygon(rings: Option<&JsonValue>) -> Result<Polygon<f64>, GeofenceError> {
    let rings = rings
        .and_then(JsonValue::as_array)
        .ok_or_else(|| GeofenceError::Invalid("polygon without rings".to_string()))?;
    let mut rings = rings.iter().map(ring);
    let exterior = rings
        .next()
        .ok_or_else(|| GeofenceError::Invalid("polygon without exterior ring".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring(positions: &JsonValue) -> Result<LineString<f64>, GeofenceError> {
    let positions = positions
        .as_array()
        .ok_or_else(|| GeofenceError::Invalid("ring is not an array".to_string()))?;
    positions
        .iter()
        .map(|position| {
            let lon = position.get(0).and_then(JsonValue::as_f64);
            let lat = position.get(1).and_then(JsonValue::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => {
                    let (x, y) = lon_lat_to_meters(lon, lat);
                    Ok(Coord { x, y })
                }
                _ => Err(GeofenceError::Invalid(format!("bad position {}", position))),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection_of_polygons() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "a"}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                }},
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[2, 2], [3, 2], [3, 3], [2, 2]]],
                        [[[4, 4], [5, 4], [5, 5], [4, 4]]]
                    ]
                }}
            ]
        });
        let mp = parse_boundary(&doc).unwrap();
        assert_eq!(mp.0.len(), 3);
    }

    #[test]
    fn test_bare_polygon_with_hole() {
        let doc = json!({
            "type": "Polygon",
            "coordinates": [
                [[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]],
                [[4, 4], [6, 4], [6, 6], [4, 4]]
            ]
        });
        let mp = parse_boundary(&doc).unwrap();
        assert_eq!(mp.0[0].interiors().len(), 1);
        // Projected, not degrees
        assert!(mp.0[0].exterior().0[1].x > 1_000_000.0);
    }

    #[test]
    fn test_rejects_points() {
        let doc = json!({"type": "Point", "coordinates": [0, 0]});
        assert!(matches!(
            parse_boundary(&doc),
            Err(GeofenceError::UnsupportedGeometry(_))
        ));
    }

    #[test]
    fn test_rejects_empty_collection() {
        let doc = json!({"type": "FeatureCollection", "features": []});
        assert!(matches!(parse_boundary(&doc), Err(GeofenceError::Empty)));
    }

    #[test]
    fn test_rejects_malformed_positions() {
        let doc = json!({"type": "Polygon", "coordinates": [[[0], [1, 1]]]});
        assert!(matches!(parse_boundary(&doc), Err(GeofenceError::Invalid(_))));
    }
}
