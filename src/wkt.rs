use geo::Geometry;
use geojson::Geometry as GeoJsonGeometry;
use geozero::ToWkt;
use serde_json::Value;

use crate::error::GeometryError;

/// Written to a row's `wkt` field when its geometry cannot be converted.
pub const GEOMETRY_ERROR_SENTINEL: &str = "Error: Could not convert geometry";

/// Converts a GeoJSON geometry object into well-known text.
pub fn geometry_to_wkt(value: &Value) -> Result<String, GeometryError> {
    check_geometry(value)?;
    let geometry = GeoJsonGeometry::from_json_value(value.clone())?;
    let geometry: Geometry<f64> = geometry.try_into()?;
    Ok(geometry.to_wkt()?)
}

/// Nesting depth of positions below `coordinates` for each geometry type.
fn position_depth(kind: &str) -> Option<usize> {
    match kind {
        "Point" => Some(0),
        "MultiPoint" | "LineString" => Some(1),
        "MultiLineString" | "Polygon" => Some(2),
        "MultiPolygon" => Some(3),
        _ => None,
    }
}

// The typed conversion indexes positions directly, so short positions and
// wrong nesting are rejected here first.
fn check_geometry(value: &Value) -> Result<(), GeometryError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(GeometryError::MissingType)?;

    if kind == "GeometryCollection" {
        let members = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| GeometryError::InvalidCoordinate("geometries".to_string()))?;
        return members.iter().try_for_each(check_geometry);
    }

    let depth = position_depth(kind)
        .ok_or_else(|| GeometryError::InvalidCoordinate(format!("unsupported type {kind}")))?;
    let coordinates = value
        .get("coordinates")
        .ok_or_else(|| GeometryError::InvalidCoordinate("missing coordinates".to_string()))?;
    check_nesting(coordinates, depth)
}

fn check_nesting(value: &Value, depth: usize) -> Result<(), GeometryError> {
    let items = value
        .as_array()
        .ok_or_else(|| GeometryError::InvalidCoordinate(value.to_string()))?;

    if depth == 0 {
        if items.len() < 2 {
            return Err(GeometryError::ShortPosition);
        }
        if let Some(bad) = items.iter().find(|item| !item.is_number()) {
            return Err(GeometryError::InvalidCoordinate(bad.to_string()));
        }
        return Ok(());
    }

    items.iter().try_for_each(|item| check_nesting(item, depth - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};
    use geozero::wkt::Wkt;
    use geozero::ToGeo;
    use serde_json::json;

    fn parse_back(wkt: &str) -> Geometry<f64> {
        Wkt(wkt).to_geo().expect("valid WKT")
    }

    #[test]
    fn point_converts() {
        let wkt = geometry_to_wkt(&json!({"type": "Point", "coordinates": [1.5, -2.0]})).unwrap();
        assert!(wkt.starts_with("POINT"));
        assert_eq!(parse_back(&wkt), Geometry::Point(point!(x: 1.5, y: -2.0)));
    }

    #[test]
    fn line_and_polygon_convert() {
        let line = geometry_to_wkt(&json!({
            "type": "LineString",
            "coordinates": [[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]]
        }))
        .unwrap();
        assert_eq!(
            parse_back(&line),
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 0.0)])
        );

        let square = geometry_to_wkt(&json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]
        }))
        .unwrap();
        assert!(square.starts_with("POLYGON"));
        assert_eq!(
            parse_back(&square),
            Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ])
        );
    }

    #[test]
    fn multi_geometries_convert() {
        let wkt = geometry_to_wkt(&json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                [[[5, 5], [6, 5], [6, 6], [5, 5]]]
            ]
        }))
        .unwrap();
        assert!(wkt.starts_with("MULTIPOLYGON"));

        let wkt = geometry_to_wkt(&json!({
            "type": "MultiPoint",
            "coordinates": [[0, 0], [3, 4]]
        }))
        .unwrap();
        assert!(wkt.starts_with("MULTIPOINT"));
    }

    #[test]
    fn collection_converts() {
        let wkt = geometry_to_wkt(&json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1, 2]},
                {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
            ]
        }))
        .unwrap();
        assert!(wkt.starts_with("GEOMETRYCOLLECTION"));
    }

    #[test]
    fn malformed_geometries_are_rejected() {
        let cases = [
            json!({"type": "Point", "coordinates": [1]}),
            json!({"type": "Point", "coordinates": []}),
            json!({"type": "Point", "coordinates": ["a", "b"]}),
            json!({"type": "LineString", "coordinates": [1, 2]}),
            json!({"type": "Polygon", "coordinates": [[0, 0], [1, 1]]}),
            json!({"type": "Circle", "coordinates": [0, 0]}),
            json!({"coordinates": [0, 0]}),
            json!({"type": "Point"}),
            json!("POINT (1 2)"),
        ];
        for case in cases {
            assert!(geometry_to_wkt(&case).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn extra_ordinates_are_accepted() {
        let wkt = geometry_to_wkt(&json!({"type": "Point", "coordinates": [1, 2, 30]})).unwrap();
        assert!(wkt.starts_with("POINT"));
    }
}
