//! Geometry previews.
//!
//! A geometry is reduced to its type tag and a nested coordinate tree, the
//! tree is fitted into a square canvas, and the result is drawn as SVG
//! primitives. Nothing in here fails loudly: every problem ends up as a short
//! textual [`Fallback`].

use geo::{BoundingRect, Coord, Geometry, MultiPoint, Point};
use geozero::wkt::Wkt;
use geozero::ToGeo;
use log::warn;
use serde_json::Value;
use std::fmt::{self, Write};

use crate::error::GeometryError;

/// Square drawing area. Coordinates are fitted inside `size - 2 * padding`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub size: f64,
    pub padding: f64,
}

impl Canvas {
    pub const INLINE: Canvas = Canvas {
        size: 40.0,
        padding: 2.0,
    };
    pub const MODAL: Canvas = Canvas {
        size: 300.0,
        padding: 2.0,
    };

    pub fn new(size: f64, padding: f64) -> Self {
        Canvas { size, padding }
    }

    fn extent(&self) -> f64 {
        self.size - 2.0 * self.padding
    }

    fn center(&self) -> [f64; 2] {
        [self.size / 2.0, self.size / 2.0]
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Canvas::INLINE
    }
}

/// Nested coordinate tree, mirroring GeoJSON `coordinates`.
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinates {
    Position([f64; 2]),
    List(Vec<Coordinates>),
}

impl Coordinates {
    /// Builds the tree by shape alone: an array starting with a number is a
    /// position, any other array is a list.
    pub fn from_json(value: &Value) -> Result<Coordinates, GeometryError> {
        let items = value
            .as_array()
            .ok_or_else(|| GeometryError::InvalidCoordinate(value.to_string()))?;

        match items.first() {
            Some(Value::Number(_)) => {
                let x = items.first().and_then(Value::as_f64);
                let y = items.get(1).and_then(Value::as_f64);
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Coordinates::Position([x, y])),
                    _ => Err(GeometryError::ShortPosition),
                }
            }
            _ => items
                .iter()
                .map(Coordinates::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Coordinates::List),
        }
    }

    pub fn positions(&self) -> Vec<[f64; 2]> {
        let mut out = Vec::new();
        self.collect_positions(&mut out);
        out
    }

    fn collect_positions(&self, out: &mut Vec<[f64; 2]>) {
        match self {
            Coordinates::Position(position) => out.push(*position),
            Coordinates::List(items) => items.iter().for_each(|item| item.collect_positions(out)),
        }
    }

    fn map_positions<F>(&self, f: &F) -> Coordinates
    where
        F: Fn([f64; 2]) -> [f64; 2],
    {
        match self {
            Coordinates::Position(position) => Coordinates::Position(f(*position)),
            Coordinates::List(items) => {
                Coordinates::List(items.iter().map(|item| item.map_positions(f)).collect())
            }
        }
    }

    fn children(&self) -> &[Coordinates] {
        match self {
            Coordinates::Position(_) => std::slice::from_ref(self),
            Coordinates::List(items) => items,
        }
    }
}

fn position(coord: Coord<f64>) -> Coordinates {
    Coordinates::Position([coord.x, coord.y])
}

fn path<I: IntoIterator<Item = Coord<f64>>>(coords: I) -> Coordinates {
    Coordinates::List(coords.into_iter().map(position).collect())
}

fn rings(polygon: &geo::Polygon<f64>) -> Coordinates {
    let mut rings = vec![path(polygon.exterior().coords().copied())];
    rings.extend(
        polygon
            .interiors()
            .iter()
            .map(|ring| path(ring.coords().copied())),
    );
    Coordinates::List(rings)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    Other(String),
}

impl GeometryKind {
    pub fn parse(tag: &str) -> GeometryKind {
        match tag {
            "Point" => GeometryKind::Point,
            "MultiPoint" => GeometryKind::MultiPoint,
            "LineString" => GeometryKind::LineString,
            "MultiLineString" => GeometryKind::MultiLineString,
            "Polygon" => GeometryKind::Polygon,
            "MultiPolygon" => GeometryKind::MultiPolygon,
            other => GeometryKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::Other(name) => name,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewGeometry {
    pub kind: GeometryKind,
    pub coordinates: Coordinates,
}

impl PreviewGeometry {
    /// Reads a GeoJSON geometry object, tolerating nesting that does not
    /// match the declared type.
    pub fn from_json(value: &Value) -> Result<PreviewGeometry, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(GeometryError::MissingType)?;
        let coordinates = value
            .get("coordinates")
            .ok_or_else(|| GeometryError::InvalidCoordinate("missing coordinates".to_string()))?;
        Ok(PreviewGeometry {
            kind: GeometryKind::parse(kind),
            coordinates: Coordinates::from_json(coordinates)?,
        })
    }

    /// Parses well-known text. Collections have no coordinate tree and give
    /// `None`, as does unparseable text.
    pub fn from_wkt(wkt: &str) -> Option<PreviewGeometry> {
        let geometry = Wkt(wkt).to_geo().ok()?;
        PreviewGeometry::from_geometry(&geometry)
    }

    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<PreviewGeometry> {
        let (kind, coordinates) = match geometry {
            Geometry::Point(point) => (GeometryKind::Point, position(point.0)),
            Geometry::MultiPoint(points) => (
                GeometryKind::MultiPoint,
                path(points.iter().map(|point| point.0)),
            ),
            Geometry::Line(line) => (GeometryKind::LineString, path([line.start, line.end])),
            Geometry::LineString(line) => {
                (GeometryKind::LineString, path(line.coords().copied()))
            }
            Geometry::MultiLineString(lines) => (
                GeometryKind::MultiLineString,
                Coordinates::List(
                    lines
                        .iter()
                        .map(|line| path(line.coords().copied()))
                        .collect(),
                ),
            ),
            Geometry::Polygon(polygon) => (GeometryKind::Polygon, rings(polygon)),
            Geometry::Rect(rect) => (GeometryKind::Polygon, rings(&rect.to_polygon())),
            Geometry::Triangle(triangle) => (GeometryKind::Polygon, rings(&triangle.to_polygon())),
            Geometry::MultiPolygon(polygons) => (
                GeometryKind::MultiPolygon,
                Coordinates::List(polygons.iter().map(rings).collect()),
            ),
            Geometry::GeometryCollection(_) => return None,
        };
        Some(PreviewGeometry { kind, coordinates })
    }
}

/// Fits every position of `coordinates` into `canvas`, keeping the nesting.
///
/// Returns `Ok(None)` when there is nothing to place. A lone position lands
/// on the canvas center. Otherwise one uniform scale, the smaller of the two
/// axis scales, is applied and Y is flipped so north points up.
pub fn project(
    coordinates: &Coordinates,
    canvas: Canvas,
) -> Result<Option<Coordinates>, GeometryError> {
    let positions = coordinates.positions();
    if let Some([x, y]) = positions
        .iter()
        .copied()
        .find(|[x, y]| !x.is_finite() || !y.is_finite())
    {
        return Err(GeometryError::NonFinite { x, y });
    }

    let points: MultiPoint<f64> = positions.iter().map(|&[x, y]| Point::new(x, y)).collect();
    let Some(bounds) = points.bounding_rect() else {
        return Ok(None);
    };

    let (min, max) = (bounds.min(), bounds.max());
    let width = max.x - min.x;
    let height = max.y - min.y;

    if width == 0.0 && height == 0.0 && positions.len() == 1 {
        let center = canvas.center();
        return Ok(Some(coordinates.map_positions(&|_| center)));
    }

    let extent = canvas.extent();
    let scale_x = if width == 0.0 { 1.0 } else { extent / width };
    let scale_y = if height == 0.0 { 1.0 } else { extent / height };
    let scale = scale_x.min(scale_y);

    let padding = canvas.padding;
    Ok(Some(coordinates.map_positions(&|[x, y]| {
        [padding + (x - min.x) * scale, padding + (max.y - y) * scale]
    })))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { center: [f64; 2], radius: f64 },
    Polyline(Vec<[f64; 2]>),
    Polygon(Vec<[f64; 2]>),
    Group(Vec<Shape>),
}

/// Turns a projected tree into primitives according to the declared type.
///
/// Multi-variants are grouped by the first level of the tree; below that the
/// positions are flattened, so irregular nesting still draws something.
/// Only the outer ring of each multipolygon member is drawn.
pub fn shapes(kind: &GeometryKind, projected: &Coordinates) -> Option<Shape> {
    match kind {
        GeometryKind::Point => projected.positions().first().map(|&center| Shape::Circle {
            center,
            radius: 3.0,
        }),
        GeometryKind::MultiPoint => non_empty_group(
            projected
                .positions()
                .into_iter()
                .map(|center| Shape::Circle {
                    center,
                    radius: 2.0,
                })
                .collect(),
        ),
        GeometryKind::LineString => {
            let points = projected.positions();
            (points.len() > 1).then_some(Shape::Polyline(points))
        }
        GeometryKind::MultiLineString => non_empty_group(
            projected
                .children()
                .iter()
                .map(|line| Shape::Polyline(line.positions()))
                .collect(),
        ),
        GeometryKind::Polygon => {
            let points = projected.positions();
            (!points.is_empty()).then_some(Shape::Polygon(points))
        }
        GeometryKind::MultiPolygon => non_empty_group(
            projected
                .children()
                .iter()
                .filter_map(|polygon| polygon.children().first())
                .map(|outer| Shape::Polygon(outer.positions()))
                .collect(),
        ),
        GeometryKind::Other(_) => None,
    }
}

fn non_empty_group(shapes: Vec<Shape>) -> Option<Shape> {
    (!shapes.is_empty()).then_some(Shape::Group(shapes))
}

/// Text shown instead of a drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    InvalidGeometry,
    NotAvailable,
    Unsupported(String),
    Error,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::InvalidGeometry => f.write_str("Invalid Geom"),
            Fallback::NotAvailable => f.write_str("Preview N/A"),
            Fallback::Unsupported(kind) if kind.is_empty() => f.write_str("Geom"),
            Fallback::Unsupported(kind) => f.write_str(kind),
            Fallback::Error => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Svg(String),
    Fallback(Fallback),
}

impl Preview {
    pub fn is_svg(&self) -> bool {
        matches!(self, Preview::Svg(_))
    }
}

/// Previews a row's WKT, as stored in the exported table.
pub fn preview_wkt(wkt: &str, canvas: Canvas) -> Preview {
    match PreviewGeometry::from_wkt(wkt) {
        Some(geometry) => preview_geometry(&geometry, canvas),
        None => Preview::Fallback(Fallback::InvalidGeometry),
    }
}

pub fn preview_json(geometry: &Value, canvas: Canvas) -> Preview {
    match PreviewGeometry::from_json(geometry) {
        Ok(geometry) => preview_geometry(&geometry, canvas),
        Err(err) => {
            warn!("Cannot preview geometry: {}", err);
            Preview::Fallback(Fallback::InvalidGeometry)
        }
    }
}

pub fn preview_geometry(geometry: &PreviewGeometry, canvas: Canvas) -> Preview {
    if let GeometryKind::Other(kind) = &geometry.kind {
        return Preview::Fallback(Fallback::Unsupported(kind.clone()));
    }
    let projected = match project(&geometry.coordinates, canvas) {
        Ok(Some(projected)) => projected,
        Ok(None) => return Preview::Fallback(Fallback::NotAvailable),
        Err(err) => {
            warn!("Cannot project {} geometry: {}", geometry.kind, err);
            return Preview::Fallback(Fallback::Error);
        }
    };
    match shapes(&geometry.kind, &projected) {
        Some(shape) => Preview::Svg(render_svg(&shape, canvas)),
        None => Preview::Fallback(Fallback::NotAvailable),
    }
}

const FILL: &str = "#3b82f6";
const STROKE: &str = "#2563eb";

pub fn render_svg(shape: &Shape, canvas: Canvas) -> String {
    SvgDocument {
        shape,
        size: canvas.size,
    }
    .to_string()
}

struct SvgDocument<'a> {
    shape: &'a Shape,
    size: f64,
}

impl fmt::Display for SvgDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size;
        write!(
            f,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
        )?;
        write_shape(f, self.shape)?;
        f.write_str("</svg>")
    }
}

fn write_shape<W: Write + ?Sized>(out: &mut W, shape: &Shape) -> fmt::Result {
    match shape {
        Shape::Circle { center, radius } => write!(
            out,
            r#"<circle cx="{}" cy="{}" r="{}" fill="{FILL}"/>"#,
            center[0], center[1], radius
        ),
        Shape::Polyline(points) => write!(
            out,
            r#"<polyline points="{}" fill="none" stroke="{STROKE}" stroke-width="1.5"/>"#,
            points_attr(points)
        ),
        Shape::Polygon(points) => write!(
            out,
            r#"<polygon points="{}" fill="{FILL}" fill-opacity="0.3" stroke="{STROKE}" stroke-width="1.5"/>"#,
            points_attr(points)
        ),
        Shape::Group(shapes) => {
            out.write_str("<g>")?;
            for shape in shapes {
                write_shape(out, shape)?;
            }
            out.write_str("</g>")
        }
    }
}

fn points_attr(points: &[[f64; 2]]) -> String {
    points
        .iter()
        .map(|[x, y]| format!("{x},{y}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn square() -> Coordinates {
        Coordinates::from_json(&json!([[[0, 0], [10, 0], [10, 10], [0, 10]]])).unwrap()
    }

    #[test]
    fn square_fills_padded_canvas() {
        let projected = project(&square(), Canvas::new(40.0, 2.0)).unwrap().unwrap();
        assert_eq!(
            projected.positions(),
            vec![[2.0, 38.0], [38.0, 38.0], [38.0, 2.0], [2.0, 2.0]]
        );
    }

    #[test]
    fn nesting_is_preserved() {
        let projected = project(&square(), Canvas::INLINE).unwrap().unwrap();
        match projected {
            Coordinates::List(rings) => {
                assert_eq!(rings.len(), 1);
                assert!(matches!(&rings[0], Coordinates::List(ring) if ring.len() == 4));
            }
            other => panic!("expected rings, got {other:?}"),
        }
    }

    #[test]
    fn lone_point_goes_to_center() {
        for raw in [json!([0, 0]), json!([123.4, -56.7]), json!([[9e9, 1e-9]])] {
            let coords = Coordinates::from_json(&raw).unwrap();
            let projected = project(&coords, Canvas::new(300.0, 2.0)).unwrap().unwrap();
            assert_eq!(projected.positions(), vec![[150.0, 150.0]]);
        }
    }

    #[test]
    fn repeated_point_is_not_centered() {
        let coords = Coordinates::from_json(&json!([[5, 5], [5, 5]])).unwrap();
        let projected = project(&coords, Canvas::INLINE).unwrap().unwrap();
        assert_eq!(projected.positions(), vec![[2.0, 2.0], [2.0, 2.0]]);
    }

    #[test]
    fn flat_line_uses_the_other_axis_scale() {
        let coords = Coordinates::from_json(&json!([[0, 5], [4, 5]])).unwrap();
        let projected = project(&coords, Canvas::new(40.0, 2.0)).unwrap().unwrap();
        // scale_y falls back to 1, which is smaller than 36 / 4
        assert_eq!(projected.positions(), vec![[2.0, 2.0], [6.0, 2.0]]);
    }

    #[test]
    fn aspect_ratio_is_kept() {
        let coords = Coordinates::from_json(&json!([[0, 0], [20, 10]])).unwrap();
        let projected = project(&coords, Canvas::new(40.0, 2.0)).unwrap().unwrap();
        assert_eq!(projected.positions(), vec![[2.0, 20.0], [38.0, 2.0]]);
    }

    #[test]
    fn empty_tree_projects_to_nothing() {
        let coords = Coordinates::from_json(&json!([])).unwrap();
        assert_eq!(project(&coords, Canvas::INLINE).unwrap(), None);
    }

    #[test]
    fn non_finite_positions_fail() {
        let coords = Coordinates::List(vec![
            Coordinates::Position([0.0, 0.0]),
            Coordinates::Position([f64::NAN, 1.0]),
        ]);
        assert!(project(&coords, Canvas::INLINE).is_err());
        let geometry = PreviewGeometry {
            kind: GeometryKind::LineString,
            coordinates: coords,
        };
        assert_eq!(
            preview_geometry(&geometry, Canvas::INLINE),
            Preview::Fallback(Fallback::Error)
        );
    }

    #[test]
    fn short_positions_are_rejected() {
        assert!(Coordinates::from_json(&json!([1])).is_err());
        assert!(Coordinates::from_json(&json!([[0, 0], [1, "x"]])).is_err());
        assert!(Coordinates::from_json(&json!("0 0")).is_err());
    }

    #[test]
    fn multipolygon_draws_outer_rings_only() {
        let geometry = PreviewGeometry::from_json(&json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0, 0], [10, 0], [10, 10], [0, 0]], [[2, 2], [3, 2], [3, 3], [2, 2]]],
                [[[20, 20], [30, 20], [30, 30], [20, 20]]]
            ]
        }))
        .unwrap();
        let projected = project(&geometry.coordinates, Canvas::INLINE).unwrap().unwrap();
        match shapes(&geometry.kind, &projected).unwrap() {
            Shape::Group(polygons) => {
                assert_eq!(polygons.len(), 2);
                assert!(polygons
                    .iter()
                    .all(|p| matches!(p, Shape::Polygon(points) if points.len() == 4)));
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn polygon_draws_all_rings_together() {
        let geometry = PreviewGeometry::from_json(&json!({
            "type": "Polygon",
            "coordinates": [
                [[0, 0], [10, 0], [10, 10], [0, 0]],
                [[2, 2], [3, 2], [3, 3], [2, 2]]
            ]
        }))
        .unwrap();
        let projected = project(&geometry.coordinates, Canvas::INLINE).unwrap().unwrap();
        assert!(matches!(
            shapes(&geometry.kind, &projected),
            Some(Shape::Polygon(points)) if points.len() == 8
        ));
    }

    #[test]
    fn declared_type_drives_grouping_of_irregular_input() {
        // MultiPoint written with an extra level of nesting
        let geometry = PreviewGeometry::from_json(&json!({
            "type": "MultiPoint",
            "coordinates": [[[0, 0]], [[4, 4]]]
        }))
        .unwrap();
        let projected = project(&geometry.coordinates, Canvas::INLINE).unwrap().unwrap();
        assert!(matches!(
            shapes(&geometry.kind, &projected),
            Some(Shape::Group(circles)) if circles.len() == 2
        ));
    }

    #[test]
    fn single_position_line_has_no_preview() {
        let preview = preview_json(
            &json!({"type": "LineString", "coordinates": [[1, 1]]}),
            Canvas::INLINE,
        );
        assert_eq!(preview, Preview::Fallback(Fallback::NotAvailable));
    }

    #[test]
    fn wkt_previews_render_svg() {
        let preview = preview_wkt("POINT(3 4)", Canvas::INLINE);
        match preview {
            Preview::Svg(svg) => {
                assert!(svg.starts_with("<svg"));
                assert!(svg.contains(r#"<circle cx="20" cy="20" r="3""#));
            }
            other => panic!("expected svg, got {other:?}"),
        }
        assert!(preview_wkt("LINESTRING(0 0,10 10)", Canvas::INLINE).is_svg());
        assert!(preview_wkt("MULTIPOLYGON(((0 0,1 0,1 1,0 0)))", Canvas::MODAL).is_svg());
    }

    struct LimitedWriter {
        written: String,
        limit: usize,
    }

    impl Write for LimitedWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            if self.written.len() + s.len() > self.limit {
                return Err(fmt::Error);
            }
            self.written.push_str(s);
            Ok(())
        }
    }

    #[test]
    fn svg_writer_errors_propagate() {
        let group = Shape::Group(vec![
            Shape::Circle {
                center: [1.0, 1.0],
                radius: 3.0,
            },
            Shape::Polyline(vec![[0.0, 0.0], [4.0, 4.0]]),
        ]);
        let document = SvgDocument {
            shape: &group,
            size: 40.0,
        };
        let full = document.to_string();
        assert!(full.ends_with("</g></svg>"));

        let mut out = LimitedWriter {
            written: String::new(),
            limit: full.len() - 1,
        };
        assert!(write!(out, "{document}").is_err());
        assert!(!out.written.contains("</svg>"));

        let mut out = LimitedWriter {
            written: String::new(),
            limit: full.len(),
        };
        assert!(write!(out, "{document}").is_ok());
        assert_eq!(out.written, full);
    }

    #[test]
    fn unreadable_wkt_falls_back() {
        for text in ["", "Error: Could not convert geometry", "POINT(1"] {
            assert_eq!(
                preview_wkt(text, Canvas::INLINE),
                Preview::Fallback(Fallback::InvalidGeometry)
            );
        }
        assert_eq!(
            preview_wkt("GEOMETRYCOLLECTION(POINT(1 1))", Canvas::INLINE),
            Preview::Fallback(Fallback::InvalidGeometry)
        );
    }

    #[test]
    fn unknown_types_fall_back_to_their_name() {
        let preview = preview_json(&json!({"type": "Circle", "coordinates": [0, 0]}), Canvas::INLINE);
        assert_eq!(preview, Preview::Fallback(Fallback::Unsupported("Circle".into())));
        assert_eq!(Fallback::Unsupported("Circle".into()).to_string(), "Circle");
        assert_eq!(Fallback::NotAvailable.to_string(), "Preview N/A");
    }

    proptest! {
        #[test]
        fn projected_positions_stay_inside_padding(
            raw in prop::collection::vec((-1e6f64..1e6, -1e6f64..1e6), 2..20)
        ) {
            let coords = Coordinates::List(
                raw.iter().map(|&(x, y)| Coordinates::Position([x, y])).collect(),
            );
            let canvas = Canvas::new(100.0, 5.0);
            let projected = project(&coords, canvas).unwrap().unwrap();
            for [x, y] in projected.positions() {
                prop_assert!((5.0 - 1e-9..=95.0 + 1e-9).contains(&x));
                prop_assert!((5.0 - 1e-9..=95.0 + 1e-9).contains(&y));
            }
        }
    }
}
