//! Feature geometry and its command-stream encoding.
//!
//! Geometries travel as a sequence of `MoveTo`, `LineTo` and `ClosePath`
//! commands with zig-zag encoded deltas relative to a cursor that persists
//! across the whole feature.

use super::error::{TileError, TileResult};
use super::proto::GeomType;

const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

/// Spline degree assumed when a spline feature does not carry one.
pub const DEFAULT_SPLINE_DEGREE: u32 = 3;

/// A position on the tile-local integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePoint {
    pub x: i32,
    pub y: i32,
}

impl TilePoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for TilePoint {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Logical geometry of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// One or more points.
    Point(Vec<TilePoint>),
    /// One or more paths.
    LineString(Vec<Vec<TilePoint>>),
    /// One or more rings, without the repeated closing vertex.
    /// Winding order distinguishes exterior from interior rings and is kept as is.
    Polygon(Vec<Vec<TilePoint>>),
    /// A single control path with its knot vector.
    Spline {
        path: Vec<TilePoint>,
        knots: Vec<f64>,
        degree: u32,
    },
}

impl Geometry {
    /// The wire geometry kind.
    pub fn geom_type(&self) -> GeomType {
        match self {
            Geometry::Point(_) => GeomType::Point,
            Geometry::LineString(_) => GeomType::Linestring,
            Geometry::Polygon(_) => GeomType::Polygon,
            Geometry::Spline { .. } => GeomType::Spline,
        }
    }

    /// First coordinate of the geometry, whatever its kind.
    pub fn first_point(&self) -> Option<TilePoint> {
        match self {
            Geometry::Point(points) => points.first().copied(),
            Geometry::LineString(paths) | Geometry::Polygon(paths) => {
                paths.iter().find_map(|p| p.first().copied())
            }
            Geometry::Spline { path, .. } => path.first().copied(),
        }
    }

    /// Rescales every coordinate from a grid of `from` units per tile edge
    /// to one of `to` units, rounding to the nearest unit. Spline knots are
    /// parametric and stay as they are.
    pub fn rescale(&mut self, from: u32, to: u32) {
        if from == to || from == 0 {
            return;
        }
        let factor = f64::from(to) / f64::from(from);
        let scale = |p: &mut TilePoint| {
            p.x = (f64::from(p.x) * factor).round() as i32;
            p.y = (f64::from(p.y) * factor).round() as i32;
        };
        match self {
            Geometry::Point(points) | Geometry::Spline { path: points, .. } => {
                points.iter_mut().for_each(scale)
            }
            Geometry::LineString(paths) | Geometry::Polygon(paths) => {
                paths.iter_mut().flatten().for_each(scale)
            }
        }
    }

    /// Decodes a feature's command stream according to its declared type.
    pub(crate) fn decode(
        layer: &str,
        geom_type: i32,
        commands: &[u32],
        knots: &[f64],
        degree: Option<u32>,
    ) -> TileResult<Self> {
        let kind = GeomType::try_from(geom_type)
            .map_err(|_| TileError::UnsupportedGeometry(geom_type))?;
        let malformed = |reason: String| TileError::Geometry {
            layer: layer.to_string(),
            reason,
        };

        let paths = decode_paths(commands).map_err(malformed)?;
        match kind {
            GeomType::Point => Ok(Geometry::Point(paths.into_iter().flatten().collect())),
            GeomType::Linestring => Ok(Geometry::LineString(paths)),
            GeomType::Polygon => Ok(Geometry::Polygon(paths)),
            GeomType::Spline => {
                if paths.len() > 1 {
                    return Err(malformed(format!(
                        "spline with {} control paths",
                        paths.len()
                    )));
                }
                Ok(Geometry::Spline {
                    path: paths.into_iter().next().unwrap_or_default(),
                    knots: knots.to_vec(),
                    degree: degree.unwrap_or(DEFAULT_SPLINE_DEGREE),
                })
            }
            GeomType::Unknown => Err(TileError::UnsupportedGeometry(geom_type)),
        }
    }

    /// Encodes the geometry back into a command stream.
    pub(crate) fn encode(&self) -> Vec<u32> {
        let mut encoder = CommandEncoder::default();
        match self {
            Geometry::Point(points) => encoder.points(points),
            Geometry::LineString(paths) => {
                for path in paths {
                    encoder.path(path, false);
                }
            }
            Geometry::Polygon(rings) => {
                for ring in rings {
                    encoder.path(ring, true);
                }
            }
            Geometry::Spline { path, .. } => encoder.path(path, false),
        }
        encoder.commands
    }
}

#[inline]
fn command(id: u32, count: usize) -> u32 {
    (id & 0x7) | ((count as u32) << 3)
}

#[inline]
fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Splits a command stream into paths. Every `MoveTo` point starts a path.
fn decode_paths(commands: &[u32]) -> Result<Vec<Vec<TilePoint>>, String> {
    let mut paths: Vec<Vec<TilePoint>> = Vec::new();
    let (mut x, mut y) = (0i32, 0i32);
    let mut i = 0;

    while i < commands.len() {
        let id = commands[i] & 0x7;
        let count = (commands[i] >> 3) as usize;
        i += 1;

        match id {
            MOVE_TO | LINE_TO => {
                if commands.len() - i < count * 2 {
                    return Err(format!("command at {} needs {} parameters", i - 1, count * 2));
                }
                for _ in 0..count {
                    x = x.wrapping_add(unzigzag(commands[i]));
                    y = y.wrapping_add(unzigzag(commands[i + 1]));
                    i += 2;
                    let point = TilePoint::new(x, y);
                    if id == MOVE_TO {
                        paths.push(vec![point]);
                    } else {
                        match paths.last_mut() {
                            Some(path) => path.push(point),
                            None => return Err("LineTo before MoveTo".to_string()),
                        }
                    }
                }
            }
            CLOSE_PATH => {
                if paths.is_empty() {
                    return Err("ClosePath before MoveTo".to_string());
                }
            }
            other => return Err(format!("unknown command {}", other)),
        }
    }

    Ok(paths)
}

#[derive(Default)]
struct CommandEncoder {
    commands: Vec<u32>,
    cursor: (i32, i32),
}

impl CommandEncoder {
    fn push_point(&mut self, p: TilePoint) {
        self.commands.push(zigzag(p.x.wrapping_sub(self.cursor.0)));
        self.commands.push(zigzag(p.y.wrapping_sub(self.cursor.1)));
        self.cursor = (p.x, p.y);
    }

    fn points(&mut self, points: &[TilePoint]) {
        if points.is_empty() {
            return;
        }
        self.commands.push(command(MOVE_TO, points.len()));
        for p in points {
            self.push_point(*p);
        }
    }

    fn path(&mut self, path: &[TilePoint], ring: bool) {
        let path = match (ring, path) {
            (true, [first, .., last]) if first == last => &path[..path.len() - 1],
            _ => path,
        };
        let Some((first, rest)) = path.split_first() else {
            return;
        };

        self.commands.push(command(MOVE_TO, 1));
        self.push_point(*first);
        if !rest.is_empty() {
            self.commands.push(command(LINE_TO, rest.len()));
            for p in rest {
                self.push_point(*p);
            }
        }
        if ring {
            self.commands.push(command(CLOSE_PATH, 1));
        }
    }
}
