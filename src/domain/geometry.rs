//! Point-in-region containment for geofences and crane zones
//!
//! Polygons use the even-odd (crossing number) rule with a ray cast in +x.
//! A point lying exactly on a polygon edge or vertex counts as inside, the
//! same way a point on a circle's boundary does.
//!
//! Geofence polygons are validated once when registered
//! (`Region::geofence`), never during containment checks.

use crate::domain::error::InvalidRegion;
use crate::domain::types::Position;
use serde::{Deserialize, Serialize};

/// Tolerance for on-edge tests (meters)
const EDGE_EPSILON: f64 = 1e-9;

/// Minimum |signed area| for a vertex triple to count as non-degenerate (m²)
const AREA_EPSILON: f64 = 1e-9;

/// Number of vertices a geofence must have
pub const GEOFENCE_VERTICES: usize = 4;

/// Horizontal point in yard coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for Point {
    fn from(p: Position) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// Ordered ring of vertices (closing edge implied)
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// Build a polygon without geofence validation
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Crossing-number test; boundary points are inside
    pub fn contains(&self, p: Point) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];

            if on_segment(p, a, b) {
                return true;
            }

            // Half-open rule on y so a vertex shared by two edges is counted once
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Circle with boundary-inclusive containment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Validated constructor for authored circles
    pub fn try_new(center: Point, radius: f64) -> Result<Self, InvalidRegion> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(InvalidRegion::Radius(radius));
        }
        Ok(Self { center, radius })
    }

    /// Exclusion zone of a crane: centered on its x/y, radius = its z
    pub fn crane_zone(position: Position) -> Self {
        Self { center: Point::new(position.x, position.y), radius: position.z }
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        (p.x - self.center.x).hypot(p.y - self.center.y) <= self.radius
    }
}

/// A spatial area used for containment tests
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Polygon(Polygon),
    Circle(Circle),
}

impl Region {
    /// Register a geofence polygon, rejecting malformed quadrilaterals
    pub fn geofence<P: Into<Point>>(
        vertices: impl IntoIterator<Item = P>,
    ) -> Result<Self, InvalidRegion> {
        let vertices: Vec<Point> = vertices.into_iter().map(Into::into).collect();
        validate_geofence_polygon(&vertices)?;
        Ok(Region::Polygon(Polygon::new(vertices)))
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        contains(p, self)
    }
}

/// Containment test for any region
pub fn contains(p: Point, region: &Region) -> bool {
    match region {
        Region::Polygon(polygon) => polygon.contains(p),
        Region::Circle(circle) => circle.contains(p),
    }
}

/// Check that `vertices` form a usable geofence quadrilateral.
///
/// Requires exactly four finite vertices, and every cyclically consecutive
/// triple must enclose a non-zero signed area.
pub fn validate_geofence_polygon(vertices: &[Point]) -> Result<(), InvalidRegion> {
    if vertices.len() != GEOFENCE_VERTICES {
        return Err(InvalidRegion::VertexCount(vertices.len()));
    }

    if let Some(idx) = vertices.iter().position(|v| !v.x.is_finite() || !v.y.is_finite()) {
        return Err(InvalidRegion::NonFinite(idx));
    }

    let n = vertices.len();
    for i in 0..n {
        let (j, k) = ((i + 1) % n, (i + 2) % n);
        if signed_area(vertices[i], vertices[j], vertices[k]).abs() <= AREA_EPSILON {
            return Err(InvalidRegion::Collinear(i, j, k));
        }
    }
    Ok(())
}

/// Signed area of triangle (a, b, c); positive when counter-clockwise
#[inline]
fn signed_area(a: Point, b: Point, c: Point) -> f64 {
    0.5 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y))
}

/// True if `p` lies on segment a-b (within `EDGE_EPSILON`)
fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let len = (b.x - a.x).hypot(b.y - a.y);
    if cross.abs() > EDGE_EPSILON * len.max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}
