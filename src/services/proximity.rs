//! Horizontal distance checks between tracked entities
//!
//! Only x/y take part; z is reserved for the crane-zone radius.

use crate::domain::types::Position;

/// 2D Euclidean distance between the horizontal positions of `a` and `b`
#[inline]
pub fn distance(a: Position, b: Position) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Strictly closer than `threshold` meters
#[inline]
pub fn within(a: Position, b: Position, threshold: f64) -> bool {
    distance(a, b) < threshold
}

/// Closest of `others` that lies within `threshold` of `origin`, with its distance
pub fn nearest_within<'a, T>(
    origin: Position,
    others: impl IntoIterator<Item = (&'a T, Position)>,
    threshold: f64,
) -> Option<(&'a T, f64)>
where
    T: ?Sized + 'a,
{
    others
        .into_iter()
        .filter(|&(_, pos)| within(origin, pos, threshold))
        .map(|(item, pos)| (item, distance(origin, pos)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
