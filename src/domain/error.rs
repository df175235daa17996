//! Error types raised by the monitoring core

use crate::domain::types::EntityId;
use thiserror::Error;

/// A region definition rejected at registration time.
///
/// This is a configuration error: the engine never sees an unvalidated geofence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidRegion {
    #[error("invalid region: geofence needs exactly 4 vertices, got {0}")]
    VertexCount(usize),
    #[error("invalid region: vertices {0}, {1}, {2} are collinear")]
    Collinear(usize, usize, usize),
    #[error("invalid region: vertex {0} is not a finite coordinate")]
    NonFinite(usize),
    #[error("invalid region: circle radius {0} must be finite and non-negative")]
    Radius(f64),
}

/// Per-entity problems that skip the entity for one tick only
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity {0} has no valid position")]
    MissingPosition(EntityId),
}
