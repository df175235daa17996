//! Domain models - core yard types, geometry and errors
//!
//! This module contains the canonical data types used throughout the system:
//! - `Entity` / `Crane` - tracked tags with a role and a position
//! - `Snapshot` - one tick worth of input for the alarm engine
//! - `AlarmKey` / `AlarmRecord` - identity and state of one hazard alarm
//! - `Region` - polygon and circle containment
//! - `InvalidRegion` / `EntityError` - error types

pub mod error;
pub mod geometry;
pub mod types;

pub use error::{EntityError, InvalidRegion};
pub use geometry::{Circle, Point, Polygon, Region};
pub use types::{AlarmKey, AlarmKind, AlarmRecord, Crane, Entity, EntityId, Position, Role, Snapshot};
