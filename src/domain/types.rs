//! Shared types for yard monitoring

use crate::domain::error::EntityError;
use crate::domain::geometry::Region;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Newtype wrapper for tag identifiers (serial numbers) to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role of a tracked entity in the yard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Forklift,
    Operator,
    Crane,
    #[default]
    Other,
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "forklift" => Role::Forklift,
            "operator" => Role::Operator,
            "crane" => Role::Crane,
            _ => Role::Other,
        })
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Forklift => "forklift",
            Role::Operator => "operator",
            Role::Crane => "crane",
            Role::Other => "other",
        }
    }

    /// Human-readable name used in alarm messages
    pub fn label(&self) -> &'static str {
        match self {
            Role::Forklift => "Forklift",
            Role::Operator => "Operator",
            Role::Crane => "Crane",
            Role::Other => "Tag",
        }
    }

    /// Ground personnel and vehicles subject to zone checks
    #[inline]
    pub fn is_ground(&self) -> bool {
        matches!(self, Role::Forklift | Role::Operator)
    }
}

/// Position in yard coordinates (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One tracked entity as seen in a single snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub role: Role,
    /// None when the last telemetry frame carried no usable coordinates
    pub position: Option<Position>,
    /// Epoch ms of the telemetry frame
    pub timestamp_ms: u64,
}

impl Entity {
    pub fn new(id: impl Into<String>, role: Role, position: Position, timestamp_ms: u64) -> Self {
        Self { id: EntityId::new(id), role, position: Some(position), timestamp_ms }
    }

    pub fn without_position(id: impl Into<String>, role: Role, timestamp_ms: u64) -> Self {
        Self { id: EntityId::new(id), role, position: None, timestamp_ms }
    }

    /// Usable position for this tick
    pub fn position(&self) -> Result<Position, EntityError> {
        match self.position {
            Some(p) if p.is_finite() => Ok(p),
            _ => Err(EntityError::MissingPosition(self.id.clone())),
        }
    }
}

/// A crane and its position. `position.z` doubles as its exclusion radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Crane {
    pub id: EntityId,
    pub position: Position,
}

impl Crane {
    pub fn new(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self { id: EntityId::new(id), position: Position::new(x, y, z) }
    }

    /// A crane whose last frame carried no coordinates; the engine skips it
    pub fn without_position(id: impl Into<String>) -> Self {
        Self { id: EntityId::new(id), position: Position::new(f64::NAN, f64::NAN, f64::NAN) }
    }
}

/// Everything the engine needs to evaluate one tick
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub sequence: String,
    pub entities: HashMap<EntityId, Entity>,
    pub cranes: Vec<Crane>,
    pub geofences: Vec<Region>,
    /// Epoch ms of the tick
    pub now_ms: u64,
}

impl Snapshot {
    pub fn new(sequence: impl Into<String>, now_ms: u64) -> Self {
        Self { sequence: sequence.into(), now_ms, ..Default::default() }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.insert(entity.id.clone(), entity);
        self
    }

    pub fn with_crane(mut self, crane: Crane) -> Self {
        self.cranes.push(crane);
        self
    }

    pub fn with_geofence(mut self, region: Region) -> Self {
        self.geofences.push(region);
        self
    }
}

/// Kind of hazard an alarm represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    Geofence,
    CraneZone,
    CraneProximity,
    ForkliftOperatorProximity,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::Geofence => "geofence",
            AlarmKind::CraneZone => "crane_zone",
            AlarmKind::CraneProximity => "crane_proximity",
            AlarmKind::ForkliftOperatorProximity => "forklift_operator_proximity",
        }
    }
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one monitored hazard condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmKey {
    pub entity: EntityId,
    pub kind: AlarmKind,
}

impl AlarmKey {
    pub fn new(entity: impl Into<EntityId>, kind: AlarmKind) -> Self {
        Self { entity: entity.into(), kind }
    }
}

/// An active alarm
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRecord {
    pub message: String,
    /// Epoch ms of the rising edge
    pub activated_at: u64,
}
