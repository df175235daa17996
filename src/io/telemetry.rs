//! Telemetry ingestion from positioning-system logs
//!
//! Lines of interest look like:
//! `$PEKIO,COORD,<seq>,<serial>,<x>,<y>,<z>,<info>,<timestamp>`
//! where the timestamp is epoch seconds (fractional). Every other line is
//! ignored. Coordinates may be empty when the tag could not be located;
//! such frames still update the tag registry, without a position.

use crate::domain::geometry::Region;
use crate::domain::types::{Crane, Entity, EntityId, Position, Role, Snapshot};
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const COORD_PREFIX: &str = "$PEKIO,COORD";

/// One parsed position frame
#[derive(Debug, Clone, PartialEq)]
pub struct CoordRecord {
    pub seq: String,
    pub serial: String,
    pub position: Option<Position>,
    pub info: String,
    pub timestamp_ms: u64,
}

/// A `$PEKIO,COORD` line that could not be used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("missing tag serial number")]
    MissingSerial,
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
}

/// Parse one log line.
///
/// Returns `Ok(None)` for lines that are not coordinate frames.
pub fn parse_line(line: &str) -> Result<Option<CoordRecord>, TelemetryError> {
    let line = line.trim();
    if !line.starts_with(COORD_PREFIX) {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let field = |idx: usize| fields.get(idx).copied().unwrap_or("");

    let serial = field(3);
    if serial.is_empty() {
        return Err(TelemetryError::MissingSerial);
    }

    let timestamp_ms = parse_timestamp(field(8))?;

    Ok(Some(CoordRecord {
        seq: field(2).to_string(),
        serial: serial.to_string(),
        position: parse_position(field(4), field(5), field(6)),
        info: field(7).to_string(),
        timestamp_ms,
    }))
}

fn parse_position(x: &str, y: &str, z: &str) -> Option<Position> {
    let x = x.parse::<f64>().ok()?;
    let y = y.parse::<f64>().ok()?;
    let z = z.parse::<f64>().ok()?;
    let position = Position::new(x, y, z);
    position.is_finite().then_some(position)
}

fn parse_timestamp(raw: &str) -> Result<u64, TelemetryError> {
    let ms = match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => (secs * 1000.0).round(),
        _ => return Err(TelemetryError::Timestamp(raw.to_string())),
    };
    // u64::MAX as f64 is 2^64, so anything below converts exactly in range
    if ms < u64::MAX as f64 {
        Ok(ms as u64)
    } else {
        Err(TelemetryError::Timestamp(raw.to_string()))
    }
}

/// Parse every coordinate frame in `text`, skipping malformed ones
pub fn parse_log(text: &str) -> Vec<CoordRecord> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!(line = %(idx + 1), error = %e, "telemetry_line_dropped"),
        }
    }
    records
}

/// Read and parse a telemetry log file
pub fn read_log<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<CoordRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read telemetry log {}", path.display()))?;
    let records = parse_log(&text);
    info!(file = %path.display(), records = %records.len(), "telemetry_loaded");
    Ok(records)
}

/// Tag registry that turns a stream of frames into per-tick snapshots
pub struct SnapshotBuilder {
    sequence: String,
    geofences: Vec<Region>,
    tag_roles: HashMap<String, Role>,
    /// Last frame per tag, ordered by serial
    tags: BTreeMap<String, CoordRecord>,
}

impl SnapshotBuilder {
    pub fn new(sequence: impl Into<String>, geofences: Vec<Region>, tag_roles: HashMap<String, Role>) -> Self {
        Self { sequence: sequence.into(), geofences, tag_roles, tags: BTreeMap::new() }
    }

    /// Record the latest frame for a tag
    pub fn apply(&mut self, record: CoordRecord) {
        if !self.tags.contains_key(&record.serial) {
            debug!(
                serial = %record.serial,
                role = %self.role_of(&record.serial).as_str(),
                "tag_registered"
            );
        }
        self.tags.insert(record.serial.clone(), record);
    }

    pub fn role_of(&self, serial: &str) -> Role {
        self.tag_roles.get(serial).copied().unwrap_or_default()
    }

    /// Number of tags seen so far
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Switch the active sequence and its geofences
    pub fn set_sequence(&mut self, sequence: impl Into<String>, geofences: Vec<Region>) {
        self.sequence = sequence.into();
        self.geofences = geofences;
    }

    /// Build the engine input for the tick at `now_ms`
    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        let mut snapshot = Snapshot::new(self.sequence.clone(), now_ms);
        snapshot.geofences = self.geofences.clone();

        for (serial, record) in &self.tags {
            let role = self.role_of(serial);
            let entity = Entity {
                id: EntityId::new(serial.as_str()),
                role,
                position: record.position,
                timestamp_ms: record.timestamp_ms,
            };

            if role == Role::Crane {
                snapshot.cranes.push(match record.position {
                    Some(p) => Crane::new(serial.as_str(), p.x, p.y, p.z),
                    None => Crane::without_position(serial.as_str()),
                });
            }
            snapshot.entities.insert(entity.id.clone(), entity);
        }

        snapshot
    }
}
