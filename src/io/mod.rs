//! I/O layer - telemetry input and alert output
//!
//! - `telemetry` - `$PEKIO,COORD` log parsing and the tag registry that builds snapshots
//! - `replay` - Paced replay of telemetry into the monitor channel
//! - `alert_log` - JSONL alert file implementing `Notifier`

pub mod alert_log;
pub mod replay;
pub mod telemetry;

pub use alert_log::{AlertLog, RecentAlert};
pub use replay::{group_into_ticks, Replay, ReplayStats, TickWindow};
pub use telemetry::{parse_line, parse_log, read_log, CoordRecord, SnapshotBuilder, TelemetryError};
