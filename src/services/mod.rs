//! Services - alarm detection and state management
//!
//! This module contains the core monitoring logic:
//! - `proximity` - Horizontal distance checks between entities
//! - `rules` - Per-sequence selection of enabled checks and thresholds
//! - `ledger` - Edge-triggered alarm state and the `Notifier` interface
//! - `engine` - Evaluates one snapshot and drives the ledger
//! - `monitor` - Serialized tick loop for a monitoring session

pub mod engine;
pub mod ledger;
pub mod monitor;
pub mod proximity;
pub mod rules;

// Re-export commonly used types
pub use engine::{AlarmEngine, TickReport};
pub use ledger::{AlarmLedger, AlarmNotification, Notifier};
pub use monitor::Monitor;
pub use rules::{SequenceRuleTable, SequenceRules, Thresholds};
