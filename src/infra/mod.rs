//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, geofence validation)
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{validate_replay_speed, Config, MIN_REPLAY_SPEED};
pub use metrics::{Metrics, MetricsSummary};
