//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! Geofences are validated while loading, so a malformed polygon fails
//! startup instead of reaching the alarm engine.

use crate::domain::geometry::Region;
use crate::domain::types::Role;
use crate::services::rules::{
    Thresholds, DEFAULT_CRANE_CRANE_M, DEFAULT_FORKLIFT_OPERATOR_M, STEELMAKING_SEQUENCE,
};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Yard identifier written into alert records
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "yard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Active operating sequence
    #[serde(default = "default_sequence")]
    pub sequence: String,
    /// Telemetry time covered by one snapshot (ms)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { sequence: default_sequence(), tick_interval_ms: default_tick_interval_ms() }
    }
}

fn default_sequence() -> String {
    STEELMAKING_SEQUENCE.to_string()
}

fn default_tick_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_forklift_operator_m")]
    pub forklift_operator_m: f64,
    #[serde(default = "default_crane_crane_m")]
    pub crane_crane_m: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            forklift_operator_m: default_forklift_operator_m(),
            crane_crane_m: default_crane_crane_m(),
        }
    }
}

fn default_forklift_operator_m() -> f64 {
    DEFAULT_FORKLIFT_OPERATOR_M
}

fn default_crane_crane_m() -> f64 {
    DEFAULT_CRANE_CRANE_M
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SequenceConfig {
    /// Geofence quadrilaterals as lists of [x, y] vertices
    #[serde(default)]
    pub geofences: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// File path for alert records (JSONL format)
    #[serde(default = "default_alerts_file")]
    pub file: String,
    /// Number of most recent activations kept in memory
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { file: default_alerts_file(), max_recent: default_max_recent() }
    }
}

fn default_alerts_file() -> String {
    "alerts.jsonl".to_string()
}

fn default_max_recent() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Playback speed relative to telemetry time (0 = as fast as possible)
    #[serde(default = "default_replay_speed")]
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { speed: default_replay_speed() }
    }
}

fn default_replay_speed() -> f64 {
    1.0
}

/// Slowest accepted non-zero playback speed
pub const MIN_REPLAY_SPEED: f64 = 0.001;

/// A playback speed is 0 (unpaced) or at least `MIN_REPLAY_SPEED`
pub fn validate_replay_speed(speed: f64) -> anyhow::Result<()> {
    if speed == 0.0 || (speed.is_finite() && speed >= MIN_REPLAY_SPEED) {
        Ok(())
    } else {
        anyhow::bail!("replay speed must be 0 or a finite number >= {}, got {}", MIN_REPLAY_SPEED, speed)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    /// Tag serial number -> role name
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub sequences: HashMap<String, SequenceConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    sequence: String,
    tick_interval_ms: u64,
    thresholds: Thresholds,
    tag_roles: HashMap<String, Role>,
    geofences: HashMap<String, Vec<Region>>,
    alerts_file: String,
    alerts_max_recent: usize,
    metrics_interval_secs: u64,
    replay_speed: f64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            sequence: default_sequence(),
            tick_interval_ms: default_tick_interval_ms(),
            thresholds: Thresholds::default(),
            tag_roles: HashMap::new(),
            geofences: HashMap::new(),
            alerts_file: default_alerts_file(),
            alerts_max_recent: default_max_recent(),
            metrics_interval_secs: default_metrics_interval(),
            replay_speed: default_replay_speed(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config file {}", path.display()))?;
        config.config_file = path.display().to_string();
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Failed to parse TOML")?;
        Self::from_toml(toml_config)
    }

    fn from_toml(toml_config: TomlConfig) -> anyhow::Result<Self> {
        let thresholds = Thresholds {
            forklift_operator_m: toml_config.thresholds.forklift_operator_m,
            crane_crane_m: toml_config.thresholds.crane_crane_m,
        };
        for (name, value) in [
            ("forklift_operator_m", thresholds.forklift_operator_m),
            ("crane_crane_m", thresholds.crane_crane_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("threshold {} must be a non-negative number, got {}", name, value);
            }
        }

        if toml_config.monitor.tick_interval_ms == 0 {
            anyhow::bail!("monitor.tick_interval_ms must be greater than zero");
        }

        validate_replay_speed(toml_config.replay.speed).context("invalid replay.speed")?;

        let tag_roles: HashMap<String, Role> = toml_config
            .tags
            .into_iter()
            .map(|(serial, name)| {
                let role = name.parse::<Role>().unwrap_or_default();
                if role == Role::Other && !name.trim().eq_ignore_ascii_case("other") {
                    warn!(serial = %serial, role = %name, "unrecognized_tag_role");
                }
                (serial, role)
            })
            .collect();

        // Register geofences; any malformed polygon is a configuration error
        let mut geofences = HashMap::new();
        for (name, sequence) in toml_config.sequences {
            let regions = sequence
                .geofences
                .into_iter()
                .enumerate()
                .map(|(idx, vertices)| {
                    Region::geofence(vertices)
                        .with_context(|| format!("sequence '{}' geofence #{}", name, idx))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            geofences.insert(name, regions);
        }

        Ok(Self {
            site_id: toml_config.site.id,
            sequence: toml_config.monitor.sequence,
            tick_interval_ms: toml_config.monitor.tick_interval_ms,
            thresholds,
            tag_roles,
            geofences,
            alerts_file: toml_config.alerts.file,
            alerts_max_recent: toml_config.alerts.max_recent,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            replay_speed: toml_config.replay.speed,
            config_file: "inline".to_string(),
        })
    }

    /// Role of a tag; unlisted tags are `Other`
    pub fn tag_role(&self, serial: &str) -> Role {
        self.tag_roles.get(serial).copied().unwrap_or_default()
    }

    /// Geofences registered for a sequence (empty if none)
    pub fn geofences(&self, sequence: &str) -> &[Region] {
        self.geofences.get(sequence).map(Vec::as_slice).unwrap_or(&[])
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn tag_roles(&self) -> &HashMap<String, Role> {
        &self.tag_roles
    }

    pub fn alerts_file(&self) -> &str {
        &self.alerts_file
    }

    pub fn alerts_max_recent(&self) -> usize {
        self.alerts_max_recent
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn replay_speed(&self) -> f64 {
        self.replay_speed
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the active sequence (e.g. from the command line)
    pub fn with_sequence(mut self, sequence: &str) -> Self {
        self.sequence = sequence.to_string();
        self
    }

    /// Builder method to override playback speed
    pub fn with_replay_speed(mut self, speed: f64) -> Self {
        self.replay_speed = speed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::InvalidRegion;
    use crate::domain::geometry::Point;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "yard");
        assert_eq!(config.sequence(), "Steelmaking Sequence");
        assert_eq!(config.tick_interval_ms(), 100);
        assert_eq!(config.thresholds(), Thresholds::default());
        assert_eq!(config.alerts_file(), "alerts.jsonl");
        assert_eq!(config.alerts_max_recent(), 10);
        assert_eq!(config.metrics_interval_secs(), 10);
        assert!(config.geofences("Steelmaking Sequence").is_empty());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.sequence(), "Steelmaking Sequence");
        assert_eq!(config.thresholds().forklift_operator_m, 3.0);
        assert_eq!(config.thresholds().crane_crane_m, 5.0);
        assert_eq!(config.replay_speed(), 1.0);
    }

    #[test]
    fn test_tag_roles() {
        let config = Config::from_toml_str(
            r#"
[tags]
"0x000EBC" = "crane"
"0x001A79" = "forklift"
"0x001A2C" = "Operator"
"0x00FFFF" = "visitor"
"#,
        )
        .unwrap();

        assert_eq!(config.tag_role("0x000EBC"), Role::Crane);
        assert_eq!(config.tag_role("0x001A79"), Role::Forklift);
        assert_eq!(config.tag_role("0x001A2C"), Role::Operator);
        assert_eq!(config.tag_role("0x00FFFF"), Role::Other);
        assert_eq!(config.tag_role("0xFFFFFF"), Role::Other);
    }

    #[test]
    fn test_geofences_registered_per_sequence() {
        let config = Config::from_toml_str(
            r#"
[sequences."Tandem Lift"]
geofences = [
    [[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]],
    [[20.0, 0.0], [20.0, 5.0], [25.0, 5.0], [25.0, 0.0]],
]
"#,
        )
        .unwrap();

        let fences = config.geofences("Tandem Lift");
        assert_eq!(fences.len(), 2);
        assert!(fences[0].contains(Point::new(5.0, 5.0)));
        assert!(fences[1].contains(Point::new(22.0, 2.0)));
        assert!(config.geofences("Bricklayers Lift").is_empty());
    }

    #[test]
    fn test_collinear_geofence_rejected() {
        let err = Config::from_toml_str(
            r#"
[sequences."Steelmaking Sequence"]
geofences = [[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]]
"#,
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Steelmaking Sequence"));
        assert!(err.chain().any(|cause| {
            matches!(cause.downcast_ref::<InvalidRegion>(), Some(InvalidRegion::Collinear(..)))
        }));
    }

    #[test]
    fn test_triangle_geofence_rejected() {
        let err = Config::from_toml_str(
            r#"
[sequences."Tandem Lift"]
geofences = [[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]]
"#,
        )
        .unwrap_err();

        assert!(err
            .chain()
            .any(|cause| cause.downcast_ref::<InvalidRegion>() == Some(&InvalidRegion::VertexCount(3))));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let result = Config::from_toml_str(
            r#"
[thresholds]
forklift_operator_m = -1.0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let result = Config::from_toml_str(
            r#"
[monitor]
tick_interval_ms = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_builders() {
        let config = Config::default().with_sequence("Tandem Lift").with_replay_speed(0.0);
        assert_eq!(config.sequence(), "Tandem Lift");
        assert_eq!(config.replay_speed(), 0.0);
    }

    #[test]
    fn test_validate_replay_speed() {
        assert!(validate_replay_speed(0.0).is_ok());
        assert!(validate_replay_speed(1.0).is_ok());
        assert!(validate_replay_speed(MIN_REPLAY_SPEED).is_ok());
        assert!(validate_replay_speed(1e-300).is_err());
        assert!(validate_replay_speed(-1.0).is_err());
        assert!(validate_replay_speed(f64::INFINITY).is_err());
        assert!(validate_replay_speed(f64::NAN).is_err());
    }

    #[test]
    fn test_tiny_replay_speed_rejected() {
        let result = Config::from_toml_str(
            r#"
[replay]
speed = 1e-300
"#,
        );
        assert!(result.is_err());
    }
}
