//! Alert log - writes alarm transitions to file
//!
//! Each activation or clear is appended as one JSON object per line.
//! Write failures are logged and swallowed; they never abort a tick.

use crate::domain::types::{AlarmKind, EntityId};
use crate::services::ledger::Notifier;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// One line of the alert log
#[derive(Debug, Clone, Serialize)]
struct AlertLine<'a> {
    site: &'a str,
    event: &'static str,
    entity: &'a str,
    kind: AlarmKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<u64>,
    logged_at: String,
}

/// An activation kept in memory
#[derive(Debug, Clone, PartialEq)]
pub struct RecentAlert {
    pub entity: EntityId,
    pub kind: AlarmKind,
    pub message: String,
    pub timestamp_ms: u64,
}

/// File-backed alarm notifier
pub struct AlertLog {
    site_id: String,
    file_path: PathBuf,
    max_recent: usize,
    /// Newest first
    recent: VecDeque<RecentAlert>,
    write_errors: u64,
}

impl AlertLog {
    pub fn new(site_id: &str, file_path: impl AsRef<Path>, max_recent: usize) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), max_recent = %max_recent, "alert_log_initialized");
        Self {
            site_id: site_id.to_string(),
            file_path,
            max_recent,
            recent: VecDeque::with_capacity(max_recent),
            write_errors: 0,
        }
    }

    /// Most recent activations, newest first
    pub fn recent(&self) -> impl Iterator<Item = &RecentAlert> {
        self.recent.iter()
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    fn write(&mut self, line: &AlertLine<'_>) {
        let result = serde_json::to_string(line)
            .map_err(std::io::Error::from)
            .and_then(|json| self.append_line(&json));

        if let Err(e) = result {
            self.write_errors += 1;
            error!(
                file = %self.file_path.display(),
                entity = %line.entity,
                kind = %line.kind,
                error = %e,
                "alert_write_failed"
            );
        }
    }

    /// Append a line to the alert file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path.display(), bytes = %line.len(), "alert_written");
        Ok(())
    }

    fn remember(&mut self, alert: RecentAlert) {
        if self.max_recent == 0 {
            return;
        }
        self.recent.push_front(alert);
        self.recent.truncate(self.max_recent);
    }
}

impl Notifier for AlertLog {
    fn on_alarm_activated(&mut self, entity: &EntityId, kind: AlarmKind, message: &str, timestamp_ms: u64) {
        info!(entity = %entity, kind = %kind, message = %message, ts = %timestamp_ms, "alarm_activated");

        let site = self.site_id.clone();
        self.write(&AlertLine {
            site: &site,
            event: "alarm_activated",
            entity: entity.as_str(),
            kind,
            message: Some(message),
            ts: Some(timestamp_ms),
            logged_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        self.remember(RecentAlert {
            entity: entity.clone(),
            kind,
            message: message.to_string(),
            timestamp_ms,
        });
    }

    fn on_alarm_cleared(&mut self, entity: &EntityId, kind: AlarmKind) {
        info!(entity = %entity, kind = %kind, "alarm_cleared");

        let site = self.site_id.clone();
        self.write(&AlertLine {
            site: &site,
            event: "alarm_cleared",
            entity: entity.as_str(),
            kind,
            message: None,
            ts: None,
            logged_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_activation_and_clear_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut log = AlertLog::new("yard-7", &path, 10);
        let id = EntityId::from("0x001A79");

        log.on_alarm_activated(&id, AlarmKind::Geofence, "Forklift 0x001A79 entered restricted zone", 1500);
        log.on_alarm_cleared(&id, AlarmKind::Geofence);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["site"], "yard-7");
        assert_eq!(lines[0]["event"], "alarm_activated");
        assert_eq!(lines[0]["entity"], "0x001A79");
        assert_eq!(lines[0]["kind"], "geofence");
        assert_eq!(lines[0]["message"], "Forklift 0x001A79 entered restricted zone");
        assert_eq!(lines[0]["ts"], 1500);
        assert!(lines[0]["logged_at"].as_str().unwrap().ends_with('Z'));

        assert_eq!(lines[1]["event"], "alarm_cleared");
        assert_eq!(lines[1]["kind"], "geofence");
        assert!(lines[1].get("message").is_none());
        assert!(lines[1].get("ts").is_none());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("alerts.jsonl");
        let mut log = AlertLog::new("yard", &path, 10);

        log.on_alarm_activated(&EntityId::from("C1"), AlarmKind::CraneProximity, "close", 1);

        assert!(path.exists());
        assert_eq!(log.write_errors(), 0);
    }

    #[test]
    fn test_recent_capped_newest_first() {
        let dir = tempdir().unwrap();
        let mut log = AlertLog::new("yard", dir.path().join("alerts.jsonl"), 3);

        for i in 0..5u64 {
            let id = EntityId::new(format!("tag{}", i));
            log.on_alarm_activated(&id, AlarmKind::CraneZone, "inside", i);
        }

        let ts: Vec<u64> = log.recent().map(|a| a.timestamp_ms).collect();
        assert_eq!(ts, vec![4, 3, 2]);
    }

    #[test]
    fn test_clears_not_remembered() {
        let dir = tempdir().unwrap();
        let mut log = AlertLog::new("yard", dir.path().join("alerts.jsonl"), 3);
        log.on_alarm_cleared(&EntityId::from("tag"), AlarmKind::CraneZone);
        assert_eq!(log.recent().count(), 0);
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let mut log = AlertLog::new("yard", dir.path(), 2);

        log.on_alarm_activated(&EntityId::from("tag"), AlarmKind::Geofence, "inside", 9);

        assert_eq!(log.write_errors(), 1);
        assert_eq!(log.recent().count(), 1);
    }
}
