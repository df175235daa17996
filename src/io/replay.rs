//! Telemetry replay into the monitor
//!
//! Frames are grouped into fixed windows of telemetry time; each window
//! yields one snapshot and every snapshot is delivered. With a non-zero
//! speed the replay is paced against the telemetry clock; a monitor that
//! falls behind holds the replay back rather than losing windows. At speed 0
//! snapshots go out as fast as the monitor consumes them.

use crate::domain::types::Snapshot;
use crate::infra::metrics::Metrics;
use crate::io::telemetry::{CoordRecord, SnapshotBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Frames belonging to one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickWindow {
    /// Telemetry time at the end of the window (epoch ms)
    pub tick_ms: u64,
    pub records: Vec<CoordRecord>,
}

/// Group frames into windows of `tick_interval_ms`, aligned on the first frame.
///
/// Windows without frames are not produced. Frames whose window end does not
/// fit in a u64 are dropped.
pub fn group_into_ticks(mut records: Vec<CoordRecord>, tick_interval_ms: u64) -> Vec<TickWindow> {
    let tick_interval_ms = tick_interval_ms.max(1);
    records.sort_by_key(|r| r.timestamp_ms);

    let Some(origin) = records.first().map(|r| r.timestamp_ms) else {
        return Vec::new();
    };

    let mut windows: Vec<TickWindow> = Vec::new();
    for record in records {
        let idx = (record.timestamp_ms - origin) / tick_interval_ms;
        let tick_ms = idx
            .checked_add(1)
            .and_then(|n| n.checked_mul(tick_interval_ms))
            .and_then(|end| origin.checked_add(end));
        let Some(tick_ms) = tick_ms else {
            warn!(serial = %record.serial, ts = %record.timestamp_ms, "telemetry_frame_out_of_range");
            continue;
        };
        match windows.last_mut() {
            Some(window) if window.tick_ms == tick_ms => window.records.push(record),
            _ => windows.push(TickWindow { tick_ms, records: vec![record] }),
        }
    }
    windows
}

/// Wall-clock pause between two ticks `gap_ms` apart at `speed`
fn pacing_delay(gap_ms: u64, speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(gap_ms as f64 / 1000.0 / speed).ok()
}

/// Outcome of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub ticks_sent: u64,
    /// Ticks that waited for the monitor to make room
    pub ticks_delayed: u64,
    pub interrupted: bool,
}

pub struct Replay {
    windows: Vec<TickWindow>,
    builder: SnapshotBuilder,
    speed: f64,
    metrics: Arc<Metrics>,
}

impl Replay {
    pub fn new(
        records: Vec<CoordRecord>,
        builder: SnapshotBuilder,
        tick_interval_ms: u64,
        speed: f64,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { windows: group_into_ticks(records, tick_interval_ms), builder, speed, metrics }
    }

    pub fn tick_count(&self) -> usize {
        self.windows.len()
    }

    /// Feed snapshots to `snapshot_tx` until the telemetry is exhausted,
    /// the receiver is gone, or shutdown is signalled.
    ///
    /// Dropping the sender on return closes the monitor's channel.
    pub async fn run(
        mut self,
        snapshot_tx: mpsc::Sender<Snapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReplayStats {
        let mut stats = ReplayStats::default();
        let paced = self.speed.is_finite() && self.speed > 0.0;
        let mut last_delay_warn: Option<Instant> = None;
        let mut previous_tick: Option<u64> = None;

        info!(ticks = %self.windows.len(), speed = %self.speed, "replay_started");

        let windows = std::mem::take(&mut self.windows);
        for window in windows {
            if *shutdown.borrow() {
                stats.interrupted = true;
                break;
            }

            if let (true, Some(prev)) = (paced, previous_tick) {
                match pacing_delay(window.tick_ms - prev, self.speed) {
                    Some(delay) => {
                        tokio::select! {
                            res = shutdown.changed() => {
                                if res.is_err() || *shutdown.borrow() {
                                    stats.interrupted = true;
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => warn!(tick_ms = %window.tick_ms, speed = %self.speed, "replay_pause_out_of_range"),
                }
            }
            previous_tick = Some(window.tick_ms);

            for record in window.records {
                self.builder.apply(record);
            }
            let snapshot = self.builder.snapshot(window.tick_ms);

            let snapshot = match snapshot_tx.try_send(snapshot) {
                Ok(()) => None,
                Err(TrySendError::Full(snapshot)) => Some(snapshot),
                Err(TrySendError::Closed(_)) => {
                    warn!("snapshot channel closed");
                    break;
                }
            };

            // Monitor is behind: wait for room instead of losing the window
            if let Some(snapshot) = snapshot {
                stats.ticks_delayed += 1;
                self.metrics.record_snapshot_delayed();
                if paced && last_delay_warn.map_or(true, |t| t.elapsed() > Duration::from_secs(1)) {
                    warn!(tick_ms = %window.tick_ms, "snapshot_delayed: channel full");
                    last_delay_warn = Some(Instant::now());
                }
                if snapshot_tx.send(snapshot).await.is_err() {
                    warn!("snapshot channel closed");
                    break;
                }
            }
            stats.ticks_sent += 1;
            debug!(tick_ms = %window.tick_ms, tags = %self.builder.tag_count(), "snapshot_sent");
        }

        info!(
            ticks_sent = %stats.ticks_sent,
            ticks_delayed = %stats.ticks_delayed,
            interrupted = %stats.interrupted,
            "replay_finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Role;
    use crate::io::telemetry::parse_line;
    use crate::services::engine::AlarmEngine;
    use crate::services::monitor::Monitor;
    use std::collections::HashMap;

    fn frame(serial: &str, x: f64, ts_secs: f64) -> CoordRecord {
        parse_line(&format!("$PEKIO,COORD,1,{},{},0.0,0.0,,{}", serial, x, ts_secs)).unwrap().unwrap()
    }

    fn builder() -> SnapshotBuilder {
        let roles = HashMap::from([
            ("F1".to_string(), Role::Forklift),
            ("O1".to_string(), Role::Operator),
        ]);
        SnapshotBuilder::new("Steelmaking Sequence", Vec::new(), roles)
    }

    #[test]
    fn test_group_into_ticks() {
        let records = vec![
            frame("F1", 0.0, 100.00),
            frame("O1", 1.0, 100.05),
            frame("F1", 2.0, 100.10),
            frame("F1", 3.0, 100.45),
        ];

        let windows = group_into_ticks(records, 100);
        let sizes: Vec<(u64, usize)> = windows.iter().map(|w| (w.tick_ms, w.records.len())).collect();
        assert_eq!(sizes, vec![(100_100, 2), (100_200, 1), (100_500, 1)]);
    }

    #[test]
    fn test_group_sorts_out_of_order_frames() {
        let windows = group_into_ticks(vec![frame("F1", 1.0, 5.2), frame("O1", 0.0, 5.0)], 100);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].records[0].serial, "O1");
    }

    #[test]
    fn test_group_empty() {
        assert!(group_into_ticks(Vec::new(), 100).is_empty());
    }

    #[tokio::test]
    async fn test_run_as_fast_as_possible_delivers_every_tick() {
        let records = vec![frame("F1", 0.0, 1.0), frame("O1", 2.0, 1.05), frame("F1", 10.0, 1.5)];
        let replay = Replay::new(records, builder(), 100, 0.0, Arc::new(Metrics::new()));
        assert_eq!(replay.tick_count(), 2);

        let (tx, mut rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(replay.run(tx, shutdown_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.now_ms, 1_100);
        assert_eq!(first.entities.len(), 2);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.now_ms, 1_600);
        assert!(rx.recv().await.is_none());

        let stats = handle.await.unwrap();
        assert_eq!(stats.ticks_sent, 2);
        assert!(!stats.interrupted);
    }

    #[test]
    fn test_group_drops_frames_past_u64_range() {
        let mut late = frame("F1", 1.0, 0.0);
        late.timestamp_ms = u64::MAX - 10;
        let windows = group_into_ticks(vec![frame("O1", 0.0, 0.0), late], 100);

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].records[0].serial, "O1");
    }

    #[test]
    fn test_pacing_delay_out_of_range() {
        assert_eq!(pacing_delay(100, 2.0), Some(Duration::from_millis(50)));
        assert_eq!(pacing_delay(100, 1e-300), None);
    }

    #[tokio::test]
    async fn test_tiny_speed_does_not_panic() {
        let records = vec![frame("F1", 0.0, 1.0), frame("F1", 1.0, 1.1)];
        let replay = Replay::new(records, builder(), 100, 1e-300, Arc::new(Metrics::new()));

        let (tx, mut rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = replay.run(tx, shutdown_rx).await;

        assert_eq!(stats.ticks_sent, 2);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_paced_replay_waits_for_slow_monitor() {
        // One window with the forklift next to the operator, surrounded by quiet ones
        let records = vec![
            frame("O1", 0.0, 1.0),
            frame("F1", 20.0, 1.0),
            frame("F1", 1.0, 1.1),
            frame("F1", 20.0, 1.2),
            frame("F1", 20.0, 1.3),
        ];
        let metrics = Arc::new(Metrics::new());
        let replay = Replay::new(records, builder(), 100, 1000.0, metrics.clone());
        assert_eq!(replay.tick_count(), 4);

        let (tx, mut rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(replay.run(tx, shutdown_rx));

        let mut monitor = Monitor::new(AlarmEngine::default(), Vec::new(), metrics.clone());
        while let Some(snapshot) = rx.recv().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
            monitor.process_snapshot(&snapshot);
        }

        let stats = handle.await.unwrap();
        assert_eq!(stats.ticks_sent, 4);
        assert!(stats.ticks_delayed > 0);
        assert_eq!(metrics.snapshots_delayed(), stats.ticks_delayed);

        let transitions: Vec<bool> =
            monitor.ledger().notifier().iter().map(|n| n.is_activation()).collect();
        assert_eq!(transitions, vec![true, false]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_replay() {
        let records = vec![frame("F1", 0.0, 1.0), frame("F1", 1.0, 1.1)];
        let replay = Replay::new(records, builder(), 100, 0.0, Arc::new(Metrics::new()));

        let (tx, _rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let stats = replay.run(tx, shutdown_rx).await;
        assert!(stats.interrupted);
        assert_eq!(stats.ticks_sent, 0);
    }
}
