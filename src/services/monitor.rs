//! Serialized tick loop for one monitoring session
//!
//! The Monitor owns the session's alarm ledger and is the single consumer of
//! the snapshot channel, which is what guarantees that at most one tick runs
//! at a time.

use crate::domain::types::Snapshot;
use crate::infra::metrics::Metrics;
use crate::services::engine::{AlarmEngine, TickReport};
use crate::services::ledger::{AlarmLedger, Notifier};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drives the alarm engine over a stream of snapshots
pub struct Monitor<N> {
    engine: AlarmEngine,
    ledger: AlarmLedger<N>,
    metrics: Arc<Metrics>,
    /// Last sequence name seen, so unknown names are warned about once per change
    last_sequence: Option<String>,
}

impl<N: Notifier> Monitor<N> {
    pub fn new(engine: AlarmEngine, notifier: N, metrics: Arc<Metrics>) -> Self {
        Self { engine, ledger: AlarmLedger::new(notifier), metrics, last_sequence: None }
    }

    /// Consume snapshots until the channel closes
    pub async fn run(&mut self, mut snapshot_rx: mpsc::Receiver<Snapshot>) {
        while let Some(snapshot) = snapshot_rx.recv().await {
            self.process_snapshot(&snapshot);
        }
        info!(active_alarms = %self.ledger.len(), "monitor_stopped");
    }

    /// Run one tick and record its outcome
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> TickReport {
        let started = Instant::now();

        if self.last_sequence.as_deref() != Some(snapshot.sequence.as_str()) {
            if self.engine.rules().is_known(&snapshot.sequence) {
                info!(sequence = %snapshot.sequence, "sequence_selected");
            } else {
                warn!(
                    sequence = %snapshot.sequence,
                    known = ?self.engine.rules().sequence_names(),
                    "unknown_sequence"
                );
            }
            self.last_sequence = Some(snapshot.sequence.clone());
        }

        let report = self.engine.run_tick(snapshot, &mut self.ledger);

        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_tick(latency_us, &report, self.ledger.len());

        debug!(
            now_ms = %snapshot.now_ms,
            entities = %snapshot.entities.len(),
            cranes = %snapshot.cranes.len(),
            activated = %report.activated,
            cleared = %report.cleared,
            skipped = %report.skipped.len(),
            latency_us = %latency_us,
            "tick_processed"
        );

        report
    }

    pub fn ledger(&self) -> &AlarmLedger<N> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut AlarmLedger<N> {
        &mut self.ledger
    }
}
