//! Yard sentinel - hazard alarm engine for industrial yards
//!
//! Replays positioning telemetry through the alarm engine and writes alarm
//! transitions to a JSONL alert log.
//!
//! Module structure:
//! - `domain/` - Core types (Entity, Crane, Snapshot, AlarmKey), geometry
//! - `io/` - Telemetry parsing and replay, alert log
//! - `services/` - Rules, proximity, ledger, engine, monitor
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use yard_sentinel::infra::{validate_replay_speed, Config, Metrics};
use yard_sentinel::io::{read_log, AlertLog, Replay, SnapshotBuilder};
use yard_sentinel::services::{AlarmEngine, Monitor, SequenceRuleTable};

/// Yard sentinel - forklift, operator and crane hazard monitoring
#[derive(Parser, Debug)]
#[command(name = "yard-sentinel", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Positioning log with `$PEKIO,COORD` frames
    #[arg(short, long)]
    telemetry: String,

    /// Override the active sequence from the config file
    #[arg(short, long)]
    sequence: Option<String>,

    /// Override replay speed (0 = as fast as possible)
    #[arg(long)]
    speed: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-tick visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "yard-sentinel starting");

    let args = Args::parse();

    // Invalid geofences abort startup here
    let mut config = Config::from_file(&args.config)?;
    if let Some(sequence) = &args.sequence {
        config = config.with_sequence(sequence);
    }
    if let Some(speed) = args.speed {
        validate_replay_speed(speed).context("invalid --speed")?;
        config = config.with_replay_speed(speed);
    }

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        sequence = %config.sequence(),
        tick_interval_ms = %config.tick_interval_ms(),
        forklift_operator_m = %config.thresholds().forklift_operator_m,
        crane_crane_m = %config.thresholds().crane_crane_m,
        geofences = %config.geofences(config.sequence()).len(),
        tags = %config.tag_roles().len(),
        alerts_file = %config.alerts_file(),
        replay_speed = %config.replay_speed(),
        "config_loaded"
    );

    let records = read_log(&args.telemetry).context("Failed to load telemetry")?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start metrics reporter (lock-free reads)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Create snapshot channel (bounded for backpressure)
    let (snapshot_tx, snapshot_rx) = mpsc::channel(64);

    let builder = SnapshotBuilder::new(
        config.sequence(),
        config.geofences(config.sequence()).to_vec(),
        config.tag_roles().clone(),
    );
    let replay =
        Replay::new(records, builder, config.tick_interval_ms(), config.replay_speed(), metrics.clone());
    let replay_handle = tokio::spawn(replay.run(snapshot_tx, shutdown_rx));

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let alert_log = AlertLog::new(config.site_id(), config.alerts_file(), config.alerts_max_recent());
    let engine = AlarmEngine::new(SequenceRuleTable::new(config.thresholds()));
    let mut monitor = Monitor::new(engine, alert_log, metrics.clone());
    info!("monitor_started");

    // Run monitor - consumes snapshots until the replay closes the channel
    monitor.run(snapshot_rx).await;

    let stats = replay_handle.await.context("replay task failed")?;
    metrics.report().log();

    for (key, record) in monitor.ledger().active() {
        info!(entity = %key.entity, kind = %key.kind, since = %record.activated_at, "alarm_outstanding");
    }

    info!(
        ticks = %stats.ticks_sent,
        delayed = %stats.ticks_delayed,
        interrupted = %stats.interrupted,
        recent_alerts = %monitor.ledger().notifier().recent().count(),
        "yard-sentinel shutdown complete"
    );
    Ok(())
}
