//! Lock-free metrics collection and periodic reporting
//!
//! Counters are updated once per tick by the monitor and read by the
//! periodic reporter. Periodic values are reset with an atomic swap.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only; never use them to decide alarm state.

use crate::services::engine::TickReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total ticks ever processed (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Tick latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Rising edges (monotonic)
    alarms_activated_total: AtomicU64,
    /// Falling edges (monotonic)
    alarms_cleared_total: AtomicU64,
    /// Alarms active after the last tick
    active_alarms: AtomicU64,
    /// Entities skipped for missing position (monotonic)
    entities_skipped_total: AtomicU64,
    /// Ticks evaluated under the permissive default (monotonic)
    unknown_sequence_ticks: AtomicU64,
    /// Snapshots that found the channel full and waited for the monitor (monotonic)
    snapshots_delayed: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            alarms_activated_total: AtomicU64::new(0),
            alarms_cleared_total: AtomicU64::new(0),
            active_alarms: AtomicU64::new(0),
            entities_skipped_total: AtomicU64::new(0),
            unknown_sequence_ticks: AtomicU64::new(0),
            snapshots_delayed: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a processed tick with its latency and outcome (lock-free)
    #[inline]
    pub fn record_tick(&self, latency_us: u64, report: &TickReport, active_alarms: usize) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        // Update histogram bucket
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        // Update max
        update_atomic_max(&self.latency_max_us, latency_us);

        self.alarms_activated_total.fetch_add(report.activated as u64, Ordering::Relaxed);
        self.alarms_cleared_total.fetch_add(report.cleared as u64, Ordering::Relaxed);
        self.entities_skipped_total.fetch_add(report.skipped.len() as u64, Ordering::Relaxed);
        if !report.known_sequence {
            self.unknown_sequence_ticks.fetch_add(1, Ordering::Relaxed);
        }
        self.active_alarms.store(active_alarms as u64, Ordering::Relaxed);
    }

    /// Record a snapshot that had to wait for channel capacity (lock-free)
    #[inline]
    pub fn record_snapshot_delayed(&self) {
        self.snapshots_delayed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alarms_activated_total(&self) -> u64 {
        self.alarms_activated_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alarms_cleared_total(&self) -> u64 {
        self.alarms_cleared_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_alarms(&self) -> u64 {
        self.active_alarms.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn snapshots_delayed(&self) -> u64 {
        self.snapshots_delayed.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if ticks_count > 0 { latency_sum / ticks_count } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            avg_tick_latency_us: avg_latency,
            max_tick_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            alarms_activated_total: self.alarms_activated_total.load(Ordering::Relaxed),
            alarms_cleared_total: self.alarms_cleared_total.load(Ordering::Relaxed),
            active_alarms: self.active_alarms.load(Ordering::Relaxed),
            entities_skipped_total: self.entities_skipped_total.load(Ordering::Relaxed),
            unknown_sequence_ticks: self.unknown_sequence_ticks.load(Ordering::Relaxed),
            snapshots_delayed: self.snapshots_delayed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    /// Tick latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub alarms_activated_total: u64,
    pub alarms_cleared_total: u64,
    pub active_alarms: u64,
    pub entities_skipped_total: u64,
    pub unknown_sequence_ticks: u64,
    pub snapshots_delayed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_latency_us = %self.avg_tick_latency_us,
            max_latency_us = %self.max_tick_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            activated = %self.alarms_activated_total,
            cleared = %self.alarms_cleared_total,
            active = %self.active_alarms,
            skipped = %self.entities_skipped_total,
            unknown_sequence_ticks = %self.unknown_sequence_ticks,
            delayed = %self.snapshots_delayed,
            "metrics"
        );
    }
}
