//! Metrics collection for BeatClock
//!
//! Counters are kept locally in atomics (readable through [`MetricsCollector::get_metrics`])
//! and mirrored to the `metrics` facade so a host process can export them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of scheduler-wide metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    /// Number of registered sessions
    pub sessions_active: u64,

    /// Number of tickers currently running
    pub tickers_running: u64,

    /// Total ticks emitted across all sessions
    pub total_ticks_emitted: u64,

    /// Total individual sink failures
    pub total_sink_failures: u64,

    /// Accepted rate changes
    pub rate_changes: u64,

    /// Rejected (non-positive) rate changes
    pub rejected_rates: u64,

    /// Loops stopped by cancellation rather than `stop()`
    pub implicit_stops: u64,

    /// Worst observed delay between a deadline and the actual wake-up
    pub max_wake_lateness_ns: u64,

    /// Average time to fan one tick out to all sinks
    pub avg_fanout_duration_ns: u64,

    /// Slowest fan-out observed
    pub max_fanout_duration_ns: u64,

    /// Seconds since the collector was created
    pub uptime_seconds: u64,
}

/// Metrics collector shared by the registry and every ticker
#[derive(Debug)]
pub struct MetricsCollector {
    sessions_active: AtomicU64,
    tickers_running: AtomicU64,
    total_ticks: AtomicU64,
    sink_failures: AtomicU64,
    rate_changes: AtomicU64,
    rejected_rates: AtomicU64,
    implicit_stops: AtomicU64,
    max_wake_lateness: AtomicU64,
    fanout_total_ns: AtomicU64,
    max_fanout: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            tickers_running: AtomicU64::new(0),
            total_ticks: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            rate_changes: AtomicU64::new(0),
            rejected_rates: AtomicU64::new(0),
            implicit_stops: AtomicU64::new(0),
            max_wake_lateness: AtomicU64::new(0),
            fanout_total_ns: AtomicU64::new(0),
            max_fanout: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one emitted tick
    pub fn record_tick(&self, session_id: &str, wake_lateness: Duration, fanout: Duration) {
        let lateness_ns = wake_lateness.as_nanos() as u64;
        let fanout_ns = fanout.as_nanos() as u64;

        self.total_ticks.fetch_add(1, Ordering::Relaxed);
        self.fanout_total_ns.fetch_add(fanout_ns, Ordering::Relaxed);
        self.max_wake_lateness.fetch_max(lateness_ns, Ordering::Relaxed);
        self.max_fanout.fetch_max(fanout_ns, Ordering::Relaxed);

        ::metrics::counter!("beat_clock_ticks_total", 1, "session" => session_id.to_string());
        ::metrics::histogram!("beat_clock_wake_lateness_seconds", wake_lateness.as_secs_f64());
        ::metrics::histogram!("beat_clock_fanout_seconds", fanout.as_secs_f64());
    }

    /// Record a failed sink call
    pub fn record_sink_failure(&self, session_id: &str, sink: &str) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(
            "beat_clock_sink_failures_total",
            1,
            "session" => session_id.to_string(),
            "sink" => sink.to_string()
        );
    }

    pub fn record_rate_change(&self, accepted: bool) {
        if accepted {
            self.rate_changes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_rates.fetch_add(1, Ordering::Relaxed);
            ::metrics::counter!("beat_clock_rejected_rates_total", 1);
        }
    }

    pub fn record_implicit_stop(&self) {
        self.implicit_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticker_started(&self) {
        let running = self.tickers_running.fetch_add(1, Ordering::Relaxed) + 1;
        ::metrics::gauge!("beat_clock_tickers_running", running as f64);
    }

    pub fn ticker_stopped(&self) {
        // never below zero
        let previous = self
            .tickers_running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        ::metrics::gauge!("beat_clock_tickers_running", previous.saturating_sub(1) as f64);
    }

    /// Update registered session count
    pub fn update_sessions_active(&self, count: usize) {
        self.sessions_active.store(count as u64, Ordering::Relaxed);
        ::metrics::gauge!("beat_clock_sessions_active", count as f64);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> SchedulerMetrics {
        let total_ticks = self.total_ticks.load(Ordering::Relaxed);
        let avg_fanout_duration_ns = if total_ticks > 0 {
            self.fanout_total_ns.load(Ordering::Relaxed) / total_ticks
        } else {
            0
        };

        SchedulerMetrics {
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            tickers_running: self.tickers_running.load(Ordering::Relaxed),
            total_ticks_emitted: total_ticks,
            total_sink_failures: self.sink_failures.load(Ordering::Relaxed),
            rate_changes: self.rate_changes.load(Ordering::Relaxed),
            rejected_rates: self.rejected_rates.load(Ordering::Relaxed),
            implicit_stops: self.implicit_stops.load(Ordering::Relaxed),
            max_wake_lateness_ns: self.max_wake_lateness.load(Ordering::Relaxed),
            avg_fanout_duration_ns,
            max_fanout_duration_ns: self.max_fanout.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.total_ticks.store(0, Ordering::Relaxed);
        self.sink_failures.store(0, Ordering::Relaxed);
        self.rate_changes.store(0, Ordering::Relaxed);
        self.rejected_rates.store(0, Ordering::Relaxed);
        self.implicit_stops.store(0, Ordering::Relaxed);
        self.max_wake_lateness.store(0, Ordering::Relaxed);
        self.fanout_total_ns.store(0, Ordering::Relaxed);
        self.max_fanout.store(0, Ordering::Relaxed);
    }
}
