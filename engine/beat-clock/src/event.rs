//! Tick events emitted by running tickers

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp rendering used in the durable log (ISO-8601 local date-time)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// One emitted tick. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Session that emitted the tick
    pub session_id: String,

    /// Tick number within the current running interval, starting at 1
    pub sequence: u64,

    /// Tempo in effect when the tick was emitted
    pub rate: u32,

    /// Wall-clock emission time
    pub timestamp: DateTime<Local>,
}

impl TickEvent {
    pub fn new(
        session_id: impl Into<String>,
        sequence: u64,
        rate: u32,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self { session_id: session_id.into(), sequence, rate, timestamp }
    }

    /// Console form: `[Room <id>] Tick #<n> at BPM <rate>`
    pub fn message(&self) -> String {
        format!("[Room {}] Tick #{} at BPM {}", self.session_id, self.sequence, self.rate)
    }

    /// Durable log form: `<timestamp> - [Room <id>] Tick #<n> at BPM <rate>`
    pub fn log_line(&self) -> String {
        format!("{} - {}", self.formatted_timestamp(), self.message())
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}
