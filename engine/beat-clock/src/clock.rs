//! Time sources used by tickers

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Monotonic time plus wall-clock timestamps.
///
/// Deadlines are computed from [`ClockSource::now`], which is tokio's monotonic
/// instant so paused test runtimes drive tickers deterministically. Event
/// timestamps come from [`ClockSource::timestamp`].
pub trait ClockSource: Send + Sync + std::fmt::Debug {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Current wall-clock time for event timestamps
    fn timestamp(&self) -> DateTime<Local>;
}

/// Production clock: tokio's monotonic clock and the local system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp(&self) -> DateTime<Local> {
        Local::now()
    }
}
