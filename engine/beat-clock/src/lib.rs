//! # BeatClock
//!
//! Multi-session beat scheduler. Every session owns an independent [`Ticker`] with
//! its own tempo; while a ticker is running it emits timestamped [`TickEvent`]s to
//! its sinks (console, durable journal, broadcast subscribers).
//!
//! The [`Scheduler`] is the control surface callers use. It owns a
//! [`TickerRegistry`] explicitly; there is no process-wide session list.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod ticker;



pub use clock::{ClockSource, SystemClock};
pub use config::{JournalSettings, SchedulerConfig, TimingMode};
pub use error::{SchedulerError, SinkError};
pub use event::TickEvent;
pub use metrics::{MetricsCollector, SchedulerMetrics};
pub use registry::{Roster, SessionSummary, TickerRegistry};
pub use scheduler::{Scheduler, SessionHandle, SessionStatus};
pub use sink::{BroadcastSink, CompositeSink, ConsoleSink, JournalSink, TickSink};
pub use ticker::{delay_for_rate, RunState, Ticker};

/// Current version of BeatClock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Milliseconds per minute; one beat lasts `MS_PER_MINUTE / bpm` milliseconds
pub const MS_PER_MINUTE: u64 = 60_000;

/// Default tempo for sessions created without an explicit rate
pub const DEFAULT_RATE_BPM: u32 = 90;

/// Default broadcast channel capacity per session
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Default threshold above which a single sink call is reported as slow
pub const DEFAULT_SLOW_SINK_WARN_MS: u64 = 50;
