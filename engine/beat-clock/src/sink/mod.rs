//! Tick sinks
//!
//! A ticker hands every event to a [`CompositeSink`], which forwards it to each
//! registered sink in registration order. Sinks are synchronous and must be fast;
//! anything slow belongs behind a [`BroadcastSink`] subscription.

mod broadcast;
mod composite;
mod console;
mod journal;

pub use broadcast::BroadcastSink;
pub use composite::CompositeSink;
pub use console::ConsoleSink;
pub use journal::JournalSink;

use crate::error::SinkError;
use crate::event::TickEvent;

/// Consumer of emitted ticks
pub trait TickSink: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and metrics labels
    fn name(&self) -> &str;

    /// Handle one tick. Called from the emission loop with the ticker locked:
    /// must not block or call back into the ticker.
    fn consume(&self, event: &TickEvent) -> Result<(), SinkError>;

    /// Release any held resource. Called once per sink when its session ends.
    fn close(&self) {}

    /// Failures of best-effort sinks are logged at debug level only
    fn is_best_effort(&self) -> bool {
        false
    }
}
