//! Error types for BeatClock

use thiserror::Error;

/// Errors returned by the scheduler control surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Session {session_id} already exists")]
    DuplicateSession { session_id: String },

    #[error("Session {session_id} not found")]
    NotFound { session_id: String },

    #[error("Invalid rate {rate}: BPM must be a positive integer")]
    InvalidRate { rate: i64 },

    #[error("No tokio runtime available to drive tickers")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SchedulerError {
    pub(crate) fn not_found(session_id: &str) -> Self {
        Self::NotFound { session_id: session_id.to_string() }
    }

    pub(crate) fn duplicate(session_id: &str) -> Self {
        Self::DuplicateSession { session_id: session_id.to_string() }
    }
}

/// Errors raised by an individual sink.
///
/// These never leave the ticker: the emission loop logs and counts them.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] tick_journal::JournalError),

    #[error("Sink {sink} is closed")]
    Closed { sink: String },

    #[error("{failed} sink(s) failed")]
    Partial { failed: usize },
}
