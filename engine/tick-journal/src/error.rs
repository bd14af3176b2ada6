//! Error types for the tick journal

use thiserror::Error;

/// Result type alias for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;

/// Errors that can occur while writing the journal
#[derive(Error, Debug)]
pub enum JournalError {
    /// I/O errors (open, write, flush, sync)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The journal has already been closed
    #[error("Journal {path} is closed")]
    Closed { path: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl JournalError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the journal handle is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}
