//! # Tick Journal
//!
//! Durable, append-only text journal used to record emitted ticks.
//!
//! ## Guarantees
//!
//! - The file is opened in append mode and never truncated or read back.
//! - Every line is flushed to the OS before `append_line` returns, so an abrupt
//!   process exit loses nothing that was reported as written.
//! - The file handle is released exactly once, either by [`Journal::close`] or on drop.
//!
//! ## Usage
//!
//! ```rust
//! use tick_journal::{Journal, JournalConfig};
//! use tempfile::TempDir;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let journal = Journal::open(JournalConfig::new(temp_dir.path().join("ticks.log")))?;
//!     journal.append_line("2024-01-01T00:00:00.000 - [Room A] Tick #1 at BPM 120")?;
//!     journal.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod journal;

pub use config::JournalConfig;
pub use error::{JournalError, Result};
pub use journal::{session_journal_path, Journal};
