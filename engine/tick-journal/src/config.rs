//! Configuration for the tick journal

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a single journal file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal file path
    pub path: PathBuf,

    /// Create missing parent directories when opening
    pub create_dirs: bool,

    /// Whether to fsync on every write (for maximum durability)
    pub fsync_every_write: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metronome_log.txt"),
            create_dirs: true,
            fsync_every_write: false, // flush-per-line is enough to survive a process crash
        }
    }
}

impl JournalConfig {
    /// Create a new configuration for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Enable or disable fsync after each line
    pub fn with_fsync(mut self, fsync_every_write: bool) -> Self {
        self.fsync_every_write = fsync_every_write;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Journal path must not be empty".to_string());
        }

        if self.path.file_name().is_none() {
            return Err(format!("Journal path {:?} does not name a file", self.path));
        }

        Ok(())
    }
}
