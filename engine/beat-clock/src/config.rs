//! Configuration for BeatClock

use crate::{DEFAULT_BROADCAST_CAPACITY, DEFAULT_RATE_BPM, DEFAULT_SLOW_SINK_WARN_MS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the Scheduler and every ticker it creates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tempo used by `create_session_default`
    pub default_rate_bpm: u32,

    /// How the next tick deadline is derived
    pub timing_mode: TimingMode,

    /// Echo every tick to stdout
    pub console_output: bool,

    /// Capacity of each session's broadcast channel
    pub broadcast_capacity: usize,

    /// Sink calls slower than this are reported at warn level
    pub slow_sink_warn_ms: u64,

    /// Durable tick log
    pub journal: JournalSettings,
}

/// How a ticker computes its next deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Next deadline = previous deadline + delay (no drift accumulation)
    Anchored,
    /// Next deadline = wake time + delay
    Relative,
}

/// Durable tick log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Open a journal for every session
    pub enabled: bool,

    /// Shared log file (every session holds its own append handle)
    pub path: PathBuf,

    /// Write `<directory>/<session>.log` instead of the shared file
    pub per_session_files: bool,

    /// Directory for per-session files
    pub directory: PathBuf,

    /// Whether to fsync on every line
    pub fsync_every_write: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_rate_bpm: DEFAULT_RATE_BPM,
            timing_mode: TimingMode::Anchored,
            console_output: true,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            slow_sink_warn_ms: DEFAULT_SLOW_SINK_WARN_MS,
            journal: JournalSettings::default(),
        }
    }
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("metronome_log.txt"),
            per_session_files: false,
            directory: PathBuf::from("logs"),
            fsync_every_write: false,
        }
    }
}

impl JournalSettings {
    /// Journal configuration for one session
    pub fn journal_config(&self, session_id: &str) -> tick_journal::JournalConfig {
        let path = if self.per_session_files {
            tick_journal::session_journal_path(&self.directory, session_id)
        } else {
            self.path.clone()
        };
        tick_journal::JournalConfig::new(path).with_fsync(self.fsync_every_write)
    }
}

impl SchedulerConfig {
    /// Configuration without console echo or journal, for embedding and tests
    pub fn quiet() -> Self {
        Self {
            console_output: false,
            journal: JournalSettings { enabled: false, ..Default::default() },
            ..Default::default()
        }
    }

    /// Get slow-sink threshold as Duration
    pub fn slow_sink_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_sink_warn_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_rate_bpm == 0 {
            return Err("default_rate_bpm must be greater than 0".to_string());
        }

        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be greater than 0".to_string());
        }

        let shared_journal = self.journal.enabled && !self.journal.per_session_files;
        if shared_journal && self.journal.path.as_os_str().is_empty() {
            return Err("journal.path must not be empty".to_string());
        }

        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
