use clap::Parser;
use std::path::PathBuf;

use crate::config::{ServiceConfig, SessionSpec};

/// Environment variable naming the configuration file when `--config` is absent
pub const CONFIG_PATH_ENV: &str = "METRONOME_CONFIG";

/// Multi-session metronome service
#[derive(Parser, Debug)]
#[command(name = "metronome")]
#[command(about = "Runs named beat sessions, each ticking at its own tempo")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra session to create, as ID or ID:BPM (repeatable)
    #[arg(short, long = "session", value_name = "ID[:BPM]")]
    pub sessions: Vec<String>,

    /// Create configured sessions stopped
    #[arg(long)]
    pub no_autostart: bool,
}

impl Cli {
    /// `--config`, falling back to `METRONOME_CONFIG`
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }

    /// Append `--session` flags to the configured sessions
    pub fn apply(&self, config: &mut ServiceConfig) -> anyhow::Result<()> {
        for value in &self.sessions {
            config.sessions.push(SessionSpec::parse(value)?);
        }
        Ok(())
    }
}
