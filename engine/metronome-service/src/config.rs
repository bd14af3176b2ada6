//! Service configuration management

use anyhow::{Context, Result};
use beat_clock::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `METRONOME__LOGGING__LEVEL=debug`
pub const ENV_PREFIX: &str = "METRONOME";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Scheduler and sink configuration
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Sessions created at startup
    pub sessions: Vec<SessionSpec>,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Interval between session status reports (0 disables them)
    pub status_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics over HTTP
    pub enabled: bool,

    /// Metrics export port
    pub port: u16,
}

/// A session to create at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub id: String,

    /// Tempo; falls back to `scheduler.default_rate_bpm`
    #[serde(default)]
    pub bpm: Option<i64>,

    /// Start ticking immediately
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Users joined to the session's roster
    #[serde(default)]
    pub users: Vec<String>,
}

fn default_autostart() -> bool {
    true
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { shutdown_timeout_secs: 10, status_interval_secs: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, port: 9090 }
    }
}

impl ServiceSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

impl SessionSpec {
    /// Parse `id` or `id:bpm`
    pub fn parse(value: &str) -> Result<Self> {
        let (id, bpm) = match value.rsplit_once(':') {
            Some((id, bpm)) => {
                let bpm = bpm
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("Invalid BPM in session spec {:?}", value))?;
                (id, Some(bpm))
            }
            None => (value, None),
        };

        let id = id.trim();
        if id.is_empty() {
            return Err(anyhow::anyhow!("Session spec {:?} has an empty id", value));
        }

        Ok(Self { id: id.to_string(), bpm, autostart: true, users: Vec::new() })
    }

    /// Tempo to create the session with
    pub fn rate(&self, scheduler: &SchedulerConfig) -> i64 {
        self.bpm.unwrap_or_else(|| i64::from(scheduler.default_rate_bpm))
    }
}

/// Load configuration from an optional TOML file and `METRONOME__*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut builder = ::config::Config::builder();

    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(::config::File::from(path).required(true));
    }

    let config: ServiceConfig = builder
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    // Validate metrics port
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    config
        .scheduler
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid scheduler configuration: {}", e))?;

    let mut seen = HashSet::new();
    for session in &config.sessions {
        if session.id.trim().is_empty() {
            return Err(anyhow::anyhow!("Session id must not be empty"));
        }
        if !seen.insert(session.id.as_str()) {
            return Err(anyhow::anyhow!("Session {} is configured twice", session.id));
        }
        let rate = session.rate(&config.scheduler);
        if rate <= 0 {
            return Err(anyhow::anyhow!("Session {} has invalid BPM {}", session.id, rate));
        }
    }

    Ok(())
}

/// Save configuration to a TOML file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write configuration to {:?}", path))?;
    Ok(())
}
