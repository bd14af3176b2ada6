//! Metronome Service Library
//!
//! Hosts a [`beat_clock::Scheduler`]: configuration loading, logging setup,
//! session bootstrap, periodic status reports and graceful shutdown.

use anyhow::{Context, Result};

pub mod cli;
pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use cli::Cli;
pub use crate::config::ServiceConfig;
pub use logging::initialize_logging_with_config;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from the CLI, the config file and environment variables
pub fn load_configuration(cli: &Cli) -> Result<ServiceConfig> {
    let path = cli.config_path();
    let mut config =
        crate::config::load_config(path.as_deref()).context("Failed to load service configuration")?;
    cli.apply(&mut config)?;
    crate::config::validate_config(&config)?;
    Ok(config)
}
