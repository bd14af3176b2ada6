//! Metronome Service
//!
//! Loads configuration, creates the configured sessions and keeps them ticking
//! until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use metronome_service::{
    graceful_shutdown, initialize_logging_with_config, load_configuration, setup_signal_handlers,
    Cli, ServiceState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env is optional
    dotenv::dotenv().ok();

    let config = load_configuration(&cli).context("Failed to load configuration")?;
    initialize_logging_with_config(&config.logging)?;

    info!("Starting Metronome Service v{}", env!("CARGO_PKG_VERSION"));

    let service_state = Arc::new(ServiceState::new(config)?);
    service_state.install_metrics_exporter()?;
    info!("Service state initialized");

    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    service_state
        .create_sessions(!cli.no_autostart)
        .context("Failed to create configured sessions")?;

    let reporter_handle = {
        let state = service_state.clone();
        tokio::spawn(async move { state.run_status_reporter().await })
    };

    info!("Metronome Service is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.recv().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service_state, reporter_handle).await?;

    info!("Metronome Service shutdown complete");
    Ok(())
}
