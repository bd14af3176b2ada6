//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

/// Setup signal handlers for graceful shutdown.
///
/// The returned receiver yields once Ctrl+C or SIGTERM arrives.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(2);

    // Handle Ctrl+C (SIGINT)
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = ctrl_c_tx.send(()).await;
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send(()).await;
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Graceful shutdown handler
pub async fn graceful_shutdown(
    service_state: Arc<ServiceState>,
    reporter_handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    info!("Starting graceful shutdown...");

    // Stops the reporter and releases every session
    service_state.shutdown();

    let shutdown_timeout = service_state.config.service.shutdown_timeout();
    match timeout(shutdown_timeout, reporter_handle).await {
        Ok(Ok(())) => {
            info!("Status reporter stopped gracefully");
        }
        Ok(Err(e)) => {
            error!("Status reporter task failed: {}", e);
        }
        Err(_) => {
            warn!("Status reporter did not stop within timeout, forcing shutdown");
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}
