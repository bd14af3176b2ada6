//! Service state management and session bootstrap

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ServiceConfig, SessionSpec};
use beat_clock::{RunState, Scheduler};

/// Service state shared by the main task, the status reporter and shutdown
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// The scheduler hosting every session
    pub scheduler: Scheduler,

    shutdown: CancellationToken,
}

impl ServiceState {
    /// Create the scheduler. Must run inside the tokio runtime.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing scheduler...");
        let scheduler =
            Scheduler::new(config.scheduler.clone()).context("Failed to create scheduler")?;

        Ok(Self { config, scheduler, shutdown: CancellationToken::new() })
    }

    /// Serve Prometheus metrics when enabled
    pub fn install_metrics_exporter(&self) -> Result<()> {
        if !self.config.metrics.enabled {
            return Ok(());
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.metrics.port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("Failed to start metrics exporter on {}", addr))?;

        info!("Prometheus metrics available on http://{}/metrics", addr);
        Ok(())
    }

    /// Create every configured session, join its users and start it if asked.
    ///
    /// Returns the number of sessions started.
    pub fn create_sessions(&self, allow_autostart: bool) -> Result<usize> {
        let mut started = 0;

        for spec in &self.config.sessions {
            self.create_session(spec)?;

            if spec.autostart && allow_autostart {
                self.scheduler.start_session(&spec.id)?;
                started += 1;
            }
        }

        info!(
            "Created {} sessions ({} running)",
            self.config.sessions.len(),
            started
        );
        Ok(started)
    }

    fn create_session(&self, spec: &SessionSpec) -> Result<()> {
        let rate = spec.rate(&self.config.scheduler);
        self.scheduler
            .create_session(&spec.id, rate)
            .with_context(|| format!("Failed to create session {}", spec.id))?;

        for user in &spec.users {
            if !self.scheduler.join_session(&spec.id, user)? {
                warn!("Skipping duplicate or empty user {:?} in session {}", user, spec.id);
            }
        }
        Ok(())
    }

    /// One line per session, ordered by id
    pub fn status_lines(&self) -> Vec<String> {
        self.scheduler
            .list_sessions()
            .into_iter()
            .map(|s| {
                let state = match s.state {
                    RunState::Running => "running",
                    RunState::Stopped => "stopped",
                };
                format!(
                    "[Room {}] {} at {} BPM, {} ticks, {} users",
                    s.session_id, state, s.rate, s.tick_count, s.user_count
                )
            })
            .collect()
    }

    /// Log session status periodically until shutdown
    pub async fn run_status_reporter(&self) {
        let Some(period) = self.config.service.status_interval() else {
            return;
        };

        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    for line in self.status_lines() {
                        info!("{}", line);
                    }
                    let metrics = self.scheduler.metrics();
                    tracing::debug!(
                        "Ticks emitted: {}, sink failures: {}, max wake lateness: {}ns",
                        metrics.total_ticks_emitted,
                        metrics.total_sink_failures,
                        metrics.max_wake_lateness_ns
                    );
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop background tasks and release every session
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.teardown();

        let metrics = self.scheduler.metrics();
        info!(
            "Scheduler stopped: {} ticks emitted, {} sink failures, {} implicit stops",
            metrics.total_ticks_emitted, metrics.total_sink_failures, metrics.implicit_stops
        );
    }
}
