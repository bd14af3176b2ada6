//! Scheduler: the control surface for sessions
//!
//! Every operation addresses a session by id and maps straight onto the
//! [`TickerRegistry`]. The scheduler owns its registry; dropping it stops and
//! releases every session.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::event::TickEvent;
use crate::metrics::{MetricsCollector, SchedulerMetrics};
use crate::registry::{SessionSummary, TickerRegistry};
use crate::ticker::{RunState, Ticker, TickerContext};

/// Status of a single session
pub type SessionStatus = SessionSummary;

/// Non-owning handle to a session's ticker.
///
/// Every operation fails with `NotFound` once the session has been removed.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    ticker: Weak<Ticker>,
}

impl SessionHandle {
    fn new(ticker: &Arc<Ticker>) -> Self {
        Self { session_id: ticker.session_id().to_string(), ticker: Arc::downgrade(ticker) }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the session still exists
    pub fn is_alive(&self) -> bool {
        self.ticker.upgrade().is_some_and(|t| !t.is_released())
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        self.ticker()?.start();
        Ok(())
    }

    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.ticker()?.stop();
        Ok(())
    }

    /// Returns whether the rate was accepted
    pub fn set_rate(&self, bpm: i64) -> Result<bool, SchedulerError> {
        Ok(self.ticker()?.set_rate(bpm))
    }

    pub fn rate(&self) -> Result<u32, SchedulerError> {
        Ok(self.ticker()?.rate())
    }

    pub fn state(&self) -> Result<RunState, SchedulerError> {
        Ok(self.ticker()?.state())
    }

    pub fn tick_count(&self) -> Result<u64, SchedulerError> {
        Ok(self.ticker()?.tick_count())
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<TickEvent>, SchedulerError> {
        self.ticker()?.subscribe().ok_or_else(|| SchedulerError::not_found(&self.session_id))
    }

    fn ticker(&self) -> Result<Arc<Ticker>, SchedulerError> {
        self.ticker
            .upgrade()
            .filter(|t| !t.is_released())
            .ok_or_else(|| SchedulerError::not_found(&self.session_id))
    }
}

/// Multi-session beat scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    registry: TickerRegistry,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sessions", &self.registry.len())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler bound to the current tokio runtime
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Config)?;
        let context = TickerContext::current(&config)?;
        Ok(Self::with_context(config, context))
    }

    /// Create a scheduler with a caller-supplied clock, metrics or runtime
    pub fn with_context(config: SchedulerConfig, context: TickerContext) -> Self {
        tracing::info!(
            "Scheduler ready (timing: {:?}, console: {}, journal: {})",
            config.timing_mode,
            config.console_output,
            config.journal.enabled
        );
        let registry = TickerRegistry::new(config.clone(), context);
        Self { config, registry }
    }

    /// Create a stopped session
    pub fn create_session(
        &self,
        session_id: &str,
        initial_rate: i64,
    ) -> Result<SessionHandle, SchedulerError> {
        let ticker = self.registry.create(session_id, initial_rate)?;
        Ok(SessionHandle::new(&ticker))
    }

    /// Create a stopped session at the configured default tempo
    pub fn create_session_default(&self, session_id: &str) -> Result<SessionHandle, SchedulerError> {
        self.create_session(session_id, i64::from(self.config.default_rate_bpm))
    }

    pub fn session(&self, session_id: &str) -> Result<SessionHandle, SchedulerError> {
        Ok(SessionHandle::new(&self.registry.get(session_id)?))
    }

    pub fn start_session(&self, session_id: &str) -> Result<(), SchedulerError> {
        self.registry.get(session_id)?.start();
        Ok(())
    }

    pub fn stop_session(&self, session_id: &str) -> Result<(), SchedulerError> {
        self.registry.get(session_id)?.stop();
        Ok(())
    }

    /// Change a session's tempo. A non-positive rate is ignored.
    pub fn set_session_rate(&self, session_id: &str, bpm: i64) -> Result<(), SchedulerError> {
        self.registry.get(session_id)?.set_rate(bpm);
        Ok(())
    }

    pub fn session_status(&self, session_id: &str) -> Result<SessionStatus, SchedulerError> {
        self.registry.summary(session_id)
    }

    /// Every session, ordered by id
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.registry.summaries()
    }

    pub fn remove_session(&self, session_id: &str) -> Result<(), SchedulerError> {
        self.registry.remove(session_id)
    }

    /// Add a user to a session's roster; `false` if already present or blank
    pub fn join_session(&self, session_id: &str, user: &str) -> Result<bool, SchedulerError> {
        let joined = self.registry.join(session_id, user)?;
        if joined {
            tracing::info!("{} joined session {}", user.trim(), session_id);
        }
        Ok(joined)
    }

    pub fn leave_session(&self, session_id: &str, user: &str) -> Result<bool, SchedulerError> {
        let left = self.registry.leave(session_id, user)?;
        if left {
            tracing::info!("{} left session {}", user.trim(), session_id);
        }
        Ok(left)
    }

    pub fn session_members(&self, session_id: &str) -> Result<Vec<String>, SchedulerError> {
        self.registry.members(session_id)
    }

    /// Receive a session's ticks asynchronously
    pub fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<TickEvent>, SchedulerError> {
        self.registry
            .get(session_id)?
            .subscribe()
            .ok_or_else(|| SchedulerError::not_found(session_id))
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.registry.metrics().get_metrics()
    }

    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        self.registry.metrics()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop and release every session. Later calls do nothing.
    pub fn teardown(&self) {
        if !self.registry.shutdown_token().is_cancelled() {
            tracing::info!("Scheduler teardown: stopping {} sessions", self.registry.len());
        }
        self.registry.teardown_all();
    }

    pub fn is_torn_down(&self) -> bool {
        self.registry.shutdown_token().is_cancelled()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::quiet()).unwrap()
    }

    #[test]
    fn test_new_without_runtime() {
        let err = Scheduler::new(SchedulerConfig::quiet()).unwrap_err();
        assert_eq!(err, SchedulerError::NoRuntime);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = SchedulerConfig { broadcast_capacity: 0, ..SchedulerConfig::quiet() };
        assert!(matches!(Scheduler::new(config), Err(SchedulerError::Config(_))));
    }

    #[tokio::test]
    async fn test_create_session_default_uses_configured_rate() {
        let config = SchedulerConfig { default_rate_bpm: 72, ..SchedulerConfig::quiet() };
        let scheduler = Scheduler::new(config).unwrap();

        let handle = scheduler.create_session_default("A").unwrap();
        assert_eq!(handle.rate().unwrap(), 72);
        assert_eq!(scheduler.session_status("A").unwrap().rate, 72);
    }

    #[tokio::test]
    async fn test_status_of_new_session() {
        let scheduler = scheduler();
        scheduler.create_session("A", 120).unwrap();

        let status = scheduler.session_status("A").unwrap();
        assert_eq!(status.session_id, "A");
        assert_eq!(status.rate, 120);
        assert_eq!(status.state, RunState::Stopped);
        assert_eq!(status.tick_count, 0);
        assert_eq!(status.user_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let scheduler = scheduler();
        let missing = SchedulerError::NotFound { session_id: "nope".to_string() };

        assert_eq!(scheduler.start_session("nope").unwrap_err(), missing);
        assert_eq!(scheduler.stop_session("nope").unwrap_err(), missing);
        assert_eq!(scheduler.set_session_rate("nope", 100).unwrap_err(), missing);
        assert_eq!(scheduler.session_status("nope").unwrap_err(), missing);
        assert_eq!(scheduler.remove_session("nope").unwrap_err(), missing);
        assert_eq!(scheduler.join_session("nope", "alice").unwrap_err(), missing);
        assert!(scheduler.subscribe("nope").is_err());
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_silent_noop() {
        let scheduler = scheduler();
        scheduler.create_session("A", 120).unwrap();

        scheduler.set_session_rate("A", 0).unwrap();
        scheduler.set_session_rate("A", -30).unwrap();
        assert_eq!(scheduler.session_status("A").unwrap().rate, 120);

        scheduler.set_session_rate("A", 150).unwrap();
        assert_eq!(scheduler.session_status("A").unwrap().rate, 150);

        let metrics = scheduler.metrics();
        assert_eq!(metrics.rate_changes, 1);
        assert_eq!(metrics.rejected_rates, 2);
    }

    #[tokio::test]
    async fn test_handle_outlives_removed_session() {
        let scheduler = scheduler();
        let handle = scheduler.create_session("A", 90).unwrap();
        assert!(handle.is_alive());

        scheduler.remove_session("A").unwrap();
        assert!(!handle.is_alive());
        assert!(matches!(handle.start(), Err(SchedulerError::NotFound { .. })));
        assert!(matches!(handle.rate(), Err(SchedulerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_recreate_after_remove() {
        let scheduler = scheduler();
        scheduler.create_session("A", 90).unwrap();
        scheduler.remove_session("A").unwrap();

        let handle = scheduler.create_session("A", 60).unwrap();
        assert_eq!(handle.rate().unwrap(), 60);
        assert_eq!(scheduler.session_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reflects_running_session() {
        let scheduler = scheduler();
        let handle = scheduler.create_session("A", 600).unwrap();
        scheduler.join_session("A", "alice").unwrap();

        handle.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let status = scheduler.session_status("A").unwrap();
        assert_eq!(status.state, RunState::Running);
        assert_eq!(status.tick_count, 2);
        assert_eq!(status.user_count, 1);

        scheduler.stop_session("A").unwrap();
        assert_eq!(scheduler.session_status("A").unwrap().state, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_teardown_then_drop() {
        let scheduler = scheduler();
        let handle = scheduler.create_session("A", 90).unwrap();
        handle.start().unwrap();

        scheduler.teardown();
        assert!(scheduler.is_torn_down());
        assert!(scheduler.list_sessions().is_empty());
        assert!(!handle.is_alive());

        // creating after teardown still works, but the session cannot run
        scheduler.create_session("B", 90).unwrap();
        scheduler.start_session("B").unwrap();
        assert_eq!(scheduler.session_status("B").unwrap().state, RunState::Stopped);
        drop(scheduler);
    }
}
