//! Session registry: owns every ticker and its sink resources

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::metrics::MetricsCollector;
use crate::sink::{ConsoleSink, JournalSink};
use crate::ticker::{RunState, Ticker, TickerContext};

/// Members of a session, in join order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    members: Vec<String>,
}

impl Roster {
    /// Add a member. Empty and duplicate names are rejected.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.members.push(name.to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let name = name.trim();
        match self.members.iter().position(|m| m == name) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.members.iter().any(|m| m == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }
}

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub rate: u32,
    pub state: RunState,
    pub tick_count: u64,
    pub user_count: usize,
}

struct SessionEntry {
    ticker: Arc<Ticker>,
    roster: Roster,
}

impl SessionEntry {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.ticker.session_id().to_string(),
            rate: self.ticker.rate(),
            state: self.ticker.state(),
            tick_count: self.ticker.tick_count(),
            user_count: self.roster.len(),
        }
    }
}

/// Owns all tickers keyed by session id
pub struct TickerRegistry {
    config: SchedulerConfig,
    context: TickerContext,
    sessions: RwLock<BTreeMap<String, SessionEntry>>,
}

impl TickerRegistry {
    pub fn new(config: SchedulerConfig, context: TickerContext) -> Self {
        Self { config, context, sessions: RwLock::new(BTreeMap::new()) }
    }

    /// Register a new stopped ticker.
    ///
    /// The journal is opened here; if that fails the session runs without it and
    /// the failure is logged once.
    pub fn create(&self, session_id: &str, initial_rate: i64) -> Result<Arc<Ticker>, SchedulerError> {
        let rate = u32::try_from(initial_rate)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(SchedulerError::InvalidRate { rate: initial_rate })?;

        let mut sessions = self.sessions.write();
        if sessions.contains_key(session_id) {
            return Err(SchedulerError::duplicate(session_id));
        }

        let ticker = Arc::new(Ticker::new(session_id, rate, self.context.clone()));

        if self.config.console_output {
            ticker.add_sink(Arc::new(ConsoleSink::stdout()));
        }

        if self.config.journal.enabled {
            let journal_config = self.config.journal.journal_config(session_id);
            match JournalSink::open(journal_config.clone()) {
                Ok(sink) => ticker.add_sink(Arc::new(sink)),
                Err(e) => tracing::warn!(
                    "Could not open tick journal {:?} for session {}: {}; continuing without it",
                    journal_config.path,
                    session_id,
                    e
                ),
            }
        }

        sessions.insert(
            session_id.to_string(),
            SessionEntry { ticker: ticker.clone(), roster: Roster::default() },
        );
        self.context.metrics.update_sessions_active(sessions.len());

        tracing::info!(
            "Created session {} at {} BPM (sinks: {})",
            session_id,
            rate,
            ticker.sink_names().join(", ")
        );
        Ok(ticker)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Ticker>, SchedulerError> {
        self.sessions
            .read()
            .get(session_id)
            .map(|entry| entry.ticker.clone())
            .ok_or_else(|| SchedulerError::not_found(session_id))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Stop the ticker, close its sinks and forget the session
    pub fn remove(&self, session_id: &str) -> Result<(), SchedulerError> {
        let entry = {
            let mut sessions = self.sessions.write();
            let entry =
                sessions.remove(session_id).ok_or_else(|| SchedulerError::not_found(session_id))?;
            self.context.metrics.update_sessions_active(sessions.len());
            entry
        };

        entry.ticker.release();
        tracing::info!("Removed session {}", session_id);
        Ok(())
    }

    /// Stop and release every ticker. Safe to call more than once.
    pub fn teardown_all(&self) {
        self.context.shutdown.cancel();

        let drained: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.write();
            let drained = std::mem::take(&mut *sessions).into_iter().collect();
            self.context.metrics.update_sessions_active(0);
            drained
        };

        if drained.is_empty() {
            return;
        }

        for (_, entry) in &drained {
            entry.ticker.release();
        }
        tracing::info!("Tore down {} sessions", drained.len());
    }

    pub fn join(&self, session_id: &str, user: &str) -> Result<bool, SchedulerError> {
        self.with_roster(session_id, |roster| roster.add(user))
    }

    pub fn leave(&self, session_id: &str, user: &str) -> Result<bool, SchedulerError> {
        self.with_roster(session_id, |roster| roster.remove(user))
    }

    pub fn members(&self, session_id: &str) -> Result<Vec<String>, SchedulerError> {
        self.sessions
            .read()
            .get(session_id)
            .map(|entry| entry.roster.members().to_vec())
            .ok_or_else(|| SchedulerError::not_found(session_id))
    }

    pub fn summary(&self, session_id: &str) -> Result<SessionSummary, SchedulerError> {
        self.sessions
            .read()
            .get(session_id)
            .map(SessionEntry::summary)
            .ok_or_else(|| SchedulerError::not_found(session_id))
    }

    /// All sessions ordered by id
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.read().values().map(SessionEntry::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.context.metrics
    }

    /// Cancelled by `teardown_all`; every loop token is a child of it
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.context.shutdown
    }

    fn with_roster<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Roster) -> T,
    ) -> Result<T, SchedulerError> {
        let mut sessions = self.sessions.write();
        let entry =
            sessions.get_mut(session_id).ok_or_else(|| SchedulerError::not_found(session_id))?;
        Ok(f(&mut entry.roster))
    }
}

impl Drop for TickerRegistry {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_with(config: SchedulerConfig) -> TickerRegistry {
        let context = TickerContext::current(&config).unwrap();
        TickerRegistry::new(config, context)
    }

    fn quiet_registry() -> TickerRegistry {
        registry_with(SchedulerConfig::quiet())
    }

    #[test]
    fn test_roster_rules() {
        let mut roster = Roster::default();
        assert!(roster.add("alice"));
        assert!(!roster.add("alice"));
        assert!(!roster.add("  "));
        assert!(roster.add(" bob "));
        assert_eq!(roster.members(), ["alice", "bob"]);
        assert!(roster.contains(" bob "));
        assert!(roster.contains("bob"));
        assert!(!roster.contains("  "));

        assert!(roster.remove("alice"));
        assert!(!roster.remove("alice"));
        assert_eq!(roster.len(), 1);
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = quiet_registry();
        let ticker = registry.create("A", 120).unwrap();

        assert_eq!(ticker.rate(), 120);
        assert_eq!(ticker.state(), RunState::Stopped);
        assert_eq!(registry.get("A").unwrap().session_id(), "A");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.metrics().get_metrics().sessions_active, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_leaves_first_untouched() {
        let registry = quiet_registry();
        registry.create("A", 120).unwrap();

        let err = registry.create("A", 60).unwrap_err();
        assert_eq!(err, SchedulerError::DuplicateSession { session_id: "A".to_string() });
        assert_eq!(registry.get("A").unwrap().rate(), 120);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_initial_rate() {
        let registry = quiet_registry();
        assert_eq!(registry.create("A", 0).unwrap_err(), SchedulerError::InvalidRate { rate: 0 });
        assert!(matches!(registry.create("A", -5), Err(SchedulerError::InvalidRate { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_leaves_registry_unchanged() {
        let registry = quiet_registry();
        registry.create("A", 90).unwrap();

        let err = registry.remove("B").unwrap_err();
        assert_eq!(err, SchedulerError::NotFound { session_id: "B".to_string() });
        assert_eq!(registry.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_releases_ticker() {
        let registry = quiet_registry();
        let ticker = registry.create("A", 90).unwrap();
        ticker.start();

        registry.remove("A").unwrap();
        assert!(ticker.is_released());
        assert_eq!(ticker.state(), RunState::Stopped);
        assert!(matches!(registry.get("A"), Err(SchedulerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_teardown_all_is_idempotent() {
        let registry = quiet_registry();
        let a = registry.create("A", 90).unwrap();
        let b = registry.create("B", 60).unwrap();
        a.start();
        b.start();

        registry.teardown_all();
        registry.teardown_all();

        assert!(registry.is_empty());
        assert!(registry.shutdown_token().is_cancelled());
        assert!(a.is_released() && b.is_released());
        assert_eq!(registry.metrics().get_metrics().tickers_running, 0);
    }

    #[tokio::test]
    async fn test_summaries_are_ordered_and_count_users() {
        let registry = quiet_registry();
        registry.create("b-room", 100).unwrap();
        registry.create("a-room", 80).unwrap();

        assert!(registry.join("a-room", "alice").unwrap());
        assert!(registry.join("a-room", "bob").unwrap());
        assert!(!registry.join("a-room", "bob").unwrap());
        assert!(matches!(registry.join("zzz", "carol"), Err(SchedulerError::NotFound { .. })));

        let summaries = registry.summaries();
        let ids: Vec<&str> = summaries.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a-room", "b-room"]);
        assert_eq!(summaries[0].user_count, 2);
        assert_eq!(summaries[1].user_count, 0);
        assert_eq!(registry.members("a-room").unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_journal_failure_degrades_to_remaining_sinks() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let mut config = SchedulerConfig::quiet();
        config.journal.enabled = true;
        config.journal.path = blocker.join("metronome_log.txt");

        let registry = registry_with(config);
        let ticker = registry.create("A", 90).unwrap();
        assert_eq!(ticker.sink_names(), vec!["broadcast"]);
    }

    #[tokio::test]
    async fn test_sinks_registered_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = SchedulerConfig::default();
        config.journal.path = temp_dir.path().join("metronome_log.txt");

        let registry = registry_with(config);
        let ticker = registry.create("A", 90).unwrap();
        assert_eq!(ticker.sink_names(), vec!["broadcast", "console", "journal"]);
    }
}
