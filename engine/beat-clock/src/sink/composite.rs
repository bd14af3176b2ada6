use super::TickSink;
use crate::error::SinkError;
use crate::event::TickEvent;
use crate::metrics::MetricsCollector;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ordered fan-out over a session's sinks.
///
/// Every sink sees every event, even when an earlier sink fails. Failures are
/// logged and counted here so the emission loop never has to handle them.
pub struct CompositeSink {
    session_id: String,
    sinks: RwLock<Vec<Arc<dyn TickSink>>>,
    metrics: Option<Arc<MetricsCollector>>,
    slow_threshold: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for CompositeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.sinks.read().iter().map(|s| s.name().to_string()).collect();
        f.debug_struct("CompositeSink")
            .field("session_id", &self.session_id)
            .field("sinks", &names)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl CompositeSink {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sinks: RwLock::new(Vec::new()),
            metrics: None,
            slow_threshold: Duration::from_millis(crate::DEFAULT_SLOW_SINK_WARN_MS),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Append a sink; it receives events after every previously added sink
    pub fn push(&self, sink: Arc<dyn TickSink>) {
        self.sinks.write().push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.read().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn report_failure(&self, sink: &dyn TickSink, event: &TickEvent, error: &SinkError) {
        if sink.is_best_effort() {
            tracing::debug!(
                "Sink {} dropped tick #{} for session {}: {}",
                sink.name(),
                event.sequence,
                self.session_id,
                error
            );
        } else {
            tracing::warn!(
                "Sink {} failed on tick #{} for session {}: {}",
                sink.name(),
                event.sequence,
                self.session_id,
                error
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sink_failure(&self.session_id, sink.name());
        }
    }
}

impl TickSink for CompositeSink {
    fn name(&self) -> &str {
        "composite"
    }

    fn consume(&self, event: &TickEvent) -> Result<(), SinkError> {
        // Snapshot so a sink added mid-tick cannot deadlock against the fan-out
        let sinks: Vec<Arc<dyn TickSink>> = self.sinks.read().clone();
        let mut failed = 0;

        for sink in &sinks {
            let started = Instant::now();
            let result = sink.consume(event);
            let elapsed = started.elapsed();

            if elapsed > self.slow_threshold {
                tracing::warn!(
                    "Slow sink {} took {:?} on tick #{} for session {} (threshold {:?})",
                    sink.name(),
                    elapsed,
                    event.sequence,
                    self.session_id,
                    self.slow_threshold
                );
            }

            if let Err(e) = result {
                self.report_failure(sink.as_ref(), event, &e);
                failed += 1;
            }
        }

        if failed > 0 {
            Err(SinkError::Partial { failed })
        } else {
            Ok(())
        }
    }

    /// Close every sink once, in registration order
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for sink in self.sinks.read().iter() {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        closes: AtomicUsize,
    }

    impl Recording {
        fn new(label: &'static str, log: Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Self> {
            Arc::new(Self { label, log, fail, closes: AtomicUsize::new(0) })
        }
    }

    impl TickSink for Recording {
        fn name(&self) -> &str {
            self.label
        }

        fn consume(&self, event: &TickEvent) -> Result<(), SinkError> {
            self.log.lock().push(format!("{}:{}", self.label, event.sequence));
            if self.fail {
                Err(SinkError::Closed { sink: self.label.to_string() })
            } else {
                Ok(())
            }
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_registration_order_and_failure_isolation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let metrics = Arc::new(MetricsCollector::new());
        let composite = CompositeSink::new("A").with_metrics(metrics.clone());

        composite.push(Recording::new("first", log.clone(), true));
        composite.push(Recording::new("second", log.clone(), false));
        assert_eq!(composite.names(), vec!["first", "second"]);

        let result = composite.consume(&TickEvent::new("A", 1, 60, Local::now()));
        assert!(matches!(result, Err(SinkError::Partial { failed: 1 })));

        composite.consume(&TickEvent::new("A", 2, 60, Local::now())).unwrap_err();

        assert_eq!(*log.lock(), vec!["first:1", "second:1", "first:2", "second:2"]);
        assert_eq!(metrics.get_metrics().total_sink_failures, 2);
    }

    #[test]
    fn test_close_runs_once_per_sink() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Recording::new("only", log, false);
        let composite = CompositeSink::new("A");
        composite.push(sink.clone());

        composite.close();
        composite.close();

        assert!(composite.is_closed());
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_composite_accepts_events() {
        let composite = CompositeSink::new("A");
        assert!(composite.is_empty());
        assert!(composite.consume(&TickEvent::new("A", 1, 60, Local::now())).is_ok());
    }
}
