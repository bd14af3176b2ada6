//! Per-session ticker: tempo, run-state and the emission loop
//!
//! Each running ticker owns one tokio task. The task waits until the next
//! deadline, then re-checks the run-state under the ticker's control mutex and
//! emits exactly one event. `stop()` takes the same mutex, so once it returns no
//! further tick can be emitted.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{ClockSource, SystemClock};
use crate::config::{SchedulerConfig, TimingMode};
use crate::error::SchedulerError;
use crate::event::TickEvent;
use crate::metrics::MetricsCollector;
use crate::sink::{BroadcastSink, CompositeSink, TickSink};
use crate::MS_PER_MINUTE;

/// Ticker run-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Stopped,
    Running,
}

/// Inter-tick delay for a tempo: `60000 / bpm` milliseconds, truncated.
///
/// Not clamped: tempos above 60000 BPM give a zero delay.
pub fn delay_for_rate(bpm: u32) -> Duration {
    Duration::from_millis(MS_PER_MINUTE / u64::from(bpm.max(1)))
}

/// Everything a ticker needs from its owner
#[derive(Debug, Clone)]
pub struct TickerContext {
    pub clock: Arc<dyn ClockSource>,
    pub metrics: Arc<MetricsCollector>,
    pub runtime: Handle,
    /// Parent of every loop's cancellation token; cancelling it stops all loops
    pub shutdown: CancellationToken,
    pub timing_mode: TimingMode,
    pub slow_sink_threshold: Duration,
    pub broadcast_capacity: usize,
}

impl TickerContext {
    /// Context bound to the current tokio runtime
    pub fn current(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self {
            clock: Arc::new(SystemClock),
            metrics: Arc::new(MetricsCollector::new()),
            runtime,
            shutdown: CancellationToken::new(),
            timing_mode: config.timing_mode,
            slow_sink_threshold: config.slow_sink_threshold(),
            broadcast_capacity: config.broadcast_capacity,
        })
    }
}

struct Control {
    run_state: RunState,
    tick_count: u64,
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

enum Step {
    Continue,
    Exit,
}

struct TickerCore {
    session_id: String,
    rate: AtomicU32,
    control: Mutex<Control>,
    // lock-free mirrors of `control`, written only while it is held
    running: AtomicBool,
    tick_count: AtomicU64,
    sinks: CompositeSink,
    broadcast: Arc<BroadcastSink>,
    clock: Arc<dyn ClockSource>,
    metrics: Arc<MetricsCollector>,
    timing_mode: TimingMode,
}

/// One session's periodic tick source
pub struct Ticker {
    core: Arc<TickerCore>,
    runtime: Handle,
    shutdown: CancellationToken,
    released: AtomicBool,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("session_id", &self.core.session_id)
            .field("rate", &self.rate())
            .field("state", &self.state())
            .field("tick_count", &self.tick_count())
            .finish()
    }
}

impl Ticker {
    /// Create a stopped ticker.
    ///
    /// The broadcast sink backing [`Ticker::subscribe`] is registered first; the
    /// owner adds console and journal sinks with [`Ticker::add_sink`].
    pub fn new(session_id: impl Into<String>, rate: NonZeroU32, context: TickerContext) -> Self {
        let session_id = session_id.into();

        let broadcast = Arc::new(BroadcastSink::new(context.broadcast_capacity));
        let sinks = CompositeSink::new(session_id.clone())
            .with_metrics(context.metrics.clone())
            .with_slow_threshold(context.slow_sink_threshold);
        sinks.push(broadcast.clone());

        let core = Arc::new(TickerCore {
            session_id,
            rate: AtomicU32::new(rate.get()),
            control: Mutex::new(Control {
                run_state: RunState::Stopped,
                tick_count: 0,
                generation: 0,
                cancel: None,
                task: None,
            }),
            running: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            sinks,
            broadcast,
            clock: context.clock,
            metrics: context.metrics,
            timing_mode: context.timing_mode,
        });

        Self {
            core,
            runtime: context.runtime,
            shutdown: context.shutdown,
            released: AtomicBool::new(false),
        }
    }

    /// Begin emitting. No-op while already running.
    pub fn start(&self) {
        let mut control = self.core.control.lock();

        if control.run_state == RunState::Running {
            return;
        }

        if self.is_released() {
            tracing::warn!("Ignoring start for released session {}", self.core.session_id);
            return;
        }

        if self.shutdown.is_cancelled() {
            tracing::warn!(
                "Ignoring start for session {}: scheduler is shutting down",
                self.core.session_id
            );
            return;
        }

        control.generation += 1;
        control.run_state = RunState::Running;
        control.tick_count = 0;
        self.core.running.store(true, Ordering::Release);
        self.core.tick_count.store(0, Ordering::Release);

        let cancel = self.shutdown.child_token();
        let generation = control.generation;
        let core = self.core.clone();
        let loop_token = cancel.clone();
        let task = self.runtime.spawn(async move { core.run_loop(generation, loop_token).await });

        control.cancel = Some(cancel);
        control.task = Some(task);
        self.core.metrics.ticker_started();

        tracing::info!(
            "Started session {} at {} BPM (generation {})",
            self.core.session_id,
            self.rate(),
            generation
        );
    }

    /// Stop emitting. No tick is emitted after this returns. No-op while stopped.
    pub fn stop(&self) {
        if self.core.halt() {
            tracing::info!(
                "Stopped session {} after {} ticks",
                self.core.session_id,
                self.tick_count()
            );
        }
    }

    /// Change the tempo.
    ///
    /// Positive values apply to the next computed delay; the wait already in
    /// progress keeps its deadline. Non-positive (or out of range) values are
    /// ignored and `false` is returned.
    pub fn set_rate(&self, bpm: i64) -> bool {
        match u32::try_from(bpm) {
            Ok(rate) if rate > 0 => {
                let previous = self.core.rate.swap(rate, Ordering::AcqRel);
                self.core.metrics.record_rate_change(true);
                tracing::debug!(
                    "Session {} rate {} -> {} BPM",
                    self.core.session_id,
                    previous,
                    rate
                );
                true
            }
            _ => {
                self.core.metrics.record_rate_change(false);
                tracing::debug!(
                    "Rejected rate {} for session {}; keeping {} BPM",
                    bpm,
                    self.core.session_id,
                    self.rate()
                );
                false
            }
        }
    }

    pub fn rate(&self) -> u32 {
        self.core.rate()
    }

    pub fn state(&self) -> RunState {
        if self.core.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn tick_count(&self) -> u64 {
        self.core.tick_count.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> &str {
        &self.core.session_id
    }

    /// Append a sink after the ones already registered
    pub fn add_sink(&self, sink: Arc<dyn TickSink>) {
        self.core.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.core.sinks.names()
    }

    /// Receive this session's ticks asynchronously; `None` once released
    pub fn subscribe(&self) -> Option<tokio::sync::broadcast::Receiver<TickEvent>> {
        self.core.broadcast.subscribe()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Stop and close every sink. Runs once; later calls do nothing.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop();
        self.core.sinks.close();
        tracing::debug!("Released session {}", self.core.session_id);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.release();
    }
}

impl TickerCore {
    fn rate(&self) -> u32 {
        self.rate.load(Ordering::Acquire)
    }

    /// Transition to Stopped; returns whether the ticker was running
    fn halt(&self) -> bool {
        let mut control = self.control.lock();
        if control.run_state == RunState::Stopped {
            return false;
        }

        control.run_state = RunState::Stopped;
        self.running.store(false, Ordering::Release);
        if let Some(cancel) = control.cancel.take() {
            cancel.cancel();
        }
        // the loop exits on its own once it observes the cancellation
        control.task.take();
        self.metrics.ticker_stopped();
        true
    }

    async fn run_loop(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let mut anchor = self.clock.now();

        loop {
            let delay = delay_for_rate(self.rate());
            let now = self.clock.now();
            let deadline = match self.timing_mode {
                TimingMode::Anchored => {
                    let next = anchor + delay;
                    // more than a whole period behind: resync instead of bursting
                    if now.saturating_duration_since(next) > delay {
                        now
                    } else {
                        next
                    }
                }
                TimingMode::Relative => now + delay,
            };

            let interrupted = if deadline <= now {
                // zero delay or behind schedule: keep the runtime responsive
                tokio::task::yield_now().await;
                cancel.is_cancelled()
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep_until(deadline) => false,
                }
            };

            match self.on_wake(generation, interrupted, deadline) {
                Step::Continue => anchor = deadline,
                Step::Exit => break,
            }
        }

        tracing::trace!("Emission loop for session {} (generation {}) exited", self.session_id, generation);
    }

    fn on_wake(&self, generation: u64, interrupted: bool, deadline: Instant) -> Step {
        let mut control = self.control.lock();

        if control.generation != generation || control.run_state != RunState::Running {
            return Step::Exit;
        }

        if interrupted {
            // cancelled by the owner's shutdown token rather than by stop()
            control.run_state = RunState::Stopped;
            self.running.store(false, Ordering::Release);
            control.cancel.take();
            control.task.take();
            self.metrics.ticker_stopped();
            self.metrics.record_implicit_stop();
            tracing::warn!(
                "Emission loop for session {} was cancelled; session stopped after {} ticks",
                self.session_id,
                control.tick_count
            );
            return Step::Exit;
        }

        let lateness = self.clock.now().saturating_duration_since(deadline);
        control.tick_count += 1;
        self.tick_count.store(control.tick_count, Ordering::Release);

        let event =
            TickEvent::new(self.session_id.clone(), control.tick_count, self.rate(), self.clock.timestamp());
        tracing::trace!("{}", event.message());

        let fanout_started = std::time::Instant::now();
        if let Err(e) = self.sinks.consume(&event) {
            tracing::trace!("Tick #{} for session {}: {}", event.sequence, self.session_id, e);
        }
        self.metrics.record_tick(&self.session_id, lateness, fanout_started.elapsed());

        Step::Continue
    }
}
