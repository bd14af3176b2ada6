use super::TickSink;
use crate::error::SinkError;
use crate::event::TickEvent;
use parking_lot::Mutex;
use std::io::Write;

/// Best-effort console echo: `[Room <id>] Tick #<n> at BPM <rate>`
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl ConsoleSink {
    /// Console sink writing to stdout
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Console sink writing to an arbitrary writer
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self { writer: Mutex::new(Box::new(writer)) }
    }
}

impl TickSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn consume(&self, event: &TickEvent) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", event.message())?;
        writer.flush()?;
        Ok(())
    }

    fn is_best_effort(&self) -> bool {
        true
    }
}
