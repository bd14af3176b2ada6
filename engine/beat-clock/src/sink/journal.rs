use super::TickSink;
use crate::error::SinkError;
use crate::event::TickEvent;
use tick_journal::{Journal, JournalConfig};

/// Durable log sink: one `<timestamp> - [Room <id>] Tick #<n> at BPM <rate>` line per tick
#[derive(Debug)]
pub struct JournalSink {
    journal: Journal,
}

impl JournalSink {
    /// Open the journal in append mode
    pub fn open(config: JournalConfig) -> Result<Self, SinkError> {
        Ok(Self { journal: Journal::open(config)? })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl TickSink for JournalSink {
    fn name(&self) -> &str {
        "journal"
    }

    fn consume(&self, event: &TickEvent) -> Result<(), SinkError> {
        self.journal.append_line(&event.log_line()).map_err(|e| {
            if e.is_closed() {
                SinkError::Closed { sink: self.name().to_string() }
            } else {
                SinkError::Journal(e)
            }
        })
    }

    fn close(&self) {
        if let Err(e) = self.journal.close() {
            tracing::warn!("Failed to close journal {:?}: {}", self.journal.path(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_journal_sink_appends_log_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metronome_log.txt");
        let sink = JournalSink::open(JournalConfig::new(&path)).unwrap();

        let timestamp = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().unwrap();
        sink.consume(&TickEvent::new("A", 5, 120, timestamp)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "2024-01-02T03:04:05.000 - [Room A] Tick #5 at BPM 120\n");
    }

    #[test]
    fn test_journal_sink_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JournalSink::open(JournalConfig::new(temp_dir.path().join("log.txt"))).unwrap();

        sink.close();
        sink.close();
        assert!(sink.journal().is_closed());

        let result = sink.consume(&TickEvent::new("A", 1, 60, Local::now()));
        assert!(matches!(result, Err(SinkError::Closed { .. })));
    }
}
