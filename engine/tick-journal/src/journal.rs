//! Append-only journal file
//!
//! One line per record. Each line is written through a `BufWriter` and flushed
//! immediately, so buffering only coalesces the line and its newline into a
//! single write.

use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only journal backed by a single file handle
pub struct Journal {
    config: JournalConfig,
    writer: Mutex<Option<BufWriter<File>>>,
    lines_written: AtomicU64,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.config.path)
            .field("closed", &self.is_closed())
            .field("lines_written", &self.lines_written())
            .finish()
    }
}

impl Journal {
    /// Open (or create) the journal file in append mode
    pub fn open(config: JournalConfig) -> Result<Self> {
        config.validate().map_err(JournalError::config)?;

        if config.create_dirs {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&config.path)?;

        tracing::debug!("Opened tick journal at {:?}", config.path);

        Ok(Self {
            config,
            writer: Mutex::new(Some(BufWriter::new(file))),
            lines_written: AtomicU64::new(0),
        })
    }

    /// Append one line and flush it
    pub fn append_line(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| self.closed_error())?;

        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        if self.config.fsync_every_write {
            writer.get_ref().sync_data()?;
        }

        self.lines_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush and release the file handle.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().take() else {
            return Ok(());
        };

        writer.flush()?;
        if self.config.fsync_every_write {
            writer.get_ref().sync_all()?;
        }

        tracing::debug!(
            "Closed tick journal at {:?} after {} lines",
            self.config.path,
            self.lines_written()
        );
        Ok(())
    }

    /// Whether the handle has been released
    pub fn is_closed(&self) -> bool {
        self.writer.lock().is_none()
    }

    /// Number of lines appended through this handle
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Journal configuration
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    fn closed_error(&self) -> JournalError {
        JournalError::Closed { path: self.config.path.display().to_string() }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close tick journal {:?}: {}", self.config.path, e);
        }
    }
}

/// Build the per-session journal path `<dir>/<session>.log`.
///
/// The id is percent-encoded, so distinct ids always map to distinct files and
/// no id can escape `dir`.
pub fn session_journal_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("{}.log", urlencoding::encode(session_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_append_and_flush_each_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ticks.log");
        let journal = Journal::open(JournalConfig::new(&path)).unwrap();

        journal.append_line("first").unwrap();
        // Visible on disk before close
        assert_eq!(read(&path), "first\n");

        journal.append_line("second").unwrap();
        assert_eq!(read(&path), "first\nsecond\n");
        assert_eq!(journal.lines_written(), 2);
    }

    #[test]
    fn test_reopen_appends_never_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ticks.log");

        {
            let journal = Journal::open(JournalConfig::new(&path)).unwrap();
            journal.append_line("one").unwrap();
        }

        let journal = Journal::open(JournalConfig::new(&path)).unwrap();
        journal.append_line("two").unwrap();
        journal.close().unwrap();

        assert_eq!(read(&path), "one\ntwo\n");
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ticks.log");
        let journal = Journal::open(JournalConfig::new(&path).with_fsync(true)).unwrap();

        journal.append_line("only").unwrap();
        journal.close().unwrap();
        journal.close().unwrap();
        assert!(journal.is_closed());

        let err = journal.append_line("late").unwrap_err();
        assert!(err.is_closed());
        assert_eq!(read(&path), "only\n");
    }

    #[test]
    fn test_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("ticks.log");
        let journal = Journal::open(JournalConfig::new(&path)).unwrap();
        journal.append_line("x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_fails_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a dir").unwrap();

        let result = Journal::open(JournalConfig::new(blocker.join("ticks.log")));
        assert!(matches!(result, Err(JournalError::Io(_))));
    }

    #[test]
    fn test_session_journal_path() {
        let dir = Path::new("logs");
        assert_eq!(session_journal_path(dir, "R1"), PathBuf::from("logs/R1.log"));
        assert_eq!(session_journal_path(dir, "a/b c"), PathBuf::from("logs/a%2Fb%20c.log"));
        assert_eq!(session_journal_path(dir, "../up"), PathBuf::from("logs/..%2Fup.log"));
        assert_eq!(session_journal_path(dir, ""), PathBuf::from("logs/.log"));
    }

    #[test]
    fn test_distinct_sessions_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let ids = ["a/b", "a b", "a_b", "a%2Fb"];

        let paths: Vec<PathBuf> =
            ids.iter().map(|id| session_journal_path(temp_dir.path(), id)).collect();
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path.parent(), Some(temp_dir.path()));
            for other in &paths[i + 1..] {
                assert_ne!(path, other);
            }
        }

        for (id, path) in ids.iter().zip(&paths) {
            let journal = Journal::open(JournalConfig::new(path)).unwrap();
            journal.append_line(id).unwrap();
            journal.close().unwrap();
        }

        for (id, path) in ids.iter().zip(&paths) {
            assert_eq!(read(path), format!("{id}\n"));
        }
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), ids.len());
    }
}
