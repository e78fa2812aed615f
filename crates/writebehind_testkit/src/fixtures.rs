//! Test fixtures and buffer helpers.
//!
//! Provides a serializable record type, temporary backup spools and the
//! polling helper the engine tests use to wait on background threads.

use crate::capture::CapturingLog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use writebehind_core::BufferConfig;

/// A small serializable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Unique id.
    pub id: u64,
    /// Free-form label.
    pub name: String,
}

impl Event {
    /// Creates an event.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Creates `count` events with ids starting at `first`.
pub fn events(first: u64, count: usize) -> Vec<Event> {
    (first..first + count as u64)
        .map(|id| Event::new(id, format!("event-{id}")))
        .collect()
}

/// Default configuration with logs captured instead of printed.
pub fn quiet_config() -> (BufferConfig, CapturingLog) {
    let log = CapturingLog::new();
    let config = BufferConfig::new().log_sink(log.clone());
    (config, log)
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns the final value of the condition.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A temporary backup directory with automatic cleanup.
pub struct TestSpool {
    dir: TempDir,
}

impl TestSpool {
    /// Creates an empty spool.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root of the spool.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Backup directory inside the spool; not created until a backup runs.
    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backup")
    }

    /// Files in the backup directory, sorted by name.
    pub fn files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.backup_dir()) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
    }

    /// Every backup line across all files, parsed as JSON.
    pub fn lines(&self) -> Vec<Value> {
        self.files()
            .iter()
            .flat_map(|path| read_lines(path))
            .collect()
    }

    /// The `data` field of every backup line.
    pub fn data(&self) -> Vec<Value> {
        self.lines()
            .into_iter()
            .map(|mut line| line["data"].take())
            .collect()
    }
}

impl Default for TestSpool {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a backup file and parses each line as JSON.
pub fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("Failed to read backup file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Backup line is not JSON"))
        .collect()
}
