//! A log sink that keeps every message for later assertions.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use writebehind_core::{LogLevel, LogSink};

/// Captures `(level, message)` pairs. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct CapturingLog {
    entries: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CapturingLog {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages logged at exactly `level`.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns true if some message at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    /// Number of messages at `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogSink for CapturingLog {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        self.entries.lock().push((level, args.to_string()));
    }
}
