//! In-memory backup writer for testing.

use crate::error::{BackupError, BackupResult};
use crate::writer::BackupWriter;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A backup writer that keeps everything in memory.
///
/// The writer is usually moved into a buffer, so inspection happens through
/// a [`MemoryContents`] handle taken beforehand.
///
/// # Example
///
/// ```rust
/// use std::io::Write;
/// use writebehind_backup::{BackupWriter, MemoryWriter};
///
/// let mut writer = MemoryWriter::new();
/// let contents = writer.handle();
/// writer.writable().unwrap().write_all(b"line\n").unwrap();
/// assert_eq!(contents.lines(), vec!["line".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryWriter {
    sink: SharedBuf,
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    opens: AtomicUsize,
    closes: AtomicUsize,
    unavailable: Mutex<Option<String>>,
}

#[derive(Debug, Default, Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MemoryWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle for inspecting what has been written.
    #[must_use]
    pub fn handle(&self) -> MemoryContents {
        MemoryContents {
            buf: self.sink.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl BackupWriter for MemoryWriter {
    fn writable(&mut self) -> BackupResult<&mut dyn Write> {
        if let Some(reason) = self.shared.unavailable.lock().clone() {
            return Err(BackupError::Unavailable(reason));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(&mut self.sink)
    }

    fn close(&mut self) -> BackupResult<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Read side of a [`MemoryWriter`].
#[derive(Debug, Clone)]
pub struct MemoryContents {
    buf: SharedBuf,
    shared: Arc<Shared>,
}

impl MemoryContents {
    /// Returns a copy of all bytes written.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.buf.0.lock().clone()
    }

    /// Returns the written content split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.bytes())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of times a handle was requested successfully.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Number of times the writer was closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Makes subsequent `writable` calls fail with `reason`, or succeed again
    /// when `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.shared.unavailable.lock() = reason.map(str::to_string);
    }
}
