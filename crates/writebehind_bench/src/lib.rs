//! Benchmark utilities.

use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;
use writebehind_core::backup::{BackupResult, BackupWriter};
use writebehind_core::{sink_fn, BufferConfig, LogLevel, LogSink, Sink, WriteBuffer};

/// Record shape used by every benchmark.
#[derive(Debug, Clone, Serialize)]
pub struct BenchRow {
    /// Sequence number.
    pub id: u64,
    /// Producer label.
    pub source: &'static str,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// Generate `count` rows with payloads of `payload_size` bytes.
pub fn generate_rows(count: usize, payload_size: usize) -> Vec<BenchRow> {
    (0..count as u64)
        .map(|id| BenchRow {
            id,
            source: "bench",
            payload: (0..payload_size).map(|i| (i % 256) as u8).collect(),
        })
        .collect()
}

/// Discards every message so logging does not skew timings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&self, _level: LogLevel, _args: std::fmt::Arguments<'_>) {}
}

/// A backup writer that discards everything it is given.
#[derive(Debug)]
pub struct NullBackup(io::Sink);

impl Default for NullBackup {
    fn default() -> Self {
        Self(io::sink())
    }
}

impl BackupWriter for NullBackup {
    fn writable(&mut self) -> BackupResult<&mut dyn Write> {
        Ok(&mut self.0)
    }

    fn close(&mut self) -> BackupResult<()> {
        Ok(())
    }
}

/// A sink that accepts and discards every batch.
pub fn discard_sink() -> impl Sink<BenchRow> {
    sink_fn(|_: &[BenchRow]| Ok(()))
}

/// Starts a buffer that flushes on `capacity` into a discarding sink.
pub fn started_buffer(capacity: usize) -> WriteBuffer<BenchRow> {
    let config = BufferConfig::new()
        .capacity(capacity)
        .flush_interval(Duration::from_secs(60))
        .log_sink(NullLog);
    let buffer = WriteBuffer::new(discard_sink(), discard_sink(), config);
    buffer.start().expect("Failed to start bench buffer");
    buffer
}
