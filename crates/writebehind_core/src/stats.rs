//! Flush counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the flush pipeline.
#[derive(Debug, Default)]
pub(crate) struct BufferStats {
    flushes: AtomicU64,
    records_flushed: AtomicU64,
    primary_batches: AtomicU64,
    secondary_batches: AtomicU64,
    backup_batches: AtomicU64,
    backup_records: AtomicU64,
    skipped_records: AtomicU64,
    dropped_batches: AtomicU64,
    dropped_records: AtomicU64,
    panics: AtomicU64,
}

impl BufferStats {
    #[inline]
    pub(crate) fn record_flush(&self, records: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_flushed
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_primary(&self) {
        self.primary_batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_secondary(&self) {
        self.secondary_batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_backup(&self, written: usize, skipped: usize) {
        self.backup_batches.fetch_add(1, Ordering::Relaxed);
        self.backup_records
            .fetch_add(written as u64, Ordering::Relaxed);
        self.skipped_records
            .fetch_add(skipped as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self, records: usize) {
        self.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.dropped_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            primary_batches: self.primary_batches.load(Ordering::Relaxed),
            secondary_batches: self.secondary_batches.load(Ordering::Relaxed),
            backup_batches: self.backup_batches.load(Ordering::Relaxed),
            backup_records: self.backup_records.load(Ordering::Relaxed),
            skipped_records: self.skipped_records.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a buffer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Non-empty flushes started.
    pub flushes: u64,
    /// Records drained from the buffer.
    pub records_flushed: u64,
    /// Batches accepted by the primary sink.
    pub primary_batches: u64,
    /// Batches accepted by the secondary sink.
    pub secondary_batches: u64,
    /// Batches handed to the backup writer.
    pub backup_batches: u64,
    /// Records written to the backup.
    pub backup_records: u64,
    /// Records left out of the backup because they failed to serialize.
    pub skipped_records: u64,
    /// Batches lost because no backup could be written.
    pub dropped_batches: u64,
    /// Records in those batches.
    pub dropped_records: u64,
    /// Flushes aborted by a panicking sink.
    pub panics: u64,
}
