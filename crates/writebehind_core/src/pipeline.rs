//! Failure-fallback pipeline: primary sink, then secondary sink, then backup.

use crate::log::LogSink;
use crate::sink::{Record, Sink};
use crate::stats::BufferStats;
use std::fmt;
use std::sync::Arc;
use writebehind_backup::{
    render_records, write_backup, BackupLayout, BackupResult, BackupWriter,
};

/// Which stage ended up holding a flushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushOutcome {
    /// Nothing to flush.
    Empty,
    /// The primary sink accepted the batch.
    Primary,
    /// The secondary sink accepted the batch.
    Secondary,
    /// Both sinks failed and the batch went to the backup writer.
    BackedUp { written: usize, skipped: usize },
    /// Both sinks failed and no backup could be written.
    Dropped,
}

impl fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushOutcome::Empty => f.write_str("empty"),
            FlushOutcome::Primary => f.write_str("primary"),
            FlushOutcome::Secondary => f.write_str("secondary"),
            FlushOutcome::BackedUp { written, skipped } => {
                write!(f, "backed up ({written} written, {skipped} skipped)")
            }
            FlushOutcome::Dropped => f.write_str("dropped"),
        }
    }
}

/// The ordered attempt sequence run on every flush.
///
/// The pipeline is only ever driven by the buffer while it holds the buffer's
/// write lock, so at most one batch is in flight.
pub(crate) struct Pipeline<T> {
    primary: Box<dyn Sink<T>>,
    secondary: Box<dyn Sink<T>>,
    backup: Option<Box<dyn BackupWriter>>,
    layout: BackupLayout,
    log: Arc<dyn LogSink>,
    stats: Arc<BufferStats>,
}

impl<T: Record> Pipeline<T> {
    pub(crate) fn new(
        primary: Box<dyn Sink<T>>,
        secondary: Box<dyn Sink<T>>,
        backup: Option<Box<dyn BackupWriter>>,
        layout: BackupLayout,
        log: Arc<dyn LogSink>,
        stats: Arc<BufferStats>,
    ) -> Self {
        Self {
            primary,
            secondary,
            backup,
            layout,
            log,
            stats,
        }
    }

    /// Delivers `rows`, falling through each stage on failure.
    pub(crate) fn run(&mut self, rows: &[T]) -> FlushOutcome {
        let total = rows.len();
        if total == 0 {
            return FlushOutcome::Empty;
        }
        self.log.debug(format_args!("flushing {total} records"));

        match self.primary.write_batch(rows) {
            Ok(()) => {
                self.stats.record_primary();
                self.log
                    .info(format_args!("primary sink accepted {total} records"));
                return FlushOutcome::Primary;
            }
            Err(e) => self
                .log
                .error(format_args!("primary sink failed for {total} records: {e}")),
        }

        match self.secondary.write_batch(rows) {
            Ok(()) => {
                self.stats.record_secondary();
                self.log
                    .info(format_args!("secondary sink accepted {total} records"));
                return FlushOutcome::Secondary;
            }
            Err(e) => self
                .log
                .error(format_args!("secondary sink failed for {total} records: {e}")),
        }

        self.backup(rows)
    }

    fn backup(&mut self, rows: &[T]) -> FlushOutcome {
        let total = rows.len();
        let Some(writer) = self.backup.as_mut() else {
            self.stats.record_dropped(total);
            self.log.error(format_args!(
                "local backup disabled, dropping {total} records"
            ));
            return FlushOutcome::Dropped;
        };

        let report = match write_backup(writer.as_mut(), rows, self.layout) {
            Ok(report) => report,
            Err(e) => {
                self.stats.record_dropped(total);
                self.log.error(format_args!(
                    "backup unavailable, dropping {total} records: {e}, data: {}",
                    render_records(rows)
                ));
                return FlushOutcome::Dropped;
            }
        };

        for skipped in &report.skipped {
            self.log.error(format_args!(
                "backup skipped record {} of {total}: {}",
                skipped.index, skipped.error
            ));
        }
        for failed in &report.errors {
            self.log.error(format_args!(
                "backup write error: {}, data: {}",
                failed.error,
                failed.data()
            ));
        }

        let written = report.written_records;
        let skipped = report.skipped.len();
        self.stats.record_backup(written, skipped);
        if report.is_clean() {
            self.log
                .warn(format_args!("backed up {written} records to disk"));
        } else {
            self.log.error(format_args!(
                "backed up {written} of {total} records to disk with errors"
            ));
        }

        FlushOutcome::BackedUp { written, skipped }
    }

    /// Closes the backup writer, if any.
    pub(crate) fn close(&mut self) -> BackupResult<()> {
        match self.backup.as_mut() {
            Some(writer) => writer.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::log::LogLevel;
    use crate::sink::sink_fn;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use writebehind_backup::MemoryWriter;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(LogLevel, String)>>);

    impl LogSink for Collect {
        fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
            self.0.lock().push((level, args.to_string()));
        }
    }

    impl Collect {
        fn errors(&self) -> Vec<String> {
            self.0
                .lock()
                .iter()
                .filter(|(level, _)| *level == LogLevel::Error)
                .map(|(_, msg)| msg.clone())
                .collect()
        }
    }

    fn ok_sink(calls: Arc<AtomicUsize>) -> Box<dyn Sink<u32>> {
        Box::new(sink_fn(move |_: &[u32]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn failing_sink(calls: Arc<AtomicUsize>) -> Box<dyn Sink<u32>> {
        Box::new(sink_fn(move |_: &[u32]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::rejected("nope"))
        }))
    }

    struct Fixture {
        primary: Arc<AtomicUsize>,
        secondary: Arc<AtomicUsize>,
        log: Arc<Collect>,
        stats: Arc<BufferStats>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                primary: Arc::new(AtomicUsize::new(0)),
                secondary: Arc::new(AtomicUsize::new(0)),
                log: Arc::new(Collect::default()),
                stats: Arc::new(BufferStats::default()),
            }
        }

        fn pipeline(
            &self,
            primary_ok: bool,
            secondary_ok: bool,
            backup: Option<Box<dyn BackupWriter>>,
        ) -> Pipeline<u32> {
            let primary = if primary_ok {
                ok_sink(Arc::clone(&self.primary))
            } else {
                failing_sink(Arc::clone(&self.primary))
            };
            let secondary = if secondary_ok {
                ok_sink(Arc::clone(&self.secondary))
            } else {
                failing_sink(Arc::clone(&self.secondary))
            };
            Pipeline::new(
                primary,
                secondary,
                backup,
                BackupLayout::PerRecord,
                Arc::clone(&self.log) as Arc<dyn LogSink>,
                Arc::clone(&self.stats),
            )
        }
    }

    #[test]
    fn empty_batch_is_noop() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(true, true, None);

        assert_eq!(pipeline.run(&[]), FlushOutcome::Empty);
        assert_eq!(fx.primary.load(Ordering::SeqCst), 0);
        assert!(fx.log.0.lock().is_empty());
    }

    #[test]
    fn primary_success_stops_chain() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(true, true, None);

        assert_eq!(pipeline.run(&[1, 2]), FlushOutcome::Primary);
        assert_eq!(fx.primary.load(Ordering::SeqCst), 1);
        assert_eq!(fx.secondary.load(Ordering::SeqCst), 0);
        assert_eq!(fx.stats.snapshot().primary_batches, 1);
    }

    #[test]
    fn secondary_catches_primary_failure() {
        let fx = Fixture::new();
        let writer = MemoryWriter::new();
        let contents = writer.handle();
        let mut pipeline = fx.pipeline(false, true, Some(Box::new(writer)));

        assert_eq!(pipeline.run(&[1, 2]), FlushOutcome::Secondary);
        assert_eq!(fx.secondary.load(Ordering::SeqCst), 1);
        assert_eq!(contents.open_count(), 0);
        assert!(fx.log.errors()[0].contains("primary sink failed for 2 records"));
    }

    #[test]
    fn backup_after_both_fail() {
        let fx = Fixture::new();
        let writer = MemoryWriter::new();
        let contents = writer.handle();
        let mut pipeline = fx.pipeline(false, false, Some(Box::new(writer)));

        let outcome = pipeline.run(&[7, 8, 9]);
        assert_eq!(
            outcome,
            FlushOutcome::BackedUp {
                written: 3,
                skipped: 0
            }
        );
        assert_eq!(contents.lines().len(), 3);
        assert_eq!(fx.stats.snapshot().backup_records, 3);
    }

    #[test]
    fn disabled_backup_drops_loudly() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(false, false, None);

        assert_eq!(pipeline.run(&[1]), FlushOutcome::Dropped);
        assert!(fx
            .log
            .errors()
            .iter()
            .any(|m| m.contains("dropping 1 records")));
        assert_eq!(fx.stats.snapshot().dropped_records, 1);
    }

    #[test]
    fn unavailable_backup_drops_loudly() {
        let fx = Fixture::new();
        let writer = MemoryWriter::new();
        writer.handle().set_unavailable(Some("read-only filesystem"));
        let mut pipeline = fx.pipeline(false, false, Some(Box::new(writer)));

        assert_eq!(pipeline.run(&[1, 2]), FlushOutcome::Dropped);
        assert!(fx
            .log
            .errors()
            .iter()
            .any(|m| m.contains("backup unavailable") && m.contains("read-only filesystem")));
    }

    #[test]
    fn dropped_batch_is_logged_with_its_records() {
        let fx = Fixture::new();
        let writer = MemoryWriter::new();
        writer.handle().set_unavailable(Some("disk full"));
        let mut pipeline = fx.pipeline(false, false, Some(Box::new(writer)));

        assert_eq!(pipeline.run(&[314, 2718]), FlushOutcome::Dropped);
        assert!(fx
            .log
            .errors()
            .iter()
            .any(|m| m.contains("dropping 2 records") && m.ends_with("data: [314,2718]")));
    }

    #[test]
    fn close_forwards_to_writer() {
        let fx = Fixture::new();
        let writer = MemoryWriter::new();
        let contents = writer.handle();
        let mut pipeline = fx.pipeline(true, true, Some(Box::new(writer)));

        pipeline.close().unwrap();
        assert_eq!(contents.close_count(), 1);

        let mut without = fx.pipeline(true, true, None);
        assert!(without.close().is_ok());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(FlushOutcome::Primary.to_string(), "primary");
        assert_eq!(
            FlushOutcome::BackedUp {
                written: 2,
                skipped: 1
            }
            .to_string(),
            "backed up (2 written, 1 skipped)"
        );
    }
}
