//! Demo command implementation.

use clap::ValueEnum;
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use writebehind_core::{
    sink_fn, BackupLayout, BufferConfig, Sink, SinkError, StatsSnapshot, TracingLog, WriteBuffer,
};

/// Event appended by the demo.
#[derive(Debug, Clone, Serialize)]
pub struct DemoEvent {
    /// Sequence number.
    pub id: u64,
    /// Label derived from the id.
    pub name: String,
}

/// Backup layout as a command-line value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// One line per record.
    PerRecord,
    /// One line per flushed batch.
    PerBatch,
}

impl From<LayoutArg> for BackupLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::PerRecord => BackupLayout::PerRecord,
            LayoutArg::PerBatch => BackupLayout::PerBatch,
        }
    }
}

/// Demo settings collected from the command line.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    /// Flush threshold.
    pub capacity: usize,
    /// Timer period in milliseconds.
    pub interval_ms: u64,
    /// Events to append.
    pub count: u64,
    /// Pause between appends in milliseconds.
    pub rate_ms: u64,
    /// Backup directory, if any.
    pub backup_dir: Option<PathBuf>,
    /// Backup file prefix.
    pub prefix: String,
    /// Backup directory mode.
    pub mode: u32,
    /// Backup line layout.
    pub layout: LayoutArg,
    /// Reject every batch at the primary sink.
    pub fail_primary: bool,
    /// Reject every batch at the secondary sink.
    pub fail_secondary: bool,
}

/// Demo run summary.
#[derive(Debug, Serialize)]
pub struct DemoReport {
    /// Events appended.
    pub appended: u64,
    /// Wall time of the run, including shutdown.
    pub elapsed_ms: u128,
    /// Flushes run.
    pub flushes: u64,
    /// Batches the primary sink accepted.
    pub primary_batches: u64,
    /// Batches the secondary sink accepted.
    pub secondary_batches: u64,
    /// Records written to the backup.
    pub backup_records: u64,
    /// Records lost because no backup was possible.
    pub dropped_records: u64,
}

impl DemoReport {
    fn new(appended: u64, elapsed: Duration, stats: &StatsSnapshot) -> Self {
        Self {
            appended,
            elapsed_ms: elapsed.as_millis(),
            flushes: stats.flushes,
            primary_batches: stats.primary_batches,
            secondary_batches: stats.secondary_batches,
            backup_records: stats.backup_records,
            dropped_records: stats.dropped_records,
        }
    }
}

fn demo_sink(name: &'static str, fail: bool) -> impl Sink<DemoEvent> {
    sink_fn(move |rows: &[DemoEvent]| {
        if fail {
            return Err(SinkError::rejected(format!("{name} sink configured to fail")));
        }
        if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
            tracing::info!(sink = name, first = first.id, last = last.id, "delivered");
        }
        Ok(())
    })
}

/// Builds the buffer configuration for `options`.
pub fn config(options: &DemoOptions) -> BufferConfig {
    let mut config = BufferConfig::new()
        .capacity(options.capacity)
        .flush_interval(Duration::from_millis(options.interval_ms))
        .backup_layout(options.layout.into())
        .log_sink(TracingLog);
    if let Some(dir) = &options.backup_dir {
        config = config.backup_dir(dir.clone(), &options.prefix, options.mode);
    }
    config
}

/// Runs the demo command.
pub fn run(options: &DemoOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let buffer = WriteBuffer::new(
        demo_sink("primary", options.fail_primary),
        demo_sink("secondary", options.fail_secondary),
        config(options),
    );
    buffer.start()?;

    let started = Instant::now();
    let pause = Duration::from_millis(options.rate_ms);
    for id in 1..=options.count {
        buffer.add(DemoEvent {
            id,
            name: format!("event-{id}"),
        });
        tracing::debug!(id, len = buffer.len(), "appended");
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
    buffer.stop()?;

    let report = DemoReport::new(options.count, started.elapsed(), &buffer.stats());
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    Ok(())
}

fn print_text(report: &DemoReport) {
    println!("Appended:          {}", report.appended);
    println!("Elapsed:           {} ms", report.elapsed_ms);
    println!("Flushes:           {}", report.flushes);
    println!("Primary batches:   {}", report.primary_batches);
    println!("Secondary batches: {}", report.secondary_batches);
    println!("Backed up records: {}", report.backup_records);
    println!("Dropped records:   {}", report.dropped_records);
}
