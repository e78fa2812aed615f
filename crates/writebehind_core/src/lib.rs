//! # Writebehind Core
//!
//! In-process write-behind buffer.
//!
//! This crate provides:
//! - A concurrent append path for any `serde::Serialize` record type
//! - Dual flush triggers: a capacity threshold and a periodic timer
//! - An ordered failure-fallback chain: primary sink, secondary sink, disk backup
//! - A pluggable log sink, with `tracing` and console implementations
//! - Flush counters for observing where batches ended up
//!
//! ## Architecture
//!
//! Each [`WriteBuffer`] owns two background threads:
//! 1. The **flush** thread consumes flush signals and runs the pipeline
//! 2. The **timer** thread posts a signal every flush interval
//!
//! Producers post a signal when an append brings the buffer to capacity.
//! Every flush drains the whole buffer, so pending signals coalesce.
//!
//! ## Key Invariants
//!
//! - Every record appended before a flush begins is in that flush's batch
//! - No record is delivered in two batches
//! - Flushes never overlap
//! - `stop` performs exactly one terminal flush
//! - Nothing is dropped without being logged

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod config;
mod error;
mod log;
mod pipeline;
mod sink;
mod stats;

pub use buffer::{BufferState, WriteBuffer};
pub use config::{
    BufferConfig, SaturationPolicy, DEFAULT_CAPACITY, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_SIGNAL_QUEUE, MAX_INITIAL_CAPACITY,
};
pub use error::{BufferError, BufferResult, SinkError};
pub use log::{ConsoleLog, LogLevel, LogSink, TracingLog};
pub use sink::{sink_fn, FnSink, Record, Sink};
pub use stats::StatsSnapshot;

pub use writebehind_backup as backup;
pub use writebehind_backup::{BackupLayout, BackupWriter};
