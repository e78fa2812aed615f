//! # writebehind backup
//!
//! Last-resort persistence for batches that every sink rejected.
//!
//! This crate is the lowest layer of writebehind. It knows nothing about
//! buffers, sinks or flush triggers: it hands out a writable handle, encodes
//! batches into JSON lines and appends them.
//!
//! ## Design Principles
//!
//! - Writers are append-only; existing content is never truncated
//! - One writer is owned by one buffer; no handle is shared between buffers
//! - Encoding failures skip a single record, never the batch
//! - Only failing to obtain a handle loses a batch, and the caller reports it
//!
//! ## Available Writers
//!
//! - [`DailyFileWriter`] - `<dir>/<prefix>.<YYYYMMDD>.log`, rotated per calendar day
//! - [`MemoryWriter`] - For tests and custom pipelines
//!
//! ## Example
//!
//! ```rust
//! use writebehind_backup::{write_backup, BackupLayout, MemoryWriter};
//!
//! let mut writer = MemoryWriter::new();
//! let contents = writer.handle();
//! let report = write_backup(&mut writer, &[1, 2, 3], BackupLayout::PerBatch).unwrap();
//! assert_eq!(report.written_lines, 1);
//! assert_eq!(contents.lines().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod layout;
mod memory;
mod writer;

pub use error::{BackupError, BackupResult};
pub use file::{DailyFileWriter, DEFAULT_DIR_MODE, DEFAULT_FILE_PREFIX};
pub use layout::{
    backup_timestamp, render_records, write_backup, write_backup_at, BackupLayout, BackupReport,
    FailedLine, SkippedRecord,
};
pub use memory::{MemoryContents, MemoryWriter};
pub use writer::BackupWriter;
