//! Backup line layout and the buffered backup write.
//!
//! Every line is a standalone JSON object:
//!
//! ```text
//! {"time":"2025-01-15T10:30:45.123+08:00","data":{"id":1}}        # PerRecord
//! {"time":"2025-01-15T10:30:45.123+08:00","data":[{"id":1},...]}  # PerBatch
//! ```
//!
//! The timestamp is taken once per backup call and shared by every line the
//! call writes.

use crate::error::{BackupError, BackupResult};
use crate::writer::BackupWriter;
use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use serde_json::value::RawValue;
use std::borrow::Cow;
use std::io::{BufWriter, Write};

/// How a failed batch is laid out in the backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupLayout {
    /// One line per record.
    #[default]
    PerRecord,
    /// One line per batch, with every record in a `data` array.
    PerBatch,
}

/// A record left out of the backup because it failed to serialize.
#[derive(Debug)]
pub struct SkippedRecord {
    /// Position of the record in the batch.
    pub index: usize,
    /// Why serialization failed.
    pub error: serde_json::Error,
}

/// What a single backup call managed to write.
#[derive(Debug, Default)]
pub struct BackupReport {
    /// Lines accepted by the buffered stream.
    pub written_lines: usize,
    /// Records contained in those lines.
    pub written_records: usize,
    /// Records skipped because they failed to serialize.
    pub skipped: Vec<SkippedRecord>,
    /// Write, flush or envelope errors. None of them abort the call.
    pub errors: Vec<FailedLine>,
}

/// Encoded data that may not have reached the backup handle.
#[derive(Debug)]
pub struct FailedLine {
    /// What went wrong.
    pub error: BackupError,
    /// The affected bytes. A flush failure carries every line buffered by
    /// the call, since the stream cannot tell which of them were lost.
    pub bytes: Vec<u8>,
}

impl FailedLine {
    /// The affected bytes as text, without the trailing newline.
    #[must_use]
    pub fn data(&self) -> Cow<'_, str> {
        let bytes = self.bytes.strip_suffix(b"\n").unwrap_or(&self.bytes);
        String::from_utf8_lossy(bytes)
    }
}

impl BackupReport {
    /// Returns true if every record was written without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.errors.is_empty()
    }
}

#[derive(Serialize)]
struct Line<'a, D: Serialize> {
    time: &'a str,
    data: D,
}

struct EncodedLine {
    bytes: Vec<u8>,
    records: usize,
}

/// Formats the shared timestamp of a backup call.
#[must_use]
pub fn backup_timestamp(now: DateTime<Local>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Writes `rows` to the writer's current handle using the current time.
///
/// # Errors
///
/// Returns an error only if no handle could be obtained; the batch is lost
/// in that case. Everything else is collected in the [`BackupReport`].
pub fn write_backup<W, T>(
    writer: &mut W,
    rows: &[T],
    layout: BackupLayout,
) -> BackupResult<BackupReport>
where
    W: BackupWriter + ?Sized,
    T: Serialize,
{
    write_backup_at(writer, rows, layout, Local::now())
}

/// Same as [`write_backup`] with an explicit timestamp.
///
/// # Errors
///
/// Returns an error only if no handle could be obtained.
pub fn write_backup_at<W, T>(
    writer: &mut W,
    rows: &[T],
    layout: BackupLayout,
    now: DateTime<Local>,
) -> BackupResult<BackupReport>
where
    W: BackupWriter + ?Sized,
    T: Serialize,
{
    let mut report = BackupReport::default();
    if rows.is_empty() {
        return Ok(report);
    }

    let time = backup_timestamp(now);
    let lines = encode_lines(rows, layout, &time, &mut report);

    let handle = writer.writable()?;
    let mut out = BufWriter::new(handle);
    let mut buffered = Vec::new();
    for line in &lines {
        match out.write_all(&line.bytes) {
            Ok(()) => {
                report.written_lines += 1;
                report.written_records += line.records;
                buffered.extend_from_slice(&line.bytes);
            }
            Err(e) => report.errors.push(FailedLine {
                error: e.into(),
                bytes: line.bytes.clone(),
            }),
        }
    }
    if let Err(e) = out.flush() {
        report.errors.push(FailedLine {
            error: e.into(),
            bytes: buffered,
        });
    }

    Ok(report)
}

fn encode_lines<T: Serialize>(
    rows: &[T],
    layout: BackupLayout,
    time: &str,
    report: &mut BackupReport,
) -> Vec<EncodedLine> {
    match layout {
        BackupLayout::PerRecord => rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                match serde_json::to_vec(&Line { time, data: row }) {
                    Ok(bytes) => Some(EncodedLine::terminated(bytes, 1)),
                    Err(error) => {
                        report.skipped.push(SkippedRecord { index, error });
                        None
                    }
                }
            })
            .collect(),
        BackupLayout::PerBatch => {
            let mut data: Vec<Box<RawValue>> = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                match serde_json::value::to_raw_value(row) {
                    Ok(raw) => data.push(raw),
                    Err(error) => report.skipped.push(SkippedRecord { index, error }),
                }
            }
            if data.is_empty() {
                return Vec::new();
            }

            let records = data.len();
            match serde_json::to_vec(&Line { time, data: &data }) {
                Ok(bytes) => vec![EncodedLine::terminated(bytes, records)],
                Err(e) => {
                    report.errors.push(FailedLine {
                        error: e.into(),
                        bytes: join_raw(&data).into_bytes(),
                    });
                    Vec::new()
                }
            }
        }
    }
}

/// Renders the records of a batch as a JSON array for diagnostics.
///
/// Records that fail to serialize are left out. Used to put a lost batch
/// into the log when no backup handle can be obtained.
#[must_use]
pub fn render_records<T: Serialize>(rows: &[T]) -> String {
    let data: Vec<Box<RawValue>> = rows
        .iter()
        .filter_map(|row| serde_json::value::to_raw_value(row).ok())
        .collect();
    join_raw(&data)
}

fn join_raw(data: &[Box<RawValue>]) -> String {
    let mut out = String::from("[");
    for (i, raw) in data.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(raw.get());
    }
    out.push(']');
    out
}

impl EncodedLine {
    fn terminated(mut bytes: Vec<u8>, records: usize) -> Self {
        bytes.push(b'\n');
        Self { bytes, records }
    }
}
