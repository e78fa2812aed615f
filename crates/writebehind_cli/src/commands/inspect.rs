//! Inspect command implementation.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading a backup file.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A line is not a `{"time":..,"data":..}` object.
    #[error("line {line} is not a backup entry: {source}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A line carries a timestamp that is not RFC 3339.
    #[error("line {line} has an invalid timestamp {value:?}")]
    Timestamp {
        /// One-based line number.
        line: usize,
        /// The offending value.
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct Entry {
    time: String,
    data: Value,
}

/// Backup file summary.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// Non-empty lines.
    pub lines: usize,
    /// Records across all lines; a batch line counts each element.
    pub records: usize,
    /// Lines holding a whole batch.
    pub batch_lines: usize,
    /// Earliest timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<DateTime<FixedOffset>>,
    /// Latest timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<DateTime<FixedOffset>>,
    /// Every record, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

/// Reads and summarizes a backup file.
pub fn inspect(path: &Path, keep_records: bool) -> Result<InspectResult, InspectError> {
    let read_err = |source| InspectError::Read {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(read_err)?);

    let mut result = InspectResult {
        path: path.display().to_string(),
        lines: 0,
        records: 0,
        batch_lines: 0,
        first: None,
        last: None,
        data: keep_records.then(Vec::new),
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(read_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let number = index + 1;
        let entry: Entry = serde_json::from_str(&line).map_err(|source| InspectError::Parse {
            line: number,
            source,
        })?;
        let time = DateTime::parse_from_rfc3339(&entry.time).map_err(|_| {
            InspectError::Timestamp {
                line: number,
                value: entry.time.clone(),
            }
        })?;

        result.lines += 1;
        result.first = Some(result.first.map_or(time, |t| t.min(time)));
        result.last = Some(result.last.map_or(time, |t| t.max(time)));

        let records = match entry.data {
            Value::Array(items) => {
                result.batch_lines += 1;
                items
            }
            other => vec![other],
        };
        result.records += records.len();
        if let Some(data) = result.data.as_mut() {
            data.extend(records);
        }
    }

    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, show_records: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, show_records)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("File:        {}", result.path);
            println!("Lines:       {}", result.lines);
            println!("Records:     {}", result.records);
            println!("Batch lines: {}", result.batch_lines);
            if let (Some(first), Some(last)) = (result.first, result.last) {
                println!("First:       {}", first.to_rfc3339());
                println!("Last:        {}", last.to_rfc3339());
            }
            if let Some(data) = &result.data {
                println!();
                for record in data {
                    println!("{record}");
                }
            }
        }
    }

    Ok(())
}
