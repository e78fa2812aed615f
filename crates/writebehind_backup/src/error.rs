//! Error types for backup operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur while persisting a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory could not be created.
    #[error("failed to create backup directory {path}: {source}")]
    CreateDir {
        /// The directory that was being created.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The backup file could not be opened.
    #[error("failed to open backup file {path}: {source}")]
    Open {
        /// The file that was being opened.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// An I/O error occurred on an open handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The writer refuses to hand out a handle.
    #[error("backup writer unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_path() {
        let err = BackupError::Open {
            path: PathBuf::from("/var/spool/failed.20250101.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("failed.20250101.log"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn io_error_converts() {
        let err: BackupError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
