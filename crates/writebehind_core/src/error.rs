//! Error types for the buffer engine.

use crate::buffer::BufferState;
use std::io;
use thiserror::Error;
use writebehind_backup::BackupError;

/// Result type for buffer lifecycle operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors returned by [`crate::WriteBuffer::start`] and [`crate::WriteBuffer::stop`].
///
/// Appending never fails; flush-path errors are reported through the log sink.
#[derive(Error, Debug)]
pub enum BufferError {
    /// The requested lifecycle transition is not allowed.
    #[error("cannot {action} a buffer in state {state:?}")]
    InvalidState {
        /// Current state.
        state: BufferState,
        /// Attempted action.
        action: &'static str,
    },

    /// A background thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread role.
        name: &'static str,
        /// Underlying error.
        source: io::Error,
    },

    /// A background thread panicked outside the flush guard.
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    /// Closing the backup writer failed.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),
}

/// Errors returned by a [`crate::Sink`].
#[derive(Error, Debug)]
pub enum SinkError {
    /// The downstream store refused the batch.
    #[error("batch rejected: {0}")]
    Rejected(String),

    /// The downstream store could not be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl SinkError {
    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Wraps an arbitrary error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}
