//! Backup writer trait definition.

use crate::error::BackupResult;
use std::io::Write;

/// A source of writable handles for backup lines.
///
/// A writer is owned by exactly one buffer and is only ever used from that
/// buffer's flush context, so implementations need `Send` but not `Sync`.
///
/// # Invariants
///
/// - `writable` returns a handle positioned at the end of the current target
/// - Data already written is never truncated
/// - `close` is idempotent and safe to call with nothing open
///
/// # Implementors
///
/// - [`super::DailyFileWriter`] - For persistent, day-rotated files
/// - [`super::MemoryWriter`] - For testing
pub trait BackupWriter: Send {
    /// Returns the handle to append to, opening or rotating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be created or opened. The batch
    /// being backed up is lost in that case, and the caller must report it.
    fn writable(&mut self) -> BackupResult<&mut dyn Write>;

    /// Closes the current handle, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle fails to flush or close.
    fn close(&mut self) -> BackupResult<()>;
}

impl<W: BackupWriter + ?Sized> BackupWriter for Box<W> {
    fn writable(&mut self) -> BackupResult<&mut dyn Write> {
        (**self).writable()
    }

    fn close(&mut self) -> BackupResult<()> {
        (**self).close()
    }
}
