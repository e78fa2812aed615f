//! Record bound and the sink abstraction.

use crate::error::SinkError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Anything a buffer can hold.
///
/// The only capability the engine needs is serialization, which is used
/// solely when a batch falls through to the disk backup.
pub trait Record: Serialize + Send + Sync + 'static {}

impl<T: Serialize + Send + Sync + 'static> Record for T {}

/// A destination for flushed batches.
///
/// The same trait serves as primary and secondary sink. Implementations must
/// be safe to call repeatedly and must not keep the slice past the call.
/// Panics are caught by the buffer, but an implementation that panics
/// loses the batch it was given.
pub trait Sink<T>: Send + Sync {
    /// Accepts a batch, or reports why it could not.
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError>;
}

impl<T, S: Sink<T> + ?Sized> Sink<T> for Arc<S> {
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        (**self).write_batch(rows)
    }
}

impl<T, S: Sink<T> + ?Sized> Sink<T> for Box<S> {
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        (**self).write_batch(rows)
    }
}

/// A sink backed by a closure. Created with [`sink_fn`].
pub struct FnSink<F>(F);

/// Wraps a closure as a [`Sink`].
///
/// ```rust
/// use writebehind_core::{sink_fn, Sink, SinkError};
///
/// let sink = sink_fn(|rows: &[u32]| {
///     if rows.is_empty() {
///         Err(SinkError::rejected("empty"))
///     } else {
///         Ok(())
///     }
/// });
/// assert!(sink.write_batch(&[1]).is_ok());
/// ```
pub fn sink_fn<T, F>(f: F) -> FnSink<F>
where
    F: Fn(&[T]) -> Result<(), SinkError> + Send + Sync,
{
    FnSink(f)
}

impl<T, F> Sink<T> for FnSink<F>
where
    F: Fn(&[T]) -> Result<(), SinkError> + Send + Sync,
{
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        (self.0)(rows)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}
