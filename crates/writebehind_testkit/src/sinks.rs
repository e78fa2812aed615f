//! Scriptable sinks.
//!
//! Every sink here is a cheap handle over shared state: clone it, hand one
//! copy to the buffer and keep the other for assertions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use writebehind_core::{Sink, SinkError};

/// Accepts every batch and keeps a copy of it.
#[derive(Debug)]
pub struct RecordingSink<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
    delay: Option<Duration>,
}

impl<T> Clone for RecordingSink<T> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            delay: self.delay,
        }
    }
}

impl<T> Default for RecordingSink<T> {
    fn default() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }
}

impl<T: Clone> RecordingSink<T> {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before accepting each batch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Batches received so far, in delivery order.
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.batches.lock().clone()
    }

    /// All records received so far, flattened.
    pub fn records(&self) -> Vec<T> {
        self.batches.lock().concat()
    }

    /// Number of `write_batch` calls.
    pub fn call_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Number of records received.
    pub fn record_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

impl<T: Clone + Send + Sync> Sink<T> for RecordingSink<T> {
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.batches.lock().push(rows.to_vec());
        Ok(())
    }
}

/// Rejects every batch with [`SinkError::Unavailable`].
#[derive(Debug, Clone)]
pub struct FailingSink {
    reason: String,
    calls: Arc<AtomicUsize>,
    records: Arc<AtomicUsize>,
}

impl FailingSink {
    /// Creates a sink that fails with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            records: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `write_batch` calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of records offered.
    pub fn record_count(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }
}

impl<T> Sink<T> for FailingSink {
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records.fetch_add(rows.len(), Ordering::SeqCst);
        Err(SinkError::unavailable(self.reason.clone()))
    }
}

/// How a [`FlakySink`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Return [`SinkError::Rejected`].
    Reject,
    /// Panic inside `write_batch`.
    Panic,
}

/// Misbehaves for the first `n` calls, then records like a
/// [`RecordingSink`].
#[derive(Debug)]
pub struct FlakySink<T> {
    fault: Fault,
    remaining: Arc<AtomicUsize>,
    faulted: Arc<AtomicUsize>,
    inner: RecordingSink<T>,
}

impl<T> Clone for FlakySink<T> {
    fn clone(&self) -> Self {
        Self {
            fault: self.fault,
            remaining: Arc::clone(&self.remaining),
            faulted: Arc::clone(&self.faulted),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> FlakySink<T> {
    /// Creates a sink that misbehaves `faults` times.
    pub fn new(fault: Fault, faults: usize) -> Self {
        Self {
            fault,
            remaining: Arc::new(AtomicUsize::new(faults)),
            faulted: Arc::new(AtomicUsize::new(0)),
            inner: RecordingSink::new(),
        }
    }

    /// The recording half, holding the batches accepted after recovery.
    pub fn recorded(&self) -> &RecordingSink<T> {
        &self.inner
    }

    /// Number of calls that misbehaved.
    pub fn fault_count(&self) -> usize {
        self.faulted.load(Ordering::SeqCst)
    }

    fn take_fault(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<T: Clone + Send + Sync> Sink<T> for FlakySink<T> {
    fn write_batch(&self, rows: &[T]) -> Result<(), SinkError> {
        if self.take_fault() {
            self.faulted.fetch_add(1, Ordering::SeqCst);
            match self.fault {
                Fault::Reject => {
                    return Err(SinkError::rejected(format!(
                        "scripted rejection of {} rows",
                        rows.len()
                    )))
                }
                Fault::Panic => panic!("scripted panic on {} rows", rows.len()),
            }
        }
        self.inner.write_batch(rows)
    }
}
