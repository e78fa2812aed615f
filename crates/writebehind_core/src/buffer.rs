//! The buffer engine: concurrent append, dual flush trigger, owned workers.

use crate::config::{BufferConfig, SaturationPolicy};
use crate::error::{BufferError, BufferResult};
use crate::log::LogSink;
use crate::pipeline::{FlushOutcome, Pipeline};
use crate::sink::{Record, Sink};
use crate::stats::{BufferStats, StatsSnapshot};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FLUSH_THREAD: &str = "writebehind-flush";
const TIMER_THREAD: &str = "writebehind-timer";

/// Lifecycle state of a [`WriteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferState {
    /// Constructed, background threads not started.
    Created = 0,
    /// Flush and timer threads are running.
    Running = 1,
    /// Shutdown issued, terminal flush in progress.
    Stopping = 2,
    /// Threads joined and the backup writer closed.
    Stopped = 3,
}

impl BufferState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BufferState::Created,
            1 => BufferState::Running,
            2 => BufferState::Stopping,
            _ => BufferState::Stopped,
        }
    }

    /// Returns true once shutdown has been issued.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, BufferState::Stopping | BufferState::Stopped)
    }
}

/// State shared between the handle and the background threads.
struct Inner<T> {
    rows: RwLock<Vec<T>>,
    /// Locked only while `rows` is write-locked, or after the workers exit.
    pipeline: Mutex<Pipeline<T>>,
    capacity: usize,
    saturation: SaturationPolicy,
    signal_tx: Sender<()>,
    /// Never receives a value; disconnects when `stop` drops the sender.
    shutdown_rx: Receiver<()>,
    state: AtomicU8,
    log: Arc<dyn LogSink>,
    stats: Arc<BufferStats>,
}

struct Lifecycle {
    signal_rx: Option<Receiver<()>>,
    shutdown_tx: Option<Sender<()>>,
    flush_interval: Duration,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

/// An in-process write-behind buffer.
///
/// Producers call [`add`](Self::add) from any thread. Records accumulate in
/// memory until the buffer reaches its capacity or the flush interval
/// elapses, then the whole buffer is handed to the primary sink as one
/// batch. A rejected batch goes to the secondary sink, and a batch both sinks
/// reject is appended to the local backup.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use writebehind_core::{sink_fn, BufferConfig, SinkError, WriteBuffer};
///
/// let primary = sink_fn(|rows: &[String]| {
///     println!("shipping {} rows", rows.len());
///     Ok(())
/// });
/// let secondary = sink_fn(|_: &[String]| Err(SinkError::unavailable("no replica")));
///
/// let buffer = WriteBuffer::new(
///     primary,
///     secondary,
///     BufferConfig::new()
///         .capacity(100)
///         .flush_interval(Duration::from_secs(5))
///         .backup_dir("/var/spool/app", "events", 0o750),
/// );
/// buffer.start()?;
/// buffer.add("user signed in".to_string());
/// buffer.stop()?;
/// # Ok::<(), writebehind_core::BufferError>(())
/// ```
pub struct WriteBuffer<T: Record> {
    inner: Arc<Inner<T>>,
    lifecycle: Mutex<Lifecycle>,
}

impl<T: Record> WriteBuffer<T> {
    /// Creates a buffer in the `Created` state. Call [`start`](Self::start)
    /// to begin flushing.
    pub fn new<P, S>(primary: P, secondary: S, config: BufferConfig) -> Self
    where
        P: Sink<T> + 'static,
        S: Sink<T> + 'static,
    {
        let resolved = config.resolve();
        let (signal_tx, signal_rx) = channel::bounded(resolved.signal_queue);
        let (shutdown_tx, shutdown_rx) = channel::bounded(0);
        let stats = Arc::new(BufferStats::default());

        let pipeline = Pipeline::new(
            Box::new(primary),
            Box::new(secondary),
            resolved.writer,
            resolved.layout,
            Arc::clone(&resolved.log),
            Arc::clone(&stats),
        );

        let inner = Inner {
            rows: RwLock::new(Vec::with_capacity(resolved.initial_capacity)),
            pipeline: Mutex::new(pipeline),
            capacity: resolved.capacity,
            saturation: resolved.saturation,
            signal_tx,
            shutdown_rx,
            state: AtomicU8::new(BufferState::Created as u8),
            log: resolved.log,
            stats,
        };

        Self {
            inner: Arc::new(inner),
            lifecycle: Mutex::new(Lifecycle {
                signal_rx: Some(signal_rx),
                shutdown_tx: Some(shutdown_tx),
                flush_interval: resolved.flush_interval,
                workers: Vec::with_capacity(2),
            }),
        }
    }

    /// Appends one record. Never fails and never waits on a sink.
    ///
    /// A stopped buffer never flushes again, so the record is discarded and
    /// the loss is logged.
    pub fn add(&self, record: T) {
        if self.inner.discard_if_stopped(1) {
            return;
        }
        let len = {
            let mut rows = self.inner.rows.write();
            rows.push(record);
            rows.len()
        };
        self.inner.appended(len);
    }

    /// Appends all records under a single lock acquisition, so no flush can
    /// observe part of the list. An empty list is a no-op.
    pub fn add_list(&self, records: Vec<T>) {
        if records.is_empty() {
            return;
        }
        if self.inner.discard_if_stopped(records.len()) {
            return;
        }
        let len = {
            let mut rows = self.inner.rows.write();
            rows.extend(records);
            rows.len()
        };
        self.inner.appended(len);
    }

    /// Number of buffered records. May be stale by the time it returns.
    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.rows.read().is_empty()
    }

    /// Flush threshold in effect.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BufferState {
        self.inner.state()
    }

    /// Snapshot of the flush counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Spawns the flush and timer threads.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidState`] unless the buffer is freshly
    /// created, and [`BufferError::Spawn`] if a thread cannot be spawned. A
    /// failed start leaves nothing running.
    pub fn start(&self) -> BufferResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        let state = self.state();
        if state != BufferState::Created {
            return Err(BufferError::InvalidState {
                state,
                action: "start",
            });
        }
        let Some(signals) = lifecycle.signal_rx.clone() else {
            return Err(BufferError::InvalidState {
                state,
                action: "start",
            });
        };

        self.inner.set_state(BufferState::Running);

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(FLUSH_THREAD.to_string())
            .spawn(move || inner.flush_loop(&signals));
        match spawned {
            Ok(handle) => lifecycle.workers.push((FLUSH_THREAD, handle)),
            Err(source) => {
                self.inner.set_state(BufferState::Created);
                return Err(BufferError::Spawn {
                    name: FLUSH_THREAD,
                    source,
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        let interval = lifecycle.flush_interval;
        let spawned = thread::Builder::new()
            .name(TIMER_THREAD.to_string())
            .spawn(move || inner.timer_loop(interval));
        match spawned {
            Ok(handle) => lifecycle.workers.push((TIMER_THREAD, handle)),
            Err(source) => {
                let stopped = self.shutdown(&mut lifecycle, BufferState::Running);
                if let Err(e) = stopped {
                    self.inner
                        .log
                        .error(format_args!("teardown after failed start: {e}"));
                }
                return Err(BufferError::Spawn {
                    name: TIMER_THREAD,
                    source,
                });
            }
        }

        self.inner.log.info(format_args!(
            "write buffer started (capacity {}, interval {:?})",
            self.inner.capacity, interval
        ));
        Ok(())
    }

    /// Stops the buffer: one terminal flush, threads joined, backup closed.
    ///
    /// Stopping a buffer that was never started flushes on the calling
    /// thread. Calling `stop` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::WorkerPanicked`] if a thread died outside the
    /// flush guard, or [`BufferError::Backup`] if closing the backup failed.
    /// The buffer is stopped either way.
    pub fn stop(&self) -> BufferResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        let state = self.state();
        if state.is_shutting_down() {
            return Ok(());
        }
        self.shutdown(&mut lifecycle, state)
    }

    fn shutdown(&self, lifecycle: &mut Lifecycle, from: BufferState) -> BufferResult<()> {
        self.inner.set_state(BufferState::Stopping);
        lifecycle.shutdown_tx = None;

        if from == BufferState::Created {
            self.inner.guarded_flush();
        }

        let mut result = Ok(());
        for (name, handle) in lifecycle.workers.drain(..) {
            if let Err(payload) = handle.join() {
                self.inner.log.error(format_args!(
                    "{name} thread panicked: {}",
                    panic_message(payload.as_ref())
                ));
                if name == FLUSH_THREAD {
                    self.inner.guarded_flush();
                }
                if result.is_ok() {
                    result = Err(BufferError::WorkerPanicked(name));
                }
            }
        }

        if let Err(e) = self.inner.pipeline.lock().close() {
            self.inner
                .log
                .error(format_args!("failed to close backup writer: {e}"));
            if result.is_ok() {
                result = Err(e.into());
            }
        }

        lifecycle.signal_rx = None;
        self.inner.set_state(BufferState::Stopped);
        self.inner.log.info(format_args!("write buffer stopped"));
        result
    }
}

impl<T: Record> Drop for WriteBuffer<T> {
    fn drop(&mut self) {
        let pending = match self.state() {
            BufferState::Running => true,
            BufferState::Created => !self.is_empty(),
            BufferState::Stopping | BufferState::Stopped => false,
        };
        if pending {
            if let Err(e) = self.stop() {
                self.inner
                    .log
                    .error(format_args!("stop on drop failed: {e}"));
            }
        }
    }
}

impl<T: Record> fmt::Debug for WriteBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("state", &self.state())
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> Inner<T> {
    fn state(&self) -> BufferState {
        BufferState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: BufferState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl<T: Record> Inner<T> {
    fn discard_if_stopped(&self, count: usize) -> bool {
        if self.state() != BufferState::Stopped {
            return false;
        }
        self.log.error(format_args!(
            "buffer is stopped, discarding {count} appended records"
        ));
        true
    }

    fn appended(&self, len: usize) {
        if len >= self.capacity {
            self.request_flush();
        }
    }

    /// Posts a flush signal. Must not be called with `rows` locked.
    fn request_flush(&self) {
        let block =
            self.saturation == SaturationPolicy::Block && self.state() == BufferState::Running;
        if block {
            select! {
                send(self.signal_tx, ()) -> _ => {}
                recv(self.shutdown_rx) -> _ => {}
            }
            return;
        }
        match self.signal_tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                self.log
                    .debug(format_args!("flush already pending, signal coalesced"));
            }
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Drains the buffer and runs the pipeline, holding the write lock
    /// throughout so flushes never overlap.
    fn flush(&self) -> FlushOutcome {
        let mut rows = self.rows.write();
        if rows.is_empty() {
            return FlushOutcome::Empty;
        }
        let mut batch = std::mem::take(&mut *rows);
        self.stats.record_flush(batch.len());

        let outcome = self.pipeline.lock().run(&batch);

        // still locked, so `rows` is empty; hand the allocation back
        batch.clear();
        *rows = batch;
        outcome
    }

    fn guarded_flush(&self) -> Option<FlushOutcome> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.flush())) {
            Ok(outcome) => Some(outcome),
            Err(payload) => {
                self.stats.record_panic();
                self.log.error(format_args!(
                    "flush aborted by panic, batch lost: {}",
                    panic_message(payload.as_ref())
                ));
                None
            }
        }
    }

    fn flush_loop(&self, signals: &Receiver<()>) {
        loop {
            select! {
                recv(signals) -> _ => {
                    self.guarded_flush();
                }
                recv(self.shutdown_rx) -> _ => break,
            }
        }
        if let Some(outcome) = self.guarded_flush() {
            self.log
                .debug(format_args!("terminal flush finished: {outcome}"));
        }
    }

    fn timer_loop(&self, interval: Duration) {
        let ticker = channel::tick(interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    select! {
                        send(self.signal_tx, ()) -> _ => {}
                        recv(self.shutdown_rx) -> _ => break,
                    }
                }
                recv(self.shutdown_rx) -> _ => break,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
