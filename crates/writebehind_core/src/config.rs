//! Configuration for a write buffer.

use crate::log::{ConsoleLog, LogSink};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use writebehind_backup::{
    BackupLayout, BackupWriter, DailyFileWriter, DEFAULT_DIR_MODE, DEFAULT_FILE_PREFIX,
};

/// Buffer length that triggers a flush when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Timer period when nothing else is configured.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Number of pending flush signals the queue holds.
pub const DEFAULT_SIGNAL_QUEUE: usize = 10;

/// Upper bound of the initial allocation, sized for roughly five records a
/// second over one default interval.
pub const MAX_INITIAL_CAPACITY: usize = 300;

/// What a producer does when the flush signal queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationPolicy {
    /// Drop the signal. The signals already queued each drain the whole
    /// buffer, so no record is left behind.
    #[default]
    Coalesce,
    /// Wait until the flush loop takes a signal or the buffer stops.
    Block,
}

/// Configuration for a [`crate::WriteBuffer`].
///
/// Builder methods are applied in order over the defaults, so a later call
/// overrides an earlier one. Out-of-range values revert to the default.
pub struct BufferConfig {
    /// Buffer length at which a flush is requested.
    pub capacity: usize,

    /// Period of the timer trigger.
    pub flush_interval: Duration,

    /// Capacity of the flush signal queue.
    pub signal_queue: usize,

    /// Behavior when the signal queue is full.
    pub saturation: SaturationPolicy,

    /// Directory for failed batches. `None` disables the file backup.
    pub backup_dir: Option<PathBuf>,

    /// Backup file name prefix.
    pub backup_prefix: String,

    /// Permission bits used when the backup directory has to be created.
    pub backup_dir_mode: u32,

    /// Line layout of the backup file.
    pub backup_layout: BackupLayout,

    log: Arc<dyn LogSink>,
    writer: Option<Box<dyn BackupWriter>>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            signal_queue: DEFAULT_SIGNAL_QUEUE,
            saturation: SaturationPolicy::Coalesce,
            backup_dir: None,
            backup_prefix: DEFAULT_FILE_PREFIX.to_string(),
            backup_dir_mode: DEFAULT_DIR_MODE,
            backup_layout: BackupLayout::PerRecord,
            log: Arc::new(ConsoleLog),
            writer: None,
        }
    }
}

impl BufferConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush threshold. Zero reverts to [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        self
    }

    /// Sets the timer period. Zero reverts to [`DEFAULT_FLUSH_INTERVAL`].
    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = if interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Sets the signal queue capacity. Zero reverts to [`DEFAULT_SIGNAL_QUEUE`].
    #[must_use]
    pub fn signal_queue(mut self, size: usize) -> Self {
        self.signal_queue = if size == 0 { DEFAULT_SIGNAL_QUEUE } else { size };
        self
    }

    /// Sets the signal queue saturation policy.
    #[must_use]
    pub fn saturation(mut self, policy: SaturationPolicy) -> Self {
        self.saturation = policy;
        self
    }

    /// Sets the log sink. Pass an `Arc` to keep a handle to it.
    #[must_use]
    pub fn log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.log = Arc::new(sink);
        self
    }

    /// Configures the file backup.
    ///
    /// An empty `dir` disables the file backup. An empty `prefix` or a zero
    /// `mode` keeps the previous value.
    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>, prefix: &str, mode: u32) -> Self {
        let dir = dir.into();
        self.backup_dir = if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir)
        };
        if !prefix.is_empty() {
            self.backup_prefix = prefix.to_string();
        }
        if mode != 0 {
            self.backup_dir_mode = mode;
        }
        self
    }

    /// Sets the backup line layout.
    #[must_use]
    pub fn backup_layout(mut self, layout: BackupLayout) -> Self {
        self.backup_layout = layout;
        self
    }

    /// Replaces the file writer. A custom writer enables the backup even
    /// without a directory.
    #[must_use]
    pub fn backup_writer(mut self, writer: impl BackupWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Returns true if failed batches will be backed up.
    pub fn backup_enabled(&self) -> bool {
        self.writer.is_some() || self.backup_dir.is_some()
    }

    /// Initial allocation of the record buffer. This is a hint, not a limit.
    pub fn initial_capacity(&self) -> usize {
        self.capacity.min(MAX_INITIAL_CAPACITY)
    }

    /// Normalizes values set directly on the public fields and builds the
    /// backup writer.
    pub(crate) fn resolve(self) -> ResolvedConfig {
        let writer = match (self.writer, &self.backup_dir) {
            (Some(writer), _) => Some(writer),
            (None, Some(dir)) => Some(Box::new(DailyFileWriter::new(
                dir.clone(),
                self.backup_prefix.clone(),
                self.backup_dir_mode,
            )) as Box<dyn BackupWriter>),
            (None, None) => None,
        };

        let capacity = if self.capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            self.capacity
        };

        ResolvedConfig {
            capacity,
            initial_capacity: capacity.min(MAX_INITIAL_CAPACITY),
            flush_interval: if self.flush_interval.is_zero() {
                DEFAULT_FLUSH_INTERVAL
            } else {
                self.flush_interval
            },
            signal_queue: if self.signal_queue == 0 {
                DEFAULT_SIGNAL_QUEUE
            } else {
                self.signal_queue
            },
            saturation: self.saturation,
            layout: self.backup_layout,
            log: self.log,
            writer,
        }
    }
}

impl fmt::Debug for BufferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferConfig")
            .field("capacity", &self.capacity)
            .field("flush_interval", &self.flush_interval)
            .field("signal_queue", &self.signal_queue)
            .field("saturation", &self.saturation)
            .field("backup_dir", &self.backup_dir)
            .field("backup_prefix", &self.backup_prefix)
            .field("backup_dir_mode", &format_args!("{:o}", self.backup_dir_mode))
            .field("backup_layout", &self.backup_layout)
            .field("custom_writer", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

/// Configuration after normalization, split into what the engine owns.
pub(crate) struct ResolvedConfig {
    pub(crate) capacity: usize,
    pub(crate) initial_capacity: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) signal_queue: usize,
    pub(crate) saturation: SaturationPolicy,
    pub(crate) layout: BackupLayout,
    pub(crate) log: Arc<dyn LogSink>,
    pub(crate) writer: Option<Box<dyn BackupWriter>>,
}
