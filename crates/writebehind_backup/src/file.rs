//! Day-rotated file writer for persistent backups.

use crate::error::{BackupError, BackupResult};
use crate::writer::BackupWriter;
use chrono::{Local, NaiveDate};
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name prefix used when none is configured.
pub const DEFAULT_FILE_PREFIX: &str = "failed";

/// Permission bits for a backup directory created on demand.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Permission bits for newly created backup files.
const FILE_MODE: u32 = 0o644;

/// A backup writer that appends to one file per calendar day.
///
/// Files are named `<prefix>.<YYYYMMDD>.log` inside the configured
/// directory, using the local date. The handle is opened lazily on the first
/// call to [`BackupWriter::writable`] and reused until the date changes, at
/// which point the stale handle is closed and the next day's file is opened.
///
/// # Durability
///
/// - Files are opened in append mode; nothing is ever truncated
/// - `close()` and day rotation call `File::sync_all()` on the handle they
///   release
///
/// # Example
///
/// ```no_run
/// use writebehind_backup::{BackupWriter, DailyFileWriter};
/// use std::io::Write;
///
/// let mut writer = DailyFileWriter::new("/var/spool/app", "events", 0o755);
/// writer.writable().unwrap().write_all(b"{}\n").unwrap();
/// writer.close().unwrap();
/// ```
#[derive(Debug)]
pub struct DailyFileWriter {
    dir: PathBuf,
    prefix: String,
    dir_mode: u32,
    current: Option<OpenFile>,
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    file: File,
}

impl DailyFileWriter {
    /// Creates a writer for `dir`. Nothing is touched on disk until the
    /// first handle is requested.
    ///
    /// An empty `prefix` falls back to [`DEFAULT_FILE_PREFIX`] and a zero
    /// `dir_mode` to [`DEFAULT_DIR_MODE`].
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, dir_mode: u32) -> Self {
        let prefix = prefix.into();
        Self {
            dir: dir.into(),
            prefix: if prefix.is_empty() {
                DEFAULT_FILE_PREFIX.to_string()
            } else {
                prefix
            },
            dir_mode: if dir_mode == 0 {
                DEFAULT_DIR_MODE
            } else {
                dir_mode
            },
            current: None,
        }
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the file that backups written on `day` go to.
    #[must_use]
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{}.log", self.prefix, day.format("%Y%m%d")))
    }

    /// Returns the path of the currently open file, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|open| open.path.as_path())
    }

    /// Returns the handle for `day`, rotating away from any other day's file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be opened.
    pub fn writable_on(&mut self, day: NaiveDate) -> BackupResult<&mut File> {
        let path = self.path_for(day);

        let open = match self.current.take() {
            Some(open) if open.path == path => open,
            stale => {
                if let Some(stale) = stale {
                    stale.retire()?;
                }
                self.ensure_dir()?;
                let file = open_append(&path)?;
                OpenFile { path, file }
            }
        };

        Ok(&mut self.current.insert(open).file)
    }

    fn ensure_dir(&self) -> BackupResult<()> {
        if self.dir.as_os_str().is_empty() || self.dir.is_dir() {
            return Ok(());
        }

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.dir_mode);
        }

        builder
            .create(&self.dir)
            .map_err(|source| BackupError::CreateDir {
                path: self.dir.clone(),
                source,
            })
    }
}

impl OpenFile {
    /// Syncs and drops the handle.
    fn retire(self) -> BackupResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> BackupResult<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    options.open(path).map_err(|source| BackupError::Open {
        path: path.to_path_buf(),
        source,
    })
}

impl BackupWriter for DailyFileWriter {
    fn writable(&mut self) -> BackupResult<&mut dyn Write> {
        let today = Local::now().date_naive();
        Ok(self.writable_on(today)?)
    }

    fn close(&mut self) -> BackupResult<()> {
        match self.current.take() {
            Some(open) => open.retire(),
            None => Ok(()),
        }
    }
}
