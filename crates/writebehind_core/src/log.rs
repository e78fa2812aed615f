//! Pluggable log sink for flush-path reporting.
//!
//! Every flush-path error ends up here, since nothing is ever returned to
//! the producer. Implementations must not block for long and must not panic.

use chrono::{DateTime, Local, SecondsFormat};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-flush detail.
    Debug,
    /// Successful deliveries and lifecycle events.
    Info,
    /// Degraded but not lossy.
    Warn,
    /// Sink failures, backup failures, dropped data.
    Error,
}

impl LogLevel {
    /// Upper-case label, as printed by [`ConsoleLog`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Receiver of leveled, formatted messages.
pub trait LogSink: Send + Sync {
    /// Logs a message at the given level.
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);

    /// Logs at debug level.
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args);
    }

    /// Logs at info level.
    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    /// Logs at warn level.
    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    /// Logs at error level.
    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }
}

impl<L: LogSink + ?Sized> LogSink for Arc<L> {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        (**self).log(level, args);
    }
}

/// Default sink: `[LEVEL] <RFC 3339 time> message` on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLog;

impl ConsoleLog {
    /// Formats one console line without the trailing newline.
    pub fn format_line(level: LogLevel, now: DateTime<Local>, args: fmt::Arguments<'_>) -> String {
        format!(
            "[{}] {} {}",
            level.as_str(),
            now.to_rfc3339_opts(SecondsFormat::Secs, false),
            args
        )
    }
}

impl LogSink for ConsoleLog {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let line = Self::format_line(level, Local::now(), args);
        // stdout may be closed; losing a log line must not take the caller down
        let _ = writeln!(io::stdout().lock(), "{line}");
    }
}

/// Forwards messages to `tracing` under the `writebehind` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "writebehind", "{}", args),
            LogLevel::Info => tracing::info!(target: "writebehind", "{}", args),
            LogLevel::Warn => tracing::warn!(target: "writebehind", "{}", args),
            LogLevel::Error => tracing::error!(target: "writebehind", "{}", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(LogLevel, String)>>);

    impl LogSink for Collect {
        fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
            self.0.lock().push((level, args.to_string()));
        }
    }

    #[test]
    fn console_line_format() {
        let now = Local.with_ymd_and_hms(2025, 1, 15, 10, 30, 45).unwrap();
        let line = ConsoleLog::format_line(LogLevel::Warn, now, format_args!("{} records", 3));
        assert!(line.starts_with("[WARN] 2025-01-15T10:30:45"));
        assert!(line.ends_with(" 3 records"));
    }

    #[test]
    fn leveled_helpers_dispatch() {
        let sink = Arc::new(Collect::default());
        sink.debug(format_args!("d"));
        sink.info(format_args!("i"));
        sink.warn(format_args!("w"));
        sink.error(format_args!("e"));

        let levels: Vec<_> = sink.0.lock().iter().map(|(l, _)| *l).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error]
        );
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert_eq!(LogLevel::Info.as_str(), "INFO");
    }
}
