//! Persistent message log.
//!
//! A write-only record of startup and shutdown events kept next to the store.
//! Every entry is one `"<unix-millis> <message>"` line; failures append their
//! cause chain as indented `caused by:` lines. Sink errors are reported
//! through `tracing` and otherwise ignored.

use embergraph_storage::{FileSink, LogSink, MemorySink};
use std::error::Error;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Append-only message log backed by a [`LogSink`].
pub struct MessageLog {
    sink: Box<dyn LogSink>,
}

impl MessageLog {
    /// Creates a log writing to `sink`.
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Creates a log from an already boxed sink.
    pub fn from_boxed(sink: Box<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Opens the log file at `path`.
    ///
    /// If the file cannot be opened the log falls back to memory so the
    /// kernel can still start.
    pub fn open(path: &Path) -> Self {
        match FileSink::open_with_create_dirs(path) {
            Ok(sink) => Self::new(sink),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "message log unavailable, keeping messages in memory"
                );
                Self::new(MemorySink::new())
            }
        }
    }

    /// Appends a plain message.
    pub fn log_message(&self, message: &str) {
        self.write_entry(format_entry(now_millis(), message, None));
    }

    /// Appends a message followed by the full cause chain of `error`.
    pub fn log_failure(&self, message: &str, error: &(dyn Error + 'static)) {
        self.write_entry(format_entry(now_millis(), message, Some(error)));
        self.flush();
    }

    /// Flushes buffered entries.
    pub fn flush(&self) {
        if let Err(err) = self.sink.flush() {
            warn!(error = %err, "failed to flush message log");
        }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.sink.size()
    }

    fn write_entry(&self, entry: String) {
        if let Err(err) = self.sink.append(entry.as_bytes()) {
            warn!(error = %err, "failed to append to message log");
        }
    }
}

impl std::fmt::Debug for MessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLog")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn format_entry(millis: u128, message: &str, error: Option<&(dyn Error + 'static)>) -> String {
    let mut entry = format!("{millis} {message}");
    if let Some(error) = error {
        let _ = write!(entry, ": {error}");
        let mut cause = error.source();
        while let Some(inner) = cause {
            let _ = write!(entry, "\n  caused by: {inner}");
            cause = inner.source();
        }
    }
    entry.push('\n');
    entry
}
