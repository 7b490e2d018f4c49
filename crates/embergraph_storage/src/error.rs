//! Error types for log sinks.

use std::io;
use thiserror::Error;

/// Result type for sink operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while writing to a sink.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sink was closed and accepts no more appends.
    #[error("log sink is closed")]
    Closed,
}
