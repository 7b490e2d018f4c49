//! Log sink trait definition.

use crate::error::StorageResult;

/// A write-only, append-only byte sink.
///
/// The kernel writes its message log through this trait. Implementations use
/// interior locking so one sink can be shared between threads behind an
/// `Arc`.
///
/// # Invariants
///
/// - `append` returns the offset where the data starts
/// - appended bytes are never rewritten
/// - after `close`, every `append` fails with [`crate::StorageError::Closed`]
pub trait LogSink: Send + Sync {
    /// Appends `data` to the end of the sink and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink is closed or an I/O error occurs.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered bytes to the underlying medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;

    /// Returns the number of bytes appended so far.
    fn size(&self) -> u64;

    /// Flushes and closes the sink. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&self) -> StorageResult<()>;
}
