//! In-memory log sink.

use crate::error::{StorageError, StorageResult};
use crate::sink::LogSink;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Buffer {
    data: Vec<u8>,
    closed: bool,
}

/// An in-memory log sink.
///
/// Clones share the same buffer, so a test can hand one clone to the kernel
/// and inspect the log through another.
///
/// # Example
///
/// ```rust
/// use embergraph_storage::{LogSink, MemorySink};
///
/// let sink = MemorySink::new();
/// let observer = sink.clone();
/// sink.append(b"hello").unwrap();
/// assert_eq!(observer.contents(), b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<RwLock<Buffer>>,
}

impl MemorySink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything appended so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.read().data.clone()
    }

    /// Returns the contents decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer.read().data).into_owned()
    }

    /// Returns whether the sink has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.buffer.read().closed
    }
}

impl LogSink for MemorySink {
    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut buffer = self.buffer.write();
        if buffer.closed {
            return Err(StorageError::Closed);
        }
        let offset = buffer.data.len() as u64;
        buffer.data.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> u64 {
        self.buffer.read().data.len() as u64
    }

    fn close(&self) -> StorageResult<()> {
        self.buffer.write().closed = true;
        Ok(())
    }
}
