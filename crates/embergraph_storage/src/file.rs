//! File-backed log sink.

use crate::error::{StorageError, StorageResult};
use crate::sink::LogSink;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct Inner {
    writer: Option<BufWriter<File>>,
    size: u64,
}

/// A log sink that appends to a file.
///
/// Existing content is preserved: reopening the same path continues the log
/// where the previous process left it.
///
/// # Durability
///
/// - `append` writes into a buffer
/// - `flush` pushes the buffer to the OS
/// - `close` flushes and syncs the file
///
/// # Example
///
/// ```no_run
/// use embergraph_storage::{FileSink, LogSink};
/// use std::path::Path;
///
/// let sink = FileSink::open_with_create_dirs(Path::new("db/messages.log")).unwrap();
/// sink.append(b"startup complete\n").unwrap();
/// sink.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FileSink {
    /// Opens or creates the file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                writer: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    /// Opens the file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn append(&self, data: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.size;
        let writer = inner.writer.as_mut().ok_or(StorageError::Closed)?;
        writer.write_all(data)?;
        inner.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        match inner.writer.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => Err(StorageError::Closed),
        }
    }

    fn size(&self) -> u64 {
        self.inner.lock().size
    }

    fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.log");

        let sink = FileSink::open(&path).unwrap();
        assert_eq!(sink.size(), 0);
        assert!(path.exists());
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn append_and_flush_reach_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.log");

        let sink = FileSink::open(&path).unwrap();
        assert_eq!(sink.append(b"first\n").unwrap(), 0);
        assert_eq!(sink.append(b"second\n").unwrap(), 6);
        sink.flush().unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "first\nsecond\n");
    }

    #[test]
    fn reopen_continues_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.log");

        {
            let sink = FileSink::open(&path).unwrap();
            sink.append(b"one\n").unwrap();
            sink.close().unwrap();
        }

        let sink = FileSink::open(&path).unwrap();
        assert_eq!(sink.size(), 4);
        assert_eq!(sink.append(b"two\n").unwrap(), 4);
        sink.close().unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "one\ntwo\n");
    }

    #[test]
    fn create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("nested").join("messages.log");

        let sink = FileSink::open_with_create_dirs(&path).unwrap();
        sink.append(b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempdir().unwrap();
        let sink = FileSink::open(&dir.path().join("messages.log")).unwrap();
        sink.close().unwrap();

        assert!(matches!(sink.append(b"late"), Err(StorageError::Closed)));
        assert!(matches!(sink.flush(), Err(StorageError::Closed)));
    }
}
