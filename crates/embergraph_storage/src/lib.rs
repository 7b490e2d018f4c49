//! # EmberGraph Storage
//!
//! Append-only byte sinks used by the EmberGraph kernel for its persistent
//! message log.
//!
//! Sinks are **opaque**: they never interpret the bytes handed to them. The
//! kernel owns the entry format; a sink only appends, flushes and reports its
//! size.
//!
//! ## Available Sinks
//!
//! - [`MemorySink`] - For tests and ephemeral kernels
//! - [`FileSink`] - For a log file that survives restarts
//!
//! ## Example
//!
//! ```rust
//! use embergraph_storage::{LogSink, MemorySink};
//!
//! let sink = MemorySink::new();
//! let offset = sink.append(b"kernel started\n").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(sink.contents(), b"kernel started\n");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod sink;

pub use error::{StorageError, StorageResult};
pub use file::FileSink;
pub use memory::MemorySink;
pub use sink::LogSink;
