//! Test fixtures and kernel helpers.
//!
//! Provides convenience functions for starting test kernels with a captured
//! message log and for common graph shapes.

use embergraph_core::{Config, CoreError, CoreResult, GraphDatabase, KernelBuilder};
use embergraph_storage::MemorySink;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test kernel with a captured message log and automatic cleanup.
pub struct TestKernel {
    /// The kernel.
    pub db: GraphDatabase,
    sink: Option<MemorySink>,
    /// The temporary store directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

/// A startup that failed, with what the kernel wrote before giving up.
#[derive(Debug)]
pub struct FailedStartup {
    /// The startup error.
    pub error: CoreError,
    /// The message log contents.
    pub message_log: String,
}

impl TestKernel {
    /// Starts an in-memory kernel with default collaborators.
    pub fn memory() -> Self {
        Self::build(|builder| builder).expect("Failed to start in-memory kernel")
    }

    /// Starts an in-memory kernel after `customize` adjusted the builder.
    pub fn build<F>(customize: F) -> CoreResult<Self>
    where
        F: FnOnce(KernelBuilder) -> KernelBuilder,
    {
        Self::try_build(Config::default(), customize).map_err(|failed| failed.error)
    }

    /// Starts an in-memory kernel, keeping the message log on failure.
    pub fn try_build<F>(config: Config, customize: F) -> Result<Self, FailedStartup>
    where
        F: FnOnce(KernelBuilder) -> KernelBuilder,
    {
        let sink = MemorySink::new();
        let builder = GraphDatabase::builder(config).with_log_sink(sink.clone());
        match customize(builder).open() {
            Ok(db) => Ok(Self {
                db,
                sink: Some(sink),
                _temp_dir: None,
            }),
            Err(error) => Err(FailedStartup {
                error,
                message_log: sink.contents_lossy(),
            }),
        }
    }

    /// Starts a kernel whose message log is a file in a temporary store
    /// directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = GraphDatabase::open(Config::new().store_dir(temp_dir.path()))
            .expect("Failed to start file-backed kernel");
        Self {
            db,
            sink: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Returns everything written to the message log so far.
    pub fn message_log(&self) -> String {
        match (&self.sink, &self.path()) {
            (Some(sink), _) => sink.contents_lossy(),
            (None, Some(path)) => {
                std::fs::read_to_string(path.join("messages.log")).unwrap_or_default()
            }
            (None, None) => String::new(),
        }
    }
}

impl std::ops::Deref for TestKernel {
    type Target = GraphDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory kernel.
///
/// # Example
///
/// ```rust,ignore
/// use embergraph_testkit::with_kernel;
///
/// #[test]
/// fn my_test() {
///     with_kernel(|db| {
///         assert!(db.is_started());
///     });
/// }
/// ```
pub fn with_kernel<F, R>(f: F) -> R
where
    F: FnOnce(&GraphDatabase) -> R,
{
    let kernel = TestKernel::memory();
    f(&kernel.db)
}

/// Runs a test with a kernel logging to a temporary store directory.
pub fn with_file_kernel<F, R>(f: F) -> R
where
    F: FnOnce(&GraphDatabase, &Path) -> R,
{
    let kernel = TestKernel::file();
    let path = kernel.path().expect("File kernel should have a path");
    f(&kernel.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use embergraph_core::{Node, NodeId};

    /// Creates `len` nodes linked by `NEXT` relationships in one transaction.
    pub fn chain(db: &GraphDatabase, len: usize) -> CoreResult<Vec<Node>> {
        db.transaction(|_| {
            let nodes = (0..len)
                .map(|_| db.create_node())
                .collect::<CoreResult<Vec<_>>>()?;
            for pair in nodes.windows(2) {
                db.create_relationship(pair[0].id(), pair[1].id(), "NEXT")?;
            }
            Ok(nodes)
        })
    }

    /// Creates `count` unconnected nodes, then deletes those at `deleted`
    /// in a second transaction. Returns the surviving nodes.
    pub fn with_tombstones(
        db: &GraphDatabase,
        count: usize,
        deleted: &[u64],
    ) -> CoreResult<Vec<Node>> {
        let created = db.transaction(|_| {
            (0..count)
                .map(|_| db.create_node())
                .collect::<CoreResult<Vec<_>>>()
        })?;
        db.transaction(|_| {
            deleted
                .iter()
                .try_for_each(|&id| db.delete_node(NodeId::new(id)))
        })?;
        Ok(created
            .into_iter()
            .filter(|node| !deleted.contains(&node.id().as_u64()))
            .collect())
    }

    /// Creates a kernel holding a chain of `len` nodes.
    pub fn populated_kernel(len: usize) -> TestKernel {
        let kernel = TestKernel::memory();
        chain(&kernel, len).expect("Failed to populate kernel");
        kernel
    }
}
