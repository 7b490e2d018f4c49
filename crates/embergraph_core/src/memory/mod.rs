//! In-memory collaborators.
//!
//! Complete implementations of the [`crate::spi`] traits that keep all state
//! in memory. Used by [`crate::GraphDatabase::open_in_memory`] and in tests.
//! Nothing is isolated: uncommitted writes are visible to other threads and
//! are undone on rollback.

mod id;
mod lock;
mod store;
mod tx;
mod types;

pub use id::{MemoryIdGenerator, MemoryIdGeneratorFactory};
pub use lock::{MemoryLockManager, MemoryLockManagerFactory};
pub use store::{MemoryNodeManager, MemoryStorageEngine};
pub use tx::{
    NoopLastCommittedTxIdSetter, SequentialTxIdGeneratorFactory, TrackingLastCommittedTxId,
};
pub use types::MemoryRelationshipTypeCreator;
