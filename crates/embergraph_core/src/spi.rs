//! Collaborator interfaces.
//!
//! The kernel never implements storage, locking or id allocation itself. It
//! reaches those subsystems through the traits below; [`crate::memory`]
//! provides in-memory implementations.

use crate::config::Config;
use crate::error::CoreResult;
use crate::event::{KernelPanicEventGenerator, TransactionData};
use crate::kernel::{Subsystems, TxModule};
use crate::types::{
    IdType, Node, NodeId, Relationship, RelationshipId, RelationshipType, TransactionId,
};
use std::sync::Arc;

/// Outcome reported to [`Synchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
}

/// A participant notified around transaction completion.
///
/// Synchronizations run in registration order.
pub trait Synchronization: Send {
    /// Runs before a commit. An error turns the commit into a rollback.
    fn before_completion(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Runs after the transaction committed or rolled back.
    ///
    /// An error after a commit means the committed state could not be
    /// applied and leaves the transaction manager unusable.
    fn after_completion(&self, status: CompletionStatus) -> CoreResult<()>;
}

/// Thread-bound transaction manager.
///
/// Every method acts on the transaction bound to the calling thread.
pub trait TransactionManager: Send + Sync {
    /// Begins a transaction on the calling thread.
    fn begin(&self) -> CoreResult<TransactionId>;

    /// Commits the calling thread's transaction.
    fn commit(&self) -> CoreResult<()>;

    /// Rolls back the calling thread's transaction.
    fn rollback(&self) -> CoreResult<()>;

    /// Marks the calling thread's transaction so that it can only roll back.
    fn set_rollback_only(&self) -> CoreResult<()>;

    /// Returns the transaction bound to the calling thread, if any.
    fn current_transaction(&self) -> Option<TransactionId>;

    /// Returns whether the calling thread has an active transaction.
    fn is_transaction_active(&self) -> bool {
        self.current_transaction().is_some()
    }

    /// Registers a completion participant for the calling thread's
    /// transaction.
    fn register_synchronization(&self, sync: Box<dyn Synchronization>) -> CoreResult<()>;

    /// Stops the manager. Later `begin` calls fail.
    fn stop(&self) {}
}

/// Named source of alternative transaction managers.
pub trait TransactionManagerProvider: Send + Sync {
    /// Name matched against the `tx_manager_impl` parameter.
    fn name(&self) -> &str;

    /// Creates the transaction manager.
    fn load(
        &self,
        config: &Config,
        panic_events: &KernelPanicEventGenerator,
    ) -> CoreResult<Arc<dyn TransactionManager>>;
}

/// Lock flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Shared lock.
    Read,
    /// Exclusive lock.
    Write,
}

/// Lockable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockResource {
    /// A node.
    Node(NodeId),
    /// A relationship.
    Relationship(RelationshipId),
}

/// Lock manager. Blocking and deadlock policy belong to the implementation.
pub trait LockManager: Send + Sync {
    /// Acquires `lock_type` on `resource` for `txid`, blocking if needed.
    fn acquire(&self, resource: LockResource, lock_type: LockType, txid: TransactionId)
        -> CoreResult<()>;

    /// Releases one hold of `lock_type` on `resource` by `txid`.
    fn release(&self, resource: LockResource, lock_type: LockType, txid: TransactionId)
        -> CoreResult<()>;
}

/// Builds the lock manager once the transaction module is known.
pub trait LockManagerFactory: Send + Sync {
    /// Creates a lock manager for `tx_module`.
    fn create(&self, tx_module: &TxModule) -> Arc<dyn LockManager>;
}

/// Allocator for one id space.
pub trait IdGenerator: Send + Sync {
    /// Allocates the next id.
    fn next_id(&self) -> CoreResult<u64>;

    /// Returns an id to the generator.
    fn free_id(&self, id: u64);

    /// Returns the first never-allocated id.
    fn high_id(&self) -> u64;

    /// Returns the highest id that may be in use, or `None` when nothing
    /// was ever allocated.
    fn highest_possible_id_in_use(&self) -> Option<u64> {
        self.high_id().checked_sub(1)
    }

    /// Returns the number of ids currently in use.
    fn ids_in_use(&self) -> u64;
}

/// Hands out one [`IdGenerator`] per id space.
pub trait IdGeneratorFactory: Send + Sync {
    /// Returns the generator for `id_type`.
    fn get(&self, id_type: IdType) -> Arc<dyn IdGenerator>;
}

/// Creates relationship types on first use.
pub trait RelationshipTypeCreator: Send + Sync {
    /// Returns the type named `name`, creating it with an id from `ids`.
    fn get_or_create(&self, name: &str, ids: &dyn IdGenerator) -> CoreResult<RelationshipType>;

    /// Returns every known type, ordered by id.
    fn types(&self) -> Vec<RelationshipType>;
}

/// Generates ids for committed transactions.
pub trait TxIdGenerator: Send + Sync {
    /// Returns the id for the transaction being committed.
    fn generate(&self) -> CoreResult<u64>;
}

/// Builds the tx-id generator once the transaction manager is known.
pub trait TxIdGeneratorFactory: Send + Sync {
    /// Creates a generator bound to `tx_manager`.
    fn create(&self, tx_manager: &Arc<dyn TransactionManager>) -> Arc<dyn TxIdGenerator>;
}

/// Receives the id of every committed transaction.
pub trait LastCommittedTxIdSetter: Send + Sync {
    /// Records `id` as the last committed transaction.
    fn set_last_committed_tx_id(&self, id: u64);
}

/// Storage and node-management subsystem.
pub trait StorageEngine: Send + Sync {
    /// Starts the subsystem against the assembled [`Subsystems`].
    fn start(&self, subsystems: &Arc<Subsystems>) -> CoreResult<Arc<dyn NodeManager>>;
}

/// Entity access provided by a started storage engine.
///
/// Lookups return `None` for absent entities; the kernel maps that to
/// not-found.
pub trait NodeManager: Send + Sync {
    /// Creates a node in the calling thread's transaction.
    fn create_node(&self) -> CoreResult<Node>;

    /// Deletes a node in the calling thread's transaction.
    fn delete_node(&self, id: NodeId) -> CoreResult<()>;

    /// Creates a relationship in the calling thread's transaction.
    fn create_relationship(
        &self,
        start: NodeId,
        end: NodeId,
        type_name: &str,
    ) -> CoreResult<Relationship>;

    /// Deletes a relationship in the calling thread's transaction.
    fn delete_relationship(&self, id: RelationshipId) -> CoreResult<()>;

    /// Looks up a live node.
    fn node(&self, id: NodeId) -> Option<Node>;

    /// Looks up a live relationship.
    fn relationship(&self, id: RelationshipId) -> Option<Relationship>;

    /// Returns the reference node.
    fn reference_node(&self) -> CoreResult<Node>;

    /// Returns the highest id of `id_type` that may be in use.
    fn highest_possible_id_in_use(&self, id_type: IdType) -> Option<u64>;

    /// Returns every relationship type.
    fn relationship_types(&self) -> Vec<RelationshipType>;

    /// Returns what `txid` changed so far.
    fn transaction_data(&self, txid: TransactionId) -> TransactionData;

    /// Stops the subsystem.
    fn stop(&self);
}
