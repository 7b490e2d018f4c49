//! Transaction completion handlers and the synchronization that runs them.

use super::same_handler;
use crate::error::{CoreError, CoreResult};
use crate::spi::{CompletionStatus, NodeManager, Synchronization};
use crate::types::{NodeId, RelationshipId, TransactionId};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Changes made by one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionData {
    /// Nodes created in the transaction.
    pub created_nodes: Vec<NodeId>,
    /// Nodes deleted in the transaction.
    pub deleted_nodes: Vec<NodeId>,
    /// Relationships created in the transaction.
    pub created_relationships: Vec<RelationshipId>,
    /// Relationships deleted in the transaction.
    pub deleted_relationships: Vec<RelationshipId>,
}

impl TransactionData {
    /// Returns whether the transaction changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.deleted_relationships.is_empty()
    }
}

/// Observes transaction completion.
pub trait TransactionEventHandler: Send + Sync {
    /// Runs before commit. An error rolls the transaction back.
    fn before_commit(&self, data: &TransactionData) -> CoreResult<()>;

    /// Runs after a successful commit.
    fn after_commit(&self, data: &TransactionData);

    /// Runs after a rollback.
    fn after_rollback(&self, data: &TransactionData);

    /// Name used in logs and error messages.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

type HandlerSet = Arc<Vec<Arc<dyn TransactionEventHandler>>>;

/// Copy-on-write set of [`TransactionEventHandler`]s keyed by `Arc` identity.
#[derive(Default)]
pub struct TransactionEventHandlers {
    handlers: RwLock<HandlerSet>,
}

impl TransactionEventHandlers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler`. Registering a present handler returns it unchanged.
    pub fn register(
        &self,
        handler: Arc<dyn TransactionEventHandler>,
    ) -> Arc<dyn TransactionEventHandler> {
        let mut current = self.handlers.write();
        if let Some(existing) = current.iter().find(|&h| same_handler(h, &handler)) {
            return Arc::clone(existing);
        }
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.push(Arc::clone(&handler));
        *current = Arc::new(next);
        handler
    }

    /// Removes `handler`.
    ///
    /// Fails with [`CoreError::UnregisteredHandler`] if it is not present.
    pub fn unregister(&self, handler: &Arc<dyn TransactionEventHandler>) -> CoreResult<()> {
        let mut current = self.handlers.write();
        let Some(index) = current.iter().position(|h| same_handler(h, handler)) else {
            drop(current);
            return Err(CoreError::unregistered_handler(handler.name()));
        };
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.remove(index);
        *current = Arc::new(next);
        Ok(())
    }

    /// Returns the current handler set.
    #[must_use]
    pub fn snapshot(&self) -> HandlerSet {
        Arc::clone(&self.handlers.read())
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for TransactionEventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEventHandlers")
            .field("len", &self.len())
            .finish()
    }
}

/// Builds a [`TransactionEventsSyncHook`] for each new transaction.
pub struct SyncHookFactory {
    handlers: Arc<TransactionEventHandlers>,
    node_manager: OnceCell<Arc<dyn NodeManager>>,
}

impl SyncHookFactory {
    /// Creates a factory over `handlers`. No hook is produced until a node
    /// manager is bound.
    #[must_use]
    pub fn new(handlers: Arc<TransactionEventHandlers>) -> Self {
        Self {
            handlers,
            node_manager: OnceCell::new(),
        }
    }

    /// Binds the node manager that supplies transaction data.
    ///
    /// Returns false if a node manager was already bound.
    pub fn bind(&self, node_manager: Arc<dyn NodeManager>) -> bool {
        self.node_manager.set(node_manager).is_ok()
    }

    /// Returns a hook for `txid`, or `None` when no handler is registered.
    #[must_use]
    pub fn create(&self, txid: TransactionId) -> Option<TransactionEventsSyncHook> {
        let handlers = self.handlers.snapshot();
        if handlers.is_empty() {
            return None;
        }
        let node_manager = Arc::clone(self.node_manager.get()?);
        Some(TransactionEventsSyncHook {
            handlers,
            node_manager,
            txid,
            data: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for SyncHookFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHookFactory")
            .field("handlers", &self.handlers)
            .field("bound", &self.node_manager.get().is_some())
            .finish()
    }
}

/// Runs transaction event handlers when one transaction completes.
///
/// The handler set is fixed when the hook is created.
pub struct TransactionEventsSyncHook {
    handlers: HandlerSet,
    node_manager: Arc<dyn NodeManager>,
    txid: TransactionId,
    data: Mutex<Option<TransactionData>>,
}

impl TransactionEventsSyncHook {
    /// Returns the transaction this hook belongs to.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.txid
    }

    /// Returns the number of handlers bound to this hook.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn take_data(&self) -> TransactionData {
        self.data
            .lock()
            .take()
            .unwrap_or_else(|| self.node_manager.transaction_data(self.txid))
    }
}

impl Synchronization for TransactionEventsSyncHook {
    fn before_completion(&self) -> CoreResult<()> {
        let data = self.node_manager.transaction_data(self.txid);
        let outcome = self.handlers.iter().try_for_each(|handler| {
            handler.before_commit(&data).map_err(|err| {
                warn!(
                    txid = %self.txid,
                    handler = %handler.name(),
                    error = %err,
                    "before-commit handler vetoed commit"
                );
                CoreError::handler_failed(format!("{}: {err}", handler.name()))
            })
        });
        *self.data.lock() = Some(data);
        outcome
    }

    fn after_completion(&self, status: CompletionStatus) -> CoreResult<()> {
        let data = self.take_data();
        debug!(
            txid = %self.txid,
            ?status,
            handlers = self.handlers.len(),
            "running transaction event handlers"
        );
        for handler in self.handlers.iter() {
            match status {
                CompletionStatus::Committed => handler.after_commit(&data),
                CompletionStatus::RolledBack => handler.after_rollback(&data),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransactionEventsSyncHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEventsSyncHook")
            .field("txid", &self.txid)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdType, Node, Relationship, RelationshipType};

    struct FixedData(TransactionData);

    impl NodeManager for FixedData {
        fn create_node(&self) -> CoreResult<Node> {
            Err(CoreError::ReadOnly)
        }
        fn delete_node(&self, _id: NodeId) -> CoreResult<()> {
            Err(CoreError::ReadOnly)
        }
        fn create_relationship(
            &self,
            _s: NodeId,
            _e: NodeId,
            _t: &str,
        ) -> CoreResult<Relationship> {
            Err(CoreError::ReadOnly)
        }
        fn delete_relationship(&self, _id: RelationshipId) -> CoreResult<()> {
            Err(CoreError::ReadOnly)
        }
        fn node(&self, _id: NodeId) -> Option<Node> {
            None
        }
        fn relationship(&self, _id: RelationshipId) -> Option<Relationship> {
            None
        }
        fn reference_node(&self) -> CoreResult<Node> {
            Err(CoreError::not_found(IdType::Node, 0))
        }
        fn highest_possible_id_in_use(&self, _id_type: IdType) -> Option<u64> {
            None
        }
        fn relationship_types(&self) -> Vec<RelationshipType> {
            Vec::new()
        }
        fn transaction_data(&self, _txid: TransactionId) -> TransactionData {
            self.0.clone()
        }
        fn stop(&self) {}
    }

    #[derive(Default)]
    struct Recorder {
        veto: bool,
        events: Mutex<Vec<String>>,
    }

    impl TransactionEventHandler for Recorder {
        fn before_commit(&self, data: &TransactionData) -> CoreResult<()> {
            self.events.lock().push(format!("before:{}", data.created_nodes.len()));
            if self.veto {
                Err(CoreError::handler_failed("veto"))
            } else {
                Ok(())
            }
        }
        fn after_commit(&self, data: &TransactionData) {
            self.events.lock().push(format!("commit:{}", data.created_nodes.len()));
        }
        fn after_rollback(&self, _data: &TransactionData) {
            self.events.lock().push("rollback".to_string());
        }
    }

    fn bound_factory(handlers: &Arc<TransactionEventHandlers>) -> SyncHookFactory {
        let factory = SyncHookFactory::new(Arc::clone(handlers));
        let data = TransactionData {
            created_nodes: vec![NodeId::new(3)],
            ..TransactionData::default()
        };
        assert!(factory.bind(Arc::new(FixedData(data))));
        factory
    }

    #[test]
    fn no_hook_without_handlers() {
        let handlers = Arc::new(TransactionEventHandlers::new());
        let factory = bound_factory(&handlers);
        assert!(factory.create(TransactionId::new(1)).is_none());
    }

    #[test]
    fn no_hook_before_node_manager_is_bound() {
        let handlers = Arc::new(TransactionEventHandlers::new());
        handlers.register(Arc::new(Recorder::default()));
        let factory = SyncHookFactory::new(handlers);
        assert!(factory.create(TransactionId::new(1)).is_none());
    }

    #[test]
    fn hook_keeps_snapshot_from_creation() {
        let handlers = Arc::new(TransactionEventHandlers::new());
        let factory = bound_factory(&handlers);
        let first = Arc::new(Recorder::default());
        handlers.register(first.clone());

        let hook = factory.create(TransactionId::new(7)).unwrap();
        let late = Arc::new(Recorder::default());
        handlers.register(late.clone());

        assert_eq!(hook.handler_count(), 1);
        hook.before_completion().unwrap();
        hook.after_completion(CompletionStatus::Committed).unwrap();

        assert_eq!(*first.events.lock(), ["before:1", "commit:1"]);
        assert!(late.events.lock().is_empty());
    }

    #[test]
    fn veto_fails_before_completion() {
        let handlers = Arc::new(TransactionEventHandlers::new());
        let factory = bound_factory(&handlers);
        let vetoer = Arc::new(Recorder {
            veto: true,
            ..Recorder::default()
        });
        handlers.register(vetoer.clone());

        let hook = factory.create(TransactionId::new(2)).unwrap();
        assert!(matches!(
            hook.before_completion(),
            Err(CoreError::HandlerFailed { .. })
        ));
        hook.after_completion(CompletionStatus::RolledBack).unwrap();
        assert_eq!(*vetoer.events.lock(), ["before:1", "rollback"]);
    }

    #[test]
    fn register_is_idempotent_and_unregister_checks_presence() {
        let handlers = TransactionEventHandlers::new();
        let handler: Arc<dyn TransactionEventHandler> = Arc::new(Recorder::default());

        let first = handlers.register(Arc::clone(&handler));
        let second = handlers.register(Arc::clone(&handler));
        assert!(same_handler(&first, &second));
        assert_eq!(handlers.len(), 1);

        handlers.unregister(&handler).unwrap();
        assert!(handlers.is_empty());
        assert!(matches!(
            handlers.unregister(&handler),
            Err(CoreError::UnregisteredHandler { .. })
        ));
    }

    #[test]
    fn transaction_data_emptiness() {
        assert!(TransactionData::default().is_empty());
        let data = TransactionData {
            deleted_relationships: vec![RelationshipId::new(1)],
            ..TransactionData::default()
        };
        assert!(!data.is_empty());
    }
}
