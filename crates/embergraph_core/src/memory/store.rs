//! In-memory node store.

use crate::error::{CoreError, CoreResult};
use crate::event::TransactionData;
use crate::kernel::{Subsystems, TxModule};
use crate::spi::{
    CompletionStatus, IdGenerator, LastCommittedTxIdSetter, LockResource, LockType, NodeManager,
    RelationshipTypeCreator, StorageEngine, Synchronization, TransactionManager, TxIdGenerator,
};
use crate::transaction::LockReleaser;
use crate::types::{
    IdType, Node, NodeId, Relationship, RelationshipId, RelationshipType, TransactionId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Starts a [`MemoryNodeManager`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStorageEngine {
    reference_node: bool,
}

impl MemoryStorageEngine {
    /// Creates an engine whose store starts empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reference_node: false,
        }
    }

    /// Creates node 0 as the reference node when the store starts.
    #[must_use]
    pub const fn with_reference_node(mut self) -> Self {
        self.reference_node = true;
        self
    }
}

impl StorageEngine for MemoryStorageEngine {
    fn start(&self, subsystems: &Arc<Subsystems>) -> CoreResult<Arc<dyn NodeManager>> {
        let manager = MemoryNodeManager::new(subsystems);
        if self.reference_node {
            manager.bootstrap_reference_node()?;
        }
        info!(store_id = %subsystems.store_id(), "in-memory store started");
        Ok(Arc::new(manager))
    }
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    relationships: BTreeSet<u64>,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeMap<u64, NodeRecord>,
    relationships: BTreeMap<u64, Relationship>,
}

impl Graph {
    fn link(&mut self, relationship: Relationship) {
        for node in [relationship.start(), relationship.end()] {
            if let Some(record) = self.nodes.get_mut(&node.as_u64()) {
                record.relationships.insert(relationship.id().as_u64());
            }
        }
        self.relationships
            .insert(relationship.id().as_u64(), relationship);
    }

    fn unlink(&mut self, id: RelationshipId) -> Option<Relationship> {
        let relationship = self.relationships.remove(&id.as_u64())?;
        for node in [relationship.start(), relationship.end()] {
            if let Some(record) = self.nodes.get_mut(&node.as_u64()) {
                record.relationships.remove(&id.as_u64());
            }
        }
        Some(relationship)
    }
}

#[derive(Debug)]
enum Change {
    CreatedNode(NodeId),
    DeletedNode(NodeId, NodeRecord),
    CreatedRelationship(Relationship),
    DeletedRelationship(Relationship),
}

type ChangeLog = Arc<Mutex<HashMap<TransactionId, Vec<Change>>>>;

/// Node manager over an in-memory graph.
///
/// Writes become visible to every thread immediately and are undone if the
/// transaction rolls back. Entities touched by a transaction are write-locked
/// until it completes.
pub struct MemoryNodeManager {
    tx_module: TxModule,
    tx_manager: Arc<dyn TransactionManager>,
    lock_releaser: Arc<LockReleaser>,
    node_ids: Arc<dyn IdGenerator>,
    relationship_ids: Arc<dyn IdGenerator>,
    type_ids: Arc<dyn IdGenerator>,
    relationship_types: Arc<dyn RelationshipTypeCreator>,
    tx_ids: Arc<dyn TxIdGenerator>,
    last_committed: Arc<dyn LastCommittedTxIdSetter>,
    graph: Arc<RwLock<Graph>>,
    changes: ChangeLog,
    stopped: AtomicBool,
}

impl MemoryNodeManager {
    fn new(subsystems: &Subsystems) -> Self {
        let ids = subsystems.id_generator_factory();
        Self {
            tx_module: subsystems.tx_module().clone(),
            tx_manager: Arc::clone(subsystems.tx_manager()),
            lock_releaser: Arc::clone(subsystems.lock_releaser()),
            node_ids: ids.get(IdType::Node),
            relationship_ids: ids.get(IdType::Relationship),
            type_ids: ids.get(IdType::RelationshipType),
            relationship_types: Arc::clone(subsystems.relationship_type_creator()),
            tx_ids: Arc::clone(subsystems.tx_id_generator()),
            last_committed: Arc::clone(subsystems.last_committed_tx_id_setter()),
            graph: Arc::default(),
            changes: Arc::default(),
            stopped: AtomicBool::new(false),
        }
    }

    fn bootstrap_reference_node(&self) -> CoreResult<()> {
        let id = self.node_ids.next_id()?;
        self.graph.write().nodes.insert(id, NodeRecord::default());
        debug!(node = id, "reference node created");
        Ok(())
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.read().nodes.len()
    }

    /// Returns the number of live relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.graph.read().relationships.len()
    }

    /// Returns the current transaction after registering the undo log for it.
    fn enlist(&self) -> CoreResult<TransactionId> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(CoreError::KernelStopped);
        }
        self.tx_module.ensure_writable()?;
        let txid = self
            .tx_manager
            .current_transaction()
            .ok_or(CoreError::NotInTransaction)?;
        if self.changes.lock().contains_key(&txid) {
            return Ok(txid);
        }

        self.tx_manager
            .register_synchronization(Box::new(ApplyOnCompletion {
                txid,
                graph: Arc::clone(&self.graph),
                changes: Arc::clone(&self.changes),
                tx_ids: Arc::clone(&self.tx_ids),
                last_committed: Arc::clone(&self.last_committed),
            }))?;
        self.changes.lock().insert(txid, Vec::new());
        Ok(txid)
    }

    fn record(&self, txid: TransactionId, change: Change) {
        self.changes.lock().entry(txid).or_default().push(change);
    }

    fn lock_node(&self, id: NodeId) -> CoreResult<()> {
        self.lock_releaser
            .acquire(LockResource::Node(id), LockType::Write)
    }
}

impl NodeManager for MemoryNodeManager {
    fn create_node(&self) -> CoreResult<Node> {
        let txid = self.enlist()?;
        let id = NodeId::new(self.node_ids.next_id()?);
        self.lock_node(id)?;
        self.graph
            .write()
            .nodes
            .insert(id.as_u64(), NodeRecord::default());
        self.record(txid, Change::CreatedNode(id));
        Ok(Node::new(id))
    }

    fn delete_node(&self, id: NodeId) -> CoreResult<()> {
        let txid = self.enlist()?;
        self.lock_node(id)?;
        let record = {
            let mut graph = self.graph.write();
            let Some(record) = graph.nodes.get(&id.as_u64()) else {
                return Err(CoreError::not_found(IdType::Node, id.as_u64() as i64));
            };
            if !record.relationships.is_empty() {
                return Err(CoreError::invalid_operation(format!(
                    "{id} still has {} relationship(s)",
                    record.relationships.len()
                )));
            }
            graph.nodes.remove(&id.as_u64()).unwrap_or_default()
        };
        self.record(txid, Change::DeletedNode(id, record));
        self.node_ids.free_id(id.as_u64());
        Ok(())
    }

    fn create_relationship(
        &self,
        start: NodeId,
        end: NodeId,
        type_name: &str,
    ) -> CoreResult<Relationship> {
        let txid = self.enlist()?;
        for node in [start, end] {
            if self.node(node).is_none() {
                return Err(CoreError::not_found(IdType::Node, node.as_u64() as i64));
            }
        }
        let rel_type = self
            .relationship_types
            .get_or_create(type_name, self.type_ids.as_ref())?;
        let id = RelationshipId::new(self.relationship_ids.next_id()?);
        self.lock_node(start)?;
        self.lock_node(end)?;
        self.lock_releaser
            .acquire(LockResource::Relationship(id), LockType::Write)?;

        let relationship = Relationship::new(id, start, end, rel_type.id());
        {
            let mut graph = self.graph.write();
            for node in [start, end] {
                if !graph.nodes.contains_key(&node.as_u64()) {
                    return Err(CoreError::not_found(IdType::Node, node.as_u64() as i64));
                }
            }
            graph.link(relationship);
        }
        self.record(txid, Change::CreatedRelationship(relationship));
        Ok(relationship)
    }

    fn delete_relationship(&self, id: RelationshipId) -> CoreResult<()> {
        let txid = self.enlist()?;
        self.lock_releaser
            .acquire(LockResource::Relationship(id), LockType::Write)?;
        let relationship = self
            .graph
            .write()
            .unlink(id)
            .ok_or_else(|| CoreError::not_found(IdType::Relationship, id.as_u64() as i64))?;
        self.record(txid, Change::DeletedRelationship(relationship));
        self.relationship_ids.free_id(id.as_u64());
        Ok(())
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        self.graph
            .read()
            .nodes
            .contains_key(&id.as_u64())
            .then(|| Node::new(id))
    }

    fn relationship(&self, id: RelationshipId) -> Option<Relationship> {
        self.graph.read().relationships.get(&id.as_u64()).copied()
    }

    fn reference_node(&self) -> CoreResult<Node> {
        self.node(NodeId::new(0))
            .ok_or_else(|| CoreError::not_found(IdType::Node, 0))
    }

    fn highest_possible_id_in_use(&self, id_type: IdType) -> Option<u64> {
        match id_type {
            IdType::Node => self.node_ids.highest_possible_id_in_use(),
            IdType::Relationship => self.relationship_ids.highest_possible_id_in_use(),
            IdType::RelationshipType => self.type_ids.highest_possible_id_in_use(),
        }
    }

    fn relationship_types(&self) -> Vec<RelationshipType> {
        self.relationship_types.types()
    }

    fn transaction_data(&self, txid: TransactionId) -> TransactionData {
        let mut data = TransactionData::default();
        if let Some(changes) = self.changes.lock().get(&txid) {
            for change in changes {
                match change {
                    Change::CreatedNode(id) => data.created_nodes.push(*id),
                    Change::DeletedNode(id, _) => data.deleted_nodes.push(*id),
                    Change::CreatedRelationship(rel) => data.created_relationships.push(rel.id()),
                    Change::DeletedRelationship(rel) => data.deleted_relationships.push(rel.id()),
                }
            }
        }
        data
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!(
                nodes = self.node_count(),
                relationships = self.relationship_count(),
                "in-memory store stopped"
            );
        }
    }
}

impl std::fmt::Debug for MemoryNodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNodeManager")
            .field("nodes", &self.node_count())
            .field("relationships", &self.relationship_count())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

/// Commits or undoes one transaction's changes.
struct ApplyOnCompletion {
    txid: TransactionId,
    graph: Arc<RwLock<Graph>>,
    changes: ChangeLog,
    tx_ids: Arc<dyn TxIdGenerator>,
    last_committed: Arc<dyn LastCommittedTxIdSetter>,
}

impl Synchronization for ApplyOnCompletion {
    fn after_completion(&self, status: CompletionStatus) -> CoreResult<()> {
        let changes = self.changes.lock().remove(&self.txid).unwrap_or_default();
        match status {
            CompletionStatus::Committed => {
                let committed = self.tx_ids.generate()?;
                self.last_committed.set_last_committed_tx_id(committed);
                debug!(txid = %self.txid, committed, changes = changes.len(), "changes committed");
            }
            CompletionStatus::RolledBack => {
                let mut graph = self.graph.write();
                for change in changes.into_iter().rev() {
                    match change {
                        Change::CreatedNode(id) => {
                            graph.nodes.remove(&id.as_u64());
                        }
                        Change::DeletedNode(id, record) => {
                            graph.nodes.insert(id.as_u64(), record);
                        }
                        Change::CreatedRelationship(rel) => {
                            graph.unlink(rel.id());
                        }
                        Change::DeletedRelationship(rel) => graph.link(rel),
                    }
                }
                debug!(txid = %self.txid, "changes rolled back");
            }
        }
        Ok(())
    }
}
