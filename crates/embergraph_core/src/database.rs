//! Kernel facade.

use crate::config::Config;
use crate::entity::{self, EntityScan};
use crate::error::{CoreError, CoreResult};
use crate::event::{KernelEventHandler, KernelPanicEventGenerator, TransactionEventHandler};
use crate::extension::{
    Capability, CapabilityKey, ExtensionLoader, IndexManager, KernelExtension, ManagementBean,
};
use crate::kernel::{
    Collaborators, KernelData, KernelInstance, KernelServices, LifecycleState, RunningKernel,
    StartupPhase,
};
use crate::logging::MessageLog;
use crate::spi::{
    IdGeneratorFactory, LastCommittedTxIdSetter, LockManagerFactory, RelationshipTypeCreator,
    StorageEngine, TransactionManagerProvider, TxIdGeneratorFactory,
};
use crate::transaction::{Transaction, TransactionBoundary};
use crate::types::{Node, NodeId, Relationship, RelationshipId, RelationshipType, StoreId};
use embergraph_storage::{LogSink, MemorySink};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Collects collaborators and extensions, then starts a [`GraphDatabase`].
///
/// Every collaborator defaults to its in-memory implementation.
pub struct KernelBuilder {
    config: Config,
    collaborators: Collaborators,
    extensions: Vec<Arc<dyn KernelExtension>>,
    message_log: Option<Arc<MessageLog>>,
    store_id: Option<StoreId>,
}

impl KernelBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            collaborators: Collaborators::in_memory(),
            extensions: Vec::new(),
            message_log: None,
            store_id: None,
        }
    }

    /// Sets the storage engine.
    #[must_use]
    pub fn with_storage_engine(mut self, engine: Arc<dyn StorageEngine>) -> Self {
        self.collaborators.storage_engine = engine;
        self
    }

    /// Sets the lock manager factory.
    #[must_use]
    pub fn with_lock_manager_factory(mut self, factory: Arc<dyn LockManagerFactory>) -> Self {
        self.collaborators.lock_manager_factory = factory;
        self
    }

    /// Sets the id generator factory.
    #[must_use]
    pub fn with_id_generator_factory(mut self, factory: Arc<dyn IdGeneratorFactory>) -> Self {
        self.collaborators.id_generator_factory = factory;
        self
    }

    /// Sets the relationship type creator.
    #[must_use]
    pub fn with_relationship_type_creator(
        mut self,
        creator: Arc<dyn RelationshipTypeCreator>,
    ) -> Self {
        self.collaborators.relationship_type_creator = creator;
        self
    }

    /// Sets the tx-id generator factory.
    #[must_use]
    pub fn with_tx_id_generator_factory(mut self, factory: Arc<dyn TxIdGeneratorFactory>) -> Self {
        self.collaborators.tx_id_generator_factory = factory;
        self
    }

    /// Sets the receiver of committed tx ids.
    #[must_use]
    pub fn with_last_committed_tx_id_setter(
        mut self,
        setter: Arc<dyn LastCommittedTxIdSetter>,
    ) -> Self {
        self.collaborators.last_committed_tx_id_setter = setter;
        self
    }

    /// Adds a transaction manager implementation selectable by name.
    #[must_use]
    pub fn with_tx_manager_provider(
        mut self,
        provider: Arc<dyn TransactionManagerProvider>,
    ) -> Self {
        self.collaborators.tx_manager_providers.push(provider);
        self
    }

    /// Adds an extension. Extensions are loaded in the order added.
    #[must_use]
    pub fn with_extension(mut self, extension: Arc<dyn KernelExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Uses `log` instead of `messages.log` in the store directory.
    #[must_use]
    pub fn with_message_log(mut self, log: MessageLog) -> Self {
        self.message_log = Some(Arc::new(log));
        self
    }

    /// Writes the message log to `sink`.
    #[must_use]
    pub fn with_log_sink(self, sink: impl LogSink + 'static) -> Self {
        self.with_message_log(MessageLog::new(sink))
    }

    /// Uses a fixed store identity.
    #[must_use]
    pub fn with_store_id(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    /// Starts the kernel and loads every extension.
    ///
    /// On failure nothing stays running: extensions are unloaded, started
    /// subsystems are stopped and the error is a
    /// [`CoreError::StartupFailed`].
    pub fn open(self) -> CoreResult<GraphDatabase> {
        let message_log = match self.message_log {
            Some(log) => log,
            None => Arc::new(MessageLog::open(&self.config.message_log_path())),
        };
        let mut services = KernelServices::new(message_log);
        if let Some(store_id) = self.store_id {
            services.store_id = store_id;
        }

        let instance = KernelInstance::new(self.config, self.collaborators, services);
        let extensions = ExtensionLoader::new(self.extensions);
        instance.start(&extensions)?;

        if let Err(err) = extensions.load() {
            let err = CoreError::startup_failed(StartupPhase::ExtensionLoad, err);
            error!(error = %err, "kernel startup failed");
            instance
                .services()
                .message_log
                .log_failure("Startup failed", &err);
            extensions.unload();
            instance.begin_shutdown();
            instance.stop();
            return Err(err);
        }

        Ok(GraphDatabase {
            instance,
            extensions,
            boundary: TransactionBoundary::new(),
        })
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("config", &self.config)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

/// An embedded graph database kernel.
///
/// # Opening
///
/// ```rust,ignore
/// use embergraph_core::GraphDatabase;
///
/// let db = GraphDatabase::open_in_memory()?;
/// db.transaction(|_| {
///     let a = db.create_node()?;
///     let b = db.create_node()?;
///     db.create_relationship(a.id(), b.id(), "KNOWS")?;
///     Ok(())
/// })?;
/// db.shutdown()?;
/// ```
///
/// Dropping the database shuts it down.
pub struct GraphDatabase {
    instance: KernelInstance,
    extensions: ExtensionLoader,
    boundary: TransactionBoundary,
}

impl GraphDatabase {
    /// Returns a builder for a kernel configured by `config`.
    #[must_use]
    pub fn builder(config: Config) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// Opens a kernel with in-memory collaborators and the message log in
    /// the store directory.
    pub fn open(config: Config) -> CoreResult<Self> {
        Self::builder(config).open()
    }

    /// Opens a kernel that keeps everything, including its message log, in
    /// memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::builder(Config::default())
            .with_log_sink(MemorySink::new())
            .open()
    }

    fn running(&self) -> CoreResult<RunningKernel> {
        self.instance.running()
    }

    fn writable(&self) -> CoreResult<RunningKernel> {
        let running = self.running()?;
        running.subsystems.tx_module().ensure_writable()?;
        Ok(running)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begins a transaction.
    ///
    /// Returns a top-level handle, or the shared placebo handle when the
    /// calling thread already runs a transaction.
    pub fn begin_tx(&self) -> CoreResult<Transaction> {
        let running = self.running()?;
        self.boundary.begin_tx(
            running.subsystems.tx_manager(),
            running.subsystems.sync_hooks(),
        )
    }

    /// Runs `f` in a transaction.
    ///
    /// The transaction succeeds if `f` returns `Ok`, and fails otherwise.
    /// Inside an enclosing transaction the outcome only affects whether the
    /// enclosing transaction may commit.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction) -> CoreResult<T>,
    {
        let tx = self.begin_tx()?;
        match f(&tx) {
            Ok(value) => {
                tx.success();
                tx.finish()?;
                Ok(value)
            }
            Err(err) => {
                tx.failure();
                if let Err(finish) = tx.finish() {
                    warn!(error = %finish, "finishing failed transaction failed");
                }
                Err(err)
            }
        }
    }

    /// Returns whether the calling thread runs a transaction.
    #[must_use]
    pub fn transaction_running(&self) -> bool {
        self.instance.transaction_running()
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Creates a node in the calling thread's transaction.
    pub fn create_node(&self) -> CoreResult<Node> {
        self.writable()?.node_manager.create_node()
    }

    /// Deletes a node in the calling thread's transaction.
    pub fn delete_node(&self, id: NodeId) -> CoreResult<()> {
        self.writable()?.node_manager.delete_node(id)
    }

    /// Creates a relationship in the calling thread's transaction.
    pub fn create_relationship(
        &self,
        start: NodeId,
        end: NodeId,
        type_name: &str,
    ) -> CoreResult<Relationship> {
        self.writable()?
            .node_manager
            .create_relationship(start, end, type_name)
    }

    /// Deletes a relationship in the calling thread's transaction.
    pub fn delete_relationship(&self, id: RelationshipId) -> CoreResult<()> {
        self.writable()?.node_manager.delete_relationship(id)
    }

    /// Returns the node with `id`.
    ///
    /// Negative, out-of-range and unused ids all fail with
    /// [`CoreError::NotFound`].
    pub fn node_by_id(&self, id: i64) -> CoreResult<Node> {
        entity::lookup(self.running()?.node_manager.as_ref(), id)
    }

    /// Returns the relationship with `id`.
    pub fn relationship_by_id(&self, id: i64) -> CoreResult<Relationship> {
        entity::lookup(self.running()?.node_manager.as_ref(), id)
    }

    /// Returns the reference node.
    pub fn reference_node(&self) -> CoreResult<Node> {
        self.running()?.node_manager.reference_node()
    }

    /// Returns a lazy scan over all live nodes.
    pub fn all_nodes(&self) -> CoreResult<EntityScan<Node>> {
        Ok(EntityScan::new(self.running()?.node_manager))
    }

    /// Returns a lazy scan over all live relationships.
    pub fn all_relationships(&self) -> CoreResult<EntityScan<Relationship>> {
        Ok(EntityScan::new(self.running()?.node_manager))
    }

    /// Returns every relationship type.
    pub fn relationship_types(&self) -> CoreResult<Vec<RelationshipType>> {
        Ok(self.running()?.node_manager.relationship_types())
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    /// Registers a lifecycle handler and returns the registered instance.
    pub fn register_kernel_event_handler(
        &self,
        handler: Arc<dyn KernelEventHandler>,
    ) -> Arc<dyn KernelEventHandler> {
        self.instance.services().kernel_handlers.register(handler)
    }

    /// Unregisters a lifecycle handler.
    pub fn unregister_kernel_event_handler(
        &self,
        handler: &Arc<dyn KernelEventHandler>,
    ) -> CoreResult<()> {
        self.instance.services().kernel_handlers.unregister(handler)
    }

    /// Registers a transaction completion handler.
    ///
    /// Transactions that already began do not see it.
    pub fn register_transaction_event_handler(
        &self,
        handler: Arc<dyn TransactionEventHandler>,
    ) -> Arc<dyn TransactionEventHandler> {
        self.instance
            .services()
            .transaction_handlers
            .register(handler)
    }

    /// Unregisters a transaction completion handler.
    pub fn unregister_transaction_event_handler(
        &self,
        handler: &Arc<dyn TransactionEventHandler>,
    ) -> CoreResult<()> {
        self.instance
            .services()
            .transaction_handlers
            .unregister(handler)
    }

    /// Returns a generator for kernel panic events.
    #[must_use]
    pub fn kernel_panic_events(&self) -> KernelPanicEventGenerator {
        self.instance.services().panic_events()
    }

    // ========================================================================
    // Kernel state
    // ========================================================================

    /// Returns the index manager.
    #[must_use]
    pub fn index(&self) -> &Arc<IndexManager> {
        &self.instance.services().index_manager
    }

    /// Returns the view of the kernel handed to extensions.
    pub fn kernel_data(&self) -> CoreResult<Arc<KernelData>> {
        Ok(self.running()?.kernel_data)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.instance.config()
    }

    /// Returns the store location.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        self.instance.config().store_path()
    }

    /// Returns the store identity.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.instance.services().store_id
    }

    /// Returns whether the kernel is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.instance.started()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.instance.state()
    }

    /// Returns whether the kernel forbids mutation.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.instance.config().read_only
    }

    /// Returns the keys of all loaded extensions.
    #[must_use]
    pub fn loaded_extensions(&self) -> Vec<String> {
        self.extensions.loaded_extensions()
    }

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    /// Returns the management bean named `name`.
    ///
    /// Fails with [`CoreError::UnsupportedCapability`] when no loaded
    /// extension offers management support or the bean does not exist.
    pub fn management_bean(&self, name: &str) -> CoreResult<ManagementBean> {
        self.running()?;
        match self.extensions.capability(CapabilityKey::Management) {
            Some(Capability::Management(management)) => management.bean(name).ok_or_else(|| {
                CoreError::unsupported_capability(format!("no management bean named `{name}`"))
            }),
            _ => Err(CoreError::unsupported_capability(
                "management support not enabled",
            )),
        }
    }

    /// Enables the remote shell.
    ///
    /// Returns `Ok(false)` when no loaded extension offers a shell.
    pub fn enable_remote_shell(&self, params: &BTreeMap<String, String>) -> CoreResult<bool> {
        self.running()?;
        match self.extensions.capability(CapabilityKey::RemoteShell) {
            Some(Capability::RemoteShell(shell)) => {
                shell.enable(params)?;
                info!(params = params.len(), "remote shell enabled");
                Ok(true)
            }
            _ => {
                info!(
                    capability = CapabilityKey::RemoteShell.as_str(),
                    "remote shell unavailable, no loaded extension offers it"
                );
                Ok(false)
            }
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Shuts the kernel down.
    ///
    /// Fires `before_shutdown` on every lifecycle handler, unloads
    /// extensions and stops the subsystems. Only the first call does any
    /// work; concurrent and later calls return `Ok(())` at once. If
    /// handlers failed, teardown still completes and the failures are
    /// returned as [`CoreError::ShutdownFailed`].
    pub fn shutdown(&self) -> CoreResult<()> {
        if !self.instance.begin_shutdown() {
            return Ok(());
        }
        info!("shutting down kernel");

        let services = self.instance.services();
        let failures = services.kernel_handlers.fire_before_shutdown();
        self.extensions.unload();
        self.instance.stop();

        if failures.is_empty() {
            services.message_log.log_message("Shutdown complete");
            services.message_log.flush();
            Ok(())
        } else {
            services.message_log.log_message(&format!(
                "Shutdown complete, {} before-shutdown handler(s) failed: {}",
                failures.len(),
                failures.join("; ")
            ));
            services.message_log.flush();
            Err(CoreError::ShutdownFailed { failures })
        }
    }
}

impl std::fmt::Debug for GraphDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDatabase")
            .field("state", &self.state())
            .field("store_dir", &self.store_dir())
            .field("extensions", &self.loaded_extensions())
            .finish_non_exhaustive()
    }
}

impl Drop for GraphDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "shutdown on drop reported failures");
        }
    }
}
