//! Lifecycle coordinator.

use super::{KernelData, Subsystems, TxModule};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::event::{
    KernelEventHandlers, KernelPanicEventGenerator, SyncHookFactory, TransactionEventHandlers,
};
use crate::extension::{ExtensionLoader, IndexManager};
use crate::logging::MessageLog;
use crate::memory::{
    MemoryIdGeneratorFactory, MemoryLockManagerFactory, MemoryRelationshipTypeCreator,
    MemoryStorageEngine, SequentialTxIdGeneratorFactory, TrackingLastCommittedTxId,
};
use crate::spi::{
    IdGeneratorFactory, LastCommittedTxIdSetter, LockManagerFactory, NodeManager,
    RelationshipTypeCreator, StorageEngine, TransactionManager, TransactionManagerProvider,
    TxIdGeneratorFactory,
};
use crate::transaction::LockReleaser;
use crate::types::StoreId;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Kernel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Not started, failed to start, or fully shut down.
    NotStarted = 0,
    /// Running.
    Started = 1,
    /// Shutdown in progress.
    ShuttingDown = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Started,
            2 => Self::ShuttingDown,
            _ => Self::NotStarted,
        }
    }
}

/// Step of the startup sequence, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupPhase {
    /// Selecting the transaction manager.
    #[default]
    TransactionModule,
    /// Starting the storage subsystem.
    Storage,
    /// Extension phase 1.
    ExtensionConfiguration,
    /// Extension phase 2.
    IndexProviders,
    /// Extension phase 3.
    ExtensionLoad,
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TransactionModule => "transaction module resolution",
            Self::Storage => "storage start",
            Self::ExtensionConfiguration => "extension configuration",
            Self::IndexProviders => "index provider initialization",
            Self::ExtensionLoad => "extension load",
        })
    }
}

/// External subsystems the kernel is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    /// Storage and node management.
    pub storage_engine: Arc<dyn StorageEngine>,
    /// Lock manager construction.
    pub lock_manager_factory: Arc<dyn LockManagerFactory>,
    /// Id allocation.
    pub id_generator_factory: Arc<dyn IdGeneratorFactory>,
    /// Relationship type creation.
    pub relationship_type_creator: Arc<dyn RelationshipTypeCreator>,
    /// Tx-id generator construction.
    pub tx_id_generator_factory: Arc<dyn TxIdGeneratorFactory>,
    /// Receives committed tx ids.
    pub last_committed_tx_id_setter: Arc<dyn LastCommittedTxIdSetter>,
    /// Alternative transaction managers, selected by name.
    pub tx_manager_providers: Vec<Arc<dyn TransactionManagerProvider>>,
}

impl Collaborators {
    /// In-memory implementations of every collaborator.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            storage_engine: Arc::new(MemoryStorageEngine::new()),
            lock_manager_factory: Arc::new(MemoryLockManagerFactory),
            id_generator_factory: Arc::new(MemoryIdGeneratorFactory::new()),
            relationship_type_creator: Arc::new(MemoryRelationshipTypeCreator::new()),
            tx_id_generator_factory: Arc::new(SequentialTxIdGeneratorFactory::new()),
            last_committed_tx_id_setter: Arc::new(TrackingLastCommittedTxId::new()),
            tx_manager_providers: Vec::new(),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self.tx_manager_providers.iter().map(|p| p.name()).collect();
        f.debug_struct("Collaborators")
            .field("tx_manager_providers", &providers)
            .finish_non_exhaustive()
    }
}

/// State the kernel shares with the facade for its whole life.
#[derive(Clone, Debug)]
pub struct KernelServices {
    /// Store identity passed to collaborators.
    pub store_id: StoreId,
    /// Lifecycle handlers.
    pub kernel_handlers: Arc<KernelEventHandlers>,
    /// Transaction completion handlers.
    pub transaction_handlers: Arc<TransactionEventHandlers>,
    /// Index providers.
    pub index_manager: Arc<IndexManager>,
    /// Persistent message log.
    pub message_log: Arc<MessageLog>,
}

impl KernelServices {
    /// Creates empty registries around `message_log`.
    #[must_use]
    pub fn new(message_log: Arc<MessageLog>) -> Self {
        Self {
            store_id: StoreId::new(),
            kernel_handlers: Arc::new(KernelEventHandlers::new()),
            transaction_handlers: Arc::new(TransactionEventHandlers::new()),
            index_manager: Arc::new(IndexManager::new()),
            message_log,
        }
    }

    /// Returns a panic event generator over the lifecycle handlers.
    #[must_use]
    pub fn panic_events(&self) -> KernelPanicEventGenerator {
        KernelPanicEventGenerator::new(Arc::clone(&self.kernel_handlers))
    }
}

/// Handles of a started kernel.
#[derive(Clone)]
pub struct RunningKernel {
    /// The subsystem aggregate.
    pub subsystems: Arc<Subsystems>,
    /// The started node manager.
    pub node_manager: Arc<dyn NodeManager>,
    /// The view handed to extensions.
    pub kernel_data: Arc<KernelData>,
}

impl fmt::Debug for RunningKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningKernel")
            .field("subsystems", &self.subsystems)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct StartedParts {
    phase: StartupPhase,
    tx_manager: Option<Arc<dyn TransactionManager>>,
    node_manager: Option<Arc<dyn NodeManager>>,
}

/// Brings the kernel subsystems up in order and takes them down again.
pub struct KernelInstance {
    config: Config,
    collaborators: Collaborators,
    services: KernelServices,
    state: AtomicU8,
    start_lock: Mutex<()>,
    running: RwLock<Option<RunningKernel>>,
}

impl KernelInstance {
    /// Creates an instance that has not been started.
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators, services: KernelServices) -> Self {
        Self {
            config,
            collaborators,
            services,
            state: AtomicU8::new(LifecycleState::NotStarted as u8),
            start_lock: Mutex::new(()),
            running: RwLock::new(None),
        }
    }

    /// Starts every subsystem and runs extension phases 1 and 2.
    ///
    /// On failure the cause is written to the message log, extensions are
    /// unloaded, already started subsystems are stopped and the instance
    /// stays [`LifecycleState::NotStarted`].
    pub fn start(&self, extensions: &ExtensionLoader) -> CoreResult<()> {
        let _guard = self.start_lock.lock();
        if self.state() != LifecycleState::NotStarted {
            return Err(CoreError::invalid_operation("kernel already started"));
        }

        info!(
            store_dir = %self.config.store_dir.display(),
            read_only = self.config.read_only,
            "starting kernel"
        );
        let mut parts = StartedParts::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.bring_up(extensions, &mut parts)
        }));
        let outcome = outcome.unwrap_or_else(|payload| {
            Err(CoreError::startup_failed(
                parts.phase,
                CoreError::from_panic(payload.as_ref()),
            ))
        });
        match outcome {
            Ok(running) => {
                *self.running.write() = Some(running);
                self.state
                    .store(LifecycleState::Started as u8, Ordering::Release);
                self.services.message_log.log_message("Kernel started");
                info!("kernel started");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "kernel startup failed");
                self.services
                    .message_log
                    .log_failure("Startup failed", &err);
                extensions.unload();
                stop_parts(parts);
                Err(err)
            }
        }
    }

    fn bring_up(
        &self,
        extensions: &ExtensionLoader,
        parts: &mut StartedParts,
    ) -> CoreResult<RunningKernel> {
        let panic_events = self.services.panic_events();
        let tx_module = TxModule::resolve(
            &self.config,
            &self.collaborators.tx_manager_providers,
            &panic_events,
        )
        .map_err(|err| CoreError::startup_failed(StartupPhase::TransactionModule, err))?;
        parts.tx_manager = Some(Arc::clone(tx_module.tx_manager()));
        debug!(
            implementation = tx_module.implementation_name(),
            read_only = tx_module.is_read_only(),
            "transaction module ready"
        );

        let lock_manager = self.collaborators.lock_manager_factory.create(&tx_module);
        let lock_releaser = Arc::new(LockReleaser::new(
            Arc::clone(&lock_manager),
            Arc::clone(tx_module.tx_manager()),
        ));
        let tx_id_generator = self
            .collaborators
            .tx_id_generator_factory
            .create(tx_module.tx_manager());
        let sync_hooks = Arc::new(SyncHookFactory::new(Arc::clone(
            &self.services.transaction_handlers,
        )));

        let subsystems = Arc::new(Subsystems {
            store_dir: self.config.store_dir.clone(),
            store_id: self.services.store_id,
            params: self.config.params.clone(),
            tx_module,
            lock_manager,
            lock_releaser,
            id_generator_factory: Arc::clone(&self.collaborators.id_generator_factory),
            relationship_type_creator: Arc::clone(&self.collaborators.relationship_type_creator),
            tx_id_generator,
            last_committed_tx_id_setter: Arc::clone(
                &self.collaborators.last_committed_tx_id_setter,
            ),
            sync_hooks: Arc::clone(&sync_hooks),
            panic_events,
        });

        parts.phase = StartupPhase::Storage;
        let node_manager = self
            .collaborators
            .storage_engine
            .start(&subsystems)
            .map_err(|err| CoreError::startup_failed(StartupPhase::Storage, err))?;
        parts.node_manager = Some(Arc::clone(&node_manager));
        sync_hooks.bind(Arc::clone(&node_manager));
        debug!("storage started");

        let kernel_data = Arc::new(KernelData::new(
            Arc::clone(&subsystems),
            Arc::clone(&node_manager),
            Arc::clone(&self.services.index_manager),
        ));
        parts.phase = StartupPhase::ExtensionConfiguration;
        extensions
            .configure_kernel_extensions(&kernel_data)
            .map_err(|err| {
                CoreError::startup_failed(StartupPhase::ExtensionConfiguration, err)
            })?;
        parts.phase = StartupPhase::IndexProviders;
        extensions
            .initialize_index_providers(&self.services.index_manager)
            .map_err(|err| CoreError::startup_failed(StartupPhase::IndexProviders, err))?;

        Ok(RunningKernel {
            subsystems,
            node_manager,
            kernel_data,
        })
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns whether the kernel is started.
    #[must_use]
    pub fn started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// Returns whether the calling thread runs a transaction.
    #[must_use]
    pub fn transaction_running(&self) -> bool {
        self.running
            .read()
            .as_ref()
            .is_some_and(|running| running.subsystems.tx_manager().is_transaction_active())
    }

    /// Moves from started to shutting down.
    ///
    /// Only one caller ever gets `true`; everyone else must treat shutdown
    /// as already handled.
    pub fn begin_shutdown(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Started as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Stops the node manager and the transaction manager and releases the
    /// aggregate.
    pub fn stop(&self) {
        let running = self.running.write().take();
        if let Some(running) = running {
            stop_parts(StartedParts {
                tx_manager: Some(Arc::clone(running.subsystems.tx_manager())),
                node_manager: Some(running.node_manager),
                ..Default::default()
            });
        }
        self.state
            .store(LifecycleState::NotStarted as u8, Ordering::Release);
        info!("kernel stopped");
    }

    /// Returns the handles of the started kernel.
    pub fn running(&self) -> CoreResult<RunningKernel> {
        self.running.read().clone().ok_or(CoreError::KernelStopped)
    }

    /// Returns the subsystem aggregate while started.
    #[must_use]
    pub fn subsystems(&self) -> Option<Arc<Subsystems>> {
        self.running
            .read()
            .as_ref()
            .map(|running| Arc::clone(&running.subsystems))
    }

    /// Returns the node manager while started.
    #[must_use]
    pub fn node_manager(&self) -> Option<Arc<dyn NodeManager>> {
        self.running
            .read()
            .as_ref()
            .map(|running| Arc::clone(&running.node_manager))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the shared services.
    #[must_use]
    pub fn services(&self) -> &KernelServices {
        &self.services
    }
}

impl fmt::Debug for KernelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInstance")
            .field("state", &self.state())
            .field("store_dir", &self.config.store_dir)
            .finish_non_exhaustive()
    }
}

fn stop_parts(parts: StartedParts) {
    if let Some(node_manager) = parts.node_manager {
        node_manager.stop();
    }
    if let Some(tx_manager) = parts.tx_manager {
        tx_manager.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{ExtensionConfig, KernelExtension};
    use embergraph_storage::MemorySink;
    use std::sync::atomic::AtomicUsize;

    fn instance(config: Config, collaborators: Collaborators) -> (KernelInstance, MemorySink) {
        let sink = MemorySink::new();
        let services = KernelServices::new(Arc::new(MessageLog::new(sink.clone())));
        (KernelInstance::new(config, collaborators, services), sink)
    }

    struct BrokenStorage;

    impl StorageEngine for BrokenStorage {
        fn start(&self, _subsystems: &Arc<Subsystems>) -> CoreResult<Arc<dyn NodeManager>> {
            Err(CoreError::system("disk gone"))
        }
    }

    struct PanickingStorage;

    impl StorageEngine for PanickingStorage {
        fn start(&self, _subsystems: &Arc<Subsystems>) -> CoreResult<Arc<dyn NodeManager>> {
            panic!("store header corrupt")
        }
    }

    #[derive(Default)]
    struct Counted {
        unloads: AtomicUsize,
    }

    impl KernelExtension for Counted {
        fn key(&self) -> &str {
            "counted"
        }

        fn load(&self, _kernel: &KernelData, _config: &ExtensionConfig) -> CoreResult<()> {
            Ok(())
        }

        fn unload(&self, _kernel: &KernelData) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_and_stop() {
        let (kernel, sink) = instance(Config::default(), Collaborators::in_memory());
        assert_eq!(kernel.state(), LifecycleState::NotStarted);
        assert!(matches!(kernel.running(), Err(CoreError::KernelStopped)));

        kernel.start(&ExtensionLoader::new(Vec::new())).unwrap();
        assert!(kernel.started());
        assert!(kernel.subsystems().is_some());
        assert!(!kernel.transaction_running());
        assert!(sink.contents_lossy().contains("Kernel started"));

        assert!(kernel.begin_shutdown());
        assert!(!kernel.begin_shutdown());
        assert_eq!(kernel.state(), LifecycleState::ShuttingDown);
        kernel.stop();
        assert_eq!(kernel.state(), LifecycleState::NotStarted);
        assert!(kernel.node_manager().is_none());
    }

    #[test]
    fn second_start_is_rejected() {
        let (kernel, _) = instance(Config::default(), Collaborators::in_memory());
        let loader = ExtensionLoader::new(Vec::new());
        kernel.start(&loader).unwrap();
        assert!(matches!(
            kernel.start(&loader),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn storage_failure_unwinds_and_logs() {
        let mut collaborators = Collaborators::in_memory();
        collaborators.storage_engine = Arc::new(BrokenStorage);
        let (kernel, sink) = instance(Config::default(), collaborators);

        let err = kernel
            .start(&ExtensionLoader::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::StartupFailed {
                phase: StartupPhase::Storage,
                ..
            }
        ));
        assert_eq!(kernel.state(), LifecycleState::NotStarted);
        assert!(!kernel.begin_shutdown());

        let log = sink.contents_lossy();
        assert!(log.contains("Startup failed: startup failed during storage start"));
        assert!(log.contains("caused by: system error: disk gone"));
    }

    #[test]
    fn storage_panic_becomes_startup_failure() {
        let mut collaborators = Collaborators::in_memory();
        collaborators.storage_engine = Arc::new(PanickingStorage);
        let (kernel, sink) = instance(Config::default(), collaborators);

        let err = kernel
            .start(&ExtensionLoader::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::StartupFailed {
                phase: StartupPhase::Storage,
                ..
            }
        ));
        assert_eq!(kernel.state(), LifecycleState::NotStarted);

        let log = sink.contents_lossy();
        assert!(log.contains("Startup failed"));
        assert!(log.contains("panicked: store header corrupt"));
    }

    #[test]
    fn unknown_tx_manager_fails_before_extensions_load() {
        let config = Config::new().tx_manager_impl("missing");
        let (kernel, _) = instance(config, Collaborators::in_memory());
        let extension = Arc::new(Counted::default());
        let loader = ExtensionLoader::new(vec![extension.clone() as Arc<dyn KernelExtension>]);

        let err = kernel.start(&loader).unwrap_err();
        assert!(matches!(
            err,
            CoreError::StartupFailed {
                phase: StartupPhase::TransactionModule,
                ..
            }
        ));
        assert!(loader.loaded_extensions().is_empty());
        assert_eq!(extension.unloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn extensions_are_configured_but_not_loaded_by_start() {
        let (kernel, _) = instance(Config::default(), Collaborators::in_memory());
        let loader =
            ExtensionLoader::new(vec![Arc::new(Counted::default()) as Arc<dyn KernelExtension>]);
        kernel.start(&loader).unwrap();

        assert!(!loader.is_loaded("counted"));
        loader.load().unwrap();
        assert!(loader.is_loaded("counted"));
    }

    #[test]
    fn startup_phase_names() {
        assert_eq!(StartupPhase::ExtensionLoad.to_string(), "extension load");
        assert_eq!(StartupPhase::Storage.to_string(), "storage start");
    }
}
