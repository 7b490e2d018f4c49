//! The assembled subsystem aggregate.

use crate::config::{Config, NATIVE_TX_MANAGER};
use crate::error::{CoreError, CoreResult};
use crate::event::{KernelPanicEventGenerator, SyncHookFactory};
use crate::spi::{
    IdGeneratorFactory, LastCommittedTxIdSetter, LockManager, RelationshipTypeCreator,
    TransactionManager, TransactionManagerProvider, TxIdGenerator,
};
use crate::transaction::{LockReleaser, NativeTxManager};
use crate::types::StoreId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Transaction manager together with the mode it runs in.
#[derive(Clone)]
pub struct TxModule {
    tx_manager: Arc<dyn TransactionManager>,
    read_only: bool,
    implementation: String,
}

impl TxModule {
    /// Builds a module around the native manager.
    #[must_use]
    pub fn native(panic_events: KernelPanicEventGenerator, read_only: bool) -> Self {
        Self {
            tx_manager: Arc::new(NativeTxManager::new(panic_events)),
            read_only,
            implementation: NATIVE_TX_MANAGER.to_string(),
        }
    }

    /// Selects the transaction manager for `config`.
    ///
    /// Read-only kernels always use the native manager in read-only mode.
    /// Otherwise `tx_manager_impl` names the implementation: unset or
    /// `"native"` is the built-in one, any other name must match one of
    /// `providers`.
    pub fn resolve(
        config: &Config,
        providers: &[Arc<dyn TransactionManagerProvider>],
        panic_events: &KernelPanicEventGenerator,
    ) -> CoreResult<Self> {
        if config.read_only {
            debug!("read-only kernel, using restricted native transaction module");
            return Ok(Self::native(panic_events.clone(), true));
        }

        let name = config.tx_manager_name();
        if name == NATIVE_TX_MANAGER {
            return Ok(Self::native(panic_events.clone(), false));
        }

        let provider = providers
            .iter()
            .find(|provider| provider.name() == name)
            .ok_or_else(|| {
                CoreError::unsupported_capability(format!(
                    "no transaction manager implementation named `{name}`"
                ))
            })?;
        let tx_manager = provider.load(config, panic_events)?;
        debug!(implementation = name, "using provided transaction manager");
        Ok(Self {
            tx_manager,
            read_only: false,
            implementation: name.to_string(),
        })
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn tx_manager(&self) -> &Arc<dyn TransactionManager> {
        &self.tx_manager
    }

    /// Returns whether mutation is forbidden.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Fails with [`CoreError::ReadOnly`] when mutation is forbidden.
    pub fn ensure_writable(&self) -> CoreResult<()> {
        if self.read_only {
            Err(CoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Returns the implementation name.
    #[must_use]
    pub fn implementation_name(&self) -> &str {
        &self.implementation
    }
}

impl std::fmt::Debug for TxModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxModule")
            .field("implementation", &self.implementation)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Everything a started kernel is made of.
///
/// Built once during startup and never modified afterwards.
pub struct Subsystems {
    pub(crate) store_dir: PathBuf,
    pub(crate) store_id: StoreId,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) tx_module: TxModule,
    pub(crate) lock_manager: Arc<dyn LockManager>,
    pub(crate) lock_releaser: Arc<LockReleaser>,
    pub(crate) id_generator_factory: Arc<dyn IdGeneratorFactory>,
    pub(crate) relationship_type_creator: Arc<dyn RelationshipTypeCreator>,
    pub(crate) tx_id_generator: Arc<dyn TxIdGenerator>,
    pub(crate) last_committed_tx_id_setter: Arc<dyn LastCommittedTxIdSetter>,
    pub(crate) sync_hooks: Arc<SyncHookFactory>,
    pub(crate) panic_events: KernelPanicEventGenerator,
}

impl Subsystems {
    /// Returns the store location.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Returns the store identity.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Returns whether mutation is forbidden.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.tx_module.is_read_only()
    }

    /// Returns the raw kernel parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Returns the transaction module.
    #[must_use]
    pub fn tx_module(&self) -> &TxModule {
        &self.tx_module
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn tx_manager(&self) -> &Arc<dyn TransactionManager> {
        self.tx_module.tx_manager()
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn lock_manager(&self) -> &Arc<dyn LockManager> {
        &self.lock_manager
    }

    /// Returns the lock releaser.
    #[must_use]
    pub fn lock_releaser(&self) -> &Arc<LockReleaser> {
        &self.lock_releaser
    }

    /// Returns the id generator factory.
    #[must_use]
    pub fn id_generator_factory(&self) -> &Arc<dyn IdGeneratorFactory> {
        &self.id_generator_factory
    }

    /// Returns the relationship type creator.
    #[must_use]
    pub fn relationship_type_creator(&self) -> &Arc<dyn RelationshipTypeCreator> {
        &self.relationship_type_creator
    }

    /// Returns the tx-id generator.
    #[must_use]
    pub fn tx_id_generator(&self) -> &Arc<dyn TxIdGenerator> {
        &self.tx_id_generator
    }

    /// Returns the last-committed-tx-id setter.
    #[must_use]
    pub fn last_committed_tx_id_setter(&self) -> &Arc<dyn LastCommittedTxIdSetter> {
        &self.last_committed_tx_id_setter
    }

    /// Returns the transaction event hook factory.
    #[must_use]
    pub fn sync_hooks(&self) -> &Arc<SyncHookFactory> {
        &self.sync_hooks
    }

    /// Returns the kernel panic event generator.
    #[must_use]
    pub fn panic_events(&self) -> &KernelPanicEventGenerator {
        &self.panic_events
    }
}

impl std::fmt::Debug for Subsystems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subsystems")
            .field("store_dir", &self.store_dir)
            .field("store_id", &self.store_id)
            .field("tx_module", &self.tx_module)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TX_MANAGER_IMPLEMENTATION;
    use crate::event::KernelEventHandlers;

    struct Provided;

    impl TransactionManagerProvider for Provided {
        fn name(&self) -> &str {
            "provided"
        }

        fn load(
            &self,
            _config: &Config,
            panic_events: &KernelPanicEventGenerator,
        ) -> CoreResult<Arc<dyn TransactionManager>> {
            Ok(Arc::new(NativeTxManager::new(panic_events.clone())))
        }
    }

    fn panic_events() -> KernelPanicEventGenerator {
        KernelPanicEventGenerator::new(Arc::new(KernelEventHandlers::new()))
    }

    #[test]
    fn read_only_wins_over_implementation_name() {
        let config = Config::new().read_only(true).tx_manager_impl("unknown");
        let module = TxModule::resolve(&config, &[], &panic_events()).unwrap();
        assert!(module.is_read_only());
        assert_eq!(module.implementation_name(), NATIVE_TX_MANAGER);
        assert!(matches!(module.ensure_writable(), Err(CoreError::ReadOnly)));
    }

    #[test]
    fn provider_is_selected_by_name() {
        let config = Config::new()
            .param(TX_MANAGER_IMPLEMENTATION, "ignored")
            .tx_manager_impl("provided");
        let providers: Vec<Arc<dyn TransactionManagerProvider>> = vec![Arc::new(Provided)];
        let module = TxModule::resolve(&config, &providers, &panic_events()).unwrap();
        assert_eq!(module.implementation_name(), "provided");
        assert!(module.ensure_writable().is_ok());
    }

    #[test]
    fn unknown_implementation_is_unsupported() {
        let config = Config::new().tx_manager_impl("jotm");
        let Err(err) = TxModule::resolve(&config, &[], &panic_events()) else {
            panic!("unknown implementation resolved");
        };
        assert!(matches!(err, CoreError::UnsupportedCapability { .. }));
    }
}
