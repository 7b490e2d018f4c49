//! View of a started kernel handed to extensions.

use super::Subsystems;
use crate::extension::IndexManager;
use crate::spi::NodeManager;
use crate::types::StoreId;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// The started kernel as seen by extensions.
pub struct KernelData {
    version: &'static str,
    subsystems: Arc<Subsystems>,
    node_manager: Arc<dyn NodeManager>,
    index_manager: Arc<IndexManager>,
}

impl KernelData {
    pub(crate) fn new(
        subsystems: Arc<Subsystems>,
        node_manager: Arc<dyn NodeManager>,
        index_manager: Arc<IndexManager>,
    ) -> Self {
        Self {
            version: crate::VERSION,
            subsystems,
            node_manager,
            index_manager,
        }
    }

    /// Returns the kernel version.
    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Returns the raw kernel parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        self.subsystems.params()
    }

    /// Returns one raw kernel parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.subsystems.params().get(key).map(String::as_str)
    }

    /// Returns the store location.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        self.subsystems.store_dir()
    }

    /// Returns the store identity.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.subsystems.store_id()
    }

    /// Returns whether the kernel is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.subsystems.is_read_only()
    }

    /// Returns the subsystem aggregate.
    #[must_use]
    pub fn subsystems(&self) -> &Arc<Subsystems> {
        &self.subsystems
    }

    /// Returns the node manager.
    #[must_use]
    pub fn node_manager(&self) -> &Arc<dyn NodeManager> {
        &self.node_manager
    }

    /// Returns the index manager.
    #[must_use]
    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }
}

impl std::fmt::Debug for KernelData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelData")
            .field("version", &self.version)
            .field("subsystems", &self.subsystems)
            .finish_non_exhaustive()
    }
}
