//! Kernel extensions.
//!
//! Extensions are brought up in three phases, strictly in order:
//!
//! 1. **configure** resolves each extension's settings against the kernel
//!    parameters, without side effects
//! 2. **initialize index providers** registers the index providers the
//!    extensions contribute, so that later phases can rely on them
//! 3. **load** activates each extension against the started kernel
//!
//! A failure in any phase aborts the remaining ones. [`ExtensionLoader::unload`]
//! undoes whatever was done and is safe to call at any point.

mod capability;
mod index;
mod loader;

pub use capability::{
    Capability, CapabilityKey, ManagementBean, ManagementCapability, RemoteShellCapability,
    CAPABILITY_MANAGEMENT, CAPABILITY_REMOTE_SHELL,
};
pub use index::{IndexManager, IndexProvider};
pub use loader::{ExtensionLoader, ExtensionPhase, ExtensionState};

use crate::error::CoreResult;
use crate::kernel::KernelData;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Settings resolved for one extension during the configure phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionConfig {
    key: String,
    settings: BTreeMap<String, String>,
}

impl ExtensionConfig {
    /// Creates an empty configuration for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Collects the parameters prefixed with `"{key}."`, prefix removed.
    pub fn from_params(key: impl Into<String>, params: &BTreeMap<String, String>) -> Self {
        let key = key.into();
        let prefix = format!("{key}.");
        let settings = params
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();
        Self { key, settings }
    }

    /// Adds a setting.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }

    /// Returns the extension key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a setting.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    /// Returns all settings.
    #[must_use]
    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

/// A kernel extension.
pub trait KernelExtension: Send + Sync {
    /// Unique key; also the prefix of the extension's parameters.
    fn key(&self) -> &str;

    /// Resolves the extension's settings. Must not have side effects.
    fn configure(&self, kernel: &KernelData) -> CoreResult<ExtensionConfig> {
        Ok(ExtensionConfig::from_params(self.key(), kernel.params()))
    }

    /// Returns the index providers this extension contributes.
    fn index_providers(
        &self,
        _kernel: &KernelData,
        _config: &ExtensionConfig,
    ) -> CoreResult<Vec<Arc<dyn IndexProvider>>> {
        Ok(Vec::new())
    }

    /// Activates the extension.
    fn load(&self, kernel: &KernelData, config: &ExtensionConfig) -> CoreResult<()>;

    /// Deactivates the extension. Also called when `load` failed.
    fn unload(&self, kernel: &KernelData);

    /// Optional capabilities offered once loaded.
    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }
}
