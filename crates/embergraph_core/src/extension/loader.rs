//! Three-phase extension loader.

use super::{Capability, CapabilityKey, ExtensionConfig, IndexManager, KernelExtension};
use crate::error::{CoreError, CoreResult};
use crate::kernel::KernelData;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extension protocol phase, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPhase {
    /// Phase 1.
    Configure,
    /// Phase 2.
    InitializeIndexProviders,
    /// Phase 3.
    Load,
    /// Teardown.
    Unload,
}

impl fmt::Display for ExtensionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configure => "configure",
            Self::InitializeIndexProviders => "initialize index providers",
            Self::Load => "load",
            Self::Unload => "unload",
        })
    }
}

/// Furthest phase an extension reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtensionState {
    /// Configuration resolved.
    Configured,
    /// Index providers registered.
    ProvidersInitialized,
    /// `load` was called but has not succeeded.
    LoadAttempted,
    /// `load` succeeded.
    Loaded,
}

struct ExtensionRecord {
    extension: Arc<dyn KernelExtension>,
    config: ExtensionConfig,
    providers: Vec<String>,
    state: ExtensionState,
}

impl ExtensionRecord {
    fn key(&self) -> &str {
        self.extension.key()
    }
}

#[derive(Default)]
struct LoaderState {
    kernel: Option<Arc<KernelData>>,
    index_manager: Option<Arc<IndexManager>>,
    records: Vec<ExtensionRecord>,
    providers_initialized: bool,
}

/// Runs the extension protocol over a fixed set of extensions.
///
/// Extension callbacks never run while the loader's lock is held.
pub struct ExtensionLoader {
    available: Vec<Arc<dyn KernelExtension>>,
    state: Mutex<LoaderState>,
}

impl ExtensionLoader {
    /// Creates a loader for `available`, in registration order.
    #[must_use]
    pub fn new(available: Vec<Arc<dyn KernelExtension>>) -> Self {
        Self {
            available,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Phase 1: resolves every extension's configuration.
    pub fn configure_kernel_extensions(&self, kernel: &Arc<KernelData>) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            if state.kernel.is_some() {
                return Err(CoreError::invalid_operation("extensions already configured"));
            }
            state.kernel = Some(Arc::clone(kernel));
        }

        let mut records = Vec::with_capacity(self.available.len());
        let mut outcome = Ok(());
        for extension in &self.available {
            match guarded(|| extension.configure(kernel)) {
                Ok(config) => {
                    debug!(
                        extension = extension.key(),
                        settings = config.settings().len(),
                        "extension configured"
                    );
                    records.push(ExtensionRecord {
                        extension: Arc::clone(extension),
                        config,
                        providers: Vec::new(),
                        state: ExtensionState::Configured,
                    });
                }
                Err(err) => {
                    outcome = Err(phase_failure(extension.key(), ExtensionPhase::Configure, &err));
                    break;
                }
            }
        }

        self.state.lock().records = records;
        outcome
    }

    /// Phase 2: registers index providers with `index_manager`.
    pub fn initialize_index_providers(
        &self,
        index_manager: &Arc<IndexManager>,
    ) -> CoreResult<()> {
        let (kernel, mut records) = {
            let mut state = self.state.lock();
            let kernel = state
                .kernel
                .clone()
                .ok_or_else(|| CoreError::invalid_operation("extensions not configured"))?;
            state.index_manager = Some(Arc::clone(index_manager));
            (kernel, std::mem::take(&mut state.records))
        };

        let mut outcome = Ok(());
        for record in &mut records {
            let extension = Arc::clone(&record.extension);
            let result = guarded(|| extension.index_providers(&kernel, &record.config))
                .and_then(|providers| {
                    for provider in providers {
                        let name = provider.name().to_string();
                        index_manager.add_provider(provider)?;
                        debug!(
                            extension = extension.key(),
                            provider = %name,
                            "index provider registered"
                        );
                        record.providers.push(name);
                    }
                    Ok(())
                });
            if let Err(err) = result {
                outcome = Err(phase_failure(
                    record.key(),
                    ExtensionPhase::InitializeIndexProviders,
                    &err,
                ));
                break;
            }
            record.state = ExtensionState::ProvidersInitialized;
        }

        let mut state = self.state.lock();
        state.records = records;
        state.providers_initialized = outcome.is_ok();
        outcome
    }

    /// Phase 3: loads every extension.
    ///
    /// Stops at the first failure. The failing extension still counts as
    /// having reached this phase and is unloaded by [`unload`](Self::unload).
    pub fn load(&self) -> CoreResult<()> {
        let (kernel, mut records) = {
            let mut state = self.state.lock();
            if !state.providers_initialized {
                return Err(CoreError::invalid_operation(
                    "index providers not initialized",
                ));
            }
            let kernel = state
                .kernel
                .clone()
                .ok_or_else(|| CoreError::invalid_operation("extensions not configured"))?;
            (kernel, std::mem::take(&mut state.records))
        };

        let mut outcome = Ok(());
        for record in &mut records {
            record.state = ExtensionState::LoadAttempted;
            let extension = Arc::clone(&record.extension);
            if let Err(err) = guarded(|| extension.load(&kernel, &record.config)) {
                outcome = Err(phase_failure(record.key(), ExtensionPhase::Load, &err));
                break;
            }
            record.state = ExtensionState::Loaded;
            info!(extension = record.key(), "extension loaded");
        }

        self.state.lock().records = records;
        outcome
    }

    /// Undoes everything the phases did, in reverse registration order.
    ///
    /// Index providers registered in phase 2 are removed, and `unload` is
    /// called on every extension that reached phase 3. Calling this again,
    /// or before any phase ran, does nothing.
    pub fn unload(&self) {
        let (kernel, index_manager, records) = {
            let mut state = self.state.lock();
            let state = std::mem::take(&mut *state);
            (state.kernel, state.index_manager, state.records)
        };
        let Some(kernel) = kernel else {
            return;
        };

        for record in records.into_iter().rev() {
            if let Some(index_manager) = &index_manager {
                for name in &record.providers {
                    if index_manager.remove_provider(name).is_none() {
                        warn!(
                            extension = record.key(),
                            provider = %name,
                            "index provider already removed"
                        );
                    }
                }
            }
            if record.state >= ExtensionState::LoadAttempted {
                let extension = &record.extension;
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(|| extension.unload(&kernel)))
                {
                    let err = CoreError::from_panic(payload.as_ref());
                    warn!(extension = record.key(), error = %err, "extension unload failed");
                    continue;
                }
                debug!(extension = record.key(), "extension unloaded");
            }
        }
    }

    /// Returns whether the extension with `key` loaded successfully.
    #[must_use]
    pub fn is_loaded(&self, key: &str) -> bool {
        self.state
            .lock()
            .records
            .iter()
            .any(|r| r.state == ExtensionState::Loaded && r.key() == key)
    }

    /// Returns the keys of all loaded extensions, in registration order.
    #[must_use]
    pub fn loaded_extensions(&self) -> Vec<String> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.state == ExtensionState::Loaded)
            .map(|r| r.key().to_string())
            .collect()
    }

    /// Returns each tracked extension with the furthest phase it reached.
    #[must_use]
    pub fn states(&self) -> Vec<(String, ExtensionState)> {
        self.state
            .lock()
            .records
            .iter()
            .map(|r| (r.key().to_string(), r.state))
            .collect()
    }

    /// Returns the first capability with `key` offered by a loaded extension.
    #[must_use]
    pub fn capability(&self, key: CapabilityKey) -> Option<Capability> {
        let loaded: Vec<Arc<dyn KernelExtension>> = self
            .state
            .lock()
            .records
            .iter()
            .filter(|r| r.state == ExtensionState::Loaded)
            .map(|r| Arc::clone(&r.extension))
            .collect();
        loaded
            .iter()
            .flat_map(|extension| extension.capabilities())
            .find(|capability| capability.key() == key)
    }

    /// Returns the number of extensions this loader manages.
    #[must_use]
    pub fn available(&self) -> usize {
        self.available.len()
    }
}

impl fmt::Debug for ExtensionLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("available", &self.available.len())
            .field("states", &self.states())
            .finish()
    }
}

/// Runs an extension callback, turning a panic into an error.
fn guarded<T>(call: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(CoreError::from_panic(payload.as_ref())))
}

fn phase_failure(extension: &str, phase: ExtensionPhase, err: &CoreError) -> CoreError {
    warn!(extension, %phase, error = %err, "extension phase failed");
    CoreError::extension_failed(extension, phase, err.to_string())
}
