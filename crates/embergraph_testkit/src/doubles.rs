//! Recording test doubles.
//!
//! Every double appends `"<name>:<event>"` entries to a shared [`EventLog`],
//! so one log can capture the interleaving of extensions and handlers.

use embergraph_core::extension::{ExtensionPhase, IndexProvider};
use embergraph_core::{
    Capability, CoreError, CoreResult, ErrorState, ExecutionOrder, ExtensionConfig, KernelData,
    KernelEventHandler, KernelExtension, TransactionData, TransactionEventHandler,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, ordered record of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `"<source>:<event>"`.
    pub fn record(&self, source: &str, event: &str) {
        self.entries.lock().push(format!("{source}:{event}"));
    }

    /// Returns a copy of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the entries recorded by `source`, without the prefix.
    pub fn events_of(&self, source: &str) -> Vec<String> {
        let prefix = format!("{source}:");
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Counts entries equal to `"<source>:<event>"`.
    pub fn count(&self, source: &str, event: &str) -> usize {
        let wanted = format!("{source}:{event}");
        self.entries.lock().iter().filter(|e| **e == wanted).count()
    }

    /// Returns the index of the first entry equal to `"<source>:<event>"`.
    pub fn position(&self, source: &str, event: &str) -> Option<usize> {
        let wanted = format!("{source}:{event}");
        self.entries.lock().iter().position(|e| *e == wanted)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Extensions
// ============================================================================

/// Index provider that only carries a name.
#[derive(Debug, Clone)]
pub struct NamedIndexProvider {
    name: String,
}

impl NamedIndexProvider {
    /// Creates a provider called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl IndexProvider for NamedIndexProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Extension that records every protocol call and can fail in any phase.
///
/// Events: `configure`, `index_providers`, `load`, `unload`.
pub struct RecordingExtension {
    key: String,
    log: EventLog,
    fail_at: Option<ExtensionPhase>,
    providers: Vec<String>,
    capabilities: Vec<Capability>,
}

impl RecordingExtension {
    /// Creates an extension with key `key` that succeeds in every phase.
    pub fn new(key: impl Into<String>, log: &EventLog) -> Self {
        Self {
            key: key.into(),
            log: log.clone(),
            fail_at: None,
            providers: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Fails the given phase. [`ExtensionPhase::Unload`] is ignored, since
    /// unload cannot fail.
    #[must_use]
    pub fn failing_at(mut self, phase: ExtensionPhase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    /// Contributes an index provider named `name` in phase 2.
    #[must_use]
    pub fn with_index_provider(mut self, name: impl Into<String>) -> Self {
        self.providers.push(name.into());
        self
    }

    /// Offers `capability` once loaded.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Wraps the extension for registration.
    pub fn into_arc(self) -> Arc<dyn KernelExtension> {
        Arc::new(self)
    }

    fn step(&self, phase: ExtensionPhase, event: &str) -> CoreResult<()> {
        self.log.record(&self.key, event);
        if self.fail_at == Some(phase) {
            return Err(CoreError::system(format!("injected {phase} failure")));
        }
        Ok(())
    }
}

impl KernelExtension for RecordingExtension {
    fn key(&self) -> &str {
        &self.key
    }

    fn configure(&self, kernel: &KernelData) -> CoreResult<ExtensionConfig> {
        self.step(ExtensionPhase::Configure, "configure")?;
        Ok(ExtensionConfig::from_params(&self.key, kernel.params()))
    }

    fn index_providers(
        &self,
        _kernel: &KernelData,
        _config: &ExtensionConfig,
    ) -> CoreResult<Vec<Arc<dyn IndexProvider>>> {
        self.step(ExtensionPhase::InitializeIndexProviders, "index_providers")?;
        Ok(self
            .providers
            .iter()
            .map(|name| Arc::new(NamedIndexProvider::new(name.clone())) as Arc<dyn IndexProvider>)
            .collect())
    }

    fn load(&self, _kernel: &KernelData, _config: &ExtensionConfig) -> CoreResult<()> {
        self.step(ExtensionPhase::Load, "load")
    }

    fn unload(&self, _kernel: &KernelData) {
        self.log.record(&self.key, "unload");
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }
}

// ============================================================================
// Kernel event handlers
// ============================================================================

/// Lifecycle handler that records notifications.
///
/// Events: `before_shutdown`, `kernel_panic(<state>)`. Ordering preferences
/// are declared against other handlers' names.
pub struct RecordingKernelHandler {
    name: String,
    log: EventLog,
    preferences: BTreeMap<String, ExecutionOrder>,
    fail_on_shutdown: bool,
    panic_on_shutdown: bool,
}

impl RecordingKernelHandler {
    /// Creates a handler called `name` without ordering preferences.
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            preferences: BTreeMap::new(),
            fail_on_shutdown: false,
            panic_on_shutdown: false,
        }
    }

    /// Asks to run before the handler named `other`.
    #[must_use]
    pub fn before(mut self, other: impl Into<String>) -> Self {
        self.preferences.insert(other.into(), ExecutionOrder::Before);
        self
    }

    /// Asks to run after the handler named `other`.
    #[must_use]
    pub fn after(mut self, other: impl Into<String>) -> Self {
        self.preferences.insert(other.into(), ExecutionOrder::After);
        self
    }

    /// Returns an error from `before_shutdown`.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_on_shutdown = true;
        self
    }

    /// Panics in `before_shutdown`.
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panic_on_shutdown = true;
        self
    }

    /// Wraps the handler for registration.
    pub fn into_arc(self) -> Arc<dyn KernelEventHandler> {
        Arc::new(self)
    }
}

impl KernelEventHandler for RecordingKernelHandler {
    fn before_shutdown(&self) -> CoreResult<()> {
        self.log.record(&self.name, "before_shutdown");
        if self.panic_on_shutdown {
            panic!("{} panicked before shutdown", self.name);
        }
        if self.fail_on_shutdown {
            return Err(CoreError::system("injected shutdown failure"));
        }
        Ok(())
    }

    fn kernel_panic(&self, error: ErrorState) {
        self.log.record(&self.name, &format!("kernel_panic({error:?})"));
    }

    fn order_compared_to(&self, other: &dyn KernelEventHandler) -> ExecutionOrder {
        self.preferences
            .get(&other.name())
            .copied()
            .unwrap_or(ExecutionOrder::DoesNotMatter)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// Transaction event handlers
// ============================================================================

/// Completion handler that records notifications and can veto commits.
///
/// Events: `before_commit(<created nodes>)`, `after_commit`, `after_rollback`.
pub struct RecordingTransactionHandler {
    name: String,
    log: EventLog,
    veto: bool,
    last_data: Mutex<Option<TransactionData>>,
}

impl RecordingTransactionHandler {
    /// Creates a handler called `name`.
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            veto: false,
            last_data: Mutex::new(None),
        }
    }

    /// Fails every `before_commit`, rolling the transaction back.
    #[must_use]
    pub fn vetoing(mut self) -> Self {
        self.veto = true;
        self
    }

    /// Returns the data passed to the last notification.
    pub fn last_data(&self) -> Option<TransactionData> {
        self.last_data.lock().clone()
    }
}

impl TransactionEventHandler for RecordingTransactionHandler {
    fn before_commit(&self, data: &TransactionData) -> CoreResult<()> {
        self.log.record(
            &self.name,
            &format!("before_commit({})", data.created_nodes.len()),
        );
        *self.last_data.lock() = Some(data.clone());
        if self.veto {
            return Err(CoreError::system("commit vetoed"));
        }
        Ok(())
    }

    fn after_commit(&self, data: &TransactionData) {
        self.log.record(&self.name, "after_commit");
        *self.last_data.lock() = Some(data.clone());
    }

    fn after_rollback(&self, data: &TransactionData) {
        self.log.record(&self.name, "after_rollback");
        *self.last_data.lock() = Some(data.clone());
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
