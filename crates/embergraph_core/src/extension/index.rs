//! Index provider registry.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An index implementation contributed by an extension.
pub trait IndexProvider: Send + Sync {
    /// Unique provider name.
    fn name(&self) -> &str;

    /// Entity kinds this provider can index.
    fn entity_types(&self) -> Vec<String> {
        vec!["node".to_string(), "relationship".to_string()]
    }
}

/// Registry of index providers, keyed by name.
#[derive(Default)]
pub struct IndexManager {
    providers: RwLock<BTreeMap<String, Arc<dyn IndexProvider>>>,
}

impl IndexManager {
    /// Creates an empty index manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`.
    ///
    /// Fails with [`CoreError::DuplicateIndexProvider`] if the name is taken.
    pub fn add_provider(&self, provider: Arc<dyn IndexProvider>) -> CoreResult<()> {
        let name = provider.name().to_string();
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(CoreError::DuplicateIndexProvider { name });
        }
        providers.insert(name, provider);
        Ok(())
    }

    /// Removes the provider registered under `name`.
    pub fn remove_provider(&self, name: &str) -> Option<Arc<dyn IndexProvider>> {
        self.providers.write().remove(name)
    }

    /// Returns the provider registered under `name`.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn IndexProvider>> {
        self.providers.read().get(name).cloned()
    }

    /// Returns all provider names in sorted order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Returns the number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Returns whether no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("providers", &self.provider_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl IndexProvider for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let manager = IndexManager::new();
        manager.add_provider(Arc::new(Named("lucene"))).unwrap();

        let err = manager.add_provider(Arc::new(Named("lucene"))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIndexProvider { ref name } if name == "lucene"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn providers_can_be_removed() {
        let manager = IndexManager::new();
        manager.add_provider(Arc::new(Named("b"))).unwrap();
        manager.add_provider(Arc::new(Named("a"))).unwrap();
        assert_eq!(manager.provider_names(), ["a", "b"]);

        assert!(manager.remove_provider("a").is_some());
        assert!(manager.remove_provider("a").is_none());
        assert!(manager.provider("a").is_none());
        assert_eq!(manager.provider("b").unwrap().entity_types().len(), 2);
    }
}
