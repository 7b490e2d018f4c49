//! In-memory relationship type registry.

use crate::error::{CoreError, CoreResult};
use crate::spi::{IdGenerator, RelationshipTypeCreator};
use crate::types::RelationshipType;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Relationship types keyed by name.
#[derive(Debug, Default)]
pub struct MemoryRelationshipTypeCreator {
    types: RwLock<BTreeMap<String, RelationshipType>>,
}

impl MemoryRelationshipTypeCreator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationshipTypeCreator for MemoryRelationshipTypeCreator {
    fn get_or_create(&self, name: &str, ids: &dyn IdGenerator) -> CoreResult<RelationshipType> {
        if let Some(existing) = self.types.read().get(name) {
            return Ok(existing.clone());
        }
        if name.is_empty() {
            return Err(CoreError::invalid_operation("relationship type name is empty"));
        }

        let mut types = self.types.write();
        if let Some(existing) = types.get(name) {
            return Ok(existing.clone());
        }
        let id = ids.next_id()?;
        let id = u32::try_from(id)
            .map_err(|_| CoreError::system(format!("relationship type id {id} out of range")))?;
        let created = RelationshipType::new(id, name);
        types.insert(name.to_string(), created.clone());
        Ok(created)
    }

    fn types(&self) -> Vec<RelationshipType> {
        let mut types: Vec<_> = self.types.read().values().cloned().collect();
        types.sort_by_key(RelationshipType::id);
        types
    }
}
