//! In-memory id allocation.

use crate::error::{CoreError, CoreResult};
use crate::spi::{IdGenerator, IdGeneratorFactory};
use crate::types::IdType;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic id generator. Freed ids are counted but never handed out again.
#[derive(Debug)]
pub struct MemoryIdGenerator {
    next: AtomicU64,
    freed: AtomicU64,
    max: u64,
}

impl MemoryIdGenerator {
    /// Creates a generator for ids `0..=max`.
    #[must_use]
    pub fn new(max: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            freed: AtomicU64::new(0),
            max,
        }
    }
}

impl IdGenerator for MemoryIdGenerator {
    fn next_id(&self) -> CoreResult<u64> {
        let max = self.max;
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                (id <= max).then_some(id + 1)
            })
            .map_err(|_| CoreError::system(format!("id space exhausted at {max}")))
    }

    fn free_id(&self, _id: u64) {
        self.freed.fetch_add(1, Ordering::Relaxed);
    }

    fn high_id(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    fn ids_in_use(&self) -> u64 {
        self.high_id()
            .saturating_sub(self.freed.load(Ordering::Relaxed))
    }
}

/// One [`MemoryIdGenerator`] per id space.
#[derive(Debug)]
pub struct MemoryIdGeneratorFactory {
    nodes: Arc<MemoryIdGenerator>,
    relationships: Arc<MemoryIdGenerator>,
    relationship_types: Arc<MemoryIdGenerator>,
}

impl MemoryIdGeneratorFactory {
    /// Creates fresh generators bounded by each kind's maximum id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(MemoryIdGenerator::new(IdType::Node.max_value())),
            relationships: Arc::new(MemoryIdGenerator::new(IdType::Relationship.max_value())),
            relationship_types: Arc::new(MemoryIdGenerator::new(
                IdType::RelationshipType.max_value(),
            )),
        }
    }
}

impl Default for MemoryIdGeneratorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGeneratorFactory for MemoryIdGeneratorFactory {
    fn get(&self, id_type: IdType) -> Arc<dyn IdGenerator> {
        match id_type {
            IdType::Node => self.nodes.clone(),
            IdType::Relationship => self.relationships.clone(),
            IdType::RelationshipType => self.relationship_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_not_reused() {
        let ids = MemoryIdGenerator::new(10);
        assert_eq!(ids.highest_possible_id_in_use(), None);
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);
        ids.free_id(0);
        assert_eq!(ids.next_id().unwrap(), 2);
        assert_eq!(ids.high_id(), 3);
        assert_eq!(ids.highest_possible_id_in_use(), Some(2));
        assert_eq!(ids.ids_in_use(), 2);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let ids = MemoryIdGenerator::new(1);
        ids.next_id().unwrap();
        ids.next_id().unwrap();
        assert!(matches!(ids.next_id(), Err(CoreError::System { .. })));
        assert_eq!(ids.high_id(), 2);
    }

    #[test]
    fn factory_separates_id_spaces() {
        let factory = MemoryIdGeneratorFactory::new();
        factory.get(IdType::Node).next_id().unwrap();
        assert_eq!(factory.get(IdType::Node).high_id(), 1);
        assert_eq!(factory.get(IdType::Relationship).high_id(), 0);
    }
}
