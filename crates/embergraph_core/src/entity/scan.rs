//! Lazy enumeration over an id space.

use super::Entity;
use crate::spi::NodeManager;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

/// Single-pass scan over every live entity of one kind, in ascending id
/// order.
///
/// The upper bound is the node manager's highest possible id in use, sampled
/// once when the scan is created and capped at the kind's maximum id.
/// Entities created afterwards are not seen; entities deleted before the scan
/// reaches them are skipped.
pub struct EntityScan<E> {
    nodes: Arc<dyn NodeManager>,
    next_id: u64,
    high_id: Option<u64>,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityScan<E> {
    /// Starts a scan over `nodes`.
    #[must_use]
    pub fn new(nodes: Arc<dyn NodeManager>) -> Self {
        let high_id = nodes
            .highest_possible_id_in_use(E::ID_TYPE)
            .map(|high| high.min(E::ID_TYPE.max_value()));
        Self {
            nodes,
            next_id: 0,
            high_id,
            _kind: PhantomData,
        }
    }

    /// Returns the sampled upper bound, or `None` if the id space was empty
    /// or the scan is exhausted.
    #[must_use]
    pub fn high_id(&self) -> Option<u64> {
        self.high_id
    }
}

impl<E: Entity> Iterator for EntityScan<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let high = self.high_id?;
        while self.next_id <= high {
            let id = self.next_id;
            self.next_id += 1;
            if let Some(entity) = E::lookup(self.nodes.as_ref(), id) {
                return Some(entity);
            }
        }
        self.high_id = None;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .high_id
            .map_or(0, |high| (high + 1).saturating_sub(self.next_id));
        (0, usize::try_from(remaining).ok())
    }
}

impl<E: Entity> FusedIterator for EntityScan<E> {}

impl<E> std::fmt::Debug for EntityScan<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityScan")
            .field("next_id", &self.next_id)
            .field("high_id", &self.high_id)
            .finish()
    }
}
