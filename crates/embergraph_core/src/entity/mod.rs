//! Entity lookup and enumeration.
//!
//! Lookups report absence as `None` internally; the facade turns that into
//! [`CoreError::NotFound`]. Out-of-range ids and ids without a live entity
//! look the same to the caller.

mod scan;

pub use scan::EntityScan;

use crate::error::{CoreError, CoreResult};
use crate::spi::NodeManager;
use crate::types::{IdType, Node, NodeId, Relationship, RelationshipId};

/// An entity kind that can be looked up by raw id.
pub trait Entity: Sized {
    /// The id space of this kind.
    const ID_TYPE: IdType;

    /// Returns the live entity with `id`, if any.
    fn lookup(nodes: &dyn NodeManager, id: u64) -> Option<Self>;
}

impl Entity for Node {
    const ID_TYPE: IdType = IdType::Node;

    fn lookup(nodes: &dyn NodeManager, id: u64) -> Option<Self> {
        nodes.node(NodeId::new(id))
    }
}

impl Entity for Relationship {
    const ID_TYPE: IdType = IdType::Relationship;

    fn lookup(nodes: &dyn NodeManager, id: u64) -> Option<Self> {
        nodes.relationship(RelationshipId::new(id))
    }
}

/// Returns `id` as an unsigned id if it lies within `0..=id_type.max_value()`.
#[must_use]
pub fn checked_id(id: i64, id_type: IdType) -> Option<u64> {
    u64::try_from(id)
        .ok()
        .filter(|&id| id <= id_type.max_value())
}

/// Looks up the entity with `id`.
///
/// Fails with [`CoreError::NotFound`] for negative ids, ids beyond the
/// kind's maximum, and ids without a live entity.
pub fn lookup<E: Entity>(nodes: &dyn NodeManager, id: i64) -> CoreResult<E> {
    checked_id(id, E::ID_TYPE)
        .and_then(|raw| E::lookup(nodes, raw))
        .ok_or_else(|| CoreError::not_found(E::ID_TYPE, id))
}
