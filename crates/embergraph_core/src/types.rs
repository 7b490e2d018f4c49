//! Core type definitions for EmberGraph.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Entity kinds that draw ids from their own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdType {
    /// Node ids.
    Node,
    /// Relationship ids.
    Relationship,
    /// Relationship type ids.
    RelationshipType,
}

impl IdType {
    /// Returns the largest id this kind can address.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::Node | Self::Relationship => (1 << 35) - 1,
            Self::RelationshipType => (1 << 16) - 1,
        }
    }

    /// Returns the display name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Relationship => "Relationship",
            Self::RelationshipType => "RelationshipType",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Creates a new node ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node[{}]", self.0)
    }
}

/// Identifier of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationshipId(pub u64);

impl RelationshipId {
    /// Creates a new relationship ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relationship[{}]", self.0)
    }
}

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Identity token of a store.
///
/// Passed through to collaborators untouched; the kernel never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId {
    creation_time: u64,
    random_id: Uuid,
}

impl StoreId {
    /// Creates a fresh store identity stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            creation_time,
            random_id: Uuid::new_v4(),
        }
    }

    /// Rebuilds a store identity from its parts.
    #[must_use]
    pub const fn from_parts(creation_time: u64, random_id: Uuid) -> Self {
        Self {
            creation_time,
            random_id,
        }
    }

    /// Creation time in Unix milliseconds.
    #[must_use]
    pub const fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Random component of the identity.
    #[must_use]
    pub const fn random_id(&self) -> Uuid {
        self.random_id
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store:{}@{}", self.random_id, self.creation_time)
    }
}

/// A node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    id: NodeId,
}

impl Node {
    /// Creates a handle for `id`.
    #[must_use]
    pub const fn new(id: NodeId) -> Self {
        Self { id }
    }

    /// Returns the node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }
}

/// A relationship handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relationship {
    id: RelationshipId,
    start: NodeId,
    end: NodeId,
    type_id: u32,
}

impl Relationship {
    /// Creates a handle.
    #[must_use]
    pub const fn new(id: RelationshipId, start: NodeId, end: NodeId, type_id: u32) -> Self {
        Self {
            id,
            start,
            end,
            type_id,
        }
    }

    /// Returns the relationship id.
    #[must_use]
    pub const fn id(&self) -> RelationshipId {
        self.id
    }

    /// Returns the start node.
    #[must_use]
    pub const fn start(&self) -> NodeId {
        self.start
    }

    /// Returns the end node.
    #[must_use]
    pub const fn end(&self) -> NodeId {
        self.end
    }

    /// Returns the relationship type id.
    #[must_use]
    pub const fn type_id(&self) -> u32 {
        self.type_id
    }
}

/// A named relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipType {
    id: u32,
    name: String,
}

impl RelationshipType {
    /// Creates a relationship type.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Returns the type id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
