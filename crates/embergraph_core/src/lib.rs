//! # EmberGraph Core
//!
//! Lifecycle and transaction-boundary kernel for the EmberGraph embedded
//! graph database.
//!
//! This crate provides:
//! - Ordered subsystem bring-up with full unwind on startup failure
//! - The three-phase extension protocol (configure, index providers, load)
//! - Transaction demarcation with top-level and placebo (nested) handles
//! - Ordered kernel lifecycle handlers and transaction completion handlers
//! - Bounds-checked entity lookup and lazy enumeration of live entities
//! - In-memory reference collaborators for tests and ephemeral kernels
//!
//! The storage engine, lock manager, id generators and transaction manager
//! are collaborators reached through the traits in [`spi`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod logging;
mod types;

pub mod entity;
pub mod event;
pub mod extension;
pub mod kernel;
pub mod memory;
pub mod spi;
pub mod transaction;

pub use config::{Config, NATIVE_TX_MANAGER, READ_ONLY, TX_MANAGER_IMPLEMENTATION};
pub use database::{GraphDatabase, KernelBuilder};
pub use entity::EntityScan;
pub use error::{CoreError, CoreResult};
pub use event::{
    ErrorState, ExecutionOrder, KernelEventHandler, TransactionData, TransactionEventHandler,
};
pub use extension::{
    Capability, CapabilityKey, ExtensionConfig, IndexManager, IndexProvider, KernelExtension,
    ManagementBean,
};
pub use kernel::{KernelData, LifecycleState, Subsystems, TxModule};
pub use logging::MessageLog;
pub use transaction::{PlaceboTransaction, TopLevelTransaction, Transaction};
pub use types::{
    IdType, Node, NodeId, Relationship, RelationshipId, RelationshipType, StoreId, TransactionId,
};

/// Kernel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
