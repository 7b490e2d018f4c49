//! Transaction demarcation.
//!
//! Transactions are bound to the thread that began them. The first
//! `begin_tx` on a thread yields a [`TopLevelTransaction`] that alone may
//! commit or roll back; further calls on that thread yield the shared
//! [`PlaceboTransaction`], which can only mark the transaction rollback-only.

mod boundary;
mod handle;
mod lock;
mod manager;

pub use boundary::TransactionBoundary;
pub use handle::{PlaceboTransaction, TopLevelTransaction, Transaction};
pub use lock::LockReleaser;
pub use manager::NativeTxManager;
