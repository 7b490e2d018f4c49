//! Kernel lifecycle and transaction completion events.
//!
//! Both registries are copy-on-write: readers take a snapshot and iterate it
//! without holding a lock, so a notification never observes a concurrent
//! modification and a handler added mid-notification is not invoked by that
//! firing.

mod kernel;
mod transaction;

pub use kernel::{
    ErrorState, ExecutionOrder, KernelEventHandler, KernelEventHandlers, KernelPanicEventGenerator,
};
pub use transaction::{
    SyncHookFactory, TransactionData, TransactionEventHandler, TransactionEventHandlers,
    TransactionEventsSyncHook,
};

use std::sync::Arc;

/// Identity comparison for trait objects, ignoring vtable addresses.
pub(crate) fn same_handler<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
