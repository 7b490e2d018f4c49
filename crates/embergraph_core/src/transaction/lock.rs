//! Transaction-scoped lock bookkeeping.

use crate::error::{CoreError, CoreResult};
use crate::spi::{
    CompletionStatus, LockManager, LockResource, LockType, Synchronization, TransactionManager,
};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

type HeldLocks = Arc<Mutex<HashMap<TransactionId, Vec<(LockResource, LockType)>>>>;

/// Acquires locks on behalf of the calling thread's transaction and releases
/// all of them when that transaction completes.
pub struct LockReleaser {
    lock_manager: Arc<dyn LockManager>,
    tx_manager: Arc<dyn TransactionManager>,
    held: HeldLocks,
}

impl LockReleaser {
    /// Creates a releaser over `lock_manager` for transactions of
    /// `tx_manager`.
    #[must_use]
    pub fn new(
        lock_manager: Arc<dyn LockManager>,
        tx_manager: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            lock_manager,
            tx_manager,
            held: Arc::default(),
        }
    }

    /// Acquires `lock_type` on `resource` for the calling thread's
    /// transaction.
    pub fn acquire(&self, resource: LockResource, lock_type: LockType) -> CoreResult<()> {
        let txid = self
            .tx_manager
            .current_transaction()
            .ok_or(CoreError::NotInTransaction)?;
        self.lock_manager.acquire(resource, lock_type, txid)?;

        let first = {
            let mut held = self.held.lock();
            let locks = held.entry(txid).or_default();
            locks.push((resource, lock_type));
            locks.len() == 1
        };
        if first {
            let release = ReleaseOnCompletion {
                txid,
                lock_manager: Arc::clone(&self.lock_manager),
                held: Arc::clone(&self.held),
            };
            if let Err(err) = self.tx_manager.register_synchronization(Box::new(release)) {
                release_all(&self.lock_manager, &self.held, txid);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Returns the locks `txid` currently holds, in acquisition order.
    #[must_use]
    pub fn held_locks(&self, txid: TransactionId) -> Vec<(LockResource, LockType)> {
        self.held.lock().get(&txid).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for LockReleaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockReleaser")
            .field("transactions", &self.held.lock().len())
            .finish()
    }
}

fn release_all(lock_manager: &Arc<dyn LockManager>, held: &HeldLocks, txid: TransactionId) {
    let locks = held.lock().remove(&txid).unwrap_or_default();
    for (resource, lock_type) in locks.into_iter().rev() {
        if let Err(err) = lock_manager.release(resource, lock_type, txid) {
            warn!(%txid, ?resource, ?lock_type, error = %err, "failed to release lock");
        }
    }
}

struct ReleaseOnCompletion {
    txid: TransactionId,
    lock_manager: Arc<dyn LockManager>,
    held: HeldLocks,
}

impl Synchronization for ReleaseOnCompletion {
    fn after_completion(&self, _status: CompletionStatus) -> CoreResult<()> {
        release_all(&self.lock_manager, &self.held, self.txid);
        Ok(())
    }
}
