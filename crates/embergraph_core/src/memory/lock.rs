//! In-memory lock manager.

use crate::error::{CoreError, CoreResult};
use crate::kernel::TxModule;
use crate::spi::{LockManager, LockManagerFactory, LockResource, LockType};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct LockState {
    readers: HashMap<TransactionId, usize>,
    writer: Option<(TransactionId, usize)>,
}

impl LockState {
    fn can_read(&self, txid: TransactionId) -> bool {
        self.writer.map_or(true, |(owner, _)| owner == txid)
    }

    fn can_write(&self, txid: TransactionId) -> bool {
        self.can_read(txid) && self.readers.keys().all(|&reader| reader == txid)
    }

    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }
}

/// Reentrant read/write locks per resource.
///
/// A transaction may upgrade its own read lock when it is the only reader.
/// Waiting is unbounded; deadlocks are not detected.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    locks: Mutex<HashMap<LockResource, LockState>>,
    released: Condvar,
}

impl MemoryLockManager {
    /// Creates a lock manager with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of resources with at least one holder.
    #[must_use]
    pub fn locked_resources(&self) -> usize {
        self.locks.lock().len()
    }
}

impl LockManager for MemoryLockManager {
    fn acquire(
        &self,
        resource: LockResource,
        lock_type: LockType,
        txid: TransactionId,
    ) -> CoreResult<()> {
        let mut locks = self.locks.lock();
        loop {
            let state = locks.entry(resource).or_default();
            let granted = match lock_type {
                LockType::Read => state.can_read(txid),
                LockType::Write => state.can_write(txid),
            };
            if granted {
                match lock_type {
                    LockType::Read => *state.readers.entry(txid).or_insert(0) += 1,
                    LockType::Write => {
                        let held = state.writer.map_or(0, |(_, count)| count);
                        state.writer = Some((txid, held + 1));
                    }
                }
                return Ok(());
            }
            self.released.wait(&mut locks);
        }
    }

    fn release(
        &self,
        resource: LockResource,
        lock_type: LockType,
        txid: TransactionId,
    ) -> CoreResult<()> {
        let mut locks = self.locks.lock();
        let not_held = || {
            CoreError::invalid_operation(format!(
                "{txid} holds no {lock_type:?} lock on {resource:?}"
            ))
        };
        let state = locks.get_mut(&resource).ok_or_else(not_held)?;
        match lock_type {
            LockType::Read => {
                let count = state.readers.get_mut(&txid).ok_or_else(not_held)?;
                *count -= 1;
                if *count == 0 {
                    state.readers.remove(&txid);
                }
            }
            LockType::Write => match state.writer {
                Some((owner, count)) if owner == txid => {
                    state.writer = (count > 1).then_some((owner, count - 1));
                }
                _ => return Err(not_held()),
            },
        }
        if state.is_free() {
            locks.remove(&resource);
        }
        drop(locks);
        self.released.notify_all();
        Ok(())
    }
}

/// Builds a [`MemoryLockManager`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryLockManagerFactory;

impl LockManagerFactory for MemoryLockManagerFactory {
    fn create(&self, _tx_module: &TxModule) -> Arc<dyn LockManager> {
        Arc::new(MemoryLockManager::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use std::sync::mpsc;
    use std::time::Duration;

    const NODE: LockResource = LockResource::Node(NodeId(1));

    fn tx(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn locks_are_reentrant() {
        let locks = MemoryLockManager::new();
        locks.acquire(NODE, LockType::Write, tx(1)).unwrap();
        locks.acquire(NODE, LockType::Write, tx(1)).unwrap();
        locks.acquire(NODE, LockType::Read, tx(1)).unwrap();

        locks.release(NODE, LockType::Read, tx(1)).unwrap();
        locks.release(NODE, LockType::Write, tx(1)).unwrap();
        assert_eq!(locks.locked_resources(), 1);
        locks.release(NODE, LockType::Write, tx(1)).unwrap();
        assert_eq!(locks.locked_resources(), 0);
    }

    #[test]
    fn readers_share() {
        let locks = MemoryLockManager::new();
        locks.acquire(NODE, LockType::Read, tx(1)).unwrap();
        locks.acquire(NODE, LockType::Read, tx(2)).unwrap();
        locks.release(NODE, LockType::Read, tx(1)).unwrap();
        locks.release(NODE, LockType::Read, tx(2)).unwrap();
        assert_eq!(locks.locked_resources(), 0);
    }

    #[test]
    fn releasing_unheld_lock_fails() {
        let locks = MemoryLockManager::new();
        assert!(locks.release(NODE, LockType::Read, tx(1)).is_err());
        locks.acquire(NODE, LockType::Write, tx(1)).unwrap();
        assert!(locks.release(NODE, LockType::Write, tx(2)).is_err());
        assert!(locks.release(NODE, LockType::Read, tx(1)).is_err());
    }

    #[test]
    fn writer_blocks_until_reader_releases() {
        let locks = Arc::new(MemoryLockManager::new());
        locks.acquire(NODE, LockType::Read, tx(1)).unwrap();

        let (sender, receiver) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            std::thread::spawn(move || {
                locks.acquire(NODE, LockType::Write, tx(2)).unwrap();
                sender.send(()).unwrap();
                locks.release(NODE, LockType::Write, tx(2)).unwrap();
            })
        };

        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
        locks.release(NODE, LockType::Read, tx(1)).unwrap();
        receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(locks.locked_resources(), 0);
    }
}
