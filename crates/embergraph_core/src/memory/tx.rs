//! Committed transaction id bookkeeping.

use crate::error::CoreResult;
use crate::spi::{LastCommittedTxIdSetter, TransactionManager, TxIdGenerator, TxIdGeneratorFactory};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out consecutive committed tx ids starting at 1.
#[derive(Debug, Default)]
pub struct SequentialTxIdGeneratorFactory {
    last: Arc<AtomicU64>,
}

impl SequentialTxIdGeneratorFactory {
    /// Creates a factory whose generators share one counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last id handed out, 0 if none.
    #[must_use]
    pub fn last_generated(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

impl TxIdGeneratorFactory for SequentialTxIdGeneratorFactory {
    fn create(&self, _tx_manager: &Arc<dyn TransactionManager>) -> Arc<dyn TxIdGenerator> {
        Arc::new(SequentialTxIdGenerator {
            last: Arc::clone(&self.last),
        })
    }
}

#[derive(Debug)]
struct SequentialTxIdGenerator {
    last: Arc<AtomicU64>,
}

impl TxIdGenerator for SequentialTxIdGenerator {
    fn generate(&self) -> CoreResult<u64> {
        Ok(self.last.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

/// Remembers the highest committed tx id.
#[derive(Debug, Default)]
pub struct TrackingLastCommittedTxId {
    last: AtomicU64,
}

impl TrackingLastCommittedTxId {
    /// Creates a tracker at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last committed tx id.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

impl LastCommittedTxIdSetter for TrackingLastCommittedTxId {
    fn set_last_committed_tx_id(&self, id: u64) {
        self.last.fetch_max(id, Ordering::AcqRel);
    }
}

/// Discards committed tx ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLastCommittedTxIdSetter;

impl LastCommittedTxIdSetter for NoopLastCommittedTxIdSetter {
    fn set_last_committed_tx_id(&self, _id: u64) {}
}
