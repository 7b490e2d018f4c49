//! Native thread-bound transaction manager.

use crate::error::{CoreError, CoreResult};
use crate::event::{ErrorState, KernelPanicEventGenerator};
use crate::spi::{CompletionStatus, Synchronization, TransactionManager};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use tracing::{debug, error, warn};

struct ActiveTransaction {
    id: TransactionId,
    rollback_only: bool,
    synchronizations: Vec<Box<dyn Synchronization>>,
}

/// Built-in transaction manager.
///
/// Each thread has at most one active transaction. Synchronizations run in
/// registration order. If a synchronization fails after a commit the manager
/// refuses new transactions and raises [`ErrorState::TxManagerNotOk`].
pub struct NativeTxManager {
    next_id: AtomicU64,
    active: Mutex<HashMap<ThreadId, ActiveTransaction>>,
    panic_events: KernelPanicEventGenerator,
    stopped: AtomicBool,
    healthy: AtomicBool,
}

impl NativeTxManager {
    /// Creates a manager that reports unrecoverable failures to
    /// `panic_events`.
    #[must_use]
    pub fn new(panic_events: KernelPanicEventGenerator) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
            panic_events,
            stopped: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
        }
    }

    /// Returns the number of threads with an active transaction.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Returns false once a post-commit failure left the manager unusable.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    fn complete(
        &self,
        txid: TransactionId,
        synchronizations: &[Box<dyn Synchronization>],
        status: CompletionStatus,
    ) -> CoreResult<()> {
        let mut failures = Vec::new();
        for sync in synchronizations {
            if let Err(err) = sync.after_completion(status) {
                failures.push(err.to_string());
            }
        }
        if failures.is_empty() {
            return Ok(());
        }

        match status {
            CompletionStatus::Committed => {
                error!(%txid, failures = ?failures, "synchronization failed after commit");
                self.healthy.store(false, Ordering::Release);
                self.panic_events.generate_event(ErrorState::TxManagerNotOk);
                Err(CoreError::system(format!(
                    "{txid} committed but {} synchronization(s) failed: {}",
                    failures.len(),
                    failures.join("; ")
                )))
            }
            CompletionStatus::RolledBack => {
                warn!(%txid, failures = ?failures, "synchronization failed after rollback");
                Ok(())
            }
        }
    }
}

impl TransactionManager for NativeTxManager {
    fn begin(&self) -> CoreResult<TransactionId> {
        if !self.is_ok() {
            return Err(CoreError::system("transaction manager is not ok"));
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(CoreError::system("transaction manager is stopped"));
        }

        let thread = thread::current().id();
        let mut active = self.active.lock();
        if let Some(existing) = active.get(&thread) {
            return Err(CoreError::invalid_operation(format!(
                "{} already active on this thread",
                existing.id
            )));
        }
        let id = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        active.insert(
            thread,
            ActiveTransaction {
                id,
                rollback_only: false,
                synchronizations: Vec::new(),
            },
        );
        debug!(txid = %id, "transaction begun");
        Ok(id)
    }

    fn commit(&self) -> CoreResult<()> {
        let thread = thread::current().id();
        let (txid, rollback_only, mut synchronizations) = {
            let mut active = self.active.lock();
            let tx = active.get_mut(&thread).ok_or(CoreError::NotInTransaction)?;
            (
                tx.id,
                tx.rollback_only,
                std::mem::take(&mut tx.synchronizations),
            )
        };

        let mut veto = rollback_only.then(|| "marked rollback-only".to_string());
        if veto.is_none() {
            for sync in &synchronizations {
                if let Err(err) = sync.before_completion() {
                    veto = Some(err.to_string());
                    break;
                }
            }
        }

        // Synchronizations registered while the others ran still take part.
        if let Some(tx) = self.active.lock().remove(&thread) {
            synchronizations.extend(tx.synchronizations);
        }

        match veto {
            Some(reason) => {
                debug!(%txid, %reason, "commit turned into rollback");
                self.complete(txid, &synchronizations, CompletionStatus::RolledBack)?;
                Err(CoreError::RolledBack { txid, reason })
            }
            None => {
                self.complete(txid, &synchronizations, CompletionStatus::Committed)?;
                debug!(%txid, "transaction committed");
                Ok(())
            }
        }
    }

    fn rollback(&self) -> CoreResult<()> {
        let thread = thread::current().id();
        let tx = self
            .active
            .lock()
            .remove(&thread)
            .ok_or(CoreError::NotInTransaction)?;
        self.complete(tx.id, &tx.synchronizations, CompletionStatus::RolledBack)?;
        debug!(txid = %tx.id, "transaction rolled back");
        Ok(())
    }

    fn set_rollback_only(&self) -> CoreResult<()> {
        let thread = thread::current().id();
        let mut active = self.active.lock();
        let tx = active.get_mut(&thread).ok_or(CoreError::NotInTransaction)?;
        tx.rollback_only = true;
        Ok(())
    }

    fn current_transaction(&self) -> Option<TransactionId> {
        let thread = thread::current().id();
        self.active.lock().get(&thread).map(|tx| tx.id)
    }

    fn register_synchronization(&self, sync: Box<dyn Synchronization>) -> CoreResult<()> {
        let thread = thread::current().id();
        let mut active = self.active.lock();
        let tx = active.get_mut(&thread).ok_or(CoreError::NotInTransaction)?;
        tx.synchronizations.push(sync);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let abandoned = self.active.lock().len();
        if abandoned > 0 {
            warn!(abandoned, "transaction manager stopped with active transactions");
        }
    }
}

impl std::fmt::Debug for NativeTxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTxManager")
            .field("active", &self.active_count())
            .field("ok", &self.is_ok())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}
