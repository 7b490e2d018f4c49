//! Transaction demarcation for the kernel facade.

use super::handle::{PlaceboTransaction, TopLevelTransaction, Transaction};
use crate::error::{CoreError, CoreResult};
use crate::event::SyncHookFactory;
use crate::spi::TransactionManager;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hands out top-level or placebo handles depending on whether the calling
/// thread already runs a transaction.
#[derive(Debug, Default)]
pub struct TransactionBoundary {
    placebo: OnceCell<Arc<PlaceboTransaction>>,
}

impl TransactionBoundary {
    /// Creates a boundary with no placebo built yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction, or joins the calling thread's transaction.
    ///
    /// When a transaction is active the same cached placebo is returned on
    /// every call and the manager is not asked to begin. Otherwise a new
    /// transaction is begun and the completion hook registered if `hooks`
    /// produces one. Errors are [`CoreError::TransactionFailure`] and leave
    /// no transaction behind.
    pub fn begin_tx(
        &self,
        tm: &Arc<dyn TransactionManager>,
        hooks: &SyncHookFactory,
    ) -> CoreResult<Transaction> {
        if tm.is_transaction_active() {
            let placebo = self
                .placebo
                .get_or_init(|| Arc::new(PlaceboTransaction::new(Arc::clone(tm))));
            return Ok(Transaction::Placebo(Arc::clone(placebo)));
        }

        let txid = tm.begin().map_err(|err| {
            warn!(error = %err, "unable to begin transaction");
            CoreError::transaction_failure("unable to begin transaction", err)
        })?;

        if let Some(hook) = hooks.create(txid) {
            if let Err(err) = tm.register_synchronization(Box::new(hook)) {
                warn!(%txid, error = %err, "unable to register transaction event hook");
                if let Err(rollback) = tm.rollback() {
                    warn!(
                        %txid,
                        error = %rollback,
                        "rollback after failed hook registration failed"
                    );
                }
                return Err(CoreError::transaction_failure(
                    "unable to begin transaction",
                    err,
                ));
            }
        }

        debug!(%txid, "top-level transaction begun");
        Ok(Transaction::TopLevel(TopLevelTransaction::new(
            Arc::clone(tm),
            txid,
        )))
    }

    /// Returns the placebo handle if one was ever handed out.
    #[must_use]
    pub fn placebo(&self) -> Option<&Arc<PlaceboTransaction>> {
        self.placebo.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        KernelEventHandlers, KernelPanicEventGenerator, TransactionEventHandlers,
    };
    use crate::spi::Synchronization;
    use crate::transaction::NativeTxManager;
    use crate::types::TransactionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        inner: NativeTxManager,
        begins: AtomicUsize,
        fail_begin: bool,
    }

    impl Counting {
        fn new(fail_begin: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: NativeTxManager::new(KernelPanicEventGenerator::new(Arc::new(
                    KernelEventHandlers::new(),
                ))),
                begins: AtomicUsize::new(0),
                fail_begin,
            })
        }
    }

    impl TransactionManager for Counting {
        fn begin(&self) -> CoreResult<TransactionId> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            if self.fail_begin {
                return Err(CoreError::system("no more transactions"));
            }
            self.inner.begin()
        }
        fn commit(&self) -> CoreResult<()> {
            self.inner.commit()
        }
        fn rollback(&self) -> CoreResult<()> {
            self.inner.rollback()
        }
        fn set_rollback_only(&self) -> CoreResult<()> {
            self.inner.set_rollback_only()
        }
        fn current_transaction(&self) -> Option<TransactionId> {
            self.inner.current_transaction()
        }
        fn register_synchronization(&self, sync: Box<dyn Synchronization>) -> CoreResult<()> {
            self.inner.register_synchronization(sync)
        }
    }

    fn no_hooks() -> SyncHookFactory {
        SyncHookFactory::new(Arc::new(TransactionEventHandlers::new()))
    }

    #[test]
    fn nested_begin_returns_identical_placebo() {
        let counting = Counting::new(false);
        let tm: Arc<dyn TransactionManager> = counting.clone();
        let boundary = TransactionBoundary::new();
        let hooks = no_hooks();

        let outer = boundary.begin_tx(&tm, &hooks).unwrap();
        assert!(!outer.is_placebo());

        let first = boundary.begin_tx(&tm, &hooks).unwrap();
        let second = boundary.begin_tx(&tm, &hooks).unwrap();
        assert!(Arc::ptr_eq(
            first.as_placebo().unwrap(),
            second.as_placebo().unwrap()
        ));
        assert_eq!(counting.begins.load(Ordering::SeqCst), 1);

        first.finish().unwrap();
        second.finish().unwrap();
        assert!(tm.is_transaction_active());

        outer.success();
        outer.finish().unwrap();
        assert!(!tm.is_transaction_active());
    }

    #[test]
    fn placebo_failure_fails_outer_commit() {
        let tm: Arc<dyn TransactionManager> = Counting::new(false);
        let boundary = TransactionBoundary::new();
        let hooks = no_hooks();

        let outer = boundary.begin_tx(&tm, &hooks).unwrap();
        let inner = boundary.begin_tx(&tm, &hooks).unwrap();
        inner.failure();
        inner.finish().unwrap();

        outer.success();
        let err = outer.finish().unwrap_err();
        assert!(matches!(err, CoreError::TransactionFailure { .. }));
        assert!(!tm.is_transaction_active());
    }

    #[test]
    fn begin_failure_is_transaction_failure() {
        let counting = Counting::new(true);
        let tm: Arc<dyn TransactionManager> = counting.clone();
        let boundary = TransactionBoundary::new();

        let err = boundary.begin_tx(&tm, &no_hooks()).unwrap_err();
        match err {
            CoreError::TransactionFailure { message, source } => {
                assert_eq!(message, "unable to begin transaction");
                assert!(matches!(*source, CoreError::System { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!tm.is_transaction_active());
        assert!(boundary.placebo().is_none());
    }

    #[test]
    fn dropped_top_level_rolls_back() {
        let tm: Arc<dyn TransactionManager> = Counting::new(false);
        let boundary = TransactionBoundary::new();
        {
            let tx = boundary.begin_tx(&tm, &no_hooks()).unwrap();
            tx.success();
        }
        assert!(!tm.is_transaction_active());
    }

    #[test]
    fn unmarked_finish_rolls_back() {
        let tm: Arc<dyn TransactionManager> = Counting::new(false);
        let boundary = TransactionBoundary::new();
        let tx = boundary.begin_tx(&tm, &no_hooks()).unwrap();
        tx.finish().unwrap();
        assert!(!tm.is_transaction_active());
    }
}
