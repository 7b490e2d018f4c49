//! Transaction handles returned by `begin_tx`.

use crate::error::{CoreError, CoreResult};
use crate::spi::TransactionManager;
use crate::types::TransactionId;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// A transaction handle.
///
/// Call [`success`](Self::success) and then [`finish`](Self::finish) to
/// commit. Anything else rolls back.
#[derive(Debug)]
pub enum Transaction {
    /// The handle that began the transaction and alone may finish it.
    TopLevel(TopLevelTransaction),
    /// A nested handle sharing the enclosing transaction.
    Placebo(Arc<PlaceboTransaction>),
}

impl Transaction {
    /// Marks the work as successful.
    pub fn success(&self) {
        match self {
            Self::TopLevel(tx) => tx.success(),
            Self::Placebo(tx) => tx.success(),
        }
    }

    /// Marks the work as failed.
    pub fn failure(&self) {
        match self {
            Self::TopLevel(tx) => tx.failure(),
            Self::Placebo(tx) => tx.failure(),
        }
    }

    /// Finishes the handle. Only a top-level handle commits or rolls back.
    pub fn finish(self) -> CoreResult<()> {
        match self {
            Self::TopLevel(tx) => tx.finish(),
            Self::Placebo(tx) => {
                tx.finish();
                Ok(())
            }
        }
    }

    /// Returns true for a nested handle.
    #[must_use]
    pub fn is_placebo(&self) -> bool {
        matches!(self, Self::Placebo(_))
    }

    /// Returns the placebo handle, if this is one.
    #[must_use]
    pub fn as_placebo(&self) -> Option<&Arc<PlaceboTransaction>> {
        match self {
            Self::Placebo(tx) => Some(tx),
            Self::TopLevel(_) => None,
        }
    }
}

/// Handle owning commit authority over the calling thread's transaction.
///
/// Not `Send`: the transaction is bound to the thread that began it.
/// Dropping an unfinished handle rolls the transaction back.
pub struct TopLevelTransaction {
    tm: Arc<dyn TransactionManager>,
    id: TransactionId,
    success: Cell<bool>,
    failure: Cell<bool>,
    finished: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl TopLevelTransaction {
    pub(crate) fn new(tm: Arc<dyn TransactionManager>, id: TransactionId) -> Self {
        Self {
            tm,
            id,
            success: Cell::new(false),
            failure: Cell::new(false),
            finished: false,
            _thread_bound: PhantomData,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Marks the transaction for commit.
    pub fn success(&self) {
        self.success.set(true);
    }

    /// Marks the transaction for rollback. Wins over [`success`](Self::success).
    pub fn failure(&self) {
        self.failure.set(true);
    }

    /// Commits if marked successful and not failed, otherwise rolls back.
    ///
    /// A commit that ends in rollback is a [`CoreError::TransactionFailure`].
    pub fn finish(mut self) -> CoreResult<()> {
        self.finished = true;
        if self.success.get() && !self.failure.get() {
            self.tm
                .commit()
                .map_err(|err| CoreError::transaction_failure("unable to commit transaction", err))
        } else {
            self.tm.rollback().map_err(|err| {
                CoreError::transaction_failure("unable to roll back transaction", err)
            })
        }
    }
}

impl Drop for TopLevelTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!(txid = %self.id, "rolling back unfinished transaction");
        if let Err(err) = self.tm.rollback() {
            warn!(txid = %self.id, error = %err, "rollback of dropped transaction failed");
        }
    }
}

impl std::fmt::Debug for TopLevelTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopLevelTransaction")
            .field("id", &self.id)
            .field("success", &self.success.get())
            .field("failure", &self.failure.get())
            .finish()
    }
}

/// Nested handle. It can mark the enclosing transaction rollback-only but
/// never commits or rolls it back.
pub struct PlaceboTransaction {
    tm: Arc<dyn TransactionManager>,
}

impl PlaceboTransaction {
    pub(crate) fn new(tm: Arc<dyn TransactionManager>) -> Self {
        Self { tm }
    }

    /// No-op.
    pub fn success(&self) {}

    /// Marks the calling thread's transaction rollback-only.
    pub fn failure(&self) {
        if let Err(err) = self.tm.set_rollback_only() {
            warn!(error = %err, "unable to mark transaction rollback-only");
        }
    }

    /// No-op.
    pub fn finish(&self) {}
}

impl std::fmt::Debug for PlaceboTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceboTransaction").finish_non_exhaustive()
    }
}
