//! Error types for the EmberGraph kernel.

use crate::extension::ExtensionPhase;
use crate::kernel::StartupPhase;
use crate::types::{IdType, TransactionId};
use std::any::Any;
use std::io;
use thiserror::Error;

/// Result type for kernel operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in kernel operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Message log sink error.
    #[error("storage error: {0}")]
    Storage(#[from] embergraph_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Subsystem bring-up failed. Extensions were unwound before this was
    /// returned.
    #[error("startup failed during {phase}")]
    StartupFailed {
        /// Step of the startup sequence that failed.
        phase: StartupPhase,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The transaction manager could not begin or finish a transaction.
    #[error("{message}")]
    TransactionFailure {
        /// What the kernel was trying to do.
        message: String,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Entity id out of range, or no live entity at that id.
    #[error("{kind}[{id}] not found")]
    NotFound {
        /// Entity kind that was looked up.
        kind: IdType,
        /// The id as passed by the caller.
        id: i64,
    },

    /// Unregister was called for a handler that is not registered.
    #[error("{handler} isn't registered")]
    UnregisteredHandler {
        /// Name of the handler.
        handler: String,
    },

    /// An optional capability was requested but is not available.
    #[error("unsupported capability: {message}")]
    UnsupportedCapability {
        /// Description of the missing capability.
        message: String,
    },

    /// An extension failed during one of its protocol phases.
    #[error("extension `{extension}` failed to {phase}: {message}")]
    ExtensionFailed {
        /// Key of the extension.
        extension: String,
        /// Phase that failed.
        phase: ExtensionPhase,
        /// Description of the failure.
        message: String,
    },

    /// Two index providers were registered under the same name.
    #[error("index provider already registered: {name}")]
    DuplicateIndexProvider {
        /// Name of the provider.
        name: String,
    },

    /// A mutation was attempted on a read-only kernel.
    #[error("kernel is read-only")]
    ReadOnly,

    /// A mutation was attempted without an active transaction.
    #[error("not in transaction")]
    NotInTransaction,

    /// A commit ended in rollback.
    #[error("{txid} rolled back: {reason}")]
    RolledBack {
        /// The transaction that was rolled back.
        txid: TransactionId,
        /// Why the commit turned into a rollback.
        reason: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The kernel is not running (never started, or already shut down).
    #[error("kernel is not running")]
    KernelStopped,

    /// Teardown completed, but some before-shutdown handlers failed.
    #[error(
        "shutdown completed with {} handler failure(s): {}",
        failures.len(),
        failures.join("; ")
    )]
    ShutdownFailed {
        /// One entry per failed handler.
        failures: Vec<String>,
    },

    /// An event handler reported a failure.
    #[error("event handler failed: {message}")]
    HandlerFailed {
        /// Description of the failure.
        message: String,
    },

    /// A collaborating subsystem failed.
    #[error("system error: {message}")]
    System {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a startup failure for `phase`.
    pub fn startup_failed(phase: StartupPhase, source: CoreError) -> Self {
        Self::StartupFailed {
            phase,
            source: Box::new(source),
        }
    }

    /// Creates a transaction failure wrapping `source`.
    pub fn transaction_failure(message: impl Into<String>, source: CoreError) -> Self {
        Self::TransactionFailure {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(kind: IdType, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates an unregistered handler error.
    pub fn unregistered_handler(handler: impl Into<String>) -> Self {
        Self::UnregisteredHandler {
            handler: handler.into(),
        }
    }

    /// Creates an unsupported capability error.
    pub fn unsupported_capability(message: impl Into<String>) -> Self {
        Self::UnsupportedCapability {
            message: message.into(),
        }
    }

    /// Creates an extension failure.
    pub fn extension_failed(
        extension: impl Into<String>,
        phase: ExtensionPhase,
        message: impl Into<String>,
    ) -> Self {
        Self::ExtensionFailed {
            extension: extension.into(),
            phase,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a handler failure.
    pub fn handler_failed(message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            message: message.into(),
        }
    }

    /// Creates a subsystem failure.
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Creates a subsystem failure from a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::system(panic_message(payload))
    }

    /// Returns true for the not-found kind.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Describes a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
