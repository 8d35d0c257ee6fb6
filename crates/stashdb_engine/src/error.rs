//! Error types for engine operations.

use crate::types::{StoreKey, StoreName};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the underlying storage engine.
///
/// Errors are `Clone` because one failure may have to be fanned out to
/// several observers: the per-operation receipt, the transaction's
/// terminal signal, and any pending siblings.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The storage quota is exhausted.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// A uniqueness constraint was violated (duplicate key).
    #[error("constraint violation: key {key:?} already exists in store {store}")]
    ConstraintViolation {
        /// The store the write targeted.
        store: StoreName,
        /// The duplicate key.
        key: StoreKey,
    },

    /// An operation was issued after the transaction reached a terminal state.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// A write operation was issued inside a read-only transaction.
    #[error("write operation in a readonly transaction")]
    ReadOnly,

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The requested store does not exist in this database.
    #[error("store not found: {store}")]
    StoreNotFound {
        /// The missing store.
        store: StoreName,
    },

    /// An ephemeral or otherwise unexplained storage failure.
    #[error("storage failure: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// An engine-specific error outside the known set.
    #[error("{name}: {message}")]
    Unknown {
        /// The engine's symbolic error name.
        name: String,
        /// The engine's error message.
        message: String,
    },
}

impl EngineError {
    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a storage failure error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an unknown engine error with a symbolic name.
    pub fn unknown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unknown {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the engine's symbolic name for this error.
    ///
    /// The names follow the platform convention consumers match on
    /// (`"ConstraintError"`, `"QuotaExceededError"`, ...). Classification
    /// should consult this before falling back to message text.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::QuotaExceeded => "QuotaExceededError",
            Self::ConstraintViolation { .. } => "ConstraintError",
            Self::TransactionInactive => "TransactionInactiveError",
            Self::ReadOnly => "ReadOnlyError",
            Self::Aborted { .. } => "AbortError",
            Self::StoreNotFound { .. } => "NotFoundError",
            Self::Storage { .. } => "UnknownError",
            Self::Unknown { name, .. } => name,
        }
    }
}
