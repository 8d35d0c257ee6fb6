//! Error types for StashDB core operations.

use stashdb_engine::StoreName;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type StashResult<T> = Result<T, StashError>;

/// Errors surfaced to StashDB callers.
///
/// Each variant carries a stable string [`code`](Self::code) so callers can
/// branch on failure class without matching on variants, and a
/// [`recommendation`](Self::recommendation) with a human-readable
/// remediation hint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StashError {
    /// The storage quota is exhausted.
    #[error("storage quota exceeded on stores {stores:?}")]
    QuotaExceeded {
        /// Stores the failing transaction was scoped to.
        stores: Vec<StoreName>,
        /// Bytes the failing write attempted, when known.
        attempted_size: Option<usize>,
    },

    /// Storage was evicted or is otherwise unavailable (e.g. ephemeral
    /// storage in private browsing).
    #[error("storage evicted or unavailable: {message}")]
    StorageEvicted {
        /// Description of the failure.
        message: String,
    },

    /// The transaction did not reach a terminal engine signal in time.
    #[error("transaction on stores {stores:?} timed out after {timeout:?}")]
    TransactionTimeout {
        /// Stores the transaction was scoped to.
        stores: Vec<StoreName>,
        /// The enforced timeout.
        timeout: Duration,
    },

    /// The transaction was aborted.
    #[error("transaction on stores {stores:?} aborted: {reason}")]
    TransactionAborted {
        /// Stores the transaction was scoped to.
        stores: Vec<StoreName>,
        /// Reason for the abort.
        reason: String,
    },

    /// The transaction failed for any other reason.
    #[error("transaction on stores {stores:?} failed: {message}")]
    TransactionFailed {
        /// Stores the transaction was scoped to.
        stores: Vec<StoreName>,
        /// The underlying error message.
        message: String,
    },

    /// A bulk item carried a key the engine must never see.
    #[error("invalid key at input index {index}")]
    InvalidKey {
        /// Index of the offending item in the original input sequence.
        index: usize,
    },
}

impl StashError {
    /// Creates a quota exceeded error.
    pub fn quota_exceeded(stores: Vec<StoreName>, attempted_size: Option<usize>) -> Self {
        Self::QuotaExceeded {
            stores,
            attempted_size,
        }
    }

    /// Creates a storage evicted error.
    pub fn storage_evicted(message: impl Into<String>) -> Self {
        Self::StorageEvicted {
            message: message.into(),
        }
    }

    /// Creates a transaction timeout error.
    pub fn timeout(stores: Vec<StoreName>, timeout: Duration) -> Self {
        Self::TransactionTimeout { stores, timeout }
    }

    /// Creates a transaction aborted error.
    pub fn aborted(stores: Vec<StoreName>, reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            stores,
            reason: reason.into(),
        }
    }

    /// Creates a generic transaction failure.
    pub fn failed(stores: Vec<StoreName>, message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            stores,
            message: message.into(),
        }
    }

    /// Creates an invalid key error for a bulk input index.
    pub fn invalid_key(index: usize) -> Self {
        Self::InvalidKey { index }
    }

    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::StorageEvicted { .. } => "STORAGE_EVICTED",
            Self::TransactionTimeout { .. } => "TRANSACTION_TIMEOUT",
            Self::TransactionAborted { .. } => "TRANSACTION_ABORTED",
            Self::TransactionFailed { .. } => "TRANSACTION_FAILED",
            Self::InvalidKey { .. } => "INVALID_KEY",
        }
    }

    /// Returns a human-readable remediation hint.
    #[must_use]
    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => {
                "Free up storage or request persistent storage before retrying the write."
            }
            Self::StorageEvicted { .. } => {
                "Storage may be ephemeral (private browsing); reopen the database and restore from a backup."
            }
            Self::TransactionTimeout { .. } => {
                "Increase the transaction timeout or reduce the batch size."
            }
            Self::TransactionAborted { .. } => {
                "The transaction was rolled back; inspect the abort reason and retry if transient."
            }
            Self::TransactionFailed { .. } => {
                "Inspect the underlying error message; the operation may succeed on retry."
            }
            Self::InvalidKey { .. } => {
                "Filter out empty keys before submitting bulk operations."
            }
        }
    }
}
