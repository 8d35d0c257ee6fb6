//! Maps raw engine failures onto the caller-facing taxonomy and drives
//! retry policy.

use crate::error::StashError;
use stashdb_engine::{EngineError, StoreName};
use std::time::Duration;

/// The classification of a raw engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Storage quota exhausted.
    QuotaExceeded,
    /// Ephemeral or unknown storage failure.
    StorageEvicted,
    /// The engine itself reported a timeout.
    Timeout,
    /// The transaction was aborted.
    Aborted,
    /// Any other transaction failure.
    Failure,
}

/// Classifies a raw engine error.
///
/// The engine's symbolic error name is consulted first; when it is not one
/// of the known names, classification falls back to case-sensitive message
/// substrings (`"quota"`, `"storage"`).
#[must_use]
pub fn classify(error: &EngineError) -> ErrorClass {
    match error.name() {
        "QuotaExceededError" => ErrorClass::QuotaExceeded,
        "TimeoutError" => ErrorClass::Timeout,
        "AbortError" => ErrorClass::Aborted,
        _ => {
            let message = error.to_string();
            if message.contains("quota") {
                ErrorClass::QuotaExceeded
            } else if message.contains("storage") {
                ErrorClass::StorageEvicted
            } else {
                ErrorClass::Failure
            }
        }
    }
}

/// Converts an engine error into the caller-facing taxonomy, attaching the
/// transaction's scope and timeout as context.
#[must_use]
pub fn to_stash_error(stores: &[StoreName], timeout: Duration, error: &EngineError) -> StashError {
    match classify(error) {
        ErrorClass::QuotaExceeded => StashError::quota_exceeded(stores.to_vec(), None),
        ErrorClass::StorageEvicted => StashError::storage_evicted(error.to_string()),
        ErrorClass::Timeout => StashError::timeout(stores.to_vec(), timeout),
        ErrorClass::Aborted => StashError::aborted(stores.to_vec(), error.to_string()),
        ErrorClass::Failure => StashError::failed(stores.to_vec(), error.to_string()),
    }
}

/// Marker the executor uses for aborts explicitly requested through a
/// transaction context. Explicit aborts are assumed intentional and are
/// never retried.
pub(crate) const EXPLICIT_ABORT_REASON: &str = "abort explicitly requested";

/// Decides whether a failed attempt is worth retrying.
///
/// Constraint and uniqueness violations are never retryable (retrying
/// cannot fix a duplicate key), quota exhaustion is never retryable, and
/// explicit aborts are assumed intentional. Everything else, including
/// failures outside the known taxonomy, is optimistically retried.
#[must_use]
pub fn is_retryable(error: &StashError) -> bool {
    match error {
        StashError::TransactionTimeout { .. } => true,
        StashError::StorageEvicted { .. } => true,
        StashError::QuotaExceeded { .. } => false,
        StashError::InvalidKey { .. } => false,
        StashError::TransactionAborted { reason, .. } => {
            !is_constraint_text(reason) && !reason.contains(EXPLICIT_ABORT_REASON)
        }
        StashError::TransactionFailed { message, .. } => !is_constraint_text(message),
    }
}

fn is_constraint_text(text: &str) -> bool {
    text.contains("constraint") || text.contains("Constraint") || text.contains("unique")
}
