//! Transaction orchestration.
//!
//! Two layers cooperate here:
//!
//! - The **executor** drives one engine transaction to exactly one terminal
//!   outcome, racing a wall-clock timeout against the engine's
//!   completion/error/abort signals and the caller's work future.
//! - The **coordinator** wraps the executor with bounded retry and
//!   exponential backoff, consulting the error classifier to decide which
//!   failures are worth another attempt.

mod coordinator;
mod executor;

pub use coordinator::{execute_with_retry, RetryPolicy};
pub use executor::{execute, TransactionContext, TransactionRequest};
