//! # StashDB Core
//!
//! Transaction orchestration and adaptive bulk writes over an
//! asynchronous key-ordered storage engine.
//!
//! This crate provides:
//! - A timed transaction executor that drives one engine transaction to
//!   exactly one terminal outcome
//! - A retrying coordinator with bounded exponential backoff
//! - An adaptive bulk-write engine that sizes batches to the engine's
//!   transaction limits and never loses track of a per-item outcome
//! - An error classifier mapping raw engine failures onto a small stable
//!   taxonomy
//!
//! ## Key Invariants
//!
//! - A submitted transaction reaches exactly one terminal outcome
//! - Success requires both the work future and the engine's completion
//!   signal; whichever settles last triggers resolution
//! - Bulk results account for every input item exactly once:
//!   `success + failed` equals the number of items processed
//! - Batches run strictly sequentially; the batch size for batch N+1
//!   depends on batch N's outcome and stays within `[10, 2 * initial]`
//! - Bulk operations never throw for partial failures; `execute` always
//!   surfaces a typed, inspectable error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod classify;
mod config;
mod database;
mod error;
mod transaction;

pub use bulk::BulkWriteResult;
pub use classify::{classify, is_retryable, to_stash_error, ErrorClass};
pub use config::{BulkOptions, ProgressFn, QuirkProfile, TransactionOptions, MIN_BATCH_SIZE};
pub use database::Database;
pub use error::{StashError, StashResult};
pub use transaction::{
    execute, execute_with_retry, RetryPolicy, TransactionContext, TransactionRequest,
};
