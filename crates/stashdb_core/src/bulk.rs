//! Adaptive bulk-write engine.
//!
//! Large record or key sequences are written in batches sized to stay
//! under per-engine transaction limits. Each batch is one read-write
//! transaction driven through the timed executor. The batch size adapts
//! between batches, growing after clean successes and shrinking after
//! retries and failures, and every input item ends up in exactly one of
//! "succeeded" or "failed".

use crate::classify::to_stash_error;
use crate::config::{BulkOptions, QuirkProfile, MIN_BATCH_SIZE};
use crate::error::{StashError, StashResult};
use crate::transaction::{execute, TransactionRequest};
use stashdb_engine::{Connection, EngineTransaction, Record, StoreKey, StoreName, TransactionMode};
use std::time::Duration;

/// Batch size added after a batch succeeds on its first attempt.
const GROWTH_INCREMENT: usize = 10;
/// Shrink factor applied from a batch's second retry onward.
const RETRY_SHRINK: f64 = 0.7;
/// Shrink factor applied after a batch exhausts its retries.
const FAILURE_SHRINK: f64 = 0.5;

/// The accumulated outcome of a bulk operation.
///
/// `success + failed` always equals the number of items processed;
/// partial failures are recorded here, never thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Items written or deleted successfully.
    pub success: usize,
    /// Items that failed.
    pub failed: usize,
    /// Failed items' positions in the original input sequence.
    pub failed_indices: Vec<usize>,
    /// One error per failed item, parallel to `failed_indices`.
    pub errors: Vec<StashError>,
}

impl BulkWriteResult {
    fn record_failure(&mut self, index: usize, error: StashError) {
        self.failed += 1;
        self.failed_indices.push(index);
        self.errors.push(error);
    }
}

/// One bulk input item: a record to insert or a key to delete.
#[derive(Debug, Clone)]
pub(crate) enum BulkItem {
    /// Insert a record (duplicate keys fail the item).
    Insert(Record),
    /// Delete a key.
    Delete(StoreKey),
}

impl BulkItem {
    fn is_valid(&self) -> bool {
        match self {
            Self::Insert(record) => record.key.is_valid(),
            Self::Delete(key) => key.is_valid(),
        }
    }
}

/// The per-item outcome of one submitted batch transaction.
#[derive(Debug, Default)]
struct BatchAttempt {
    succeeded: usize,
    failures: Vec<(usize, StashError)>,
}

/// Runs a bulk operation against `store`, batch by batch.
///
/// Batches are strictly sequential: batch N+1 is not started until batch
/// N's terminal outcome is known, because its size depends on that
/// outcome. Whole-batch failures are retried with exponential backoff up
/// to `options.retries`; once retries are exhausted the batch's items are
/// recorded as failed and the run continues with the next batch.
pub(crate) async fn run<C: Connection>(
    conn: &C,
    store: &StoreName,
    items: Vec<BulkItem>,
    options: &BulkOptions,
    profile: &QuirkProfile,
) -> BulkWriteResult {
    let total = items.len();
    let mut result = BulkWriteResult::default();
    if total == 0 {
        return result;
    }

    let initial = options
        .batch_size
        .unwrap_or(profile.recommended_batch_size)
        .max(MIN_BATCH_SIZE);
    let max_size = initial * 2;
    let timeout = options.timeout.unwrap_or(profile.recommended_timeout);
    let base_delay = options
        .retry_delay
        .unwrap_or_else(|| profile.default_retry_delay());

    let mut size = initial;
    let mut offset = 0usize;

    while offset < total {
        let mut attempt = 0u32;
        let (end, invalid, outcome) = loop {
            // The slice is recomputed per attempt: a shrink between
            // retries resubmits fewer items and leaves the rest to later
            // batches.
            let end = (offset + size).min(total);
            let mut invalid = Vec::new();
            let mut valid = Vec::new();
            for (i, item) in items[offset..end].iter().enumerate() {
                let index = offset + i;
                if item.is_valid() {
                    valid.push((index, item.clone()));
                } else {
                    invalid.push(index);
                }
            }
            if valid.is_empty() {
                break (end, invalid, Ok(BatchAttempt::default()));
            }

            match submit_batch(conn, store, &valid, timeout).await {
                Ok(batch) => {
                    if attempt == 0 {
                        size = (size + GROWTH_INCREMENT).min(max_size);
                    }
                    break (end, invalid, Ok(batch));
                }
                Err(error) if options.retry_on_fail && attempt < options.retries => {
                    attempt += 1;
                    if attempt >= 2 {
                        size = shrink(size, RETRY_SHRINK);
                    }
                    let delay = base_delay.saturating_mul(1u32 << (attempt - 1).min(31));
                    tracing::warn!(
                        attempt,
                        ?delay,
                        batch_size = size,
                        code = error.code(),
                        "batch failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    size = shrink(size, FAILURE_SHRINK);
                    let indices: Vec<usize> = valid.iter().map(|(index, _)| *index).collect();
                    break (end, invalid, Err((error, indices)));
                }
            }
        };

        for index in invalid {
            result.record_failure(index, StashError::invalid_key(index));
        }
        match outcome {
            Ok(batch) => {
                result.success += batch.succeeded;
                for (index, error) in batch.failures {
                    result.record_failure(index, error);
                }
            }
            Err((error, indices)) => {
                tracing::warn!(
                    batch_start = offset,
                    batch_end = end,
                    code = error.code(),
                    "batch retries exhausted, recording items as failed"
                );
                for index in indices {
                    result.record_failure(index, error.clone());
                }
            }
        }

        if let Some(on_progress) = &options.on_progress {
            on_progress(end, total);
        }
        offset = end;
    }

    result
}

/// Submits one batch as a single read-write transaction.
///
/// Every item is issued as its own operation so one item's failure does
/// not abort its siblings; the work future settles only once all items
/// have reported. Per-item failures come back in the attempt result; a
/// transaction-level failure (timeout, abort, engine error) surfaces as
/// the whole batch's error.
async fn submit_batch<C: Connection>(
    conn: &C,
    store: &StoreName,
    items: &[(usize, BulkItem)],
    timeout: Duration,
) -> StashResult<BatchAttempt> {
    let request = TransactionRequest::new(vec![store.clone()], TransactionMode::ReadWrite, timeout);
    let store = store.clone();
    let items = items.to_vec();
    execute(conn, &request, move |ctx| async move {
        let mut receipts = Vec::with_capacity(items.len());
        // Issue everything before the first await: the engine auto-commits
        // once no operation is pending, so a suspension point here would
        // race the commit.
        for (index, item) in &items {
            let receipt = match item {
                BulkItem::Insert(record) => ctx.txn().insert(&store, record.clone()),
                BulkItem::Delete(key) => ctx.txn().delete(&store, key),
            };
            receipts.push((*index, receipt));
        }

        let stores = [store];
        let mut batch = BatchAttempt::default();
        for (index, receipt) in receipts {
            match receipt.settled().await {
                Ok(()) => batch.succeeded += 1,
                Err(error) => batch
                    .failures
                    .push((index, to_stash_error(&stores, timeout, &error))),
            }
        }
        Ok(batch)
    })
    .await
}

fn shrink(size: usize, factor: f64) -> usize {
    (((size as f64) * factor).floor() as usize).max(MIN_BATCH_SIZE)
}
