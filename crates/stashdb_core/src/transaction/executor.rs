//! Timed transaction executor.

use crate::classify::{to_stash_error, EXPLICIT_ABORT_REASON};
use crate::error::{StashError, StashResult};
use stashdb_engine::{Connection, EngineTransaction, StoreName, TransactionMode, TxnSignal};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One transaction submission: scope, mode, and enforced timeout.
///
/// Immutable once submitted; retries resubmit the same request against a
/// fresh engine transaction.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    /// Stores the transaction is scoped to, in declaration order.
    pub stores: Vec<StoreName>,
    /// Access mode.
    pub mode: TransactionMode,
    /// Wall-clock timeout for the whole attempt.
    pub timeout: Duration,
}

impl TransactionRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(stores: Vec<StoreName>, mode: TransactionMode, timeout: Duration) -> Self {
        Self {
            stores,
            mode,
            timeout,
        }
    }
}

/// The view of a live transaction handed to the work closure.
#[derive(Debug)]
pub struct TransactionContext<T: EngineTransaction> {
    txn: Arc<T>,
    mode: TransactionMode,
}

impl<T: EngineTransaction> TransactionContext<T> {
    /// The live transaction handle.
    #[must_use]
    pub fn txn(&self) -> &T {
        &self.txn
    }

    /// A shareable clone of the handle, for work that fans out.
    #[must_use]
    pub fn handle(&self) -> Arc<T> {
        Arc::clone(&self.txn)
    }

    /// The transaction's access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Explicitly aborts the transaction.
    ///
    /// The executor reports the outcome as aborted; an explicit abort is
    /// assumed intentional and is not retried.
    pub fn abort(&self) {
        self.txn.abort();
    }
}

/// Executes one transaction against the engine, enforcing the request's
/// timeout and resolving to exactly one outcome.
///
/// The work closure receives a [`TransactionContext`] and may issue any
/// number of operations. Success requires both the work future and the
/// engine's completion signal to settle: the engine commits only once all
/// operations issued before the work's first suspension point have been
/// queued, so whichever of the two settles last triggers resolution.
///
/// # Errors
///
/// - [`StashError::TransactionTimeout`] when the timer fires first; the
///   underlying transaction is aborted before returning
/// - [`StashError::TransactionAborted`] when the engine signals an abort,
///   explicit or otherwise
/// - the work future's own error, after aborting the transaction
/// - the classified engine error for an engine-level failure
pub async fn execute<C, F, Fut, R>(
    conn: &C,
    request: &TransactionRequest,
    work: F,
) -> StashResult<R>
where
    C: Connection,
    F: FnOnce(TransactionContext<C::Txn>) -> Fut,
    Fut: Future<Output = StashResult<R>>,
{
    if request.stores.is_empty() {
        return Err(StashError::failed(
            Vec::new(),
            "transaction requires at least one store",
        ));
    }

    let txn = Arc::new(
        conn.begin(&request.stores, request.mode)
            .map_err(|error| to_stash_error(&request.stores, request.timeout, &error))?,
    );
    tracing::debug!(stores = ?request.stores, mode = %request.mode, "transaction started");

    let signal = txn.watch().wait();
    let work_fut = work(TransactionContext {
        txn: Arc::clone(&txn),
        mode: request.mode,
    });
    let sleep = tokio::time::sleep(request.timeout);
    tokio::pin!(signal, work_fut, sleep);

    // Two completion flags joined into one resolution: the loop breaks
    // exactly once, and a branch that has already settled is guarded off
    // so it is never polled again. `biased` keeps the terminal signal
    // ahead of the work future when both are ready in the same tick.
    let mut engine_done = false;
    let mut work_value: Option<R> = None;

    let outcome = loop {
        tokio::select! {
            biased;
            () = &mut sleep => {
                txn.abort();
                break Err(StashError::timeout(request.stores.clone(), request.timeout));
            }
            signal = &mut signal, if !engine_done => match signal {
                TxnSignal::Complete => {
                    engine_done = true;
                    if let Some(value) = work_value.take() {
                        break Ok(value);
                    }
                }
                TxnSignal::Error(error) => {
                    break Err(to_stash_error(&request.stores, request.timeout, &error));
                }
                TxnSignal::Aborted(error) => {
                    break Err(match error {
                        Some(error) => to_stash_error(&request.stores, request.timeout, &error),
                        None => StashError::aborted(request.stores.clone(), EXPLICIT_ABORT_REASON),
                    });
                }
            },
            result = &mut work_fut, if work_value.is_none() => match result {
                Ok(value) => {
                    if engine_done {
                        break Ok(value);
                    }
                    work_value = Some(value);
                }
                Err(error) => {
                    // An uncommitted transaction must never be left dangling.
                    txn.abort();
                    break Err(error);
                }
            },
        }
    };

    match &outcome {
        Ok(_) => tracing::debug!(stores = ?request.stores, "transaction completed"),
        Err(error) => {
            tracing::debug!(stores = ?request.stores, code = error.code(), "transaction failed");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashdb_engine::{MemoryEngine, Record, StorageEngine, StoreKey, EngineError};
    use tokio::time::Instant;

    fn store() -> StoreName {
        StoreName::new("items")
    }

    fn request(timeout_ms: u64) -> TransactionRequest {
        TransactionRequest::new(
            vec![store()],
            TransactionMode::ReadWrite,
            Duration::from_millis(timeout_ms),
        )
    }

    fn record(key: &str) -> Record {
        Record::new(StoreKey::from(key), b"v".to_vec())
    }

    #[tokio::test]
    async fn resolves_with_work_result_after_commit() {
        let engine = MemoryEngine::with_stores(["items"]);
        let conn = engine.connect().await.unwrap();

        let value = execute(&conn, &request(1_000), |ctx| async move {
            ctx.txn().insert(&store(), record("a")).settled().await.ok();
            Ok(42)
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(engine.committed(&store(), &StoreKey::from("a")), Some(b"v".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_slow_work_after_engine_completion() {
        let engine = MemoryEngine::with_stores(["items"]);
        let conn = engine.connect().await.unwrap();

        let value = execute(&conn, &request(1_000), |ctx| async move {
            ctx.txn().insert(&store(), record("a")).settled().await.ok();
            // The engine commits while the work future is still pending;
            // resolution must wait for both.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("late")
        })
        .await
        .unwrap();

        assert_eq!(value, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_aborts_the_transaction() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.set_op_delay(Some(Duration::from_millis(500)));
        let conn = engine.connect().await.unwrap();

        let started = Instant::now();
        let result: StashResult<()> = execute(&conn, &request(50), |ctx| async move {
            ctx.txn().insert(&store(), record("a")).settled().await.ok();
            Ok(())
        })
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.code(), "TRANSACTION_TIMEOUT");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(engine.transactions_aborted(), 1);
        assert_eq!(engine.store_len(&store()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_and_completion_racing_resolve_once() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.set_op_delay(Some(Duration::from_millis(50)));
        let conn = engine.connect().await.unwrap();

        // Timer and engine completion become ready at the same instant;
        // exactly one terminal path may fire.
        let result: StashResult<()> = execute(&conn, &request(50), |ctx| async move {
            ctx.txn().insert(&store(), record("a")).settled().await.ok();
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "TRANSACTION_TIMEOUT");
    }

    #[tokio::test]
    async fn engine_failure_is_classified() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.fail_transactions(1, EngineError::unknown("WeirdError", "boom"));
        let conn = engine.connect().await.unwrap();

        let result: StashResult<()> = execute(&conn, &request(1_000), |ctx| async move {
            ctx.txn().insert(&store(), record("a")).settled().await.ok();
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "TRANSACTION_FAILED");
    }

    #[tokio::test]
    async fn explicit_abort_reports_aborted() {
        let engine = MemoryEngine::with_stores(["items"]);
        let conn = engine.connect().await.unwrap();

        let result: StashResult<()> = execute(&conn, &request(1_000), |ctx| async move {
            // Abort while the insert is still in flight, before the engine
            // can auto-commit.
            let receipt = ctx.txn().insert(&store(), record("a"));
            ctx.abort();
            receipt.settled().await.ok();
            Ok(())
        })
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.code(), "TRANSACTION_ABORTED");
        assert!(!crate::classify::is_retryable(&error));
    }

    #[tokio::test]
    async fn work_error_aborts_before_surfacing() {
        let engine = MemoryEngine::with_stores(["items"]);
        let conn = engine.connect().await.unwrap();

        let result: StashResult<()> = execute(&conn, &request(1_000), |_ctx| async move {
            Err(StashError::failed(vec![store()], "caller bug"))
        })
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.code(), "TRANSACTION_FAILED");
        assert!(error.to_string().contains("caller bug"));
        assert_eq!(engine.transactions_aborted(), 1);
    }

    #[tokio::test]
    async fn empty_scope_is_rejected() {
        let engine = MemoryEngine::with_stores(["items"]);
        let conn = engine.connect().await.unwrap();
        let request = TransactionRequest::new(
            Vec::new(),
            TransactionMode::ReadOnly,
            Duration::from_millis(10),
        );

        let result: StashResult<()> = execute(&conn, &request, |_ctx| async { Ok(()) }).await;
        assert!(result.is_err());
        assert_eq!(engine.transactions_started(), 0);
    }
}
