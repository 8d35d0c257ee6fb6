//! Retrying transaction coordinator.

use crate::classify::is_retryable;
use crate::error::StashResult;
use crate::transaction::executor::{execute, TransactionContext, TransactionRequest};
use stashdb_engine::Connection;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means one attempt total.
    pub retries: u32,
    /// Base delay; attempt `n` sleeps `base_delay * 2^n` before retrying.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and the default base
    /// delay.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Backoff delay slept after failed attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(31))
    }
}

/// Runs a transaction through the executor, resubmitting it on retryable
/// failures up to the policy's bound.
///
/// Each attempt opens a fresh engine transaction; the work closure is
/// invoked once per attempt. After a failed attempt the coordinator sleeps
/// `base_delay * 2^attempt` before the next one. The underlying attempt
/// runs at most `retries + 1` times.
///
/// # Errors
///
/// The last attempt's error, surfaced as-is: no wrapping, no loss of the
/// original error type.
pub async fn execute_with_retry<C, F, Fut, R>(
    conn: &C,
    request: &TransactionRequest,
    policy: &RetryPolicy,
    work: F,
) -> StashResult<R>
where
    C: Connection,
    F: Fn(TransactionContext<C::Txn>) -> Fut,
    Fut: Future<Output = StashResult<R>>,
{
    let mut attempt = 0u32;
    loop {
        match execute(conn, request, &work).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.retries || !is_retryable(&error) {
                    return Err(error);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    ?delay,
                    code = error.code(),
                    "transaction attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashdb_engine::{
        EngineError, EngineTransaction, MemoryEngine, Record, StorageEngine, StoreKey, StoreName,
        TransactionMode,
    };
    use tokio::time::Instant;

    fn store() -> StoreName {
        StoreName::new("items")
    }

    fn request() -> TransactionRequest {
        TransactionRequest::new(
            vec![store()],
            TransactionMode::ReadWrite,
            Duration::from_secs(1),
        )
    }

    async fn insert_one(
        conn: &stashdb_engine::MemoryConnection,
        policy: &RetryPolicy,
    ) -> StashResult<()> {
        execute_with_retry(conn, &request(), policy, |ctx| async move {
            ctx.txn()
                .insert(&store(), Record::new(StoreKey::from("k"), b"v".to_vec()))
                .settled()
                .await
                .ok();
            Ok(())
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded_by_retries_plus_one() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.fail_transactions(10, EngineError::unknown("WeirdError", "flaky"));
        let conn = engine.connect().await.unwrap();

        let policy = RetryPolicy::new(2).with_base_delay(Duration::from_millis(10));
        let result = insert_one(&conn, &policy).await;

        assert!(result.is_err());
        assert_eq!(engine.transactions_started(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.fail_transactions(1, EngineError::unknown("WeirdError", "flaky"));
        let conn = engine.connect().await.unwrap();

        let policy = RetryPolicy::new(3).with_base_delay(Duration::from_millis(10));
        insert_one(&conn, &policy).await.unwrap();

        assert_eq!(engine.transactions_started(), 2);
        assert_eq!(engine.committed(&store(), &StoreKey::from("k")), Some(b"v".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn constraint_violations_are_not_retried() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.fail_transactions(
            5,
            EngineError::ConstraintViolation {
                store: store(),
                key: StoreKey::from("k"),
            },
        );
        let conn = engine.connect().await.unwrap();

        let policy = RetryPolicy::new(5).with_base_delay(Duration::from_millis(10));
        let error = insert_one(&conn, &policy).await.unwrap_err();

        assert_eq!(error.code(), "TRANSACTION_FAILED");
        assert_eq!(engine.transactions_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_per_attempt() {
        let engine = MemoryEngine::with_stores(["items"]);
        engine.fail_transactions(10, EngineError::unknown("WeirdError", "flaky"));
        let conn = engine.connect().await.unwrap();

        let policy = RetryPolicy::new(2).with_base_delay(Duration::from_millis(100));
        let started = Instant::now();
        let _ = insert_one(&conn, &policy).await;

        // 100ms after attempt 0, 200ms after attempt 1.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy::new(4).with_base_delay(Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }
}
