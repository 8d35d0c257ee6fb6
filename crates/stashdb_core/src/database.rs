//! Caller-facing database facade.

use crate::bulk::{self, BulkItem, BulkWriteResult};
use crate::classify::to_stash_error;
use crate::config::{BulkOptions, QuirkProfile, TransactionOptions};
use crate::error::StashResult;
use crate::transaction::{execute_with_retry, RetryPolicy, TransactionContext, TransactionRequest};
use stashdb_engine::{Connection, Record, StorageEngine, StoreKey, StoreName, TransactionMode};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A database handle layering transaction orchestration and bulk writes
/// over a storage engine.
///
/// The handle opens its engine connection lazily and caches it; each
/// logical operation gets its own transaction scoped only to the stores it
/// declares, so concurrent calls never share a live transaction object.
///
/// # Example
///
/// ```rust
/// use stashdb_core::{BulkOptions, Database};
/// use stashdb_engine::{MemoryEngine, Record, StoreKey, StoreName};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = Database::new(MemoryEngine::with_stores(["items"]));
/// let store = StoreName::new("items");
///
/// let records = vec![Record::new(StoreKey::from("k1"), b"v1".to_vec())];
/// let result = db.bulk_write(&store, records, BulkOptions::new()).await.unwrap();
/// assert_eq!(result.success, 1);
/// # }
/// ```
pub struct Database<E: StorageEngine> {
    engine: E,
    profile: QuirkProfile,
    conn: Mutex<Option<Arc<E::Conn>>>,
}

impl<E: StorageEngine> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl<E: StorageEngine> Database<E> {
    /// Creates a database over `engine` with the default quirk profile.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_profile(engine, QuirkProfile::default())
    }

    /// Creates a database with an explicit quirk profile.
    #[must_use]
    pub fn with_profile(engine: E, profile: QuirkProfile) -> Self {
        Self {
            engine,
            profile,
            conn: Mutex::new(None),
        }
    }

    /// The quirk profile supplying this database's defaults.
    #[must_use]
    pub fn profile(&self) -> &QuirkProfile {
        &self.profile
    }

    /// Returns the cached engine connection, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns the classified engine error when opening fails.
    pub async fn connection(&self) -> StashResult<Arc<E::Conn>> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(Arc::clone(conn));
        }
        let conn = self
            .engine
            .connect()
            .await
            .map(Arc::new)
            .map_err(|error| to_stash_error(&[], self.profile.recommended_timeout, &error))?;
        *guard = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Executes a transaction with timeout enforcement and optional retry.
    ///
    /// The work closure is invoked once per attempt with a fresh
    /// transaction context.
    ///
    /// # Errors
    ///
    /// Unlike the bulk operations this is not a result-object API: the
    /// last attempt's typed error is returned and callers must catch it.
    pub async fn execute<F, Fut, R>(
        &self,
        stores: Vec<StoreName>,
        mode: TransactionMode,
        options: TransactionOptions,
        work: F,
    ) -> StashResult<R>
    where
        F: Fn(TransactionContext<<E::Conn as Connection>::Txn>) -> Fut,
        Fut: Future<Output = StashResult<R>>,
    {
        let conn = self.connection().await?;
        let request = TransactionRequest::new(
            stores,
            mode,
            options.timeout.unwrap_or(self.profile.recommended_timeout),
        );
        let policy = RetryPolicy {
            retries: options.retries,
            base_delay: options
                .retry_delay
                .unwrap_or_else(|| self.profile.default_retry_delay()),
        };
        execute_with_retry(conn.as_ref(), &request, &policy, work).await
    }

    /// Writes records into `store` in adaptively sized batches.
    ///
    /// Partial failures are recorded in the result, never thrown; the
    /// result's `success + failed` equals the input length.
    ///
    /// # Errors
    ///
    /// Only a failure to open the engine connection is returned as an
    /// error.
    pub async fn bulk_write(
        &self,
        store: &StoreName,
        records: Vec<Record>,
        options: BulkOptions,
    ) -> StashResult<BulkWriteResult> {
        let conn = self.connection().await?;
        let items = records.into_iter().map(BulkItem::Insert).collect();
        Ok(bulk::run(conn.as_ref(), store, items, &options, &self.profile).await)
    }

    /// Deletes keys from `store` in adaptively sized batches.
    ///
    /// Invalid (empty) keys are recorded as failed without reaching the
    /// engine.
    ///
    /// # Errors
    ///
    /// Only a failure to open the engine connection is returned as an
    /// error.
    pub async fn bulk_delete(
        &self,
        store: &StoreName,
        keys: Vec<StoreKey>,
        options: BulkOptions,
    ) -> StashResult<BulkWriteResult> {
        let conn = self.connection().await?;
        let items = keys.into_iter().map(BulkItem::Delete).collect();
        Ok(bulk::run(conn.as_ref(), store, items, &options, &self.profile).await)
    }
}
