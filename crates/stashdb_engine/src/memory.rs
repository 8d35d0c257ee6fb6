//! In-memory storage engine for testing and ephemeral databases.

use crate::error::{EngineError, EngineResult};
use crate::txn::{
    Connection, EngineTransaction, GetReceipt, OpReceipt, SignalWatcher, StorageEngine, TxnSignal,
};
use crate::types::{Record, StoreKey, StoreName, TransactionMode};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// An in-memory key-ordered storage engine.
///
/// Stores live in ordered maps and transactions follow the same
/// auto-commit contract as the platform engines StashDB wraps: a
/// transaction commits once every issued operation has settled, and a
/// transaction that issues no operations before its first yield commits
/// empty. Operations issued after that point settle with
/// [`EngineError::TransactionInactive`].
///
/// # Fault Injection
///
/// Tests can shape failure behavior without touching internals:
///
/// - [`set_op_delay`](Self::set_op_delay) makes every operation take a
///   fixed amount of (tokio) time, for timeout scenarios
/// - [`fail_transactions`](Self::fail_transactions) makes the next `n`
///   transactions fail with an engine-level error signal
/// - [`transactions_started`](Self::transactions_started) and
///   [`transactions_aborted`](Self::transactions_aborted) expose call
///   counters for retry-bound and abort assertions
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    stores: RwLock<BTreeMap<StoreName, BTreeMap<StoreKey, Vec<u8>>>>,
    faults: Mutex<FaultPlan>,
    txns_started: AtomicU64,
    txns_aborted: AtomicU64,
}

#[derive(Debug, Default)]
struct FaultPlan {
    op_delay: Option<Duration>,
    failures: VecDeque<EngineError>,
}

impl MemoryEngine {
    /// Creates an engine with no object stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the given object stores.
    #[must_use]
    pub fn with_stores<I, S>(stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StoreName>,
    {
        let engine = Self::new();
        for store in stores {
            engine.create_store(store.into());
        }
        engine
    }

    /// Creates an object store. Creating an existing store is a no-op.
    pub fn create_store(&self, store: StoreName) {
        self.shared.stores.write().entry(store).or_default();
    }

    /// Writes records directly into a store, bypassing transactions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreNotFound`] for an unknown store.
    pub fn seed<I>(&self, store: &StoreName, records: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut stores = self.shared.stores.write();
        let map = stores.get_mut(store).ok_or_else(|| EngineError::StoreNotFound {
            store: store.clone(),
        })?;
        for record in records {
            map.insert(record.key, record.value);
        }
        Ok(())
    }

    /// Makes every operation take `delay` of tokio time, or restores
    /// immediate settlement with `None`.
    pub fn set_op_delay(&self, delay: Option<Duration>) {
        self.shared.faults.lock().op_delay = delay;
    }

    /// Makes the next `n` transactions fail with `error` as their
    /// terminal signal.
    pub fn fail_transactions(&self, n: usize, error: EngineError) {
        let mut faults = self.shared.faults.lock();
        for _ in 0..n {
            faults.failures.push_back(error.clone());
        }
    }

    /// Number of transactions begun against this engine.
    #[must_use]
    pub fn transactions_started(&self) -> u64 {
        self.shared.txns_started.load(Ordering::SeqCst)
    }

    /// Number of transactions explicitly aborted.
    #[must_use]
    pub fn transactions_aborted(&self) -> u64 {
        self.shared.txns_aborted.load(Ordering::SeqCst)
    }

    /// Returns the committed value for a key, if present.
    #[must_use]
    pub fn committed(&self, store: &StoreName, key: &StoreKey) -> Option<Vec<u8>> {
        self.shared.stores.read().get(store)?.get(key).cloned()
    }

    /// Committed keys of a store in ascending key order.
    #[must_use]
    pub fn committed_keys(&self, store: &StoreName) -> Vec<StoreKey> {
        self.shared
            .stores
            .read()
            .get(store)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed records in a store (0 for unknown stores).
    #[must_use]
    pub fn store_len(&self, store: &StoreName) -> usize {
        self.shared
            .stores
            .read()
            .get(store)
            .map_or(0, BTreeMap::len)
    }
}

impl StorageEngine for MemoryEngine {
    type Conn = MemoryConnection;

    fn connect(&self) -> impl std::future::Future<Output = EngineResult<Self::Conn>> + Send {
        let shared = Arc::clone(&self.shared);
        async move { Ok(MemoryConnection { shared }) }
    }
}

/// An open connection to a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Connection for MemoryConnection {
    type Txn = MemoryTransaction;

    fn begin(&self, stores: &[StoreName], mode: TransactionMode) -> EngineResult<Self::Txn> {
        if stores.is_empty() {
            return Err(EngineError::unknown(
                "InvalidAccessError",
                "transaction scope is empty",
            ));
        }
        {
            let known = self.shared.stores.read();
            for store in stores {
                if !known.contains_key(store) {
                    return Err(EngineError::StoreNotFound {
                        store: store.clone(),
                    });
                }
            }
        }
        self.shared.txns_started.fetch_add(1, Ordering::SeqCst);

        let (planned_failure, op_delay) = {
            let mut faults = self.shared.faults.lock();
            (faults.failures.pop_front(), faults.op_delay)
        };
        let inner = Arc::new(TxnInner {
            shared: Arc::clone(&self.shared),
            scope: stores.to_vec(),
            mode,
            op_delay,
            state: Mutex::new(TxnState {
                planned_failure,
                ..TxnState::default()
            }),
        });
        TxnInner::spawn_idle_probe(&inner);
        Ok(MemoryTransaction { inner })
    }
}

/// A live transaction against a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    inner: Arc<TxnInner>,
}

#[derive(Debug)]
struct TxnInner {
    shared: Arc<Shared>,
    scope: Vec<StoreName>,
    mode: TransactionMode,
    op_delay: Option<Duration>,
    state: Mutex<TxnState>,
}

#[derive(Debug, Default)]
struct TxnState {
    /// Writes applied atomically at commit. `None` payload is a delete.
    staged: Vec<(StoreName, StoreKey, Option<Vec<u8>>)>,
    pending_ops: usize,
    /// Bumped on every registration. The commit paths snapshot it before
    /// yielding and re-check it after, so a commit decision made while
    /// the issuing code is still queuing operations on another worker is
    /// discarded instead of acted on.
    generation: u64,
    terminal: Option<TxnSignal>,
    watchers: Vec<oneshot::Sender<TxnSignal>>,
    planned_failure: Option<EngineError>,
}

impl TxnInner {
    /// Commits empty transactions: the engine auto-commits a transaction
    /// that has not issued any operation by its first yield point.
    fn spawn_idle_probe(inner: &Arc<Self>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let mut state = inner.state.lock();
            if state.terminal.is_none() && state.generation == 0 {
                if let Some(error) = state.planned_failure.take() {
                    Self::finish(&mut state, TxnSignal::Error(error));
                } else {
                    inner.commit_locked(&mut state);
                }
            }
        });
    }

    /// Registers a new operation, or settles `tx` immediately when the
    /// transaction is already terminal. Returns the sender when the
    /// operation may proceed.
    fn register_op<T>(
        &self,
        tx: oneshot::Sender<Result<T, EngineError>>,
    ) -> Option<oneshot::Sender<Result<T, EngineError>>> {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            let _ = tx.send(Err(EngineError::TransactionInactive));
            return None;
        }
        state.generation += 1;
        state.pending_ops += 1;
        Some(tx)
    }

    fn op_settled(self: Arc<Self>) {
        let generation = {
            let mut state = self.state.lock();
            state.pending_ops -= 1;
            if state.pending_ops > 0 || state.terminal.is_some() {
                return;
            }
            state.generation
        };
        // The commit decision is deferred one scheduler pass: the issuing
        // code may still be queuing further operations on another worker,
        // and those must join this transaction, not fail as inactive.
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let mut state = self.state.lock();
            if state.terminal.is_none()
                && state.pending_ops == 0
                && state.generation == generation
            {
                self.commit_locked(&mut state);
            }
        });
    }

    fn commit_locked(&self, state: &mut TxnState) {
        let mut stores = self.shared.stores.write();
        for (store, key, payload) in state.staged.drain(..) {
            let Some(map) = stores.get_mut(&store) else {
                continue;
            };
            match payload {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        drop(stores);
        tracing::debug!(scope = ?self.scope, "transaction committed");
        Self::finish(state, TxnSignal::Complete);
    }

    fn finish(state: &mut TxnState, signal: TxnSignal) {
        state.terminal = Some(signal.clone());
        for watcher in state.watchers.drain(..) {
            let _ = watcher.send(signal.clone());
        }
    }

    /// Shared preamble for every operation: planned transaction failures
    /// fire on the first processed operation, and terminal transactions
    /// reject everything.
    fn check_live(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if let Some(error) = state.planned_failure.take() {
            state.staged.clear();
            Self::finish(&mut state, TxnSignal::Error(error.clone()));
            return Err(error);
        }
        match &state.terminal {
            None => Ok(()),
            Some(TxnSignal::Error(error)) => Err(error.clone()),
            Some(TxnSignal::Aborted(_)) => Err(EngineError::aborted("transaction aborted")),
            Some(TxnSignal::Complete) => Err(EngineError::TransactionInactive),
        }
    }

    fn check_scope(&self, store: &StoreName) -> Result<(), EngineError> {
        if self.scope.contains(store) {
            Ok(())
        } else {
            Err(EngineError::StoreNotFound {
                store: store.clone(),
            })
        }
    }

    fn apply_insert(&self, store: &StoreName, record: Record) -> Result<(), EngineError> {
        self.check_live()?;
        if !self.mode.is_write() {
            return Err(EngineError::ReadOnly);
        }
        self.check_scope(store)?;
        if !record.key.is_valid() {
            return Err(EngineError::unknown("DataError", "invalid key"));
        }

        let mut state = self.state.lock();
        let staged_last = state
            .staged
            .iter()
            .rev()
            .find(|(s, k, _)| s == store && k == &record.key);
        let duplicate = match staged_last {
            Some((_, _, Some(_))) => true,
            Some((_, _, None)) => false,
            None => self
                .shared
                .stores
                .read()
                .get(store)
                .is_some_and(|map| map.contains_key(&record.key)),
        };
        if duplicate {
            return Err(EngineError::ConstraintViolation {
                store: store.clone(),
                key: record.key,
            });
        }
        state
            .staged
            .push((store.clone(), record.key, Some(record.value)));
        Ok(())
    }

    fn apply_delete(&self, store: &StoreName, key: &StoreKey) -> Result<(), EngineError> {
        self.check_live()?;
        if !self.mode.is_write() {
            return Err(EngineError::ReadOnly);
        }
        self.check_scope(store)?;
        if !key.is_valid() {
            return Err(EngineError::unknown("DataError", "invalid key"));
        }
        // Deleting an absent key settles successfully.
        self.state
            .lock()
            .staged
            .push((store.clone(), key.clone(), None));
        Ok(())
    }

    fn apply_get(&self, store: &StoreName, key: &StoreKey) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_live()?;
        self.check_scope(store)?;

        let state = self.state.lock();
        if let Some((_, _, payload)) = state
            .staged
            .iter()
            .rev()
            .find(|(s, k, _)| s == store && k == key)
        {
            return Ok(payload.clone());
        }
        Ok(self
            .shared
            .stores
            .read()
            .get(store)
            .and_then(|map| map.get(key).cloned()))
    }
}

impl EngineTransaction for MemoryTransaction {
    fn insert(&self, store: &StoreName, record: Record) -> OpReceipt {
        let (tx, rx) = oneshot::channel();
        if let Some(tx) = self.inner.register_op(tx) {
            let inner = Arc::clone(&self.inner);
            let store = store.clone();
            tokio::spawn(async move {
                if let Some(delay) = inner.op_delay {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(inner.apply_insert(&store, record));
                inner.op_settled();
            });
        }
        OpReceipt::new(rx)
    }

    fn delete(&self, store: &StoreName, key: &StoreKey) -> OpReceipt {
        let (tx, rx) = oneshot::channel();
        if let Some(tx) = self.inner.register_op(tx) {
            let inner = Arc::clone(&self.inner);
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                if let Some(delay) = inner.op_delay {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(inner.apply_delete(&store, &key));
                inner.op_settled();
            });
        }
        OpReceipt::new(rx)
    }

    fn get(&self, store: &StoreName, key: &StoreKey) -> GetReceipt {
        let (tx, rx) = oneshot::channel();
        if let Some(tx) = self.inner.register_op(tx) {
            let inner = Arc::clone(&self.inner);
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                if let Some(delay) = inner.op_delay {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(inner.apply_get(&store, &key));
                inner.op_settled();
            });
        }
        GetReceipt::new(rx)
    }

    fn abort(&self) {
        let mut state = self.inner.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.staged.clear();
        self.inner.shared.txns_aborted.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(scope = ?self.inner.scope, "transaction aborted");
        TxnInner::finish(&mut state, TxnSignal::Aborted(None));
    }

    fn watch(&self) -> SignalWatcher {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.lock();
        match &state.terminal {
            Some(signal) => {
                let _ = tx.send(signal.clone());
            }
            None => state.watchers.push(tx),
        }
        SignalWatcher::new(rx)
    }
}
