//! Engine, connection, and transaction traits plus their signal types.

use crate::error::{EngineError, EngineResult};
use crate::types::{Record, StoreKey, StoreName, TransactionMode};
use std::future::Future;
use tokio::sync::oneshot;

/// The terminal signal a transaction delivers exactly once.
#[derive(Debug, Clone)]
pub enum TxnSignal {
    /// All issued operations settled and the transaction committed.
    Complete,
    /// The engine failed the transaction; nothing was committed.
    Error(EngineError),
    /// The transaction was aborted, either explicitly or by the engine.
    ///
    /// `None` means the abort was explicitly requested by the caller.
    Aborted(Option<EngineError>),
}

/// The pending result of a single write or delete operation.
///
/// Receipts settle individually: a failed operation settles its own
/// receipt with an error without aborting sibling operations in the same
/// transaction.
#[derive(Debug)]
pub struct OpReceipt {
    rx: oneshot::Receiver<Result<(), EngineError>>,
}

impl OpReceipt {
    /// Wraps a receiver that the engine will settle.
    #[must_use]
    pub fn new(rx: oneshot::Receiver<Result<(), EngineError>>) -> Self {
        Self { rx }
    }

    /// Waits for the operation to settle.
    ///
    /// A transaction torn down before the operation settled reads as an
    /// abort.
    pub async fn settled(self) -> Result<(), EngineError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(EngineError::aborted("transaction ended before the operation settled")))
    }
}

/// The pending result of a single read operation.
#[derive(Debug)]
pub struct GetReceipt {
    rx: oneshot::Receiver<Result<Option<Vec<u8>>, EngineError>>,
}

impl GetReceipt {
    /// Wraps a receiver that the engine will settle.
    #[must_use]
    pub fn new(rx: oneshot::Receiver<Result<Option<Vec<u8>>, EngineError>>) -> Self {
        Self { rx }
    }

    /// Waits for the read to settle.
    pub async fn settled(self) -> Result<Option<Vec<u8>>, EngineError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(EngineError::aborted("transaction ended before the operation settled")))
    }
}

/// A one-shot view of a transaction's terminal signal.
#[derive(Debug)]
pub struct SignalWatcher {
    rx: oneshot::Receiver<TxnSignal>,
}

impl SignalWatcher {
    /// Wraps a receiver the engine resolves with the terminal signal.
    #[must_use]
    pub fn new(rx: oneshot::Receiver<TxnSignal>) -> Self {
        Self { rx }
    }

    /// Waits for the terminal signal.
    ///
    /// A transaction dropped without signalling reads as an abort.
    pub async fn wait(self) -> TxnSignal {
        self.rx.await.unwrap_or(TxnSignal::Aborted(None))
    }
}

/// An asynchronous key-ordered storage engine.
pub trait StorageEngine: Send + Sync + 'static {
    /// The connection type this engine hands out.
    type Conn: Connection;

    /// Opens a connection to the engine.
    fn connect(&self) -> impl Future<Output = EngineResult<Self::Conn>> + Send;
}

/// An open connection capable of starting transactions.
pub trait Connection: Send + Sync + 'static {
    /// The transaction handle type.
    type Txn: EngineTransaction;

    /// Begins a transaction scoped to `stores` in the given mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is empty or names an unknown store.
    fn begin(&self, stores: &[StoreName], mode: TransactionMode) -> EngineResult<Self::Txn>;
}

/// A live transaction handle.
///
/// The engine auto-commits once every issued operation has settled, so
/// callers must issue all operations before suspending; an operation
/// issued after the engine decided to commit settles with
/// [`EngineError::TransactionInactive`].
pub trait EngineTransaction: Send + Sync + 'static {
    /// Inserts a record, failing the item on a duplicate key.
    fn insert(&self, store: &StoreName, record: Record) -> OpReceipt;

    /// Deletes a key. Deleting an absent key settles successfully.
    fn delete(&self, store: &StoreName, key: &StoreKey) -> OpReceipt;

    /// Reads a value, staged writes included.
    fn get(&self, store: &StoreName, key: &StoreKey) -> GetReceipt;

    /// Requests an abort. Idempotent; a no-op once terminal.
    fn abort(&self);

    /// Returns a watcher for the terminal signal.
    ///
    /// Watching an already-terminal transaction resolves immediately.
    fn watch(&self) -> SignalWatcher;
}
