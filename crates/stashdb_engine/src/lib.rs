//! # StashDB Engine
//!
//! Storage engine contract for StashDB.
//!
//! This crate defines the lowest-level abstraction StashDB builds on: an
//! asynchronous, key-ordered storage engine with an event-based transaction
//! model. The engine commits a transaction on its own once every operation
//! issued inside it has settled; callers observe the terminal outcome
//! through a one-shot signal rather than an explicit commit call.
//!
//! ## Design Principles
//!
//! - Engines are key-ordered stores of opaque byte values
//! - Transactions are scoped to named stores and a mode, and auto-commit
//! - Per-operation results are delivered through [`OpReceipt`] futures; a
//!   single failed operation does not abort its siblings
//! - Exactly one terminal [`TxnSignal`] is delivered per transaction
//! - Engines must be `Send + Sync` for concurrent use
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - In-memory engine for tests and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use stashdb_engine::{
//!     Connection, EngineTransaction, MemoryEngine, Record, StorageEngine, StoreKey, StoreName,
//!     TransactionMode, TxnSignal,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = MemoryEngine::with_stores(["items"]);
//! let conn = engine.connect().await.unwrap();
//! let store = StoreName::new("items");
//!
//! let txn = conn.begin(&[store.clone()], TransactionMode::ReadWrite).unwrap();
//! let receipt = txn.insert(&store, Record::new(StoreKey::from("k1"), b"v1".to_vec()));
//! receipt.settled().await.unwrap();
//! assert!(matches!(txn.watch().wait().await, TxnSignal::Complete));
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod txn;
mod types;

pub use error::{EngineError, EngineResult};
pub use memory::{MemoryConnection, MemoryEngine, MemoryTransaction};
pub use txn::{
    Connection, EngineTransaction, GetReceipt, OpReceipt, SignalWatcher, StorageEngine, TxnSignal,
};
pub use types::{Record, StoreKey, StoreName, TransactionMode};
