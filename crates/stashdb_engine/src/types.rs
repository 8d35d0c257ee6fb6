//! Common types shared across the engine contract.

use std::fmt;

/// The name of an object store inside a database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreName(String);

impl StoreName {
    /// Creates a new store name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An ordered key within a store.
///
/// Keys are opaque byte strings compared lexicographically, which is the
/// order the engine iterates them in. The empty key is reserved and never
/// valid; it is the engine-level rendition of a missing key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns `true` when the key can be submitted to the engine.
    ///
    /// The empty key is invalid and must be rejected before it reaches
    /// the engine.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for StoreKey {
    fn from(key: &str) -> Self {
        Self(key.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for StoreKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A keyed record stored in an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record's key.
    pub key: StoreKey,
    /// The record's value bytes.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(key: StoreKey, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

/// The access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only; write operations are rejected per item.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl TransactionMode {
    /// Returns `true` for [`TransactionMode::ReadWrite`].
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("readonly"),
            Self::ReadWrite => f.write_str("readwrite"),
        }
    }
}
