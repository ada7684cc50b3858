//! Storage for planner state.
//!
//! Two backends serve different deployments:
//!
//! - [`MemStore`](mem::MemStore): concurrent hashmap (DashMap), memory-only
//! - [`DurableStore`](durable::DurableStore): ACID transactions (redb)
//!
//! [`Storage`] hides the choice. Records are bincode-encoded and keyed by
//! prefix: `task/`, `plan/`, `sugg/`, `dismiss/`, `settings/`, `meta/`.

pub mod durable;
pub mod mem;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteOp {
    /// Encode `value` and put it under `key`.
    pub fn put_value<T: Serialize>(key: impl Into<Vec<u8>>, value: &T) -> StoreResult<Self> {
        Ok(Self::Put(key.into(), encode(value)?))
    }
}

/// Serialize a record for storage.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode record: {e}"),
    })
}

/// Deserialize a stored record.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to decode record: {e}"),
    })
}

/// Backend-agnostic key-value storage.
#[derive(Debug)]
pub enum Storage {
    Memory(mem::MemStore),
    Durable(durable::DurableStore),
}

impl Storage {
    /// Create a memory-only store (no persistence).
    pub fn memory_only() -> Self {
        Self::Memory(mem::MemStore::new())
    }

    /// Open (or create) a durable store under `data_dir`.
    pub fn with_persistence(data_dir: &std::path::Path) -> StoreResult<Self> {
        Ok(Self::Durable(durable::DurableStore::open(data_dir)?))
    }

    /// Whether writes survive a restart.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Durable(_))
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self {
            Self::Memory(m) => Ok(m.get(key)),
            Self::Durable(d) => d.get(key),
        }
    }

    pub fn put(&self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        match self {
            Self::Memory(m) => {
                m.put(key, value);
                Ok(())
            }
            Self::Durable(d) => d.put(key, &value),
        }
    }

    /// Delete a key. Returns whether the key existed.
    pub fn remove(&self, key: &[u8]) -> StoreResult<bool> {
        match self {
            Self::Memory(m) => Ok(m.remove(key)),
            Self::Durable(d) => d.remove(key),
        }
    }

    /// Apply all writes atomically.
    pub fn apply(&self, ops: &[WriteOp]) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        match self {
            Self::Memory(m) => {
                m.apply(ops);
                Ok(())
            }
            Self::Durable(d) => d.apply(ops),
        }
    }

    /// Scan all entries with the given key prefix, sorted by key.
    pub fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        match self {
            Self::Memory(m) => Ok(m.scan_prefix(prefix)),
            Self::Durable(d) => d.scan_prefix(prefix),
        }
    }

    /// Typed read.
    pub fn get_value<T: DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        self.get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    /// Typed write.
    pub fn put_value<T: Serialize>(&self, key: &[u8], value: &T) -> StoreResult<()> {
        self.put(key, encode(value)?)
    }

    /// Typed prefix scan; values only.
    pub fn scan_values<T: DeserializeOwned>(&self, prefix: &[u8]) -> StoreResult<Vec<T>> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(_, v)| decode(&v))
            .collect()
    }
}
