//! In-memory storage backed by DashMap.
//!
//! Used for memory-only planners (tests, `--memory`). All data is lost on
//! process exit. Batches and prefix scans are serialized against each other
//! through a gate so a scan never observes half of a batch.

use std::sync::RwLock;

use dashmap::DashMap;

use super::WriteOp;

/// Concurrent in-memory store using a sharded hashmap.
#[derive(Debug, Default)]
pub struct MemStore {
    data: DashMap<Vec<u8>, Vec<u8>>,
    gate: RwLock<()>,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn put(&self, key: &[u8], value: Vec<u8>) {
        let _g = self.gate.read().unwrap_or_else(|p| p.into_inner());
        self.data.insert(key.to_vec(), value);
    }

    /// Get a clone of the stored value.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).map(|v| v.value().clone())
    }

    /// Remove a key, returning whether it existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let _g = self.gate.read().unwrap_or_else(|p| p.into_inner());
        self.data.remove(key).is_some()
    }

    /// Apply a batch atomically with respect to [`scan_prefix`](Self::scan_prefix).
    pub fn apply(&self, ops: &[WriteOp]) {
        let _g = self.gate.write().unwrap_or_else(|p| p.into_inner());
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    self.data.insert(key.clone(), value.clone());
                }
                WriteOp::Delete(key) => {
                    self.data.remove(key);
                }
            }
        }
    }

    /// All entries whose key starts with `prefix`, sorted by key.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let _g = self.gate.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<_> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
