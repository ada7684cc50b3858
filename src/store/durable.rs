//! ACID-durable key-value store backed by redb.
//!
//! All planner state lives in one byte-keyed table; subsystems carve out key
//! spaces by prefix. Multi-key writes go through [`DurableStore::apply`] so a
//! plan commit and its task updates land in a single transaction.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};

use super::WriteOp;
use crate::error::StoreError;
use crate::store::StoreResult;

/// Table for all planner records (prefixed keys → bincode values).
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

fn redb_err(op: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// ACID-durable store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("lifeplan.redb");
        let db = Database::create(&db_path).map_err(|e| StoreError::Unavailable {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Make sure the table exists so read transactions never see it missing.
        let txn = db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.open_table(RECORDS)
            .map_err(|e| redb_err("open_table", e))?;
        txn.commit().map_err(|e| redb_err("commit", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Store a key-value pair with full ACID guarantees.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.apply(&[WriteOp::Put(key.to_vec(), value.to_vec())])
    }

    /// Read a value by key. Returns `Ok(None)` if the key doesn't exist.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(RECORDS)
            .map_err(|e| redb_err("open_table", e))?;
        let result = table.get(key).map_err(|e| redb_err("get", e))?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    /// Delete a key. Returns whether the key existed.
    pub fn remove(&self, key: &[u8]) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        let existed = {
            let mut table = txn
                .open_table(RECORDS)
                .map_err(|e| redb_err("open_table", e))?;
            let result = table.remove(key).map_err(|e| redb_err("remove", e))?;
            result.is_some()
        };
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(existed)
    }

    /// Apply a batch of writes in one transaction: all or nothing.
    pub fn apply(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(RECORDS)
                .map_err(|e| redb_err("open_table", e))?;
            for op in ops {
                match op {
                    WriteOp::Put(key, value) => {
                        table
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(|e| redb_err("insert", e))?;
                    }
                    WriteOp::Delete(key) => {
                        table
                            .remove(key.as_slice())
                            .map_err(|e| redb_err("remove", e))?;
                    }
                }
            }
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order,
    /// read from one snapshot.
    pub fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(RECORDS)
            .map_err(|e| redb_err("open_table", e))?;
        let mut out = Vec::new();
        for entry in table.range(prefix..).map_err(|e| redb_err("range", e))? {
            let (k, v) = entry.map_err(|e| redb_err("range", e))?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), v.value().to_vec()));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        store.put(b"hello", b"world").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));

        assert!(store.remove(b"hello").unwrap());
        assert_eq!(store.get(b"hello").unwrap(), None);
        assert!(!store.remove(b"hello").unwrap());
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.put(b"persist_key", b"persist_val").unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get(b"persist_key").unwrap(),
            Some(b"persist_val".to_vec())
        );
    }

    #[test]
    fn batch_applies_puts_and_deletes() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store.put(b"task/a", b"1").unwrap();

        store
            .apply(&[
                WriteOp::Delete(b"task/a".to_vec()),
                WriteOp::Put(b"task/b".to_vec(), b"2".to_vec()),
                WriteOp::Put(b"plan/x".to_vec(), b"3".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get(b"task/a").unwrap(), None);
        assert_eq!(store.get(b"task/b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"plan/x").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn scan_prefix_stops_at_boundary() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store.put(b"task/u1/a", b"1").unwrap();
        store.put(b"task/u1/b", b"2").unwrap();
        store.put(b"task/u2/a", b"3").unwrap();
        store.put(b"tasks", b"4").unwrap();

        let hits = store.scan_prefix(b"task/u1/").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"task/u1/a".to_vec());
        assert_eq!(hits[1].1, b"2".to_vec());
    }
}
