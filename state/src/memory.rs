//! In-memory database for testing and ephemeral nodes

use dashmap::DashMap;
use parking_lot::Mutex;
use strata_core::StrataResult;

use crate::store::{BatchOp, Database};

/// In-memory database
pub struct MemoryDatabase {
    data: DashMap<Vec<u8>, Vec<u8>>,
    // keeps prefix scans from observing half of a batch
    batch_lock: Mutex<()>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            batch_lock: Mutex::new(()),
        }
    }

    pub fn with_data(data: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let db = Self::new();
        for (key, value) in data {
            db.data.insert(key, value);
        }
        db
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemoryDatabase {
    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn has(&self, key: &[u8]) -> StrataResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StrataResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StrataResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StrataResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let _guard = self.batch_lock.lock();
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> StrataResult<()> {
        let _guard = self.batch_lock.lock();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> StrataResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_db_basic() {
        let db = MemoryDatabase::new();

        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));

        db.delete(b"key1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), None);
        assert!(db.is_empty());
    }

    #[test]
    fn test_memory_db_batch() {
        let db = MemoryDatabase::with_data(vec![(b"k0".to_vec(), b"v0".to_vec())]);

        let ops = vec![
            BatchOp::Put {
                key: b"k1".to_vec(),
                value: b"v1".to_vec(),
            },
            BatchOp::Put {
                key: b"k2".to_vec(),
                value: b"v2".to_vec(),
            },
            BatchOp::Delete { key: b"k0".to_vec() },
        ];
        db.apply_batch(ops).unwrap();

        assert!(db.has(b"k1").unwrap());
        assert!(db.has(b"k2").unwrap());
        assert!(!db.has(b"k0").unwrap());
        assert_eq!(db.len(), 2);
    }
}
