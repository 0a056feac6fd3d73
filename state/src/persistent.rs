//! Persistent database backed by sled

use sled::Db;
use std::path::Path;
use std::sync::Arc;
use strata_core::{StrataError, StrataResult};

use crate::store::{BatchOp, Database};

/// Persistent database backed by a sled instance.
///
/// All keyspaces share sled's default tree; separation is by key prefix.
pub struct SledDatabase {
    db: Db,
}

impl SledDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> StrataResult<Self> {
        let db = sled::open(path).map_err(|e| StrataError::StorageError(e.to_string()))?;
        Ok(Self { db })
    }

    /// Database size estimate in bytes
    pub fn size_on_disk(&self) -> StrataResult<u64> {
        self.db
            .size_on_disk()
            .map_err(|e| StrataError::StorageError(e.to_string()))
    }
}

impl Database for SledDatabase {
    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(|e| StrataError::StorageError(e.to_string()))
    }

    fn has(&self, key: &[u8]) -> StrataResult<bool> {
        self.db
            .contains_key(key)
            .map_err(|e| StrataError::StorageError(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StrataResult<()> {
        self.db
            .insert(key, value)
            .map_err(|e| StrataError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StrataResult<()> {
        self.db
            .remove(key)
            .map_err(|e| StrataError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StrataResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix)
            .map(|result| result.map(|(key, value)| (key.to_vec(), value.to_vec())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StrataError::StorageError(e.to_string()))
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> StrataResult<()> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.insert(key, value),
                BatchOp::Delete { key } => batch.remove(key),
            }
        }

        self.db
            .apply_batch(batch)
            .map_err(|e| StrataError::StorageError(e.to_string()))
    }

    fn flush(&self) -> StrataResult<()> {
        self.db
            .flush()
            .map_err(|e| StrataError::StorageError(e.to_string()))?;
        Ok(())
    }
}

/// Thread-safe persistent database wrapper
pub type SharedSledDatabase = Arc<SledDatabase>;

/// Open a shared persistent database
pub fn create_sled_db<P: AsRef<Path>>(path: P) -> StrataResult<SharedSledDatabase> {
    Ok(Arc::new(SledDatabase::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sled_db_basic() {
        let tmp = TempDir::new().unwrap();
        let db = create_sled_db(tmp.path()).unwrap();

        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        db.flush().unwrap();
        assert!(db.size_on_disk().unwrap() > 0);

        db.delete(b"key1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_sled_db_reopen() {
        let tmp = TempDir::new().unwrap();

        {
            let db = SledDatabase::open(tmp.path()).unwrap();
            db.put(b"key1", b"value1").unwrap();
            db.apply_batch(vec![BatchOp::Put {
                key: b"k2".to_vec(),
                value: b"v2".to_vec(),
            }])
            .unwrap();
            db.flush().unwrap();
        }

        {
            let db = SledDatabase::open(tmp.path()).unwrap();
            assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
            assert_eq!(db.get(b"k2").unwrap(), Some(b"v2".to_vec()));
            assert_eq!(db.scan_prefix(b"k").unwrap().len(), 2);
        }
    }
}
