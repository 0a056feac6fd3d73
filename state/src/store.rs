//! Base database interface shared by the metadata and transaction stores

use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::{Id, StrataResult};

/// A single write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Key-value database both sub-stores write into.
///
/// Implementations must apply a batch atomically with respect to a crash:
/// either every op is durable after `flush`, or none is.
pub trait Database: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>>;

    /// Check if a key exists
    fn has(&self, key: &[u8]) -> StrataResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Set a value
    fn put(&self, key: &[u8], value: &[u8]) -> StrataResult<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> StrataResult<()>;

    /// All entries whose key starts with `prefix`, ordered by key
    fn scan_prefix(&self, prefix: &[u8]) -> StrataResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply a batch of writes atomically
    fn apply_batch(&self, ops: Vec<BatchOp>) -> StrataResult<()>;

    /// Make previous writes durable
    fn flush(&self) -> StrataResult<()>;
}

/// Shared handle to the base database
pub type SharedDatabase = Arc<dyn Database>;

/// A logical keyspace carved out of a shared database by key prefix.
///
/// Cloning shares the underlying database. Dropping a `PrefixDb` never
/// closes the base handle.
#[derive(Clone)]
pub struct PrefixDb {
    inner: SharedDatabase,
    prefix: Vec<u8>,
}

impl PrefixDb {
    pub fn new(inner: SharedDatabase, prefix: &[u8]) -> Self {
        Self {
            inner,
            prefix: prefix.to_vec(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// The base database this keyspace lives in
    pub fn base(&self) -> &SharedDatabase {
        &self.inner
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl Database for PrefixDb {
    fn get(&self, key: &[u8]) -> StrataResult<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key))
    }

    fn has(&self, key: &[u8]) -> StrataResult<bool> {
        self.inner.has(&self.full_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StrataResult<()> {
        self.inner.put(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> StrataResult<()> {
        self.inner.delete(&self.full_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StrataResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let strip = self.prefix.len();
        Ok(self
            .inner
            .scan_prefix(&self.full_key(prefix))?
            .into_iter()
            .map(|(key, value)| (key[strip..].to_vec(), value))
            .collect())
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> StrataResult<()> {
        let ops = ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => BatchOp::Put {
                    key: self.full_key(&key),
                    value,
                },
                BatchOp::Delete { key } => BatchOp::Delete {
                    key: self.full_key(&key),
                },
            })
            .collect();
        self.inner.apply_batch(ops)
    }

    fn flush(&self) -> StrataResult<()> {
        self.inner.flush()
    }
}

/// Writes buffered in memory until the owning store is written.
///
/// Later writes to the same key replace earlier ones, so a put followed by a
/// delete leaves only the delete.
#[derive(Debug, Clone, Default)]
pub struct StateDiff {
    changes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.changes.insert(key, Some(value));
    }

    pub fn remove(&mut self, key: Vec<u8>) {
        self.changes.insert(key, None);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Batch ops for every buffered change, in key order
    pub fn to_batch(&self) -> Vec<BatchOp> {
        self.changes
            .iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                None => BatchOp::Delete { key: key.clone() },
            })
            .collect()
    }
}

/// Build a record key: `<prefix><id>`
pub fn record_key(prefix: &[u8], id: &Id) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(id.as_bytes());
    key
}

/// Parse the id out of a record key built by [`record_key`]
pub fn parse_record_key(prefix: &[u8], key: &[u8]) -> Option<Id> {
    let rest = key.strip_prefix(prefix)?;
    let bytes: [u8; 32] = rest.try_into().ok()?;
    Some(Id::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    #[test]
    fn test_prefix_db_isolates_keyspaces() {
        let base: SharedDatabase = Arc::new(MemoryDatabase::new());
        let meta = PrefixDb::new(base.clone(), b"meta/");
        let txs = PrefixDb::new(base.clone(), b"txs/");

        meta.put(b"k", b"meta-value").unwrap();
        txs.put(b"k", b"tx-value").unwrap();

        assert_eq!(meta.get(b"k").unwrap(), Some(b"meta-value".to_vec()));
        assert_eq!(txs.get(b"k").unwrap(), Some(b"tx-value".to_vec()));
        assert_eq!(base.get(b"meta/k").unwrap(), Some(b"meta-value".to_vec()));
    }

    #[test]
    fn test_prefix_scan_strips_prefix() {
        let base: SharedDatabase = Arc::new(MemoryDatabase::new());
        let txs = PrefixDb::new(base.clone(), b"txs/");
        let utxos = PrefixDb::new(base, b"txs/utxo/");

        utxos.put(b"b", b"2").unwrap();
        utxos.put(b"a", b"1").unwrap();
        txs.put(b"other", b"x").unwrap();

        let entries = utxos.scan_prefix(b"").unwrap();
        assert_eq!(
            entries,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec())
            ]
        );
    }

    #[test]
    fn test_diff_last_write_wins() {
        let mut diff = StateDiff::new();
        diff.set(b"k1".to_vec(), b"v1".to_vec());
        diff.remove(b"k1".to_vec());
        diff.set(b"k2".to_vec(), b"v2".to_vec());

        assert_eq!(diff.len(), 2);
        assert_eq!(
            diff.to_batch(),
            vec![
                BatchOp::Delete { key: b"k1".to_vec() },
                BatchOp::Put {
                    key: b"k2".to_vec(),
                    value: b"v2".to_vec()
                },
            ]
        );
    }

    #[test]
    fn test_record_key() {
        let id = Id([9u8; 32]);
        let key = record_key(b"utxo/", &id);
        assert_eq!(parse_record_key(b"utxo/", &key), Some(id));
        assert_eq!(parse_record_key(b"chain/", &key), None);
    }
}
