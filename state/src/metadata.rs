//! Chain metadata state: timestamp, supply, last accepted block

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::{Amount, BlockId, Id, StrataError, StrataResult, Timestamp};
use tracing::{debug, info, warn};

use crate::store::{BatchOp, Database, PrefixDb, SharedDatabase};

/// Keyspace of the metadata store in the base database
pub const METADATA_PREFIX: &[u8] = b"metadata/";

const TIMESTAMP_KEY: &[u8] = b"timestamp";
const CURRENT_SUPPLY_KEY: &[u8] = b"current_supply";
const LAST_ACCEPTED_KEY: &[u8] = b"last_accepted";
const INITIALIZED_KEY: &[u8] = b"initialized";

/// Metadata read and updated while executing blocks
pub trait MetadataMutable: Send + Sync {
    /// Current chain time
    fn timestamp(&self) -> Timestamp;

    fn set_timestamp(&self, timestamp: Timestamp);

    /// Current token supply, including rewards promised to stakers
    fn current_supply(&self) -> Amount;

    fn set_current_supply(&self, supply: Amount);
}

/// All metadata queries and updates
pub trait MetadataContent: MetadataMutable {
    fn last_accepted(&self) -> BlockId;

    fn set_last_accepted(&self, block_id: BlockId);

    /// Whether a genesis sync has ever been persisted to the database
    fn is_initialized(&self) -> StrataResult<bool>;

    /// Persist the marker checked by [`MetadataContent::is_initialized`]
    fn mark_initialized(&self) -> StrataResult<()>;
}

/// Metadata store lifecycle
pub trait MetadataStore: MetadataContent {
    fn sync_genesis(
        &self,
        genesis_block_id: BlockId,
        timestamp: Timestamp,
        initial_supply: Amount,
    ) -> StrataResult<()>;

    fn load_metadata(&self) -> StrataResult<()>;

    fn write_metadata(&self) -> StrataResult<()>;

    fn close_metadata(&self) -> StrataResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
struct Fields {
    timestamp: Timestamp,
    current_supply: Amount,
    last_accepted: BlockId,
    dirty: bool,
}

/// Metadata store persisted under [`METADATA_PREFIX`]
pub struct DataState {
    db: PrefixDb,
    fields: RwLock<Fields>,
    closed: AtomicBool,
}

impl DataState {
    pub fn new(base_db: SharedDatabase) -> Self {
        Self {
            db: PrefixDb::new(base_db, METADATA_PREFIX),
            fields: RwLock::new(Fields::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// The base database shared with the transaction store
    pub fn base_db(&self) -> &SharedDatabase {
        self.db.base()
    }

    /// Whether in-memory values differ from what was last written
    pub fn is_dirty(&self) -> bool {
        self.fields.read().dirty
    }

    fn ensure_open(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::Closed);
        }
        Ok(())
    }

    fn read_u64(&self, key: &[u8], name: &str) -> StrataResult<u64> {
        let bytes = self
            .db
            .get(key)?
            .ok_or_else(|| StrataError::MissingMetadata(name.to_string()))?;
        let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            StrataError::StateCorruption(format!("{} has length {}", name, bytes.len()))
        })?;
        Ok(u64::from_be_bytes(arr))
    }

    fn read_id(&self, key: &[u8], name: &str) -> StrataResult<Id> {
        let bytes = self
            .db
            .get(key)?
            .ok_or_else(|| StrataError::MissingMetadata(name.to_string()))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            StrataError::StateCorruption(format!("{} has length {}", name, bytes.len()))
        })?;
        Ok(Id::from_bytes(arr))
    }
}

impl MetadataMutable for DataState {
    fn timestamp(&self) -> Timestamp {
        self.fields.read().timestamp
    }

    fn set_timestamp(&self, timestamp: Timestamp) {
        let mut fields = self.fields.write();
        fields.timestamp = timestamp;
        fields.dirty = true;
    }

    fn current_supply(&self) -> Amount {
        self.fields.read().current_supply
    }

    fn set_current_supply(&self, supply: Amount) {
        let mut fields = self.fields.write();
        fields.current_supply = supply;
        fields.dirty = true;
    }
}

impl MetadataContent for DataState {
    fn last_accepted(&self) -> BlockId {
        self.fields.read().last_accepted
    }

    fn set_last_accepted(&self, block_id: BlockId) {
        let mut fields = self.fields.write();
        fields.last_accepted = block_id;
        fields.dirty = true;
    }

    fn is_initialized(&self) -> StrataResult<bool> {
        self.db.has(INITIALIZED_KEY)
    }

    fn mark_initialized(&self) -> StrataResult<()> {
        self.ensure_open()?;
        self.db.put(INITIALIZED_KEY, &[1])?;
        self.db.flush()
    }
}

impl MetadataStore for DataState {
    fn sync_genesis(
        &self,
        genesis_block_id: BlockId,
        timestamp: Timestamp,
        initial_supply: Amount,
    ) -> StrataResult<()> {
        self.ensure_open()?;
        *self.fields.write() = Fields {
            timestamp,
            current_supply: initial_supply,
            last_accepted: genesis_block_id,
            dirty: true,
        };

        info!(
            block = %genesis_block_id,
            timestamp = %timestamp,
            supply = %initial_supply,
            "Synced genesis metadata"
        );
        Ok(())
    }

    fn load_metadata(&self) -> StrataResult<()> {
        self.ensure_open()?;
        let timestamp = Timestamp::from_secs(self.read_u64(TIMESTAMP_KEY, "timestamp")?);
        let current_supply = Amount::new(self.read_u64(CURRENT_SUPPLY_KEY, "current_supply")?);
        let last_accepted = self.read_id(LAST_ACCEPTED_KEY, "last_accepted")?;

        *self.fields.write() = Fields {
            timestamp,
            current_supply,
            last_accepted,
            dirty: false,
        };

        debug!(
            timestamp = %timestamp,
            supply = %current_supply,
            last_accepted = %last_accepted,
            "Loaded metadata"
        );
        Ok(())
    }

    fn write_metadata(&self) -> StrataResult<()> {
        self.ensure_open()?;
        let fields = *self.fields.read();
        if !fields.dirty {
            return Ok(());
        }

        let batch = vec![
            BatchOp::Put {
                key: TIMESTAMP_KEY.to_vec(),
                value: fields.timestamp.as_secs().to_be_bytes().to_vec(),
            },
            BatchOp::Put {
                key: CURRENT_SUPPLY_KEY.to_vec(),
                value: fields.current_supply.0.to_be_bytes().to_vec(),
            },
            BatchOp::Put {
                key: LAST_ACCEPTED_KEY.to_vec(),
                value: fields.last_accepted.as_bytes().to_vec(),
            },
        ];
        self.db.apply_batch(batch)?;
        self.db.flush()?;

        // a setter may have run since the snapshot was taken
        let mut current = self.fields.write();
        if current.timestamp == fields.timestamp
            && current.current_supply == fields.current_supply
            && current.last_accepted == fields.last_accepted
        {
            current.dirty = false;
        }

        debug!(timestamp = %fields.timestamp, "Wrote metadata");
        Ok(())
    }

    fn close_metadata(&self) -> StrataResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StrataError::Closed);
        }
        if self.is_dirty() {
            warn!("Closing metadata with unwritten changes");
        }
        debug!("Closed metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use std::sync::Arc;

    fn base() -> SharedDatabase {
        Arc::new(MemoryDatabase::new())
    }

    #[test]
    fn test_genesis_then_write_then_load() {
        let db = base();
        let block = Id([3u8; 32]);

        let metadata = DataState::new(db.clone());
        metadata
            .sync_genesis(block, Timestamp::from_secs(1_000), Amount::new(1_000_000))
            .unwrap();
        assert!(metadata.is_dirty());
        metadata.write_metadata().unwrap();
        assert!(!metadata.is_dirty());

        let reloaded = DataState::new(db);
        reloaded.load_metadata().unwrap();
        assert_eq!(reloaded.timestamp(), Timestamp::from_secs(1_000));
        assert_eq!(reloaded.current_supply(), Amount::new(1_000_000));
        assert_eq!(reloaded.last_accepted(), block);
    }

    #[test]
    fn test_load_from_empty_db_is_missing() {
        let metadata = DataState::new(base());
        let err = metadata.load_metadata().unwrap_err();
        assert!(matches!(err, StrataError::MissingMetadata(ref key) if key == "timestamp"));
    }

    #[test]
    fn test_corrupt_entry_detected() {
        let db = base();
        db.put(b"metadata/timestamp", b"short").unwrap();
        let metadata = DataState::new(db);
        assert!(matches!(
            metadata.load_metadata(),
            Err(StrataError::StateCorruption(_))
        ));
    }

    #[test]
    fn test_initialized_marker() {
        let db = base();
        let metadata = DataState::new(db.clone());
        assert!(!metadata.is_initialized().unwrap());
        metadata.mark_initialized().unwrap();
        assert!(DataState::new(db).is_initialized().unwrap());
    }

    #[test]
    fn test_closed_store_rejects_writes() {
        let metadata = DataState::new(base());
        metadata.set_timestamp(Timestamp::from_secs(5));
        metadata.close_metadata().unwrap();
        assert!(matches!(metadata.write_metadata(), Err(StrataError::Closed)));
        assert!(matches!(metadata.close_metadata(), Err(StrataError::Closed)));
    }

    #[test]
    fn test_close_does_not_touch_base_db() {
        let db = base();
        let metadata = DataState::new(db.clone());
        metadata.close_metadata().unwrap();
        db.put(b"still", b"open").unwrap();
        assert!(db.has(b"still").unwrap());
    }
}
