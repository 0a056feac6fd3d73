//! Transaction-derived state: UTXOs, current stakers, sub-chains, tx statuses
//!
//! The store keeps every record in memory and buffers changes in a
//! [`StateDiff`] until `write_txs`. It holds the metadata store it was built
//! with, since staking rewards depend on the chain time and current supply.

use parking_lot::RwLock;
use prometheus::{Gauge, Registry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::{
    Address, Amount, ChainConfig, ChainContext, ChainId, NodeId, StrataError, StrataResult,
    SubnetId, Timestamp, TxId, UtxoId,
};
use tracing::{debug, info, warn};

use crate::genesis::{GenesisValidator, SubChain, Utxo};
use crate::metadata::{DataState, MetadataMutable};
use crate::metrics::TxMetrics;
use crate::reward::RewardCalculator;
use crate::store::{parse_record_key, record_key, Database, PrefixDb, SharedDatabase, StateDiff};

/// Keyspace of the transaction store in the base database
pub const TXS_PREFIX: &[u8] = b"txs/";

const UTXO_PREFIX: &[u8] = b"utxo/";
const STAKER_PREFIX: &[u8] = b"staker/";
const CHAIN_PREFIX: &[u8] = b"chain/";
const STATUS_PREFIX: &[u8] = b"status/";

/// Final or pending status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Processing,
    Committed,
    Aborted,
}

/// A validator in the current staker set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staker {
    pub tx_id: TxId,
    pub node_id: NodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub weight: Amount,
    pub reward_owner: Address,
    /// Reward paid out if the staker completes its period
    pub potential_reward: Amount,
}

impl Staker {
    pub fn from_genesis(validator: &GenesisValidator, potential_reward: Amount) -> Self {
        Self {
            tx_id: validator.tx_id(),
            node_id: validator.node_id,
            start: validator.start,
            end: validator.end,
            weight: validator.weight,
            reward_owner: validator.reward_owner,
            potential_reward,
        }
    }

    pub fn to_bytes(&self) -> StrataResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> StrataResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StrataError::DeserializationError(e.to_string()))
    }
}

/// Transaction state read and updated while executing blocks
pub trait TxMutable: Send + Sync {
    fn utxo(&self, utxo_id: &UtxoId) -> Option<Utxo>;

    fn add_utxo(&self, utxo: Utxo);

    fn delete_utxo(&self, utxo_id: &UtxoId);

    fn tx_status(&self, tx_id: &TxId) -> Option<TxStatus>;

    fn add_tx(&self, tx_id: TxId, status: TxStatus);

    fn current_staker(&self, tx_id: &TxId) -> Option<Staker>;

    fn add_current_staker(&self, staker: Staker);

    fn delete_current_staker(&self, tx_id: &TxId);

    fn add_chain(&self, chain: SubChain);
}

/// All transaction state queries and updates
pub trait TxContent: TxMutable {
    /// UTXOs spendable by `owner`, in id order
    fn utxo_ids(&self, owner: &Address) -> Vec<UtxoId>;

    fn utxo_count(&self) -> usize;

    /// Current stakers ordered by end time, then tx id
    fn current_stakers(&self) -> Vec<Staker>;

    /// Total weight staked by `node_id`
    fn validator_weight(&self, node_id: &NodeId) -> Amount;

    /// Total weight of the current staker set
    fn total_stake(&self) -> Amount;

    /// All registered chains, in chain id order
    fn chains(&self) -> Vec<SubChain>;

    /// Chains registered on `subnet_id`
    fn subnet_chains(&self, subnet_id: &SubnetId) -> Vec<SubChain>;
}

/// Transaction store lifecycle
pub trait TransactionStore: TxContent {
    fn sync_genesis(
        &self,
        utxos: &[Utxo],
        validators: &[GenesisValidator],
        chains: &[SubChain],
    ) -> StrataResult<()>;

    fn load_txs(&self) -> StrataResult<()>;

    fn write_txs(&self) -> StrataResult<()>;

    fn close_txs(&self) -> StrataResult<()>;
}

#[derive(Default)]
struct TxCache {
    utxos: HashMap<UtxoId, Utxo>,
    owners: HashMap<Address, BTreeSet<UtxoId>>,
    stakers: BTreeMap<TxId, Staker>,
    chains: BTreeMap<ChainId, SubChain>,
    statuses: HashMap<TxId, TxStatus>,
    pending: StateDiff,
    // records that failed to encode; reported once by the next write
    encode_errors: Vec<String>,
}

impl TxCache {
    fn index_utxo(&mut self, utxo: Utxo) {
        let id = utxo.id();
        self.owners.entry(utxo.owner).or_default().insert(id);
        self.utxos.insert(id, utxo);
    }

    fn unindex_utxo(&mut self, utxo_id: &UtxoId) -> Option<Utxo> {
        let utxo = self.utxos.remove(utxo_id)?;
        if let Some(ids) = self.owners.get_mut(&utxo.owner) {
            ids.remove(utxo_id);
            if ids.is_empty() {
                self.owners.remove(&utxo.owner);
            }
        }
        Some(utxo)
    }

    fn stage(&mut self, key: Vec<u8>, encoded: StrataResult<Vec<u8>>) {
        match encoded {
            Ok(bytes) => self.pending.set(key, bytes),
            Err(err) => self.encode_errors.push(err.to_string()),
        }
    }
}

/// Transaction store persisted under [`TXS_PREFIX`]
pub struct TxState {
    db: PrefixDb,
    metadata: Arc<DataState>,
    config: ChainConfig,
    ctx: ChainContext,
    local_stake: Gauge,
    total_stake: Gauge,
    rewards: Arc<dyn RewardCalculator>,
    metrics: Option<TxMetrics>,
    cache: RwLock<TxCache>,
    closed: AtomicBool,
}

impl TxState {
    pub fn new(
        base_db: SharedDatabase,
        metadata: Arc<DataState>,
        config: ChainConfig,
        ctx: ChainContext,
        local_stake: Gauge,
        total_stake: Gauge,
        rewards: Arc<dyn RewardCalculator>,
    ) -> Self {
        Self {
            db: PrefixDb::new(base_db, TXS_PREFIX),
            metadata,
            config,
            ctx,
            local_stake,
            total_stake,
            rewards,
            metrics: None,
            cache: RwLock::new(TxCache::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Like [`TxState::new`], registering the store's metrics on `registry`
    #[allow(clippy::too_many_arguments)]
    pub fn new_metered(
        base_db: SharedDatabase,
        metadata: Arc<DataState>,
        registry: &Registry,
        config: ChainConfig,
        ctx: ChainContext,
        local_stake: Gauge,
        total_stake: Gauge,
        rewards: Arc<dyn RewardCalculator>,
    ) -> StrataResult<Self> {
        let metrics = TxMetrics::register(registry)?;
        let mut state = Self::new(
            base_db,
            metadata,
            config,
            ctx,
            local_stake,
            total_stake,
            rewards,
        );
        state.metrics = Some(metrics);
        Ok(state)
    }

    /// The metadata store this transaction store reads from
    pub fn metadata(&self) -> &Arc<DataState> {
        &self.metadata
    }

    /// The base database shared with the metadata store
    pub fn base_db(&self) -> &SharedDatabase {
        self.db.base()
    }

    /// Number of changes not yet written
    pub fn pending_changes(&self) -> usize {
        self.cache.read().pending.len()
    }

    fn ensure_open(&self) -> StrataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::Closed);
        }
        Ok(())
    }

    fn refresh_stake_gauges(&self, cache: &TxCache) {
        let mut local = 0u64;
        let mut total = 0u64;
        for staker in cache.stakers.values() {
            total = total.saturating_add(staker.weight.0);
            if staker.node_id == self.ctx.node_id {
                local = local.saturating_add(staker.weight.0);
            }
        }
        self.local_stake.set(local as f64);
        self.total_stake.set(total as f64);
        if let Some(metrics) = &self.metrics {
            metrics.current_stakers.set(cache.stakers.len() as i64);
        }
    }

    fn check_genesis_validator(
        &self,
        validator: &GenesisValidator,
        chain_time: Timestamp,
    ) -> StrataResult<()> {
        if validator.end <= validator.start {
            return Err(StrataError::InvalidGenesis(format!(
                "validator {} ends before it starts",
                validator.node_id
            )));
        }
        if validator.end <= chain_time {
            return Err(StrataError::InvalidGenesis(format!(
                "validator {} ends at {} before genesis time {}",
                validator.node_id, validator.end, chain_time
            )));
        }
        if validator.weight < self.config.min_validator_stake
            || validator.weight > self.config.max_validator_stake
        {
            return Err(StrataError::InvalidGenesis(format!(
                "validator {} stakes {} outside [{}, {}]",
                validator.node_id,
                validator.weight,
                self.config.min_validator_stake,
                self.config.max_validator_stake
            )));
        }
        Ok(())
    }

    fn load_records<T>(
        &self,
        prefix: &[u8],
        decode: impl Fn(&[u8]) -> StrataResult<T>,
    ) -> StrataResult<Vec<(TxId, T)>> {
        self.db
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, value)| {
                let id = parse_record_key(prefix, &key).ok_or_else(|| {
                    StrataError::StateCorruption(format!("malformed key {:?}", key))
                })?;
                Ok((id, decode(&value)?))
            })
            .collect()
    }
}

impl TxMutable for TxState {
    fn utxo(&self, utxo_id: &UtxoId) -> Option<Utxo> {
        self.cache.read().utxos.get(utxo_id).cloned()
    }

    fn add_utxo(&self, utxo: Utxo) {
        let key = record_key(UTXO_PREFIX, &utxo.id());
        let encoded = utxo.to_bytes();
        let mut cache = self.cache.write();
        cache.stage(key, encoded);
        cache.index_utxo(utxo);
        if let Some(metrics) = &self.metrics {
            metrics.utxos_added.inc();
        }
    }

    fn delete_utxo(&self, utxo_id: &UtxoId) {
        let mut cache = self.cache.write();
        if cache.unindex_utxo(utxo_id).is_some() {
            cache.pending.remove(record_key(UTXO_PREFIX, utxo_id));
            if let Some(metrics) = &self.metrics {
                metrics.utxos_deleted.inc();
            }
        }
    }

    fn tx_status(&self, tx_id: &TxId) -> Option<TxStatus> {
        self.cache.read().statuses.get(tx_id).copied()
    }

    fn add_tx(&self, tx_id: TxId, status: TxStatus) {
        let encoded = bincode::serialize(&status).map_err(StrataError::from);
        let mut cache = self.cache.write();
        cache.stage(record_key(STATUS_PREFIX, &tx_id), encoded);
        cache.statuses.insert(tx_id, status);
    }

    fn current_staker(&self, tx_id: &TxId) -> Option<Staker> {
        self.cache.read().stakers.get(tx_id).cloned()
    }

    fn add_current_staker(&self, staker: Staker) {
        let encoded = staker.to_bytes();
        let mut cache = self.cache.write();
        cache.stage(record_key(STAKER_PREFIX, &staker.tx_id), encoded);
        cache.stakers.insert(staker.tx_id, staker);
        self.refresh_stake_gauges(&cache);
    }

    fn delete_current_staker(&self, tx_id: &TxId) {
        let mut cache = self.cache.write();
        if cache.stakers.remove(tx_id).is_some() {
            cache.pending.remove(record_key(STAKER_PREFIX, tx_id));
            self.refresh_stake_gauges(&cache);
        }
    }

    fn add_chain(&self, chain: SubChain) {
        let encoded = chain.to_bytes();
        let mut cache = self.cache.write();
        cache.stage(record_key(CHAIN_PREFIX, &chain.chain_id), encoded);
        cache.chains.insert(chain.chain_id, chain);
    }
}

impl TxContent for TxState {
    fn utxo_ids(&self, owner: &Address) -> Vec<UtxoId> {
        self.cache
            .read()
            .owners
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn utxo_count(&self) -> usize {
        self.cache.read().utxos.len()
    }

    fn current_stakers(&self) -> Vec<Staker> {
        let mut stakers: Vec<Staker> = self.cache.read().stakers.values().cloned().collect();
        stakers.sort_by(|a, b| a.end.cmp(&b.end).then(a.tx_id.cmp(&b.tx_id)));
        stakers
    }

    fn validator_weight(&self, node_id: &NodeId) -> Amount {
        self.cache
            .read()
            .stakers
            .values()
            .filter(|s| &s.node_id == node_id)
            .fold(Amount::ZERO, |total, s| total.saturating_add(s.weight))
    }

    fn total_stake(&self) -> Amount {
        self.cache
            .read()
            .stakers
            .values()
            .fold(Amount::ZERO, |total, s| total.saturating_add(s.weight))
    }

    fn chains(&self) -> Vec<SubChain> {
        self.cache.read().chains.values().cloned().collect()
    }

    fn subnet_chains(&self, subnet_id: &SubnetId) -> Vec<SubChain> {
        self.cache
            .read()
            .chains
            .values()
            .filter(|c| &c.subnet_id == subnet_id)
            .cloned()
            .collect()
    }
}

impl TransactionStore for TxState {
    fn sync_genesis(
        &self,
        utxos: &[Utxo],
        validators: &[GenesisValidator],
        chains: &[SubChain],
    ) -> StrataResult<()> {
        self.ensure_open()?;

        // Rewards depend on the chain time, so metadata must already be synced
        let chain_time = self.metadata.timestamp();
        let mut seen = HashSet::with_capacity(validators.len());
        for validator in validators {
            self.check_genesis_validator(validator, chain_time)?;
            let tx_id = validator.tx_id();
            if !seen.insert(tx_id) || self.current_staker(&tx_id).is_some() {
                return Err(StrataError::InvalidGenesis(format!(
                    "validator {} listed twice (tx {})",
                    validator.node_id, tx_id
                )));
            }
        }

        // Price every staker before anything is staged
        let mut supply = self.metadata.current_supply();
        let mut stakers = Vec::with_capacity(validators.len());
        for validator in validators {
            let staked_for = validator.end.saturating_since(validator.start.max(chain_time));
            let reward = self.rewards.calculate(staked_for, validator.weight, supply);
            supply = supply.checked_add(reward).ok_or_else(|| {
                StrataError::ConstraintViolation(format!(
                    "supply {} overflows adding reward {}",
                    supply, reward
                ))
            })?;
            stakers.push(Staker::from_genesis(validator, reward));
        }

        for utxo in utxos {
            self.add_utxo(utxo.clone());
        }

        for staker in stakers {
            debug!(
                node = %staker.node_id,
                weight = %staker.weight,
                reward = %staker.potential_reward,
                "Adding genesis staker"
            );
            self.add_tx(staker.tx_id, TxStatus::Committed);
            self.add_current_staker(staker);
        }
        self.metadata.set_current_supply(supply);

        for chain in chains {
            self.add_tx(chain.chain_id, TxStatus::Committed);
            self.add_chain(chain.clone());
        }

        info!(
            utxos = utxos.len(),
            validators = validators.len(),
            chains = chains.len(),
            supply = %self.metadata.current_supply(),
            "Synced genesis transactions"
        );
        Ok(())
    }

    fn load_txs(&self) -> StrataResult<()> {
        self.ensure_open()?;
        let utxos = self.load_records(UTXO_PREFIX, Utxo::from_bytes)?;
        let stakers = self.load_records(STAKER_PREFIX, Staker::from_bytes)?;
        let chains = self.load_records(CHAIN_PREFIX, SubChain::from_bytes)?;
        let statuses = self.load_records(STATUS_PREFIX, |bytes| {
            bincode::deserialize::<TxStatus>(bytes)
                .map_err(|e| StrataError::DeserializationError(e.to_string()))
        })?;

        let mut cache = TxCache::default();
        for (id, utxo) in utxos {
            if utxo.id() != id {
                return Err(StrataError::StateCorruption(format!(
                    "utxo stored under {} hashes to {}",
                    id,
                    utxo.id()
                )));
            }
            cache.index_utxo(utxo);
        }
        cache.stakers = stakers.into_iter().collect();
        cache.chains = chains.into_iter().collect();
        cache.statuses = statuses.into_iter().collect();

        let chain_time = self.metadata.timestamp();
        let expired = cache.stakers.values().filter(|s| s.end <= chain_time).count();
        self.refresh_stake_gauges(&cache);

        info!(
            utxos = cache.utxos.len(),
            stakers = cache.stakers.len(),
            expired_stakers = expired,
            chains = cache.chains.len(),
            "Loaded transaction state"
        );
        *self.cache.write() = cache;
        Ok(())
    }

    fn write_txs(&self) -> StrataResult<()> {
        self.ensure_open()?;
        let batch = {
            let mut cache = self.cache.write();
            if !cache.encode_errors.is_empty() {
                let errors = std::mem::take(&mut cache.encode_errors);
                return Err(StrataError::SerializationError(errors.join("; ")));
            }
            if cache.pending.is_empty() {
                return Ok(());
            }
            cache.pending.to_batch()
        };

        let entries = batch.len();
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        self.cache.write().pending.clear();

        if let Some(metrics) = &self.metrics {
            metrics.writes.inc();
            metrics.written_entries.inc_by(entries as u64);
        }
        debug!(entries, "Wrote transaction state");
        Ok(())
    }

    fn close_txs(&self) -> StrataResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StrataError::Closed);
        }
        let pending = self.pending_changes();
        if pending > 0 {
            warn!(
                pending,
                chain_time = %self.metadata.timestamp(),
                "Closing transaction state with unwritten changes"
            );
        }
        debug!("Closed transaction state");
        Ok(())
    }
}
