//! Composite platform state
//!
//! Combines the metadata store and the transaction store behind one
//! capability surface and sequences their lifecycle. The transaction store
//! reads metadata, so:
//!
//! - genesis sync, load and write run metadata first, then transactions;
//! - close runs transactions first, then metadata;
//! - the first failure stops the sequence and is returned as is.

use prometheus::{Gauge, Registry};
use std::sync::Arc;
use strata_core::{
    Address, Amount, BlockId, ChainConfig, ChainContext, NodeId, StrataError, StrataResult,
    SubnetId, Timestamp, TxId, UtxoId,
};
use tracing::{debug, error, info};

use crate::genesis::{GenesisState, SubChain, Utxo};
use crate::metadata::{DataState, MetadataContent, MetadataMutable, MetadataStore};
use crate::reward::RewardCalculator;
use crate::store::SharedDatabase;
use crate::transactions::{Staker, TransactionStore, TxContent, TxMutable, TxState, TxStatus};

/// Every update made while executing blocks, across both stores
pub trait Mutable: TxMutable + MetadataMutable {}

impl<T: TxMutable + MetadataMutable + ?Sized> Mutable for T {}

/// Every query and update across both stores
pub trait Content: TxContent + MetadataContent + Mutable {}

impl<T: TxContent + MetadataContent + ?Sized> Content for T {}

/// Content plus the lifecycle used to initialize and persist it
pub trait State: Content {
    /// Populate both stores from genesis. Only valid on a fresh state.
    fn sync_genesis(
        &mut self,
        genesis_block_id: BlockId,
        genesis: &GenesisState,
    ) -> StrataResult<()>;

    /// Pull previously persisted state. Only valid on a fresh state.
    fn load(&mut self) -> StrataResult<()>;

    /// Persist pending changes of both stores
    fn write(&mut self) -> StrataResult<()>;

    /// Release both stores. The base database stays open.
    fn close(&mut self) -> StrataResult<()>;
}

/// Lifecycle phase of a [`CompositeState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, neither loaded nor synced
    Fresh,
    /// Loaded or synced from genesis
    Ready,
    /// A load or genesis sync failed; only close is allowed
    Failed(&'static str),
    Closed,
}

/// Metadata and transaction stores managed as one unit
pub struct CompositeState<M = DataState, T = TxState> {
    metadata: Arc<M>,
    txs: T,
    phase: Phase,
}

/// The composite over the persistent store implementations
pub type PlatformState = CompositeState<DataState, TxState>;

impl CompositeState<DataState, TxState> {
    /// Build both stores over `base_db` without metrics
    pub fn new(
        base_db: SharedDatabase,
        config: ChainConfig,
        ctx: ChainContext,
        local_stake: Gauge,
        total_stake: Gauge,
        rewards: Arc<dyn RewardCalculator>,
    ) -> Self {
        let metadata = Arc::new(DataState::new(base_db.clone()));
        let txs = TxState::new(
            base_db,
            metadata.clone(),
            config,
            ctx,
            local_stake,
            total_stake,
            rewards,
        );
        Self::from_parts(metadata, txs)
    }

    /// Build both stores over `base_db`, registering metrics on `registry`
    #[allow(clippy::too_many_arguments)]
    pub fn new_metered(
        base_db: SharedDatabase,
        registry: &Registry,
        config: ChainConfig,
        ctx: ChainContext,
        local_stake: Gauge,
        total_stake: Gauge,
        rewards: Arc<dyn RewardCalculator>,
    ) -> StrataResult<Self> {
        let metadata = Arc::new(DataState::new(base_db.clone()));
        let txs = TxState::new_metered(
            base_db,
            metadata.clone(),
            registry,
            config,
            ctx,
            local_stake,
            total_stake,
            rewards,
        )?;
        Ok(Self::from_parts(metadata, txs))
    }
}

impl<M: MetadataStore, T: TransactionStore> CompositeState<M, T> {
    /// Combine already-wired stores. `txs` must read from `metadata`.
    pub fn from_parts(metadata: Arc<M>, txs: T) -> Self {
        Self {
            metadata,
            txs,
            phase: Phase::Fresh,
        }
    }

    pub fn metadata(&self) -> &Arc<M> {
        &self.metadata
    }

    pub fn transactions(&self) -> &T {
        &self.txs
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn ensure_fresh(&self) -> StrataResult<()> {
        match self.phase {
            Phase::Fresh => Ok(()),
            Phase::Ready => Err(StrataError::AlreadyInitialized),
            Phase::Failed(during) => Err(StrataError::Unusable(during)),
            Phase::Closed => Err(StrataError::Closed),
        }
    }

    fn ensure_ready(&self) -> StrataResult<()> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Fresh => Err(StrataError::NotInitialized),
            Phase::Failed(during) => Err(StrataError::Unusable(during)),
            Phase::Closed => Err(StrataError::Closed),
        }
    }

    /// Record the outcome of an initializing operation
    fn settle(&mut self, during: &'static str, result: StrataResult<()>) -> StrataResult<()> {
        match result {
            Ok(()) => {
                self.phase = Phase::Ready;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "State {} failed", during);
                self.phase = Phase::Failed(during);
                Err(err)
            }
        }
    }
}

impl<M: MetadataStore, T: TransactionStore> State for CompositeState<M, T> {
    fn sync_genesis(
        &mut self,
        genesis_block_id: BlockId,
        genesis: &GenesisState,
    ) -> StrataResult<()> {
        self.ensure_fresh()?;
        let result = self
            .metadata
            .sync_genesis(genesis_block_id, genesis.timestamp, genesis.initial_supply)
            .and_then(|()| {
                self.txs
                    .sync_genesis(&genesis.utxos, &genesis.validators, &genesis.chains)
            });
        self.settle("genesis sync", result)?;

        info!(block = %genesis_block_id, "State synced from genesis");
        Ok(())
    }

    fn load(&mut self) -> StrataResult<()> {
        self.ensure_fresh()?;
        // TxState depends on metadata, so metadata loads first
        let result = self.metadata.load_metadata().and_then(|()| self.txs.load_txs());
        self.settle("load", result)?;

        info!(
            last_accepted = %self.metadata.last_accepted(),
            timestamp = %self.metadata.timestamp(),
            "State loaded"
        );
        Ok(())
    }

    fn write(&mut self) -> StrataResult<()> {
        self.ensure_ready()?;
        self.metadata.write_metadata()?;
        self.txs.write_txs()?;

        debug!("State written");
        Ok(())
    }

    fn close(&mut self) -> StrataResult<()> {
        if self.phase == Phase::Closed {
            return Err(StrataError::Closed);
        }
        // TxState depends on metadata, so metadata closes last
        self.txs.close_txs()?;
        self.metadata.close_metadata()?;
        self.phase = Phase::Closed;

        info!("State closed");
        Ok(())
    }
}

impl<M: MetadataStore, T: TransactionStore> MetadataMutable for CompositeState<M, T> {
    fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp()
    }

    fn set_timestamp(&self, timestamp: Timestamp) {
        self.metadata.set_timestamp(timestamp)
    }

    fn current_supply(&self) -> Amount {
        self.metadata.current_supply()
    }

    fn set_current_supply(&self, supply: Amount) {
        self.metadata.set_current_supply(supply)
    }
}

impl<M: MetadataStore, T: TransactionStore> MetadataContent for CompositeState<M, T> {
    fn last_accepted(&self) -> BlockId {
        self.metadata.last_accepted()
    }

    fn set_last_accepted(&self, block_id: BlockId) {
        self.metadata.set_last_accepted(block_id)
    }

    fn is_initialized(&self) -> StrataResult<bool> {
        self.metadata.is_initialized()
    }

    fn mark_initialized(&self) -> StrataResult<()> {
        self.metadata.mark_initialized()
    }
}

impl<M: MetadataStore, T: TransactionStore> TxMutable for CompositeState<M, T> {
    fn utxo(&self, utxo_id: &UtxoId) -> Option<Utxo> {
        self.txs.utxo(utxo_id)
    }

    fn add_utxo(&self, utxo: Utxo) {
        self.txs.add_utxo(utxo)
    }

    fn delete_utxo(&self, utxo_id: &UtxoId) {
        self.txs.delete_utxo(utxo_id)
    }

    fn tx_status(&self, tx_id: &TxId) -> Option<TxStatus> {
        self.txs.tx_status(tx_id)
    }

    fn add_tx(&self, tx_id: TxId, status: TxStatus) {
        self.txs.add_tx(tx_id, status)
    }

    fn current_staker(&self, tx_id: &TxId) -> Option<Staker> {
        self.txs.current_staker(tx_id)
    }

    fn add_current_staker(&self, staker: Staker) {
        self.txs.add_current_staker(staker)
    }

    fn delete_current_staker(&self, tx_id: &TxId) {
        self.txs.delete_current_staker(tx_id)
    }

    fn add_chain(&self, chain: SubChain) {
        self.txs.add_chain(chain)
    }
}

impl<M: MetadataStore, T: TransactionStore> TxContent for CompositeState<M, T> {
    fn utxo_ids(&self, owner: &Address) -> Vec<UtxoId> {
        self.txs.utxo_ids(owner)
    }

    fn utxo_count(&self) -> usize {
        self.txs.utxo_count()
    }

    fn current_stakers(&self) -> Vec<Staker> {
        self.txs.current_stakers()
    }

    fn validator_weight(&self, node_id: &NodeId) -> Amount {
        self.txs.validator_weight(node_id)
    }

    fn total_stake(&self) -> Amount {
        self.txs.total_stake()
    }

    fn chains(&self) -> Vec<SubChain> {
        self.txs.chains()
    }

    fn subnet_chains(&self, subnet_id: &SubnetId) -> Vec<SubChain> {
        self.txs.subnet_chains(subnet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::GenesisValidator;
    use crate::memory::MemoryDatabase;
    use crate::reward::Calculator;
    use strata_core::{Id, RewardConfig};

    fn gauges() -> (Gauge, Gauge) {
        (
            Gauge::new("local_stake", "local").unwrap(),
            Gauge::new("total_stake", "total").unwrap(),
        )
    }

    fn platform_state(db: SharedDatabase) -> PlatformState {
        let (local, total) = gauges();
        // cap equal to the genesis supply: no rewards are minted
        let rewards = Calculator::new(RewardConfig {
            supply_cap: Amount::new(1_000_000),
            ..RewardConfig::default()
        });
        PlatformState::new(
            db,
            ChainConfig {
                min_validator_stake: Amount::new(1),
                ..ChainConfig::default()
            },
            ChainContext::default(),
            local,
            total,
            Arc::new(rewards),
        )
    }

    fn genesis() -> GenesisState {
        GenesisState {
            timestamp: Timestamp::from_secs(1_000),
            initial_supply: Amount::new(1_000_000),
            utxos: vec![Utxo {
                tx_id: Id([1u8; 32]),
                output_index: 0,
                asset_id: Id([2u8; 32]),
                owner: Address([3u8; 20]),
                amount: Amount::new(400_000),
            }],
            validators: vec![GenesisValidator {
                node_id: NodeId([4u8; 20]),
                start: Timestamp::from_secs(1_000),
                end: Timestamp::from_secs(2_000),
                weight: Amount::new(5_000),
                reward_owner: Address([3u8; 20]),
            }],
            chains: vec![],
        }
    }

    #[test]
    fn test_stores_share_base_db_and_metadata() {
        let state = platform_state(Arc::new(MemoryDatabase::new()));
        assert!(Arc::ptr_eq(state.metadata(), state.transactions().metadata()));
        assert!(Arc::ptr_eq(
            state.metadata().base_db(),
            state.transactions().base_db()
        ));
    }

    #[test]
    fn test_genesis_scenario() {
        let mut state = platform_state(Arc::new(MemoryDatabase::new()));
        let genesis = genesis();
        let block_id = Id([0xAA; 32]);

        state.sync_genesis(block_id, &genesis).unwrap();

        assert_eq!(state.phase(), Phase::Ready);
        assert_eq!(state.timestamp(), Timestamp::from_secs(1_000));
        assert_eq!(state.current_supply(), Amount::new(1_000_000));
        assert_eq!(state.last_accepted(), block_id);
        assert_eq!(state.utxo_count(), 1);
        assert!(state.utxo(&genesis.utxos[0].id()).is_some());
        assert_eq!(state.current_stakers().len(), 1);
        assert_eq!(state.current_stakers()[0].node_id, NodeId([4u8; 20]));
        assert!(state.chains().is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let db: SharedDatabase = Arc::new(MemoryDatabase::new());
        let genesis = genesis();
        let block_id = genesis.block_id().unwrap();

        let mut first = platform_state(db.clone());
        assert!(!first.is_initialized().unwrap());
        first.sync_genesis(block_id, &genesis).unwrap();
        first.write().unwrap();
        first.mark_initialized().unwrap();
        first.close().unwrap();

        let mut second = platform_state(db);
        assert!(second.is_initialized().unwrap());
        second.load().unwrap();
        assert_eq!(second.last_accepted(), block_id);
        assert_eq!(second.current_supply(), first.metadata().current_supply());
        assert_eq!(second.utxo_ids(&Address([3u8; 20])), vec![genesis.utxos[0].id()]);
        assert_eq!(second.total_stake(), Amount::new(5_000));
    }

    #[test]
    fn test_genesis_sync_only_once() {
        let mut state = platform_state(Arc::new(MemoryDatabase::new()));
        state.sync_genesis(Id::EMPTY, &genesis()).unwrap();
        assert!(matches!(
            state.sync_genesis(Id::EMPTY, &genesis()),
            Err(StrataError::AlreadyInitialized)
        ));
        assert!(matches!(state.load(), Err(StrataError::AlreadyInitialized)));
    }

    #[test]
    fn test_failed_load_leaves_state_unusable() {
        let mut state = platform_state(Arc::new(MemoryDatabase::new()));
        assert!(matches!(state.load(), Err(StrataError::MissingMetadata(_))));
        assert_eq!(state.phase(), Phase::Failed("load"));

        assert!(matches!(state.write(), Err(StrataError::Unusable("load"))));
        assert!(matches!(
            state.sync_genesis(Id::EMPTY, &genesis()),
            Err(StrataError::Unusable("load"))
        ));
        state.close().unwrap();
    }

    #[test]
    fn test_write_requires_initialization() {
        let mut state = platform_state(Arc::new(MemoryDatabase::new()));
        assert!(matches!(state.write(), Err(StrataError::NotInitialized)));
    }

    #[test]
    fn test_close_is_final() {
        let mut state = platform_state(Arc::new(MemoryDatabase::new()));
        state.close().unwrap();
        assert_eq!(state.phase(), Phase::Closed);
        assert!(matches!(state.close(), Err(StrataError::Closed)));
        assert!(matches!(state.load(), Err(StrataError::Closed)));
    }

    #[test]
    fn test_metered_construction_surfaces_duplicate_registration() {
        let registry = Registry::new();
        let db: SharedDatabase = Arc::new(MemoryDatabase::new());
        let rewards: Arc<dyn RewardCalculator> =
            Arc::new(Calculator::new(RewardConfig::default()));

        let (local, total) = gauges();
        let first = PlatformState::new_metered(
            db.clone(),
            &registry,
            ChainConfig::default(),
            ChainContext::default(),
            local,
            total,
            rewards.clone(),
        );
        assert!(first.is_ok());

        let (local, total) = gauges();
        let second = PlatformState::new_metered(
            db,
            &registry,
            ChainConfig::default(),
            ChainContext::default(),
            local,
            total,
            rewards,
        );
        assert!(matches!(second, Err(StrataError::MetricsError(_))));
    }
}
