//! State runtime owning the base database and the composite state

use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use strata_core::{ChainContext, NodeConfig, NodeId, StrataError, StrataResult};
use strata_crypto::hashing::hash;
use strata_state::{
    create_sled_db, Calculator, GenesisState, MetadataContent, MetadataMutable, PlatformState,
    SharedDatabase, SharedSledDatabase, State, TxContent,
};
use tracing::{error, info, warn};

/// How the state was brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// Warm start from previously persisted state
    Loaded,
    /// Cold start from the genesis payload
    Genesis,
}

/// Point-in-time view of the state, printed by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub last_accepted: String,
    pub timestamp: u64,
    pub current_supply: u64,
    pub utxos: usize,
    pub stakers: usize,
    pub total_stake: u64,
    pub local_stake: u64,
    pub chains: usize,
    pub disk_bytes: u64,
}

/// Runtime managing the state and its storage
pub struct StateRuntime {
    config: NodeConfig,
    node_id: NodeId,
    db: SharedSledDatabase,
    registry: Registry,
    state: PlatformState,
}

impl StateRuntime {
    /// Open the database under the configured data directory and wire the state
    pub fn open(config: NodeConfig) -> StrataResult<Self> {
        let db_path = config.data_dir.join(&config.state.db_dir);
        std::fs::create_dir_all(&db_path)?;
        let db = create_sled_db(&db_path)?;
        let base_db: SharedDatabase = db.clone();

        let node_id = resolve_node_id(&config)?;
        let ctx = ChainContext {
            network_id: config.chain.network_id,
            node_id,
            ..ChainContext::default()
        };

        let registry = Registry::new_custom(Some("strata".into()), None)
            .map_err(|e| StrataError::MetricsError(e.to_string()))?;
        let local_stake = register_gauge(&registry, "local_staked", "Weight staked by this node")?;
        let total_stake = register_gauge(&registry, "total_staked", "Weight staked overall")?;
        let rewards = Arc::new(Calculator::new(config.chain.rewards.clone()));

        let state = if config.state.metrics_enabled {
            PlatformState::new_metered(
                base_db,
                &registry,
                config.chain.clone(),
                ctx,
                local_stake,
                total_stake,
                rewards,
            )?
        } else {
            PlatformState::new(
                base_db,
                config.chain.clone(),
                ctx,
                local_stake,
                total_stake,
                rewards,
            )
        };

        info!(path = %db_path.display(), node = %node_id, "Opened state database");

        Ok(Self {
            config,
            node_id,
            db,
            registry,
            state,
        })
    }

    /// Load persisted state, or sync and persist `genesis` on first start
    pub fn bootstrap(&mut self, genesis: &GenesisState) -> StrataResult<Bootstrap> {
        if self.state.is_initialized()? {
            self.state.load()?;
            return Ok(Bootstrap::Loaded);
        }

        let block_id = genesis.block_id()?;
        self.state.sync_genesis(block_id, genesis)?;
        self.state.write()?;
        self.state.mark_initialized()?;
        info!(block = %block_id, "Initialized state from genesis");
        Ok(Bootstrap::Genesis)
    }

    /// Load persisted state; fails on a database that was never initialized
    pub fn load(&mut self) -> StrataResult<()> {
        if !self.state.is_initialized()? {
            return Err(StrataError::NotInitialized);
        }
        self.state.load()
    }

    pub fn flush(&mut self) -> StrataResult<()> {
        self.state.write()
    }

    /// Flush and close the state, returning the first error
    pub fn shutdown(mut self) -> StrataResult<()> {
        let written = self.state.write();
        if let Err(e) = &written {
            error!(error = %e, "Final flush failed, closing anyway");
        }
        self.state.close()?;
        written
    }

    /// Close the state without flushing. Used when bootstrap failed and the
    /// staged changes must not reach disk.
    pub fn abort(mut self) -> StrataResult<()> {
        warn!("Closing state without flushing");
        self.state.close()
    }

    pub fn summary(&self) -> StrataResult<StateSummary> {
        Ok(StateSummary {
            last_accepted: self.state.last_accepted().to_hex(),
            timestamp: self.state.timestamp().as_secs(),
            current_supply: self.state.current_supply().0,
            utxos: self.state.utxo_count(),
            stakers: self.state.current_stakers().len(),
            total_stake: self.state.total_stake().0,
            local_stake: self.state.validator_weight(&self.node_id).0,
            chains: self.state.chains().len(),
            disk_bytes: self.db.size_on_disk()?,
        })
    }

    /// Metrics in the Prometheus text exposition format
    pub fn metrics_text(&self) -> StrataResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| StrataError::MetricsError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| StrataError::Internal(e.to_string()))
    }

    pub fn state(&self) -> &PlatformState {
        &self.state
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> StrataResult<Gauge> {
    let gauge = Gauge::new(name, help).map_err(|e| StrataError::MetricsError(e.to_string()))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| StrataError::MetricsError(e.to_string()))?;
    Ok(gauge)
}

/// Configured node id, or one derived from the node name
pub fn resolve_node_id(config: &NodeConfig) -> StrataResult<NodeId> {
    match &config.node_id {
        Some(hex_id) => NodeId::from_hex(hex_id)
            .map_err(|e| StrataError::ConfigError(format!("invalid node_id: {}", e))),
        None => {
            let digest = hash(config.name.as_bytes());
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&digest.as_bytes()[..20]);
            Ok(NodeId::from_bytes(bytes))
        }
    }
}
