//! Configuration types for STRATA

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{Amount, ChainId, Id, NodeId};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Hex-encoded 20-byte node id, used to attribute local stake
    pub node_id: Option<String>,

    /// State persistence configuration
    pub state: StateConfig,

    /// Chain parameters
    pub chain: ChainConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "strata-node".to_string(),
            data_dir: PathBuf::from("./data"),
            node_id: None,
            state: StateConfig::default(),
            chain: ChainConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file
    pub fn from_json(json: &str) -> crate::StrataResult<Self> {
        serde_json::from_str(json).map_err(|e| crate::StrataError::ConfigError(e.to_string()))
    }
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory (under data_dir) holding the state database
    pub db_dir: String,

    /// Seconds between periodic flushes while running
    pub flush_interval_secs: u64,

    /// Register state metrics with the node's registry
    pub metrics_enabled: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_dir: "state".to_string(),
            flush_interval_secs: 30,
            metrics_enabled: true,
        }
    }
}

/// Platform chain parameters consulted by the transaction state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Network id (1 = mainnet)
    pub network_id: u32,

    /// Minimum weight a validator may stake
    pub min_validator_stake: Amount,

    /// Maximum weight a validator may stake
    pub max_validator_stake: Amount,

    /// Staking reward parameters
    pub rewards: RewardConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            min_validator_stake: Amount::from_units(2_000),
            max_validator_stake: Amount::from_units(3_000_000),
            rewards: RewardConfig::default(),
        }
    }
}

/// Staking reward parameters
///
/// Consumption rates are expressed per [`RewardConfig::PERCENT_DENOMINATOR`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Rate consumed from the remaining supply for a full minting period stake
    pub max_consumption_rate: u64,

    /// Rate consumed from the remaining supply for a zero-length stake
    pub min_consumption_rate: u64,

    /// Minting period in seconds
    pub minting_period_secs: u64,

    /// Supply can never exceed this
    pub supply_cap: Amount,
}

impl RewardConfig {
    pub const PERCENT_DENOMINATOR: u64 = 1_000_000;
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            max_consumption_rate: 120_000, // 12%
            min_consumption_rate: 100_000, // 10%
            minting_period_secs: 365 * 24 * 60 * 60,
            supply_cap: Amount::from_units(720_000_000),
        }
    }
}

/// Identity of the chain this state belongs to and of the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainContext {
    pub network_id: u32,
    pub chain_id: ChainId,
    pub node_id: NodeId,
    /// Native staking asset
    pub asset_id: Id,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "name": "n1",
            "log_level": "debug",
            "state": { "flush_interval_secs": 5 }
        }"#;
        let config = NodeConfig::from_json(json).unwrap();
        assert_eq!(config.name, "n1");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.state.flush_interval_secs, 5);
        assert_eq!(config.state.db_dir, "state");
        assert_eq!(config.chain.rewards.max_consumption_rate, 120_000);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = NodeConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::StrataError::ConfigError(_)));
    }
}
