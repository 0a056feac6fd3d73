//! Genesis payload consumed once at bootstrap

use serde::{Deserialize, Serialize};
use strata_core::{
    Address, Amount, BlockId, ChainId, Id, NodeId, StrataError, StrataResult, SubnetId,
    Timestamp, TxId, UtxoId,
};
use strata_crypto::hashing::{hash, hash_multiple, sha256_hash};

/// Unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_id: TxId,
    pub output_index: u32,
    pub asset_id: Id,
    pub owner: Address,
    pub amount: Amount,
}

impl Utxo {
    /// Identifier derived from the producing tx and output index
    pub fn id(&self) -> UtxoId {
        hash(&self.tx_id.prefixed_bytes(self.output_index))
    }

    pub fn to_bytes(&self) -> StrataResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> StrataResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StrataError::DeserializationError(e.to_string()))
    }
}

/// Validator staking from genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub node_id: NodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub weight: Amount,
    pub reward_owner: Address,
}

impl GenesisValidator {
    /// Id of the implicit add-validator tx
    pub fn tx_id(&self) -> TxId {
        hash_multiple(&[
            b"add-validator",
            self.node_id.as_bytes(),
            &self.start.as_secs().to_be_bytes(),
            &self.end.as_secs().to_be_bytes(),
            &self.weight.0.to_be_bytes(),
            self.reward_owner.as_bytes(),
        ])
    }
}

/// Blockchain registered on a subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChain {
    pub chain_id: ChainId,
    pub subnet_id: SubnetId,
    pub name: String,
    pub vm_id: Id,
    #[serde(default)]
    pub genesis_data: Vec<u8>,
}

impl SubChain {
    pub fn to_bytes(&self) -> StrataResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> StrataResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StrataError::DeserializationError(e.to_string()))
    }
}

/// Decoded genesis state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub timestamp: Timestamp,
    pub initial_supply: Amount,
    #[serde(default)]
    pub utxos: Vec<Utxo>,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub chains: Vec<SubChain>,
}

impl GenesisState {
    /// Deterministic block id: SHA-256 of the canonical encoding
    pub fn block_id(&self) -> StrataResult<BlockId> {
        let bytes = bincode::serialize(self)?;
        Ok(sha256_hash(&bytes))
    }

    /// Sum of all genesis UTXO amounts
    pub fn utxo_total(&self) -> StrataResult<Amount> {
        self.utxos.iter().try_fold(Amount::ZERO, |total, utxo| {
            total.checked_add(utxo.amount).ok_or_else(|| {
                StrataError::InvalidGenesis("utxo amounts overflow".to_string())
            })
        })
    }

    /// Small single-validator genesis for local development
    pub fn devnet(node_id: NodeId, timestamp: Timestamp) -> Self {
        let asset_id = hash(b"strata-devnet-asset");
        let owner = Address([1u8; 20]);
        let stake = Amount::from_units(2_000);
        Self {
            timestamp,
            initial_supply: Amount::from_units(360_000_000),
            utxos: vec![Utxo {
                tx_id: hash(b"strata-devnet-allocation"),
                output_index: 0,
                asset_id,
                owner,
                amount: Amount::from_units(1_000_000),
            }],
            validators: vec![GenesisValidator {
                node_id,
                start: timestamp,
                end: Timestamp::from_secs(timestamp.as_secs() + 365 * 24 * 60 * 60),
                weight: stake,
                reward_owner: owner,
            }],
            chains: vec![],
        }
    }

    pub fn to_json(&self) -> StrataResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StrataError::SerializationError(e.to_string()))
    }

    pub fn from_json(json: &str) -> StrataResult<Self> {
        serde_json::from_str(json).map_err(|e| StrataError::DeserializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GenesisState {
        GenesisState::devnet(NodeId([4u8; 20]), Timestamp::from_secs(1_000))
    }

    #[test]
    fn test_block_id_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a.block_id().unwrap(), b.block_id().unwrap());

        let mut c = sample();
        c.initial_supply = Amount::new(1);
        assert_ne!(a.block_id().unwrap(), c.block_id().unwrap());
    }

    #[test]
    fn test_utxo_ids_distinct_per_output() {
        let mut utxo = sample().utxos[0].clone();
        let first = utxo.id();
        utxo.output_index = 1;
        assert_ne!(first, utxo.id());
    }

    #[test]
    fn test_json_roundtrip_with_missing_collections() {
        let genesis = GenesisState::from_json(
            r#"{ "timestamp": 1000, "initial_supply": 1000000 }"#,
        )
        .unwrap();
        assert_eq!(genesis.timestamp, Timestamp::from_secs(1_000));
        assert!(genesis.utxos.is_empty());
        assert!(genesis.chains.is_empty());

        let json = sample().to_json().unwrap();
        assert_eq!(GenesisState::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn test_utxo_total_overflow() {
        let mut genesis = sample();
        let mut extra = genesis.utxos[0].clone();
        extra.amount = Amount::MAX;
        genesis.utxos.push(extra);
        assert!(matches!(
            genesis.utxo_total(),
            Err(StrataError::InvalidGenesis(_))
        ));
    }
}
