//! Core types for STRATA
//!
//! Defines fundamental identifiers and scalar values used across the system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte identifier (blocks, transactions, chains, subnets, assets)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Id(pub [u8; 32]);

impl Id {
    pub const EMPTY: Id = Id([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Id(arr))
    }

    /// Prefix an id with a numeric index, used for derived identifiers
    pub fn prefixed_bytes(&self, index: u32) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.0);
        out[32..].copy_from_slice(&index.to_be_bytes());
        out
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id(0x{})", self.to_hex())
    }
}

/// Block identifier
pub type BlockId = Id;

/// Transaction identifier
pub type TxId = Id;

/// Chain identifier
pub type ChainId = Id;

/// Subnet identifier
pub type SubnetId = Id;

/// UTXO identifier (derived from tx id and output index)
pub type UtxoId = Id;

/// 20-byte node identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 20 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(NodeId(arr))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", &self.to_hex()[..12])
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

/// 20-byte address of an output owner
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

/// Token amount in the smallest denomination
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u64::MAX);

    /// One whole unit = 10^9 smallest units
    pub const DECIMALS: u32 = 9;
    pub const ONE_UNIT: u64 = 1_000_000_000;

    pub fn new(value: u64) -> Self {
        Amount(value)
    }

    pub fn from_units(units: u64) -> Self {
        Amount(units.saturating_mul(Self::ONE_UNIT))
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::ONE_UNIT;
        let frac = self.0 % Self::ONE_UNIT;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            write!(f, "{}.{:09}", whole, frac)
        }
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

/// Chain time in seconds since Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Timestamp(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex() {
        let id = Id([7u8; 32]);
        let parsed = Id::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
        assert!(Id::from_hex("abcd").is_err());
    }

    #[test]
    fn test_amount_operations() {
        let a = Amount::from_units(10);
        let b = Amount::from_units(5);
        assert_eq!(a.checked_sub(b), Some(Amount::from_units(5)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(Amount::MAX.checked_add(Amount::new(1)), None);
    }

    #[test]
    fn test_timestamp_since() {
        let start = Timestamp::from_secs(100);
        let end = Timestamp::from_secs(160);
        assert_eq!(end.saturating_since(start), 60);
        assert_eq!(start.saturating_since(end), 0);
    }

    #[test]
    fn test_prefixed_bytes() {
        let id = Id([1u8; 32]);
        let bytes = id.prefixed_bytes(3);
        assert_eq!(&bytes[..32], id.as_bytes());
        assert_eq!(&bytes[32..], &[0, 0, 0, 3]);
    }
}
