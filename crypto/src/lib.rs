//! STRATA Cryptography Module
//!
//! Hashing used to derive identifiers:
//! - BLAKE3 for UTXO, staker and chain ids
//! - SHA-256 for genesis block ids

pub mod hashing;

pub use hashing::*;
