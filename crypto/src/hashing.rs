//! Hashing functions using BLAKE3 and SHA-256

use sha2::{Digest, Sha256};
use strata_core::Id;

/// Compute BLAKE3 hash of data
pub fn blake3_hash(data: &[u8]) -> Id {
    let hash = blake3::hash(data);
    Id::from_bytes(*hash.as_bytes())
}

/// Compute SHA-256 hash of data
pub fn sha256_hash(data: &[u8]) -> Id {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Id::from_bytes(bytes)
}

/// Default hash function (BLAKE3)
pub fn hash(data: &[u8]) -> Id {
    blake3_hash(data)
}

/// Hash multiple pieces of data
pub fn hash_multiple(parts: &[&[u8]]) -> Id {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    let hash = hasher.finalize();
    Id::from_bytes(*hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash() {
        let data = b"Hello, STRATA!";
        let hash1 = blake3_hash(data);
        let hash2 = blake3_hash(data);

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, Id::EMPTY);
    }

    #[test]
    fn test_different_hashes() {
        let data = b"Hello, STRATA!";
        assert_ne!(blake3_hash(data), sha256_hash(data));
    }

    #[test]
    fn test_hash_multiple_matches_concatenation() {
        let joined = hash(b"genesis-utxo");
        let parts = hash_multiple(&[b"genesis-", b"utxo"]);
        assert_eq!(joined, parts);
    }
}
