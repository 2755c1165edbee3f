//! # Canonical Hashing
//!
//! Every content hash in the coordination core is Keccak-256 over the
//! canonical `bincode` encoding of the value.

use serde::Serialize;
use sha3::{Digest, Keccak256};

use crate::entities::Hash;
use crate::errors::SerializationError;

/// Canonical encoding of a value.
pub fn marshal<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SerializationError> {
    bincode::serialize(value).map_err(|e| SerializationError::Encode(e.to_string()))
}

/// Keccak-256 of raw bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Content hash of a value: Keccak-256 of its canonical encoding.
pub fn calculate_hash<T: Serialize + ?Sized>(value: &T) -> Result<Hash, SerializationError> {
    Ok(keccak256(&marshal(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_of_empty_input() {
        // Known Keccak-256 digest of the empty string.
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_calculate_hash_is_deterministic() {
        let value = (1u64, vec![1u8, 2, 3]);
        assert_eq!(calculate_hash(&value).unwrap(), calculate_hash(&value).unwrap());
        assert_ne!(
            calculate_hash(&value).unwrap(),
            calculate_hash(&(2u64, vec![1u8, 2, 3])).unwrap()
        );
    }
}
