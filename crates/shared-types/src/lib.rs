//! # Shared Types Crate
//!
//! Block-body entities shared by the transaction coordination subsystems:
//! transactions of every kind, miniblocks, bodies, headers, shard identifiers
//! and the canonical hashing used to address them.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every entity that crosses a subsystem
//!   boundary is defined here.
//! - **Content Addressing**: identities are Keccak-256 hashes of the canonical
//!   `bincode` encoding (`calculate_hash`).

#![warn(missing_docs)]

pub mod entities;
pub mod errors;
pub mod hashing;

pub use entities::*;
pub use errors::*;
pub use hashing::{calculate_hash, keccak256, marshal};

/// Decode a value from its canonical encoding.
pub fn unmarshal<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    bincode::deserialize(bytes).map_err(|e| SerializationError::Decode(e.to_string()))
}
