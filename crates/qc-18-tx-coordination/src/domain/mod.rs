//! # Domain Layer - Transaction Coordination
//!
//! ## Components
//!
//! - `entities`: user and peer accounts, staking records, peer changes
//! - `value_objects`: TransactionType, PeerAction, SnapshotId, StorageUpdate
//! - `invariants`: gas ceiling, transaction space, miniblock order
//! - `errors`: ProcessError and its taxonomy

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use value_objects::*;
