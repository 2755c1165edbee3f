//! Protocol state derived from system smart contracts.

pub mod staking_to_peer;

pub use staking_to_peer::{ArgStakingToPeer, StakingToPeer};
