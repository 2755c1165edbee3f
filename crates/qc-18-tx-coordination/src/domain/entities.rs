//! Domain entities: accounts and peer-change records.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::value_objects::{PeerAction, SignedValue};

/// Anything the account store can hold.
pub trait AccountHandler: Clone + Serialize + Send + Sync + 'static {
    /// Empty account for an address.
    fn new_empty(address: &[u8]) -> Self;

    /// Account address.
    fn address(&self) -> &[u8];
}

/// A user account: balance and nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserAccount {
    /// Account address.
    pub address: Vec<u8>,
    /// Next expected nonce.
    pub nonce: u64,
    /// Balance in base units.
    pub balance: U256,
}

impl AccountHandler for UserAccount {
    fn new_empty(address: &[u8]) -> Self {
        Self {
            address: address.to_vec(),
            ..Default::default()
        }
    }

    fn address(&self) -> &[u8] {
        &self.address
    }
}

/// Consensus-side projection of a validator.
///
/// Keyed by the validator's BLS public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PeerAccount {
    /// Account key (the BLS public key).
    pub address: Vec<u8>,
    /// Address receiving the validator's rewards.
    pub reward_address: Vec<u8>,
    /// BLS public key.
    pub bls_public_key: Vec<u8>,
    /// Locked stake.
    pub stake: U256,
    /// Nonce at which the validator registered.
    pub nonce: u64,
    /// Nonce at which the validator unstaked (0 when staked).
    pub unstaked_nonce: u64,
    /// True while the validator waits for its first epoch.
    pub node_in_waiting_list: bool,
}

impl AccountHandler for PeerAccount {
    fn new_empty(address: &[u8]) -> Self {
        Self {
            address: address.to_vec(),
            ..Default::default()
        }
    }

    fn address(&self) -> &[u8] {
        &self.address
    }
}

/// Record of the staking registry for one validator, as returned by the
/// registry's `get` function (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StakingData {
    /// Nonce at which the validator registered.
    pub start_nonce: u64,
    /// Nonce at which the validator unstaked (0 when staked).
    pub unstaked_nonce: u64,
    /// Address receiving the validator's rewards.
    pub reward_address: Vec<u8>,
    /// Locked stake.
    pub stake_value: U256,
}

/// One delta applied to a validator's peer account in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChange {
    /// Reward address of the validator.
    pub address: Vec<u8>,
    /// BLS public key of the validator.
    pub public_key: Vec<u8>,
    /// What happened.
    pub action: PeerAction,
    /// Block nonce of the change.
    pub timestamp: u64,
    /// Signed stake difference.
    pub value_change: SignedValue,
}
