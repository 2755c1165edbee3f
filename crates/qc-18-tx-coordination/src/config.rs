//! Configuration types for transaction coordination

use serde::{Deserialize, Serialize};
use shared_types::ShardId;
use std::collections::BTreeSet;
use std::time::Duration;

/// Function name identifying a relayed transaction.
pub const RELAYED_TX_FUNCTION: &str = "relayedTx";

/// Default address length in bytes.
pub const DEFAULT_ADDRESS_LEN: usize = 32;

/// Runtime configuration of the coordination core
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Configured address length in bytes
    pub address_len: usize,

    /// Number of shards (metachain excluded)
    pub num_shards: u32,

    /// Shard this node belongs to
    pub self_shard_id: ShardId,

    /// Names of the protocol built-in functions
    pub built_in_functions: BTreeSet<String>,

    /// Function name of relayed transactions
    pub relayed_tx_function: String,

    /// Re-poll interval while waiting for requested data (milliseconds)
    pub data_poll_interval_ms: u64,

    /// Lifetime of a requested-item entry (milliseconds)
    pub requested_items_ttl_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            address_len: DEFAULT_ADDRESS_LEN,
            num_shards: 2,
            self_shard_id: 0,
            built_in_functions: ["ClaimDeveloperRewards", "ChangeOwnerAddress", "SaveKeyValue"]
                .into_iter()
                .map(String::from)
                .collect(),
            relayed_tx_function: RELAYED_TX_FUNCTION.to_string(),
            data_poll_interval_ms: 100,
            requested_items_ttl_ms: 5_000,
        }
    }
}

impl CoordinationConfig {
    /// Small, fast configuration for tests
    pub fn for_testing() -> Self {
        Self {
            data_poll_interval_ms: 5,
            requested_items_ttl_ms: 60_000,
            ..Default::default()
        }
    }

    /// Re-poll interval while waiting for requested data
    pub fn data_poll_interval(&self) -> Duration {
        Duration::from_millis(self.data_poll_interval_ms)
    }

    /// Lifetime of a requested-item entry
    pub fn requested_items_ttl(&self) -> Duration {
        Duration::from_millis(self.requested_items_ttl_ms)
    }
}

/// Economics parameters used for gas and fee computation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EconomicsConfig {
    /// Base gas cost of any transaction
    pub min_gas_limit: u64,

    /// Gas charged per payload byte
    pub gas_per_data_byte: u64,

    /// Gas ceiling of one block in one shard
    pub max_gas_limit_per_block: u64,

    /// Minimum accepted gas price
    pub min_gas_price: u64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            min_gas_limit: 50_000,
            gas_per_data_byte: 1_500,
            max_gas_limit_per_block: 1_500_000_000,
            min_gas_price: 1_000_000_000,
        }
    }
}

impl EconomicsConfig {
    /// Round numbers for tests
    pub fn for_testing() -> Self {
        Self {
            min_gas_limit: 10,
            gas_per_data_byte: 1,
            max_gas_limit_per_block: 1_000,
            min_gas_price: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinationConfig::default();
        assert_eq!(config.address_len, 32);
        assert_eq!(config.relayed_tx_function, "relayedTx");
        assert!(config.built_in_functions.contains("ClaimDeveloperRewards"));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "address_len": 20,
            "num_shards": 3,
            "self_shard_id": 1,
            "built_in_functions": ["Burn"],
            "relayed_tx_function": "relayedTx",
            "data_poll_interval_ms": 10,
            "requested_items_ttl_ms": 100
        }"#;
        let config: CoordinationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.address_len, 20);
        assert_eq!(config.data_poll_interval(), Duration::from_millis(10));
        assert!(config.built_in_functions.contains("Burn"));
    }
}
