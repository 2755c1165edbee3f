//! Address-to-shard partition.
//!
//! The shard of an address is read from its trailing byte(s), masked to the
//! smallest power of two covering the shard count; values past the last
//! shard fall back to the next smaller mask.

use shared_types::{ShardId, METACHAIN_SHARD_ID};

use crate::domain::{ProcessError, Result};
use crate::ports::ShardCoordinator;

/// Shard coordinator for a fixed number of shards.
#[derive(Debug, Clone)]
pub struct MultiShardCoordinator {
    number_of_shards: u32,
    self_id: ShardId,
    mask_high: u32,
    mask_low: u32,
}

impl MultiShardCoordinator {
    /// Create a coordinator. `self_id` may be the metachain.
    pub fn new(number_of_shards: u32, self_id: ShardId) -> Result<Self> {
        if number_of_shards == 0 {
            return Err(ProcessError::InvalidNumberOfShards(number_of_shards));
        }
        if self_id >= number_of_shards && self_id != METACHAIN_SHARD_ID {
            return Err(ProcessError::InvalidShardId(self_id));
        }

        let (mask_high, mask_low) = Self::masks(number_of_shards);
        Ok(Self {
            number_of_shards,
            self_id,
            mask_high,
            mask_low,
        })
    }

    fn masks(number_of_shards: u32) -> (u32, u32) {
        if number_of_shards <= 1 {
            return (0, 0);
        }
        let bits = 32 - (number_of_shards - 1).leading_zeros();
        ((1 << bits) - 1, (1 << (bits - 1)) - 1)
    }
}

fn shard_id_to_string(shard: ShardId) -> String {
    if shard == METACHAIN_SHARD_ID {
        "_META".to_string()
    } else {
        format!("_{shard}")
    }
}

/// Identifier of the channel between two shards (order independent).
pub fn communication_identifier_between_shards(first: ShardId, second: ShardId) -> String {
    if first == second {
        return shard_id_to_string(first);
    }
    let (low, high) = if first < second {
        (first, second)
    } else {
        (second, first)
    };
    format!("{}{}", shard_id_to_string(low), shard_id_to_string(high))
}

impl ShardCoordinator for MultiShardCoordinator {
    fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }

    fn compute_id(&self, address: &[u8]) -> ShardId {
        let bytes_needed = (self.number_of_shards / 256) as usize + 1;
        let start = address.len().saturating_sub(bytes_needed);

        let value = address[start..]
            .iter()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));

        let shard = value & self.mask_high;
        if shard > self.number_of_shards - 1 {
            return value & self.mask_low;
        }
        shard
    }

    fn self_id(&self) -> ShardId {
        self.self_id
    }

    fn communication_identifier(&self, dest: ShardId) -> String {
        communication_identifier_between_shards(self.self_id, dest)
    }
}
