//! Broadcast topic and cache identifier naming.
//!
//! Peers subscribe to these names literally.

use shared_types::{BlockType, ShardId};

use crate::domain::{ProcessError, Result};
use crate::ports::ShardCoordinator;

/// Topic of user transactions.
pub const TRANSACTION_TOPIC: &str = "Transactions";

/// Topic of smart contract results.
pub const UNSIGNED_TRANSACTION_TOPIC: &str = "UnsignedTransactions";

/// Topic of reward transactions.
pub const REWARDS_TRANSACTION_TOPIC: &str = "Rewards";

/// Topic of peer change bodies.
pub const PEER_CH_BODY_TOPIC: &str = "PeerCh";

/// Topic for miniblocks of `block_type` sent to `dest_shard`.
pub fn create_broadcast_topic(
    shard_coordinator: &dyn ShardCoordinator,
    dest_shard: ShardId,
    block_type: BlockType,
) -> Result<String> {
    let base_topic = match block_type {
        BlockType::TxBlock => TRANSACTION_TOPIC,
        BlockType::PeerBlock => PEER_CH_BODY_TOPIC,
        BlockType::SmartContractResultBlock => UNSIGNED_TRANSACTION_TOPIC,
        BlockType::RewardsBlock => REWARDS_TRANSACTION_TOPIC,
        other => return Err(ProcessError::UnknownBlockType(other)),
    };

    Ok(format!(
        "{base_topic}{}",
        shard_coordinator.communication_identifier(dest_shard)
    ))
}

/// Pool cache id of transactions moving from `sender` to `receiver`.
pub fn shard_cacher_identifier(sender: ShardId, receiver: ShardId) -> String {
    if sender == receiver {
        format!("_{sender}")
    } else {
        format!("_{sender}_{receiver}")
    }
}
