//! Invariant checkers for block coordination.
//!
//! These hold for every body a shard creates or accepts.

use super::errors::{ProcessError, Result};
use shared_types::{Body, ShardId};

/// Per-block gas ceiling.
///
/// Gas charged to the local shard MUST NOT exceed `max_gas_per_block`.
pub fn check_block_gas(consumed_in_self: u64, additional: u64, max_gas_per_block: u64) -> Result<()> {
    match consumed_in_self.checked_add(additional) {
        Some(total) if total <= max_gas_per_block => Ok(()),
        _ => Err(ProcessError::MaxGasLimitPerBlockReached),
    }
}

/// Transaction space.
///
/// True when adding `count` more transactions to `added` would overflow `max_tx_space`.
pub fn tx_space_exceeded(added: usize, count: usize, max_tx_space: usize) -> bool {
    added.saturating_add(count) > max_tx_space
}

/// Miniblock order.
///
/// Miniblocks received from other shards come first; once a miniblock created
/// by `self_id` appears, every following one must also be created by `self_id`.
pub fn check_mini_blocks_order(body: &Body, self_id: ShardId) -> Result<()> {
    let first_from_me = body
        .mini_blocks
        .iter()
        .position(|mb| mb.sender_shard_id == self_id);

    if let Some(index) = first_from_me {
        if body.mini_blocks[index..]
            .iter()
            .any(|mb| mb.sender_shard_id != self_id)
        {
            return Err(ProcessError::MiniBlocksInWrongOrder);
        }
    }
    Ok(())
}
