//! Inbound (Driving) ports for the coordination subsystem.
//!
//! The block-processing pipeline drives the coordinator through
//! [`TransactionCoordinatorApi`]; the coordinator in turn drives one
//! [`PreProcessor`] and at most one [`IntermediateProcessor`] per block type.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use shared_types::{Body, BlockTransaction, BlockType, Hash, Header, MiniBlock, ShardId};

use super::outbound::MiniBlockCache;
use crate::domain::{PreProcessorState, Result, TransactionType};

/// Cooperative deadline check: false once the round is out of time.
pub type HaveTime<'a> = &'a (dyn Fn() -> bool + Sync);

/// Time left in the round. Zero means out of time.
pub type TimeRemaining<'a> = &'a (dyn Fn() -> Duration + Sync);

/// Classifies user transactions.
pub trait TxTypeHandler: Send + Sync {
    /// Kind of `tx`; `None` is always invalid.
    fn compute_transaction_type(&self, tx: Option<&BlockTransaction>) -> TransactionType;
}

/// Per-round gas bookkeeping.
///
/// Implementations synchronize internally.
pub trait GasHandler: Send + Sync {
    /// Reset totals and per-transaction figures.
    fn init(&self);

    /// Record gas consumed by a transaction (last write wins).
    fn set_gas_consumed(&self, gas: u64, hash: Hash);

    /// Record gas refunded to a transaction (last write wins).
    fn set_gas_refunded(&self, gas: u64, hash: Hash);

    /// Gas consumed by a transaction.
    fn gas_consumed(&self, hash: &Hash) -> u64;

    /// Gas refunded to a transaction.
    fn gas_refunded(&self, hash: &Hash) -> u64;

    /// Gas consumed in the current round.
    fn total_gas_consumed(&self) -> u64;

    /// Gas refunded in the current round.
    fn total_gas_refunded(&self) -> u64;

    /// Forget consumed gas of discarded transactions.
    fn remove_gas_consumed(&self, hashes: &[Hash]);

    /// Forget refunded gas of discarded transactions.
    fn remove_gas_refunded(&self, hashes: &[Hash]);

    /// Gas charged to the sender shard and to the receiver shard.
    fn compute_gas_consumed_by_tx(
        &self,
        sender_shard: ShardId,
        receiver_shard: ShardId,
        tx: &BlockTransaction,
    ) -> Result<(u64, u64)>;

    /// Sum of [`GasHandler::compute_gas_consumed_by_tx`] over a miniblock.
    fn compute_gas_consumed_by_mini_block(
        &self,
        mini_block: &MiniBlock,
        txs: &HashMap<Hash, BlockTransaction>,
    ) -> Result<(u64, u64)>;
}

/// Per-kind transaction pre-processor.
pub trait PreProcessor: Send + Sync {
    /// Kind handled.
    fn block_type(&self) -> BlockType;

    /// Reset the per-round working set.
    fn create_block_started(&self);

    /// Request every missing transaction of this kind in `body`.
    /// Returns the number of missing transactions.
    fn request_block_transactions(&self, body: &Body) -> usize;

    /// Request the missing transactions of one miniblock.
    fn request_transactions_for_mini_block(&self, mini_block: &MiniBlock) -> usize;

    /// Wait until `requested` transactions arrived, or fail with `TimeIsOut`.
    fn is_data_prepared(&self, requested: usize, time_remaining: TimeRemaining<'_>) -> Result<()>;

    /// Execute every miniblock of this kind in `body`, in body order.
    fn process_block_transactions(&self, body: &Body, have_time: HaveTime<'_>) -> Result<()>;

    /// Execute one miniblock. The caller owns the snapshot boundary.
    fn process_mini_block(
        &self,
        mini_block: &MiniBlock,
        have_time: HaveTime<'_>,
        round: u64,
    ) -> Result<()>;

    /// Pack pending pool transactions into miniblocks, executing each one.
    fn create_and_process_mini_blocks(
        &self,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> Result<Vec<MiniBlock>>;

    /// Persist the transactions of this kind referenced by `body`.
    fn save_tx_block_to_storage(&self, body: &Body) -> Result<()>;

    /// Move transactions of `body` from storage back into the pools.
    /// Returns the number of restored transactions.
    fn restore_tx_block_into_pools(
        &self,
        body: &Body,
        mini_block_pool: &dyn MiniBlockCache,
    ) -> Result<usize>;

    /// Drop transactions and miniblocks of `body` from the pools.
    fn remove_tx_block_from_pools(
        &self,
        body: &Body,
        mini_block_pool: &dyn MiniBlockCache,
    ) -> Result<()>;

    /// Canonical encodings of the referenced transactions, for broadcast.
    fn create_marshalized_data(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>>;

    /// Transactions used in the current round.
    fn get_all_current_used_txs(&self) -> HashMap<Hash, BlockTransaction>;

    /// Progress in the current round.
    fn state(&self) -> PreProcessorState;
}

/// Accumulator of transactions generated while executing a block.
pub trait IntermediateProcessor: Send + Sync {
    /// Kind produced.
    fn block_type(&self) -> BlockType;

    /// Add generated transactions. Safe for concurrent callers.
    fn add_intermediate_transactions(&self, txs: Vec<BlockTransaction>) -> Result<()>;

    /// One miniblock per destination shard, sorted by destination.
    fn create_all_inter_mini_blocks(&self) -> Vec<MiniBlock>;

    /// Compare the locally expected cross-shard miniblocks with `body`.
    fn verify_inter_mini_blocks(&self, body: &Body) -> Result<()>;

    /// Persist the accumulated transactions.
    fn save_current_intermediate_tx_to_storage(&self) -> Result<()>;

    /// Clear the accumulator.
    fn create_block_started(&self);

    /// Transactions accumulated in the current round.
    fn get_all_current_finished_txs(&self) -> HashMap<Hash, BlockTransaction>;

    /// Canonical encodings of the referenced transactions, for broadcast.
    fn create_marshalized_data(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>>;

    /// Miniblock of transactions that stay in this shard, from the last
    /// `create_all_inter_mini_blocks`.
    fn get_created_in_shard_mini_block(&self) -> Option<MiniBlock>;
}

/// Result of processing cross-shard miniblocks destined to this shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossShardOutcome {
    /// Miniblocks processed in this call.
    pub mini_blocks: Vec<MiniBlock>,
    /// Transactions in those miniblocks.
    pub tx_added: usize,
    /// True when every referenced miniblock is processed.
    pub all_processed: bool,
}

/// Serialized data of a body, ready for broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarshalizedData {
    /// Cross-shard miniblocks grouped by destination shard.
    pub mini_blocks_per_shard: BTreeMap<ShardId, Vec<MiniBlock>>,
    /// Encoded transactions grouped by broadcast topic.
    pub txs_per_topic: BTreeMap<String, Vec<Vec<u8>>>,
}

/// Block-level API used by the block-processing pipeline.
pub trait TransactionCoordinatorApi: Send + Sync {
    /// Request every missing transaction of `body`, per kind.
    fn request_block_transactions(&self, body: &Body);

    /// Wait for the transactions requested by `request_block_transactions`.
    fn is_data_prepared_for_processing(&self, time_remaining: TimeRemaining<'_>) -> Result<()>;

    /// Execute `body`, kind by kind in ascending type order.
    fn process_block_transaction(&self, body: &Body, time_remaining: TimeRemaining<'_>)
        -> Result<()>;

    /// Process cross-shard miniblocks referenced by `header` for this shard.
    fn create_mbs_and_process_cross_shard_transactions_dst_me(
        &self,
        header: &Header,
        processed_mini_blocks: &HashSet<Hash>,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> CrossShardOutcome;

    /// Pack pool transactions and intermediate results into miniblocks.
    fn create_mbs_and_process_transactions_from_me(
        &self,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> Vec<MiniBlock>;

    /// Persist transactions of `body` and the intermediate results.
    fn save_block_data_to_storage(&self, body: &Body) -> Result<()>;

    /// Move transactions of `body` back into the pools.
    fn restore_block_data_from_storage(&self, body: &Body) -> Result<usize>;

    /// Drop transactions of `body` from the pools.
    fn remove_block_data_from_pool(&self, body: &Body) -> Result<()>;

    /// Serialize cross-shard data of `body` for broadcast.
    fn create_marshalized_data(&self, body: &Body) -> MarshalizedData;

    /// Verify the intermediate miniblocks a proposer put in `body`.
    fn verify_created_block_transactions(&self, body: &Body) -> Result<()>;

    /// Hash over every intra-shard intermediate miniblock.
    fn create_receipts_hash(&self) -> Result<Hash>;

    /// Compare the header's receipts hash with the local one.
    fn verify_receipts_hash(&self, header: &Header) -> Result<()>;

    /// Request cross-shard miniblocks referenced by `header` and not cached.
    fn request_mini_blocks(&self, header: &Header);

    /// Start a new round.
    fn create_block_started(&self);

    /// Transactions of a kind used in the current round.
    fn get_all_current_used_txs(&self, block_type: BlockType) -> HashMap<Hash, BlockTransaction>;
}
