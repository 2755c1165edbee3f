//! # Core Domain Entities
//!
//! Block-body entities shared by the transaction coordination subsystems.
//!
//! ## Clusters
//!
//! - **Transactions**: `Transaction`, `SmartContractResult`, `RewardTx`, `BlockTransaction`
//! - **Block body**: `MiniBlock`, `Body`, `BlockType`
//! - **Header**: `Header`, `MiniBlockHeader`

use serde::{Deserialize, Serialize};

use crate::errors::SerializationError;
use crate::hashing::calculate_hash;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

// =============================================================================
// CLUSTER A: IDENTIFIERS
// =============================================================================

/// A 32-byte content hash (Keccak-256 of the canonical encoding).
pub type Hash = [u8; 32];

/// An account address.
///
/// The length is a network parameter, so it is not fixed at the type level.
pub type Address = Vec<u8>;

/// Shard identifier.
pub type ShardId = u32;

/// Shard identifier reserved for the metachain.
pub const METACHAIN_SHARD_ID: ShardId = u32::MAX;

// =============================================================================
// CLUSTER B: TRANSACTIONS
// =============================================================================

/// A user-signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Transaction {
    /// Sender's nonce to prevent replay attacks.
    pub nonce: u64,
    /// Transferred value in base units.
    pub value: U256,
    /// Receiver address.
    pub rcv_addr: Address,
    /// Sender address.
    pub snd_addr: Address,
    /// Gas price in base units.
    pub gas_price: u64,
    /// Gas limit declared by the sender.
    pub gas_limit: u64,
    /// Opaque payload (`function@arg@arg` for calls, code for deployments).
    pub data: Vec<u8>,
    /// Sender's signature over the transaction.
    pub signature: Vec<u8>,
}

/// A transaction generated as a side effect of smart contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SmartContractResult {
    /// Nonce of the result.
    pub nonce: u64,
    /// Transferred value in base units.
    pub value: U256,
    /// Receiver address.
    pub rcv_addr: Address,
    /// Sender address (the contract that produced it).
    pub snd_addr: Address,
    /// Gas price inherited from the originating transaction.
    pub gas_price: u64,
    /// Gas left for the receiver.
    pub gas_limit: u64,
    /// Payload (storage updates for system contracts).
    pub data: Vec<u8>,
    /// Hash of the transaction that produced this result.
    pub original_tx_hash: Hash,
}

/// A reward distributed to a validator at the end of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RewardTx {
    /// Round the reward is granted for.
    pub round: u64,
    /// Epoch the reward is granted for.
    pub epoch: u32,
    /// Reward value in base units.
    pub value: U256,
    /// Receiver (reward) address.
    pub rcv_addr: Address,
    /// Shard that issued the reward.
    pub shard_id: ShardId,
}

/// Any transaction that can be referenced from a miniblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockTransaction {
    /// User transaction.
    Normal(Transaction),
    /// Smart contract result.
    SmartContractResult(SmartContractResult),
    /// Reward transaction.
    Reward(RewardTx),
}

impl BlockTransaction {
    /// Miniblock type this transaction belongs to.
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Normal(_) => BlockType::TxBlock,
            Self::SmartContractResult(_) => BlockType::SmartContractResultBlock,
            Self::Reward(_) => BlockType::RewardsBlock,
        }
    }

    /// Nonce (rewards carry their round).
    pub fn nonce(&self) -> u64 {
        match self {
            Self::Normal(tx) => tx.nonce,
            Self::SmartContractResult(scr) => scr.nonce,
            Self::Reward(rtx) => rtx.round,
        }
    }

    /// Transferred value.
    pub fn value(&self) -> U256 {
        match self {
            Self::Normal(tx) => tx.value,
            Self::SmartContractResult(scr) => scr.value,
            Self::Reward(rtx) => rtx.value,
        }
    }

    /// Receiver address.
    pub fn receiver(&self) -> &[u8] {
        match self {
            Self::Normal(tx) => &tx.rcv_addr,
            Self::SmartContractResult(scr) => &scr.rcv_addr,
            Self::Reward(rtx) => &rtx.rcv_addr,
        }
    }

    /// Sender address. Rewards have no sender.
    pub fn sender(&self) -> &[u8] {
        match self {
            Self::Normal(tx) => &tx.snd_addr,
            Self::SmartContractResult(scr) => &scr.snd_addr,
            Self::Reward(_) => &[],
        }
    }

    /// Declared gas limit.
    pub fn gas_limit(&self) -> u64 {
        match self {
            Self::Normal(tx) => tx.gas_limit,
            Self::SmartContractResult(scr) => scr.gas_limit,
            Self::Reward(_) => 0,
        }
    }

    /// Declared gas price.
    pub fn gas_price(&self) -> u64 {
        match self {
            Self::Normal(tx) => tx.gas_price,
            Self::SmartContractResult(scr) => scr.gas_price,
            Self::Reward(_) => 0,
        }
    }

    /// Opaque payload.
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Normal(tx) => &tx.data,
            Self::SmartContractResult(scr) => &scr.data,
            Self::Reward(_) => &[],
        }
    }

    /// Content hash of the canonical encoding.
    pub fn hash(&self) -> Result<Hash, SerializationError> {
        calculate_hash(self)
    }
}

impl From<Transaction> for BlockTransaction {
    fn from(tx: Transaction) -> Self {
        Self::Normal(tx)
    }
}

impl From<SmartContractResult> for BlockTransaction {
    fn from(scr: SmartContractResult) -> Self {
        Self::SmartContractResult(scr)
    }
}

impl From<RewardTx> for BlockTransaction {
    fn from(rtx: RewardTx) -> Self {
        Self::Reward(rtx)
    }
}

// =============================================================================
// CLUSTER C: BLOCK BODY
// =============================================================================

/// Miniblock type.
///
/// The discriminants are the canonical type identifiers. Ascending identifier
/// order is the processing order wherever the order of kinds matters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(u8)]
pub enum BlockType {
    /// User transactions.
    #[default]
    TxBlock = 0,
    /// State changes.
    StateBlock = 30,
    /// Peer state changes.
    PeerBlock = 60,
    /// Smart contract results.
    SmartContractResultBlock = 90,
    /// Invalid transactions kept for fee accounting.
    InvalidBlock = 120,
    /// Receipts.
    ReceiptBlock = 150,
    /// Rewards.
    RewardsBlock = 255,
}

impl BlockType {
    /// Canonical type identifier.
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// An ordered list of transaction hashes of one kind between two shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MiniBlock {
    /// Referenced transaction hashes, in execution order.
    pub tx_hashes: Vec<Hash>,
    /// Destination shard.
    pub receiver_shard_id: ShardId,
    /// Source shard.
    pub sender_shard_id: ShardId,
    /// Kind of every referenced transaction.
    pub block_type: BlockType,
}

impl MiniBlock {
    /// Create an empty miniblock.
    pub fn new(sender_shard_id: ShardId, receiver_shard_id: ShardId, block_type: BlockType) -> Self {
        Self {
            tx_hashes: Vec::new(),
            receiver_shard_id,
            sender_shard_id,
            block_type,
        }
    }

    /// Content hash of the canonical encoding.
    pub fn hash(&self) -> Result<Hash, SerializationError> {
        calculate_hash(self)
    }
}

/// A block payload: an ordered list of miniblocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Body {
    /// Miniblocks in block order.
    pub mini_blocks: Vec<MiniBlock>,
}

impl Body {
    /// Create a body from miniblocks.
    pub fn new(mini_blocks: Vec<MiniBlock>) -> Self {
        Self { mini_blocks }
    }

    /// Total number of referenced transactions.
    pub fn tx_count(&self) -> usize {
        self.mini_blocks.iter().map(|mb| mb.tx_hashes.len()).sum()
    }

    /// True when the body has no miniblocks.
    pub fn is_empty(&self) -> bool {
        self.mini_blocks.is_empty()
    }
}

impl From<Vec<MiniBlock>> for Body {
    fn from(mini_blocks: Vec<MiniBlock>) -> Self {
        Self { mini_blocks }
    }
}

// =============================================================================
// CLUSTER D: HEADER
// =============================================================================

/// Header entry committing to one miniblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MiniBlockHeader {
    /// Miniblock hash.
    pub hash: Hash,
    /// Source shard.
    pub sender_shard_id: ShardId,
    /// Destination shard.
    pub receiver_shard_id: ShardId,
    /// Number of referenced transactions.
    pub tx_count: u32,
    /// Miniblock kind.
    pub block_type: BlockType,
}

impl MiniBlockHeader {
    /// Build the header entry for a miniblock.
    pub fn from_mini_block(mini_block: &MiniBlock) -> Result<Self, SerializationError> {
        Ok(Self {
            hash: mini_block.hash()?,
            sender_shard_id: mini_block.sender_shard_id,
            receiver_shard_id: mini_block.receiver_shard_id,
            tx_count: mini_block.tx_hashes.len() as u32,
            block_type: mini_block.block_type,
        })
    }
}

/// Block header (the parts the coordination core reads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    /// Block nonce.
    pub nonce: u64,
    /// Consensus round.
    pub round: u64,
    /// Shard that produced the block.
    pub shard_id: ShardId,
    /// Committed miniblocks, in block order.
    pub mini_block_headers: Vec<MiniBlockHeader>,
    /// Hash over the intra-shard intermediate miniblocks.
    pub receipts_hash: Hash,
}

impl Header {
    /// Cross-shard miniblocks destined to `shard_id`, as `(hash, sender shard)`
    /// pairs in header order.
    pub fn mini_block_headers_with_dst(&self, shard_id: ShardId) -> Vec<(Hash, ShardId)> {
        self.mini_block_headers
            .iter()
            .filter(|mbh| mbh.receiver_shard_id == shard_id && mbh.sender_shard_id != shard_id)
            .map(|mbh| (mbh.hash, mbh.sender_shard_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            value: U256::from(10),
            rcv_addr: vec![2u8; 32],
            snd_addr: vec![1u8; 32],
            gas_price: 1,
            gas_limit: 50_000,
            data: Vec::new(),
            signature: vec![7u8; 64],
        }
    }

    #[test]
    fn test_block_type_order_follows_identifiers() {
        let mut types = vec![
            BlockType::RewardsBlock,
            BlockType::SmartContractResultBlock,
            BlockType::TxBlock,
            BlockType::PeerBlock,
        ];
        types.sort();
        assert_eq!(
            types,
            vec![
                BlockType::TxBlock,
                BlockType::PeerBlock,
                BlockType::SmartContractResultBlock,
                BlockType::RewardsBlock,
            ]
        );
        assert_eq!(BlockType::RewardsBlock.id(), 255);
    }

    #[test]
    fn test_transaction_hash_is_content_addressed() {
        let a = BlockTransaction::from(sample_tx(1));
        let b = BlockTransaction::from(sample_tx(1));
        let c = BlockTransaction::from(sample_tx(2));

        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
    }

    #[test]
    fn test_same_fields_different_kind_hash_differently() {
        let scr = BlockTransaction::from(SmartContractResult::default());
        let tx = BlockTransaction::from(Transaction::default());
        assert_ne!(scr.hash().unwrap(), tx.hash().unwrap());
    }

    #[test]
    fn test_reward_accessors() {
        let rtx = BlockTransaction::from(RewardTx {
            round: 9,
            rcv_addr: vec![3u8; 32],
            ..Default::default()
        });
        assert_eq!(rtx.block_type(), BlockType::RewardsBlock);
        assert_eq!(rtx.nonce(), 9);
        assert!(rtx.sender().is_empty());
        assert_eq!(rtx.gas_limit(), 0);
    }

    #[test]
    fn test_header_cross_shard_filter() {
        let header = Header {
            mini_block_headers: vec![
                MiniBlockHeader {
                    hash: [1u8; 32],
                    sender_shard_id: 1,
                    receiver_shard_id: 0,
                    ..Default::default()
                },
                MiniBlockHeader {
                    hash: [2u8; 32],
                    sender_shard_id: 0,
                    receiver_shard_id: 0,
                    ..Default::default()
                },
                MiniBlockHeader {
                    hash: [3u8; 32],
                    sender_shard_id: 2,
                    receiver_shard_id: 1,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let cross = header.mini_block_headers_with_dst(0);
        assert_eq!(cross, vec![([1u8; 32], 1)]);
    }

    #[test]
    fn test_body_tx_count() {
        let mut mb1 = MiniBlock::new(0, 1, BlockType::TxBlock);
        mb1.tx_hashes = vec![[1u8; 32], [2u8; 32]];
        let mut mb2 = MiniBlock::new(0, 0, BlockType::SmartContractResultBlock);
        mb2.tx_hashes = vec![[3u8; 32]];

        let body = Body::new(vec![mb1, mb2]);
        assert_eq!(body.tx_count(), 3);
        assert!(!body.is_empty());
    }
}
