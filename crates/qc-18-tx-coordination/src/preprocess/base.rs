//! Working set and request glue shared by the pre-processors.

use std::collections::HashMap;

use shared_types::{marshal, BlockTransaction, BlockType, Hash, ShardId};
use tracing::{debug, warn};

use crate::domain::{PreProcessorState, ProcessError, Result, UnitType};
use crate::ports::RequestedItemsHandler;

/// Storage unit holding transactions of `block_type`.
pub fn storage_unit(block_type: BlockType) -> Result<UnitType> {
    match block_type {
        BlockType::TxBlock => Ok(UnitType::TransactionUnit),
        BlockType::SmartContractResultBlock => Ok(UnitType::UnsignedTransactionUnit),
        BlockType::RewardsBlock => Ok(UnitType::RewardTransactionUnit),
        other => Err(ProcessError::UnsupportedBlockType(other)),
    }
}

/// Keep the hashes with no outstanding request and mark them as requested.
///
/// A hash listed twice is kept once.
pub fn filter_unrequested(
    requested_items: &dyn RequestedItemsHandler,
    hashes: impl IntoIterator<Item = Hash>,
) -> Vec<Hash> {
    let mut to_request = Vec::new();
    for hash in hashes {
        if requested_items.has(&hash) {
            continue;
        }
        if let Err(error) = requested_items.add(&hash) {
            debug!(hash = %hex::encode(hash), %error, "Could not track requested item");
        }
        to_request.push(hash);
    }
    to_request
}

#[derive(Debug, Clone)]
pub(crate) struct TxInfo {
    pub tx: Option<BlockTransaction>,
    pub sender_shard: ShardId,
    pub receiver_shard: ShardId,
}

/// Transactions referenced in the current round. `None` marks a transaction
/// that was requested and has not arrived yet.
#[derive(Debug, Default)]
pub(crate) struct TxsForBlock {
    pub missing: usize,
    pub txs: HashMap<Hash, TxInfo>,
    pub state: PreProcessorState,
}

impl TxsForBlock {
    pub fn reset(&mut self) {
        self.missing = 0;
        self.txs.clear();
        self.state = PreProcessorState::Idle;
    }

    pub fn tx(&self, hash: &Hash) -> Option<BlockTransaction> {
        self.txs.get(hash).and_then(|info| info.tx.clone())
    }

    pub fn has_tx(&self, hash: &Hash) -> bool {
        self.txs.get(hash).is_some_and(|info| info.tx.is_some())
    }

    pub fn insert_tx(&mut self, hash: Hash, tx: BlockTransaction, sender: ShardId, receiver: ShardId) {
        self.txs.insert(
            hash,
            TxInfo {
                tx: Some(tx),
                sender_shard: sender,
                receiver_shard: receiver,
            },
        );
    }

    /// Track `hash` as missing. The counter moves only for hashes not
    /// already tracked.
    pub fn track_missing(&mut self, hash: Hash, sender: ShardId, receiver: ShardId) {
        if self.txs.contains_key(&hash) {
            return;
        }
        self.txs.insert(
            hash,
            TxInfo {
                tx: None,
                sender_shard: sender,
                receiver_shard: receiver,
            },
        );
        self.missing += 1;
    }

    /// Shards of a hash still waiting for its transaction.
    pub fn awaited(&self, hash: &Hash) -> Option<(ShardId, ShardId)> {
        self.txs
            .get(hash)
            .filter(|info| info.tx.is_none())
            .map(|info| (info.sender_shard, info.receiver_shard))
    }

    /// Fill an awaited entry. Returns true when the last missing transaction arrived.
    pub fn fill(&mut self, hash: &Hash, tx: BlockTransaction) -> bool {
        let Some(info) = self.txs.get_mut(hash) else {
            return false;
        };
        if info.tx.is_some() {
            return false;
        }
        info.tx = Some(tx);
        if self.missing == 0 {
            return false;
        }
        self.missing -= 1;
        self.missing == 0
    }

    pub fn used_txs(&self) -> HashMap<Hash, BlockTransaction> {
        self.txs
            .iter()
            .filter_map(|(hash, info)| info.tx.clone().map(|tx| (*hash, tx)))
            .collect()
    }

    /// Canonical encodings of the referenced transactions. Unknown hashes are skipped.
    pub fn marshalized(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>> {
        let mut encoded = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.tx(hash) {
                Some(tx) => encoded.push(marshal(&tx)?),
                None => warn!(hash = %hex::encode(hash), "Missing transaction while marshalizing"),
            }
        }
        Ok(encoded)
    }
}
