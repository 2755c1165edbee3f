//! Accumulator of transactions generated while executing a block.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{marshal, Body, BlockTransaction, BlockType, Hash, MiniBlock, ShardId};
use tracing::{debug, info_span, trace, warn, Span};

use crate::domain::{ProcessError, Result, UnitType};
use crate::ports::{IntermediateProcessor, ShardCoordinator, TransactionCacher, TxStorer};
use crate::preprocess::storage_unit;

/// Dependencies of an [`IntermediateResultsProcessor`].
pub struct ArgIntermediateResultsProcessor {
    /// Kind produced: `SmartContractResultBlock` or `RewardsBlock`.
    pub block_type: BlockType,
    /// Shard topology.
    pub shard_coordinator: Option<Arc<dyn ShardCoordinator>>,
    /// Storage of produced transactions.
    pub storage: Option<Arc<dyn TxStorer>>,
    /// Cache of the transactions belonging to the current block.
    pub current_txs: Option<Arc<dyn TransactionCacher>>,
}

struct InterResult {
    tx: BlockTransaction,
    sender_shard: ShardId,
    receiver_shard: ShardId,
}

#[derive(Default)]
struct InterResults {
    txs: BTreeMap<Hash, InterResult>,
    intra_shard_mini_block: Option<MiniBlock>,
}

/// Intermediate processor for smart contract results and rewards.
pub struct IntermediateResultsProcessor {
    block_type: BlockType,
    storage_unit: UnitType,
    shard_coordinator: Arc<dyn ShardCoordinator>,
    storage: Arc<dyn TxStorer>,
    current_txs: Arc<dyn TransactionCacher>,
    results: Mutex<InterResults>,
    span: Span,
}

impl IntermediateResultsProcessor {
    /// Create a processor.
    pub fn new(args: ArgIntermediateResultsProcessor) -> Result<Self> {
        if !matches!(
            args.block_type,
            BlockType::SmartContractResultBlock | BlockType::RewardsBlock
        ) {
            return Err(ProcessError::UnsupportedBlockType(args.block_type));
        }
        let storage_unit = storage_unit(args.block_type)?;
        let shard_coordinator = args
            .shard_coordinator
            .ok_or(ProcessError::NilShardCoordinator)?;
        let storage = args.storage.ok_or(ProcessError::NilTxStorage)?;
        let current_txs = args
            .current_txs
            .ok_or(ProcessError::NilTxForCurrentBlockHandler)?;

        let span = info_span!(
            "intermediate_results",
            block_type = ?args.block_type,
            shard = shard_coordinator.self_id()
        );

        Ok(Self {
            block_type: args.block_type,
            storage_unit,
            shard_coordinator,
            storage,
            current_txs,
            results: Mutex::new(InterResults::default()),
            span,
        })
    }

    /// The all-zero (or empty) address belongs to this shard.
    fn shard_of(&self, address: &[u8]) -> ShardId {
        if address.iter().all(|b| *b == 0) {
            return self.shard_coordinator.self_id();
        }
        self.shard_coordinator.compute_id(address)
    }
}

impl IntermediateProcessor for IntermediateResultsProcessor {
    fn block_type(&self) -> BlockType {
        self.block_type
    }

    fn add_intermediate_transactions(&self, txs: Vec<BlockTransaction>) -> Result<()> {
        let _guard = self.span.enter();
        let mut results = self.results.lock();

        for tx in txs {
            if tx.block_type() != self.block_type {
                return Err(ProcessError::WrongTypeAssertion);
            }
            let hash = tx.hash()?;
            let sender_shard = self.shard_of(tx.sender());
            let receiver_shard = self.shard_of(tx.receiver());

            debug!(
                hash = %hex::encode(hash),
                nonce = tx.nonce(),
                value = %tx.value(),
                receiver_shard,
                "Intermediate transaction added"
            );
            results.txs.insert(
                hash,
                InterResult {
                    tx,
                    sender_shard,
                    receiver_shard,
                },
            );
        }
        Ok(())
    }

    fn create_all_inter_mini_blocks(&self) -> Vec<MiniBlock> {
        let _guard = self.span.enter();
        let self_id = self.shard_coordinator.self_id();

        self.current_txs.clean();
        let mut results = self.results.lock();

        let mut per_destination: BTreeMap<ShardId, MiniBlock> = BTreeMap::new();
        for (hash, result) in &results.txs {
            per_destination
                .entry(result.receiver_shard)
                .or_insert_with(|| MiniBlock::new(self_id, result.receiver_shard, self.block_type))
                .tx_hashes
                .push(*hash);
            self.current_txs.add_tx(*hash, result.tx.clone());
        }

        let mini_blocks: Vec<MiniBlock> = per_destination
            .into_values()
            .map(|mut mini_block| {
                mini_block.tx_hashes.sort_unstable();
                trace!(
                    receiver = mini_block.receiver_shard_id,
                    txs = mini_block.tx_hashes.len(),
                    "Created intermediate miniblock"
                );
                mini_block
            })
            .collect();

        results.intra_shard_mini_block = mini_blocks
            .iter()
            .find(|mb| mb.receiver_shard_id == self_id)
            .cloned();

        mini_blocks
    }

    fn verify_inter_mini_blocks(&self, body: &Body) -> Result<()> {
        let self_id = self.shard_coordinator.self_id();
        let created: BTreeMap<ShardId, MiniBlock> = self
            .create_all_inter_mini_blocks()
            .into_iter()
            .filter(|mb| mb.receiver_shard_id != self_id)
            .map(|mb| (mb.receiver_shard_id, mb))
            .collect();

        let _guard = self.span.enter();
        let mut received = 0usize;
        for mini_block in body
            .mini_blocks
            .iter()
            .filter(|mb| mb.block_type == self.block_type && mb.receiver_shard_id != self_id)
        {
            received += 1;
            let expected = created
                .get(&mini_block.receiver_shard_id)
                .ok_or(ProcessError::MiniBlockHashMismatch)?;
            if expected.hash()? != mini_block.hash()? {
                debug!(
                    receiver = mini_block.receiver_shard_id,
                    "Intermediate miniblock differs"
                );
                return Err(ProcessError::MiniBlockHashMismatch);
            }
        }

        if created.len() != received {
            return Err(ProcessError::MiniBlockNumMismatch {
                created: created.len(),
                received,
            });
        }
        Ok(())
    }

    fn save_current_intermediate_tx_to_storage(&self) -> Result<()> {
        let results = self.results.lock();
        for (hash, result) in &results.txs {
            self.storage
                .put(self.storage_unit, hash, marshal(&result.tx)?)?;
        }
        Ok(())
    }

    fn create_block_started(&self) {
        let mut results = self.results.lock();
        results.txs.clear();
        results.intra_shard_mini_block = None;
    }

    fn get_all_current_finished_txs(&self) -> HashMap<Hash, BlockTransaction> {
        let self_id = self.shard_coordinator.self_id();
        self.results
            .lock()
            .txs
            .iter()
            .filter(|(_, result)| result.sender_shard == self_id && result.receiver_shard == self_id)
            .map(|(hash, result)| (*hash, result.tx.clone()))
            .collect()
    }

    fn create_marshalized_data(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>> {
        let results = self.results.lock();
        let mut encoded = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match results.txs.get(hash) {
                Some(result) => encoded.push(marshal(&result.tx)?),
                None => {
                    let _guard = self.span.enter();
                    warn!(hash = %hex::encode(hash), "Missing intermediate transaction");
                }
            }
        }
        Ok(encoded)
    }

    fn get_created_in_shard_mini_block(&self) -> Option<MiniBlock> {
        self.results.lock().intra_shard_mini_block.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CurrentBlockTxs, MemoryTxStorage, MultiShardCoordinator};
    use primitive_types::U256;
    use shared_types::{RewardTx, SmartContractResult, Transaction};

    fn processor(block_type: BlockType) -> (IntermediateResultsProcessor, Arc<MemoryTxStorage>, Arc<CurrentBlockTxs>) {
        let storage = Arc::new(MemoryTxStorage::new());
        let current_txs = Arc::new(CurrentBlockTxs::new());
        let processor = IntermediateResultsProcessor::new(ArgIntermediateResultsProcessor {
            block_type,
            shard_coordinator: Some(Arc::new(MultiShardCoordinator::new(2, 0).unwrap())),
            storage: Some(storage.clone()),
            current_txs: Some(current_txs.clone()),
        })
        .unwrap();
        (processor, storage, current_txs)
    }

    // shard 0 of 2 owns addresses with an even last byte
    fn address(last: u8) -> Vec<u8> {
        let mut address = vec![7u8; 32];
        address[31] = last;
        address
    }

    fn scr(nonce: u64, sender: u8, receiver: u8) -> BlockTransaction {
        BlockTransaction::SmartContractResult(SmartContractResult {
            nonce,
            value: U256::from(1),
            snd_addr: address(sender),
            rcv_addr: address(receiver),
            ..Default::default()
        })
    }

    #[test]
    fn test_nil_dependencies() {
        let result = IntermediateResultsProcessor::new(ArgIntermediateResultsProcessor {
            block_type: BlockType::SmartContractResultBlock,
            shard_coordinator: Some(Arc::new(MultiShardCoordinator::new(2, 0).unwrap())),
            storage: Some(Arc::new(MemoryTxStorage::new())),
            current_txs: None,
        });
        assert!(matches!(result, Err(ProcessError::NilTxForCurrentBlockHandler)));

        let result = IntermediateResultsProcessor::new(ArgIntermediateResultsProcessor {
            block_type: BlockType::TxBlock,
            shard_coordinator: None,
            storage: None,
            current_txs: None,
        });
        assert!(matches!(
            result,
            Err(ProcessError::UnsupportedBlockType(BlockType::TxBlock))
        ));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let (processor, _, _) = processor(BlockType::SmartContractResultBlock);
        assert_eq!(
            processor.add_intermediate_transactions(vec![BlockTransaction::Normal(
                Transaction::default()
            )]),
            Err(ProcessError::WrongTypeAssertion)
        );
    }

    #[test]
    fn test_mini_blocks_per_destination() {
        let (processor, _, current_txs) = processor(BlockType::SmartContractResultBlock);
        processor
            .add_intermediate_transactions(vec![scr(1, 2, 3), scr(2, 2, 4), scr(3, 2, 5)])
            .unwrap();

        let mini_blocks = processor.create_all_inter_mini_blocks();
        assert_eq!(mini_blocks.len(), 2);
        assert_eq!(mini_blocks[0].receiver_shard_id, 0);
        assert_eq!(mini_blocks[0].tx_hashes.len(), 1);
        assert_eq!(mini_blocks[1].receiver_shard_id, 1);
        assert_eq!(mini_blocks[1].tx_hashes.len(), 2);
        assert!(mini_blocks[1].tx_hashes.windows(2).all(|w| w[0] < w[1]));
        assert!(mini_blocks
            .iter()
            .all(|mb| mb.sender_shard_id == 0 && mb.block_type == BlockType::SmartContractResultBlock));

        assert_eq!(
            processor.get_created_in_shard_mini_block(),
            Some(mini_blocks[0].clone())
        );
        assert!(current_txs.get_tx(&scr(1, 2, 3).hash().unwrap()).is_ok());
        assert_eq!(processor.get_all_current_finished_txs().len(), 1);
    }

    #[test]
    fn test_zero_sender_belongs_to_self() {
        let (processor, _, _) = processor(BlockType::RewardsBlock);
        let reward = BlockTransaction::Reward(RewardTx {
            round: 1,
            value: U256::from(5),
            rcv_addr: address(2),
            ..Default::default()
        });
        processor.add_intermediate_transactions(vec![reward.clone()]).unwrap();

        let finished = processor.get_all_current_finished_txs();
        assert_eq!(finished.get(&reward.hash().unwrap()), Some(&reward));
    }

    #[test]
    fn test_concurrent_adds() {
        let (processor, _, _) = processor(BlockType::SmartContractResultBlock);
        std::thread::scope(|scope| {
            for worker in 0..4u64 {
                let processor = &processor;
                scope.spawn(move || {
                    for nonce in 0..25 {
                        processor
                            .add_intermediate_transactions(vec![scr(worker * 100 + nonce, 2, 3)])
                            .unwrap();
                    }
                });
            }
        });

        let mini_blocks = processor.create_all_inter_mini_blocks();
        assert_eq!(mini_blocks[0].tx_hashes.len(), 100);
    }

    #[test]
    fn test_verify_inter_mini_blocks() {
        let (processor, _, _) = processor(BlockType::SmartContractResultBlock);
        processor
            .add_intermediate_transactions(vec![scr(1, 2, 3), scr(2, 2, 4)])
            .unwrap();
        let created = processor.create_all_inter_mini_blocks();

        assert!(processor.verify_inter_mini_blocks(&Body::new(created.clone())).is_ok());

        let mut tampered = created.clone();
        tampered[1].tx_hashes.push([9u8; 32]);
        assert_eq!(
            processor.verify_inter_mini_blocks(&Body::new(tampered)),
            Err(ProcessError::MiniBlockHashMismatch)
        );

        let only_intra: Vec<MiniBlock> = created
            .into_iter()
            .filter(|mb| mb.receiver_shard_id == 0)
            .collect();
        assert_eq!(
            processor.verify_inter_mini_blocks(&Body::new(only_intra)),
            Err(ProcessError::MiniBlockNumMismatch {
                created: 1,
                received: 0
            })
        );
    }

    #[test]
    fn test_storage_and_reset() {
        let (processor, storage, _) = processor(BlockType::SmartContractResultBlock);
        let tx = scr(1, 2, 3);
        processor.add_intermediate_transactions(vec![tx.clone()]).unwrap();

        processor.save_current_intermediate_tx_to_storage().unwrap();
        assert_eq!(storage.unit_len(UnitType::UnsignedTransactionUnit), 1);

        let encoded = processor
            .create_marshalized_data(&[tx.hash().unwrap(), [1u8; 32]])
            .unwrap();
        assert_eq!(encoded, vec![marshal(&tx).unwrap()]);

        processor.create_all_inter_mini_blocks();
        processor.create_block_started();
        assert!(processor.create_all_inter_mini_blocks().is_empty());
        assert!(processor.get_created_in_shard_mini_block().is_none());
    }
}
