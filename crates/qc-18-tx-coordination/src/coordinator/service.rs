//! Transaction Coordinator Service
//!
//! Main service implementing [`TransactionCoordinatorApi`]. Splits a block
//! body by miniblock kind and drives one pre-processor per kind, then folds
//! the intermediate processors' results into the proposed body.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use shared_types::{calculate_hash, Body, BlockTransaction, BlockType, Hash, Header, MiniBlock, ShardId};
use tracing::{debug, info, info_span, trace, warn, Span};

use super::containers::{IntermediateProcessorsContainer, PreProcessorsContainer};
use crate::algorithms::{create_broadcast_topic, separate_body_by_type};
use crate::domain::invariants::{check_mini_blocks_order, tx_space_exceeded};
use crate::domain::{ProcessError, Result};
use crate::ports::{
    CrossShardOutcome, GasHandler, HaveTime, IntermediateProcessor, MarshalizedData,
    MiniBlockCache, PreProcessor, RequestHandler, RequestedItemsHandler, ShardCoordinator,
    StateJournal, TimeRemaining, TransactionCoordinatorApi,
};

/// Dependencies of a [`TransactionCoordinator`].
#[derive(Default)]
pub struct ArgTransactionCoordinator {
    /// Shard topology.
    pub shard_coordinator: Option<Arc<dyn ShardCoordinator>>,
    /// Journal of the account store, for miniblock-level reverts.
    pub accounts: Option<Arc<dyn StateJournal>>,
    /// Cache of received miniblocks.
    pub mini_block_pool: Option<Arc<dyn MiniBlockCache>>,
    /// Network requests.
    pub request_handler: Option<Arc<dyn RequestHandler>>,
    /// One pre-processor per handled kind.
    pub pre_processors: Option<PreProcessorsContainer>,
    /// One intermediate processor per produced kind.
    pub intermediate_processors: Option<IntermediateProcessorsContainer>,
    /// Gas bookkeeping, reset at every round.
    pub gas_handler: Option<Arc<dyn GasHandler>>,
    /// Outstanding request tracker.
    pub requested_items: Option<Arc<dyn RequestedItemsHandler>>,
}

/// Transaction Coordinator
///
/// Per-kind work inside one call runs on the rayon pool; calls
/// themselves are expected to come from the single block-processing
/// pipeline.
pub struct TransactionCoordinator {
    shard_coordinator: Arc<dyn ShardCoordinator>,
    accounts: Arc<dyn StateJournal>,
    mini_block_pool: Arc<dyn MiniBlockCache>,
    request_handler: Arc<dyn RequestHandler>,
    pre_processors: PreProcessorsContainer,
    intermediate_processors: IntermediateProcessorsContainer,
    gas_handler: Arc<dyn GasHandler>,
    requested_items: Arc<dyn RequestedItemsHandler>,
    requested_txs: RwLock<BTreeMap<BlockType, usize>>,
    span: Span,
}

type Job<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// Run `task` once per item on the rayon pool and wait for all of them.
fn fork_join<T: Send>(span: &Span, items: Vec<T>, task: impl Fn(T) + Sync + Send) {
    items.into_par_iter().for_each(|item| {
        let _guard = span.enter();
        task(item)
    });
}

/// Like [`fork_join`]; every task runs to completion and the first error
/// recorded is returned.
fn fork_join_first_error<T: Send>(
    span: &Span,
    items: Vec<T>,
    task: impl Fn(T) -> Result<()> + Sync + Send,
) -> Result<()> {
    let first_error: Mutex<Option<ProcessError>> = Mutex::new(None);
    fork_join(span, items, |item| {
        if let Err(error) = task(item) {
            first_error.lock().get_or_insert(error);
        }
    });
    first_error.into_inner().map_or(Ok(()), Err)
}

impl TransactionCoordinator {
    /// Create a coordinator and subscribe it to miniblock arrivals.
    pub fn new(args: ArgTransactionCoordinator) -> Result<Arc<Self>> {
        let shard_coordinator = args
            .shard_coordinator
            .ok_or(ProcessError::NilShardCoordinator)?;
        let accounts = args.accounts.ok_or(ProcessError::NilAccountsAdapter)?;
        let mini_block_pool = args.mini_block_pool.ok_or(ProcessError::NilMiniBlockPool)?;
        let request_handler = args.request_handler.ok_or(ProcessError::NilRequestHandler)?;
        let pre_processors = args
            .pre_processors
            .ok_or(ProcessError::NilPreProcessorsContainer)?;
        let intermediate_processors = args
            .intermediate_processors
            .ok_or(ProcessError::NilIntermediateProcessorContainer)?;
        let gas_handler = args.gas_handler.ok_or(ProcessError::NilGasHandler)?;
        let requested_items = args
            .requested_items
            .ok_or(ProcessError::NilRequestedItemsHandler)?;

        let span = info_span!("tx_coordinator", shard = shard_coordinator.self_id());

        let coordinator = Arc::new(Self {
            shard_coordinator,
            accounts,
            mini_block_pool,
            request_handler,
            pre_processors,
            intermediate_processors,
            gas_handler,
            requested_items,
            requested_txs: RwLock::new(BTreeMap::new()),
            span,
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator
            .mini_block_pool
            .register_handler(Box::new(move |hash| {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.received_mini_block(hash);
                }
            }));

        info!(
            shard = coordinator.self_id(),
            pre_processors = coordinator.pre_processors.len(),
            intermediate_processors = coordinator.intermediate_processors.len(),
            "Transaction coordinator ready"
        );

        Ok(coordinator)
    }

    fn self_id(&self) -> ShardId {
        self.shard_coordinator.self_id()
    }

    /// Transactions of `block_type` missing after the last
    /// `request_block_transactions`.
    pub fn requested_txs(&self, block_type: BlockType) -> usize {
        self.requested_txs
            .read()
            .get(&block_type)
            .copied()
            .unwrap_or(0)
    }

    /// Group the miniblocks of `body` by kind.
    pub fn separate_body_by_type(&self, body: &Body) -> BTreeMap<BlockType, Body> {
        separate_body_by_type(body)
    }

    /// Miniblock pool arrival callback.
    fn received_mini_block(&self, hash: Hash) {
        let _guard = self.span.enter();
        let Some(mini_block) = self.mini_block_pool.peek(&hash) else {
            return;
        };
        let Ok(pre_processor) = self.pre_processors.get(mini_block.block_type) else {
            trace!(block_type = ?mini_block.block_type, "No pre-processor for received miniblock");
            return;
        };
        let requested = pre_processor.request_transactions_for_mini_block(&mini_block);
        trace!(
            hash = %hex::encode(hash),
            requested,
            "Received miniblock"
        );
    }

    fn request_mini_block_once(&self, sender_shard: ShardId, hash: Hash) {
        if self.requested_items.has(&hash) {
            return;
        }
        if let Err(error) = self.requested_items.add(&hash) {
            debug!(hash = %hex::encode(hash), %error, "Could not track requested miniblock");
        }
        self.request_handler.request_mini_block(sender_shard, hash);
    }

    /// Execute one miniblock atomically.
    ///
    /// On failure the account store is reverted to the state it had before
    /// the miniblock.
    pub fn process_complete_mini_block(
        &self,
        pre_processor: &dyn PreProcessor,
        mini_block: &MiniBlock,
        round: u64,
        have_time: HaveTime<'_>,
    ) -> Result<()> {
        let snapshot = self.accounts.snapshot();

        if let Err(error) = pre_processor.process_mini_block(mini_block, have_time, round) {
            debug!(
                block_type = ?mini_block.block_type,
                sender = mini_block.sender_shard_id,
                %error,
                "Miniblock processing failed, reverting"
            );
            if let Err(revert_error) = self.accounts.revert_to_snapshot(snapshot) {
                warn!(%revert_error, "Revert to snapshot failed");
            }
            return Err(error);
        }

        Ok(())
    }

    /// Kinds of `body` paired with their pre-processor. Kinds without one are
    /// skipped.
    fn pre_processor_jobs(&self, body: &Body) -> Vec<(Arc<dyn PreProcessor>, Body)> {
        separate_body_by_type(body)
            .into_iter()
            .filter_map(|(block_type, kind_body)| match self.pre_processors.get(block_type) {
                Ok(pre_processor) => Some((pre_processor, kind_body)),
                Err(_) => {
                    trace!(?block_type, "No pre-processor for kind");
                    None
                }
            })
            .collect()
    }

    /// Intermediate miniblocks of every kind except rewards, then rewards.
    fn create_intermediate_mini_blocks(&self) -> Vec<MiniBlock> {
        let mut mini_blocks: Vec<MiniBlock> = self
            .intermediate_processors
            .iter()
            .filter(|(block_type, _)| *block_type != BlockType::RewardsBlock)
            .flat_map(|(_, processor)| processor.create_all_inter_mini_blocks())
            .collect();

        if let Ok(rewards) = self.intermediate_processors.get(BlockType::RewardsBlock) {
            mini_blocks.extend(rewards.create_all_inter_mini_blocks());
        }
        mini_blocks
    }
}

impl TransactionCoordinatorApi for TransactionCoordinator {
    fn request_block_transactions(&self, body: &Body) {
        let _guard = self.span.enter();
        self.requested_txs.write().clear();

        fork_join(&self.span, self.pre_processor_jobs(body), |(pre_processor, kind_body)| {
            let requested = pre_processor.request_block_transactions(&kind_body);
            self.requested_txs
                .write()
                .insert(pre_processor.block_type(), requested);
        });

        debug!(requested = ?*self.requested_txs.read(), "Requested block transactions");
    }

    fn is_data_prepared_for_processing(&self, time_remaining: TimeRemaining<'_>) -> Result<()> {
        let _guard = self.span.enter();
        let requested = self.requested_txs.read();

        let jobs: Vec<(Arc<dyn PreProcessor>, usize)> = requested
            .iter()
            .filter_map(|(block_type, count)| {
                self.pre_processors
                    .get(*block_type)
                    .ok()
                    .map(|pre_processor| (pre_processor, *count))
            })
            .collect();

        fork_join_first_error(&self.span, jobs, |(pre_processor, count)| {
            pre_processor.is_data_prepared(count, time_remaining)
        })
    }

    fn process_block_transaction(
        &self,
        body: &Body,
        time_remaining: TimeRemaining<'_>,
    ) -> Result<()> {
        let _guard = self.span.enter();

        // 1. Cross-shard miniblocks precede the ones created here
        check_mini_blocks_order(body, self.self_id())?;

        // 2. Every kind in the body needs a pre-processor
        let separated = separate_body_by_type(body);
        let mut kinds = Vec::with_capacity(separated.len());
        for (block_type, kind_body) in separated {
            let pre_processor = self.pre_processors.get(block_type).map_err(|_| {
                warn!(?block_type, "Body holds a kind without pre-processor");
                ProcessError::MissingPreProcessor
            })?;
            kinds.push((pre_processor, kind_body));
        }

        // 3. Kinds run one after the other, in ascending type order
        let have_time = || !time_remaining().is_zero();
        for (pre_processor, kind_body) in kinds {
            if let Err(error) = pre_processor.process_block_transactions(&kind_body, &have_time) {
                debug!(block_type = ?pre_processor.block_type(), %error, "Block transactions failed");
                return Err(error);
            }
        }

        Ok(())
    }

    fn create_mbs_and_process_cross_shard_transactions_dst_me(
        &self,
        header: &Header,
        processed_mini_blocks: &HashSet<Hash>,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> CrossShardOutcome {
        let _guard = self.span.enter();
        let cross_mini_blocks = header.mini_block_headers_with_dst(self.self_id());
        let mut outcome = CrossShardOutcome::default();
        let mut processed = 0usize;

        for (hash, sender_shard) in &cross_mini_blocks {
            if !have_time() {
                debug!("Out of time while processing cross-shard miniblocks");
                break;
            }

            if processed_mini_blocks.contains(hash) {
                processed += 1;
                continue;
            }

            let Some(mini_block) = self.mini_block_pool.peek(hash) else {
                self.request_mini_block_once(*sender_shard, *hash);
                continue;
            };

            let Ok(pre_processor) = self.pre_processors.get(mini_block.block_type) else {
                continue;
            };

            if tx_space_exceeded(outcome.tx_added, mini_block.tx_hashes.len(), max_tx_space) {
                outcome.all_processed = false;
                return outcome;
            }

            if pre_processor.request_transactions_for_mini_block(&mini_block) > 0 {
                continue;
            }

            if self
                .process_complete_mini_block(pre_processor.as_ref(), &mini_block, header.round, have_time)
                .is_err()
            {
                continue;
            }

            outcome.tx_added += mini_block.tx_hashes.len();
            outcome.mini_blocks.push(mini_block);
            processed += 1;

            if outcome.mini_blocks.len() >= max_mb_space {
                debug!(
                    mini_blocks = outcome.mini_blocks.len(),
                    tx_added = outcome.tx_added,
                    "Miniblock space filled by cross-shard miniblocks"
                );
                outcome.all_processed = false;
                return outcome;
            }
        }

        outcome.all_processed = processed == cross_mini_blocks.len();
        debug!(
            mini_blocks = outcome.mini_blocks.len(),
            tx_added = outcome.tx_added,
            all_processed = outcome.all_processed,
            "Processed cross-shard miniblocks"
        );
        outcome
    }

    fn create_mbs_and_process_transactions_from_me(
        &self,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> Vec<MiniBlock> {
        let _guard = self.span.enter();
        let mut mini_blocks: Vec<MiniBlock> = Vec::new();

        for (block_type, pre_processor) in self.pre_processors.iter() {
            let tx_added: usize = mini_blocks.iter().map(|mb| mb.tx_hashes.len()).sum();
            let tx_space = max_tx_space.saturating_sub(tx_added);
            let mb_space = max_mb_space.saturating_sub(mini_blocks.len());
            if tx_space == 0 || mb_space == 0 {
                break;
            }

            match pre_processor.create_and_process_mini_blocks(tx_space, mb_space, have_time) {
                Ok(created) => mini_blocks.extend(created),
                Err(error) => {
                    debug!(?block_type, %error, "Could not create miniblocks");
                }
            }
        }

        mini_blocks.extend(self.create_intermediate_mini_blocks());

        debug!(mini_blocks = mini_blocks.len(), "Created miniblocks from me");
        mini_blocks
    }

    fn save_block_data_to_storage(&self, body: &Body) -> Result<()> {
        let _guard = self.span.enter();

        let mut jobs: Vec<Job<'_>> = Vec::new();
        for (pre_processor, kind_body) in self.pre_processor_jobs(body) {
            jobs.push(Box::new(move || pre_processor.save_tx_block_to_storage(&kind_body)));
        }
        for (_, processor) in self.intermediate_processors.iter() {
            let processor = Arc::clone(processor);
            jobs.push(Box::new(move || processor.save_current_intermediate_tx_to_storage()));
        }

        fork_join_first_error(&self.span, jobs, |job: Job<'_>| job())
    }

    fn restore_block_data_from_storage(&self, body: &Body) -> Result<usize> {
        let _guard = self.span.enter();
        let restored = Mutex::new(0usize);

        fork_join_first_error(
            &self.span,
            self.pre_processor_jobs(body),
            |(pre_processor, kind_body)| {
                let count = pre_processor
                    .restore_tx_block_into_pools(&kind_body, self.mini_block_pool.as_ref())?;
                *restored.lock() += count;
                Ok(())
            },
        )?;

        let restored = restored.into_inner();
        debug!(restored, "Restored block data into pools");
        Ok(restored)
    }

    fn remove_block_data_from_pool(&self, body: &Body) -> Result<()> {
        let _guard = self.span.enter();
        fork_join_first_error(
            &self.span,
            self.pre_processor_jobs(body),
            |(pre_processor, kind_body)| {
                pre_processor.remove_tx_block_from_pools(&kind_body, self.mini_block_pool.as_ref())
            },
        )
    }

    fn create_marshalized_data(&self, body: &Body) -> MarshalizedData {
        let _guard = self.span.enter();
        let self_id = self.self_id();
        let mut data = MarshalizedData::default();

        for mini_block in &body.mini_blocks {
            if mini_block.receiver_shard_id == self_id {
                continue;
            }

            let topic = match create_broadcast_topic(
                self.shard_coordinator.as_ref(),
                mini_block.receiver_shard_id,
                mini_block.block_type,
            ) {
                Ok(topic) => topic,
                Err(error) => {
                    debug!(block_type = ?mini_block.block_type, %error, "No broadcast topic");
                    continue;
                }
            };

            let mut encoded = Vec::new();
            let mut known_kind = false;

            if let Ok(pre_processor) = self.pre_processors.get(mini_block.block_type) {
                known_kind = true;
                match pre_processor.create_marshalized_data(&mini_block.tx_hashes) {
                    Ok(txs) => encoded.extend(txs),
                    Err(error) => trace!(%error, "Could not marshal pre-processed transactions"),
                }
            }

            if let Ok(processor) = self.intermediate_processors.get(mini_block.block_type) {
                known_kind = true;
                match processor.create_marshalized_data(&mini_block.tx_hashes) {
                    Ok(txs) => encoded.extend(txs),
                    Err(error) => trace!(%error, "Could not marshal intermediate transactions"),
                }
            }

            if !known_kind {
                continue;
            }

            data.mini_blocks_per_shard
                .entry(mini_block.receiver_shard_id)
                .or_default()
                .push(mini_block.clone());
            if !encoded.is_empty() {
                data.txs_per_topic.entry(topic).or_default().extend(encoded);
            }
        }

        data
    }

    fn verify_created_block_transactions(&self, body: &Body) -> Result<()> {
        let _guard = self.span.enter();

        let non_reward: Vec<Arc<dyn IntermediateProcessor>> = self
            .intermediate_processors
            .iter()
            .filter(|(block_type, _)| *block_type != BlockType::RewardsBlock)
            .map(|(_, processor)| Arc::clone(processor))
            .collect();

        fork_join_first_error(&self.span, non_reward, |processor| {
            processor.verify_inter_mini_blocks(body)
        })?;

        match self.intermediate_processors.get(BlockType::RewardsBlock) {
            Ok(rewards) => rewards.verify_inter_mini_blocks(body),
            Err(_) => Ok(()),
        }
    }

    fn create_receipts_hash(&self) -> Result<Hash> {
        let mut all_hashes: Vec<Hash> = Vec::with_capacity(self.intermediate_processors.len());
        for (_, processor) in self.intermediate_processors.iter() {
            let in_shard = processor.get_created_in_shard_mini_block();
            all_hashes.push(calculate_hash(&in_shard)?);
        }
        Ok(calculate_hash(&all_hashes)?)
    }

    fn verify_receipts_hash(&self, header: &Header) -> Result<()> {
        let local = self.create_receipts_hash()?;
        if local != header.receipts_hash {
            warn!(
                local = %hex::encode(local),
                header = %hex::encode(header.receipts_hash),
                "Receipts hash mismatch"
            );
            return Err(ProcessError::ReceiptsHashMismatch);
        }
        Ok(())
    }

    fn request_mini_blocks(&self, header: &Header) {
        let _guard = self.span.enter();
        for (hash, sender_shard) in header.mini_block_headers_with_dst(self.self_id()) {
            if self.mini_block_pool.has(&hash) {
                continue;
            }
            self.request_mini_block_once(sender_shard, hash);
        }
    }

    fn create_block_started(&self) {
        self.gas_handler.init();
        for (_, pre_processor) in self.pre_processors.iter() {
            pre_processor.create_block_started();
        }
        for (_, processor) in self.intermediate_processors.iter() {
            processor.create_block_started();
        }
        self.requested_txs.write().clear();
        self.requested_items.sweep();
    }

    fn get_all_current_used_txs(&self, block_type: BlockType) -> HashMap<Hash, BlockTransaction> {
        let mut txs = HashMap::new();
        if let Ok(pre_processor) = self.pre_processors.get(block_type) {
            txs.extend(pre_processor.get_all_current_used_txs());
        }
        if let Ok(processor) = self.intermediate_processors.get(block_type) {
            txs.extend(processor.get_all_current_finished_txs());
        }
        txs
    }
}
