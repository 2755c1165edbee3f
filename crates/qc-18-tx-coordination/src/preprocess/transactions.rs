//! Pre-processor for one transaction kind.
//!
//! User transactions are processed wherever their miniblock lives and are
//! packed from the local pool. Smart contract results and rewards arrive
//! from other shards: they are requested, processed and saved only at their
//! destination, and never packed here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use shared_types::{
    marshal, unmarshal, Body, BlockTransaction, BlockType, Hash, MiniBlock, ShardId,
    METACHAIN_SHARD_ID,
};
use tracing::{debug, info_span, trace, warn, Span};

use super::base::{filter_unrequested, storage_unit, TxsForBlock};
use crate::algorithms::shard_cacher_identifier;
use crate::config::CoordinationConfig;
use crate::domain::invariants::{check_block_gas, tx_space_exceeded};
use crate::domain::{PreProcessorState, ProcessError, Result, UnitType};
use crate::ports::{
    FeeHandler, GasHandler, HaveTime, MiniBlockCache, PreProcessor, RequestHandler,
    RequestedItemsHandler, ShardCoordinator, ShardedTxPool, StateJournal, TimeRemaining,
    TransactionProcessor, TxStorer,
};

/// Dependencies of a [`TransactionsPreProcessor`].
pub struct ArgTransactionsPreProcessor {
    /// Kind handled: `TxBlock`, `SmartContractResultBlock` or `RewardsBlock`.
    pub block_type: BlockType,
    /// Runtime configuration.
    pub config: CoordinationConfig,
    /// Pool holding transactions of this kind.
    pub tx_pool: Option<Arc<dyn ShardedTxPool>>,
    /// Storage of processed transactions.
    pub storage: Option<Arc<dyn TxStorer>>,
    /// Executor.
    pub tx_processor: Option<Arc<dyn TransactionProcessor>>,
    /// Shard topology.
    pub shard_coordinator: Option<Arc<dyn ShardCoordinator>>,
    /// Journal of the account store, for per-transaction reverts while packing.
    pub accounts: Option<Arc<dyn StateJournal>>,
    /// Network requests.
    pub request_handler: Option<Arc<dyn RequestHandler>>,
    /// Outstanding request tracker.
    pub requested_items: Option<Arc<dyn RequestedItemsHandler>>,
    /// Gas bookkeeping.
    pub gas_handler: Option<Arc<dyn GasHandler>>,
    /// Network economics.
    pub fee_handler: Option<Arc<dyn FeeHandler>>,
}

/// Pre-processor of one transaction kind.
pub struct TransactionsPreProcessor {
    block_type: BlockType,
    storage_unit: UnitType,
    data_poll_interval: Duration,
    tx_pool: Arc<dyn ShardedTxPool>,
    storage: Arc<dyn TxStorer>,
    tx_processor: Arc<dyn TransactionProcessor>,
    shard_coordinator: Arc<dyn ShardCoordinator>,
    accounts: Arc<dyn StateJournal>,
    request_handler: Arc<dyn RequestHandler>,
    requested_items: Arc<dyn RequestedItemsHandler>,
    gas_handler: Arc<dyn GasHandler>,
    fee_handler: Arc<dyn FeeHandler>,
    txs_for_block: Mutex<TxsForBlock>,
    all_txs_arrived: Condvar,
    span: Span,
}

impl TransactionsPreProcessor {
    /// Create a pre-processor and subscribe it to arrivals in its pool.
    pub fn new(args: ArgTransactionsPreProcessor) -> Result<Arc<Self>> {
        let storage_unit = storage_unit(args.block_type)?;
        let tx_pool = args.tx_pool.ok_or(ProcessError::NilTxDataPool)?;
        let storage = args.storage.ok_or(ProcessError::NilTxStorage)?;
        let tx_processor = args.tx_processor.ok_or(ProcessError::NilTxProcessor)?;
        let shard_coordinator = args
            .shard_coordinator
            .ok_or(ProcessError::NilShardCoordinator)?;
        let accounts = args.accounts.ok_or(ProcessError::NilAccountsAdapter)?;
        let request_handler = args.request_handler.ok_or(ProcessError::NilRequestHandler)?;
        let requested_items = args
            .requested_items
            .ok_or(ProcessError::NilRequestedItemsHandler)?;
        let gas_handler = args.gas_handler.ok_or(ProcessError::NilGasHandler)?;
        let fee_handler = args.fee_handler.ok_or(ProcessError::NilEconomicsFeeHandler)?;

        let span = info_span!(
            "preprocessor",
            block_type = ?args.block_type,
            shard = shard_coordinator.self_id()
        );

        let preprocessor = Arc::new(Self {
            block_type: args.block_type,
            storage_unit,
            data_poll_interval: args.config.data_poll_interval(),
            tx_pool,
            storage,
            tx_processor,
            shard_coordinator,
            accounts,
            request_handler,
            requested_items,
            gas_handler,
            fee_handler,
            txs_for_block: Mutex::new(TxsForBlock::default()),
            all_txs_arrived: Condvar::new(),
            span,
        });

        let weak = Arc::downgrade(&preprocessor);
        preprocessor.tx_pool.register_handler(Box::new(move |hash| {
            if let Some(preprocessor) = weak.upgrade() {
                preprocessor.received_transaction(hash);
            }
        }));

        Ok(preprocessor)
    }

    /// Pool arrival callback.
    fn received_transaction(&self, hash: Hash) {
        let mut block = self.txs_for_block.lock();
        let Some((sender, receiver)) = block.awaited(&hash) else {
            return;
        };
        let Some(tx) = self
            .tx_pool
            .get(&shard_cacher_identifier(sender, receiver), &hash)
        else {
            return;
        };

        if block.fill(&hash, tx) {
            let _guard = self.span.enter();
            debug!("Received all missing transactions");
            self.all_txs_arrived.notify_all();
        }
    }

    fn self_id(&self) -> ShardId {
        self.shard_coordinator.self_id()
    }

    fn is_user_kind(&self) -> bool {
        self.block_type == BlockType::TxBlock
    }

    /// Miniblocks whose missing transactions are requested by this shard.
    fn is_requested_here(&self, mini_block: &MiniBlock) -> bool {
        mini_block.block_type == self.block_type
            && (self.is_user_kind() || mini_block.sender_shard_id != self.self_id())
    }

    /// Miniblocks executed and saved by this shard.
    fn is_processed_here(&self, mini_block: &MiniBlock) -> bool {
        mini_block.block_type == self.block_type
            && (self.is_user_kind()
                || (mini_block.receiver_shard_id == self.self_id()
                    && mini_block.sender_shard_id != self.self_id()))
    }

    fn tx_for_block(&self, hash: &Hash, mini_block: &MiniBlock) -> Option<BlockTransaction> {
        if let Some(tx) = self.txs_for_block.lock().tx(hash) {
            return Some(tx);
        }
        self.tx_pool.get(
            &shard_cacher_identifier(mini_block.sender_shard_id, mini_block.receiver_shard_id),
            hash,
        )
    }

    fn request_missing(&self, dest_shard: ShardId, hashes: Vec<Hash>) {
        let to_request = filter_unrequested(self.requested_items.as_ref(), hashes);
        if to_request.is_empty() {
            return;
        }
        debug!(
            dest_shard,
            count = to_request.len(),
            "Requesting missing transactions"
        );
        self.request_handler
            .request_transactions(self.block_type, dest_shard, to_request);
    }

    /// Gas charged to this shard for `tx`, checked against the block ceiling.
    fn charge_gas(
        &self,
        mini_block: &MiniBlock,
        hash: Hash,
        tx: &BlockTransaction,
        consumed_in_self: &mut u64,
    ) -> Result<()> {
        let (in_sender, in_receiver) = self.gas_handler.compute_gas_consumed_by_tx(
            mini_block.sender_shard_id,
            mini_block.receiver_shard_id,
            tx,
        )?;
        let in_self = if mini_block.sender_shard_id == self.self_id() {
            in_sender
        } else {
            in_receiver
        };

        check_block_gas(
            *consumed_in_self,
            in_self,
            self.fee_handler.max_gas_limit_per_block(),
        )?;
        *consumed_in_self += in_self;
        self.gas_handler.set_gas_consumed(in_self, hash);
        Ok(())
    }

    /// Charge gas for every transaction of a miniblock, then execute them in order.
    fn charge_and_execute(
        &self,
        mini_block: &MiniBlock,
        txs: &[(Hash, BlockTransaction)],
        have_time: HaveTime<'_>,
        charged: &mut Vec<Hash>,
    ) -> Result<()> {
        let mut consumed_in_self = self.gas_handler.total_gas_consumed();
        for (hash, tx) in txs {
            if !have_time() {
                return Err(ProcessError::TimeIsOut);
            }
            self.charge_gas(mini_block, *hash, tx, &mut consumed_in_self)?;
            charged.push(*hash);
        }

        for (_, tx) in txs {
            if !have_time() {
                return Err(ProcessError::TimeIsOut);
            }
            self.tx_processor.process_transaction(tx)?;
        }
        Ok(())
    }

    fn remember(&self, mini_block: &MiniBlock, txs: Vec<(Hash, BlockTransaction)>) {
        let mut block = self.txs_for_block.lock();
        for (hash, tx) in txs {
            block.insert_tx(
                hash,
                tx,
                mini_block.sender_shard_id,
                mini_block.receiver_shard_id,
            );
        }
    }

    /// Destinations packed by this shard, ascending.
    fn destinations(&self) -> Vec<ShardId> {
        let mut destinations: Vec<ShardId> = (0..self.shard_coordinator.number_of_shards()).collect();
        destinations.push(METACHAIN_SHARD_ID);
        destinations
    }

    /// Pool content for `dest`, ordered by sender then nonce then hash.
    fn pending_for(&self, dest: ShardId) -> Vec<(Hash, BlockTransaction)> {
        let mut pending = self
            .tx_pool
            .cache_content(&shard_cacher_identifier(self.self_id(), dest));
        pending.sort_by(|(hash_a, tx_a), (hash_b, tx_b)| {
            tx_a.sender()
                .cmp(tx_b.sender())
                .then(tx_a.nonce().cmp(&tx_b.nonce()))
                .then(hash_a.cmp(hash_b))
        });
        pending
    }

    fn drop_from_pool(&self, dest: ShardId, hash: &Hash) {
        self.tx_pool
            .remove(&shard_cacher_identifier(self.self_id(), dest), hash);
    }
}

impl PreProcessor for TransactionsPreProcessor {
    fn block_type(&self) -> BlockType {
        self.block_type
    }

    fn create_block_started(&self) {
        self.txs_for_block.lock().reset();
    }

    fn request_block_transactions(&self, body: &Body) -> usize {
        let _guard = self.span.enter();

        let mut missing_per_shard: BTreeMap<ShardId, Vec<Hash>> = BTreeMap::new();
        let mut missing = 0usize;
        {
            let mut block = self.txs_for_block.lock();
            let mut requested_kind = false;

            for mini_block in body.mini_blocks.iter().filter(|mb| self.is_requested_here(mb)) {
                requested_kind = true;
                let cache_id = shard_cacher_identifier(
                    mini_block.sender_shard_id,
                    mini_block.receiver_shard_id,
                );

                for hash in &mini_block.tx_hashes {
                    if block.has_tx(hash) {
                        continue;
                    }
                    match self.tx_pool.get(&cache_id, hash) {
                        Some(tx) => block.insert_tx(
                            *hash,
                            tx,
                            mini_block.sender_shard_id,
                            mini_block.receiver_shard_id,
                        ),
                        None => {
                            block.track_missing(
                                *hash,
                                mini_block.sender_shard_id,
                                mini_block.receiver_shard_id,
                            );
                            missing += 1;
                            missing_per_shard
                                .entry(mini_block.sender_shard_id)
                                .or_default()
                                .push(*hash);
                        }
                    }
                }
            }

            if requested_kind && block.state == PreProcessorState::Idle {
                block.state = PreProcessorState::Requested;
            }
        }

        for (dest_shard, hashes) in missing_per_shard {
            self.request_missing(dest_shard, hashes);
        }
        missing
    }

    fn request_transactions_for_mini_block(&self, mini_block: &MiniBlock) -> usize {
        if !self.is_requested_here(mini_block) {
            return 0;
        }
        let _guard = self.span.enter();

        let cache_id =
            shard_cacher_identifier(mini_block.sender_shard_id, mini_block.receiver_shard_id);
        let missing: Vec<Hash> = mini_block
            .tx_hashes
            .iter()
            .filter(|hash| self.tx_pool.get(&cache_id, hash).is_none())
            .copied()
            .collect();

        let count = missing.len();
        if count > 0 {
            self.request_missing(mini_block.sender_shard_id, missing);
        }
        count
    }

    fn is_data_prepared(&self, requested: usize, time_remaining: TimeRemaining<'_>) -> Result<()> {
        let _guard = self.span.enter();
        let mut block = self.txs_for_block.lock();

        if requested == 0 {
            if block.state == PreProcessorState::Requested {
                block.state = PreProcessorState::DataPrepared;
            }
            return Ok(());
        }

        debug!(requested, "Waiting for missing transactions");
        let result = loop {
            if block.missing == 0 {
                break Ok(());
            }
            let remaining = time_remaining();
            if remaining.is_zero() {
                break Err(ProcessError::TimeIsOut);
            }
            self.all_txs_arrived
                .wait_for(&mut block, remaining.min(self.data_poll_interval));
        };

        let still_missing = block.missing;
        block.missing = 0;
        if result.is_ok() {
            block.state = PreProcessorState::DataPrepared;
        }
        debug!(
            received = requested.saturating_sub(still_missing),
            requested, "Received missing transactions"
        );
        result
    }

    fn process_block_transactions(&self, body: &Body, have_time: HaveTime<'_>) -> Result<()> {
        let _guard = self.span.enter();
        let mut consumed_in_self = self.gas_handler.total_gas_consumed();

        for mini_block in body.mini_blocks.iter().filter(|mb| self.is_processed_here(mb)) {
            let mut processed = Vec::with_capacity(mini_block.tx_hashes.len());
            for hash in &mini_block.tx_hashes {
                if !have_time() {
                    return Err(ProcessError::TimeIsOut);
                }

                let tx = self.tx_for_block(hash, mini_block).ok_or_else(|| {
                    warn!(hash = %hex::encode(hash), "Missing transaction in block");
                    ProcessError::missing_transaction(hash)
                })?;
                self.charge_gas(mini_block, *hash, &tx, &mut consumed_in_self)?;
                self.tx_processor.process_transaction(&tx)?;
                processed.push((*hash, tx));
            }
            self.remember(mini_block, processed);
        }

        self.txs_for_block.lock().state = PreProcessorState::Processed;
        Ok(())
    }

    fn process_mini_block(
        &self,
        mini_block: &MiniBlock,
        have_time: HaveTime<'_>,
        round: u64,
    ) -> Result<()> {
        if mini_block.block_type != self.block_type {
            return Err(ProcessError::WrongTypeInMiniBlock {
                expected: self.block_type,
                actual: mini_block.block_type,
            });
        }
        let _guard = self.span.enter();

        let cache_id =
            shard_cacher_identifier(mini_block.sender_shard_id, mini_block.receiver_shard_id);
        let mut txs = Vec::with_capacity(mini_block.tx_hashes.len());
        for hash in &mini_block.tx_hashes {
            if !have_time() {
                return Err(ProcessError::TimeIsOut);
            }
            let tx = self
                .tx_pool
                .get(&cache_id, hash)
                .ok_or_else(|| ProcessError::missing_transaction(hash))?;
            txs.push((*hash, tx));
        }

        trace!(round, txs = txs.len(), "Processing miniblock");

        let mut charged: Vec<Hash> = Vec::with_capacity(txs.len());
        if let Err(error) = self.charge_and_execute(mini_block, &txs, have_time, &mut charged) {
            self.gas_handler.remove_gas_consumed(&charged);
            self.gas_handler.remove_gas_refunded(&charged);
            return Err(error);
        }

        self.remember(mini_block, txs);
        Ok(())
    }

    fn create_and_process_mini_blocks(
        &self,
        max_tx_space: usize,
        max_mb_space: usize,
        have_time: HaveTime<'_>,
    ) -> Result<Vec<MiniBlock>> {
        if !self.is_user_kind() {
            return Ok(Vec::new());
        }
        let _guard = self.span.enter();

        let self_id = self.self_id();
        let max_gas = self.fee_handler.max_gas_limit_per_block();
        let mut consumed_in_self = self.gas_handler.total_gas_consumed();
        let mut mini_blocks = Vec::new();
        let mut added_total = 0usize;
        let mut failed = 0usize;

        'destinations: for dest in self.destinations() {
            if !have_time() {
                debug!("Time is out while creating miniblocks");
                break;
            }
            if mini_blocks.len() >= max_mb_space {
                break;
            }

            let mut mini_block = MiniBlock::new(self_id, dest, BlockType::TxBlock);
            let mut packed = Vec::new();
            let mut time_is_out = false;

            for (hash, tx) in self.pending_for(dest) {
                if !have_time() {
                    time_is_out = true;
                    break;
                }
                if tx_space_exceeded(added_total, 1, max_tx_space) {
                    break;
                }

                let (in_sender, _) =
                    match self.gas_handler.compute_gas_consumed_by_tx(self_id, dest, &tx) {
                        Ok(gas) => gas,
                        Err(error) => {
                            debug!(hash = %hex::encode(hash), %error, "Skipping transaction");
                            continue;
                        }
                    };
                if check_block_gas(consumed_in_self, in_sender, max_gas).is_err() {
                    trace!(dest, consumed_in_self, "Block gas ceiling reached");
                    break;
                }
                if let Err(error) = self.fee_handler.check_validity_tx_values(&tx) {
                    debug!(hash = %hex::encode(hash), %error, "Dropping invalid transaction");
                    self.drop_from_pool(dest, &hash);
                    failed += 1;
                    continue;
                }

                let snapshot = self.accounts.snapshot();
                if let Err(error) = self.tx_processor.process_transaction(&tx) {
                    if let Err(revert_error) = self.accounts.revert_to_snapshot(snapshot) {
                        warn!(%revert_error, "Revert after failed transaction failed");
                    }
                    debug!(hash = %hex::encode(hash), %error, "Transaction failed execution");
                    self.drop_from_pool(dest, &hash);
                    failed += 1;
                    continue;
                }

                consumed_in_self += in_sender;
                self.gas_handler.set_gas_consumed(in_sender, hash);
                mini_block.tx_hashes.push(hash);
                packed.push((hash, tx));
                added_total += 1;
            }

            if !packed.is_empty() {
                self.remember(&mini_block, packed);
                mini_blocks.push(mini_block);
            }
            if time_is_out {
                break 'destinations;
            }
        }

        debug!(
            mini_blocks = mini_blocks.len(),
            added = added_total,
            failed,
            "Created miniblocks from pool"
        );
        Ok(mini_blocks)
    }

    fn save_tx_block_to_storage(&self, body: &Body) -> Result<()> {
        let _guard = self.span.enter();
        for mini_block in body.mini_blocks.iter().filter(|mb| self.is_processed_here(mb)) {
            for hash in &mini_block.tx_hashes {
                let tx = self
                    .tx_for_block(hash, mini_block)
                    .ok_or_else(|| ProcessError::missing_transaction(hash))?;
                self.storage.put(self.storage_unit, hash, marshal(&tx)?)?;
            }
        }
        Ok(())
    }

    fn restore_tx_block_into_pools(
        &self,
        body: &Body,
        mini_block_pool: &dyn MiniBlockCache,
    ) -> Result<usize> {
        let _guard = self.span.enter();
        let mut restored = 0usize;

        for mini_block in body
            .mini_blocks
            .iter()
            .filter(|mb| mb.block_type == self.block_type)
        {
            let cache_id =
                shard_cacher_identifier(mini_block.sender_shard_id, mini_block.receiver_shard_id);
            for hash in &mini_block.tx_hashes {
                let bytes = self
                    .storage
                    .get(self.storage_unit, hash)?
                    .ok_or_else(|| {
                        debug!(
                            hash = %hex::encode(hash),
                            sender = mini_block.sender_shard_id,
                            "Transaction not found in storage"
                        );
                        ProcessError::missing_transaction(hash)
                    })?;
                let tx: BlockTransaction = unmarshal(&bytes)?;
                self.tx_pool.add(&cache_id, *hash, tx);
            }

            if mini_block.sender_shard_id != self.self_id() {
                mini_block_pool.put(mini_block.hash()?, mini_block.clone());
            }
            restored += mini_block.tx_hashes.len();
        }

        Ok(restored)
    }

    fn remove_tx_block_from_pools(
        &self,
        body: &Body,
        mini_block_pool: &dyn MiniBlockCache,
    ) -> Result<()> {
        for mini_block in body
            .mini_blocks
            .iter()
            .filter(|mb| mb.block_type == self.block_type)
        {
            let cache_id =
                shard_cacher_identifier(mini_block.sender_shard_id, mini_block.receiver_shard_id);
            for hash in &mini_block.tx_hashes {
                self.tx_pool.remove(&cache_id, hash);
            }
            mini_block_pool.remove(&mini_block.hash()?);
        }
        Ok(())
    }

    fn create_marshalized_data(&self, hashes: &[Hash]) -> Result<Vec<Vec<u8>>> {
        let _guard = self.span.enter();
        self.txs_for_block.lock().marshalized(hashes)
    }

    fn get_all_current_used_txs(&self) -> HashMap<Hash, BlockTransaction> {
        self.txs_for_block.lock().used_txs()
    }

    fn state(&self) -> PreProcessorState {
        self.txs_for_block.lock().state
    }
}
