//! Shared fixtures: one fully wired shard node over in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use primitive_types::U256;
use qc_18_tx_coordination::adapters::{
    CurrentBlockTxs, EconomicsData, InMemoryAccounts, MemoryTxStorage, MiniBlockPool,
    MoveBalanceProcessor, MultiShardCoordinator, RequestHandlerRecorder, ShardedDataPool,
    TimeCache,
};
use qc_18_tx_coordination::algorithms::{shard_cacher_identifier, GasComputation};
use qc_18_tx_coordination::ports::{
    AccountsAdapter, IntermediateProcessor, ShardedTxPool, StateJournal, TransactionProcessor,
};
use qc_18_tx_coordination::{
    ArgIntermediateResultsProcessor, ArgTransactionCoordinator, ArgTransactionsPreProcessor,
    CoordinationConfig, EconomicsConfig, IntermediateProcessorsContainer,
    IntermediateResultsProcessor, PreProcessorsContainer, TransactionCoordinator,
    TransactionsPreProcessor, UserAccount,
};
use shared_types::{BlockTransaction, BlockType, Hash, ShardId, Transaction};

pub struct Node {
    pub shards: Arc<MultiShardCoordinator>,
    pub tx_pool: Arc<ShardedDataPool>,
    pub scr_pool: Arc<ShardedDataPool>,
    pub reward_pool: Arc<ShardedDataPool>,
    pub mini_blocks: Arc<MiniBlockPool>,
    pub storage: Arc<MemoryTxStorage>,
    pub accounts: Arc<InMemoryAccounts<UserAccount>>,
    pub requests: Arc<RequestHandlerRecorder>,
    pub gas: Arc<GasComputation>,
    pub tx_pre_processor: Arc<TransactionsPreProcessor>,
    pub scr_results: Arc<IntermediateResultsProcessor>,
    pub coordinator: Arc<TransactionCoordinator>,
}

impl Node {
    pub fn new(self_id: ShardId) -> Self {
        let shards = Arc::new(MultiShardCoordinator::new(2, self_id).unwrap());
        let storage = Arc::new(MemoryTxStorage::new());
        let accounts = Arc::new(InMemoryAccounts::<UserAccount>::new());
        let requests = Arc::new(RequestHandlerRecorder::new());
        let requested_items = Arc::new(TimeCache::new(Duration::from_secs(60)));
        let economics = Arc::new(EconomicsData::new(EconomicsConfig::for_testing()));
        let gas = Arc::new(GasComputation::new(Some(economics.clone())).unwrap());

        let intermediate = |block_type| {
            Arc::new(
                IntermediateResultsProcessor::new(ArgIntermediateResultsProcessor {
                    block_type,
                    shard_coordinator: Some(shards.clone()),
                    storage: Some(storage.clone()),
                    current_txs: Some(Arc::new(CurrentBlockTxs::new())),
                })
                .unwrap(),
            )
        };
        let scr_results = intermediate(BlockType::SmartContractResultBlock);
        let reward_results = intermediate(BlockType::RewardsBlock);

        let executor: Arc<dyn TransactionProcessor> = Arc::new(
            MoveBalanceProcessor::new(accounts.clone())
                .with_results(scr_results.clone() as Arc<dyn IntermediateProcessor>),
        );

        let pre_processor = |block_type, pool: Arc<ShardedDataPool>| {
            TransactionsPreProcessor::new(ArgTransactionsPreProcessor {
                block_type,
                config: CoordinationConfig::for_testing(),
                tx_pool: Some(pool),
                storage: Some(storage.clone()),
                tx_processor: Some(executor.clone()),
                shard_coordinator: Some(shards.clone()),
                accounts: Some(accounts.clone()),
                request_handler: Some(requests.clone()),
                requested_items: Some(requested_items.clone()),
                gas_handler: Some(gas.clone()),
                fee_handler: Some(economics.clone()),
            })
            .unwrap()
        };

        let tx_pool = Arc::new(ShardedDataPool::new());
        let scr_pool = Arc::new(ShardedDataPool::new());
        let reward_pool = Arc::new(ShardedDataPool::new());
        let tx_pre_processor = pre_processor(BlockType::TxBlock, tx_pool.clone());

        let mut pre_processors = PreProcessorsContainer::new();
        pre_processors
            .add(BlockType::TxBlock, tx_pre_processor.clone())
            .unwrap();
        pre_processors
            .add(
                BlockType::SmartContractResultBlock,
                pre_processor(BlockType::SmartContractResultBlock, scr_pool.clone()),
            )
            .unwrap();
        pre_processors
            .add(
                BlockType::RewardsBlock,
                pre_processor(BlockType::RewardsBlock, reward_pool.clone()),
            )
            .unwrap();

        let mut intermediate_processors = IntermediateProcessorsContainer::new();
        intermediate_processors
            .add(BlockType::SmartContractResultBlock, scr_results.clone())
            .unwrap();
        intermediate_processors
            .add(BlockType::RewardsBlock, reward_results)
            .unwrap();

        let mini_blocks = Arc::new(MiniBlockPool::new());
        let coordinator = TransactionCoordinator::new(ArgTransactionCoordinator {
            shard_coordinator: Some(shards.clone()),
            accounts: Some(accounts.clone()),
            mini_block_pool: Some(mini_blocks.clone()),
            request_handler: Some(requests.clone()),
            pre_processors: Some(pre_processors),
            intermediate_processors: Some(intermediate_processors),
            gas_handler: Some(gas.clone()),
            requested_items: Some(requested_items),
        })
        .unwrap();

        Self {
            shards,
            tx_pool,
            scr_pool,
            reward_pool,
            mini_blocks,
            storage,
            accounts,
            requests,
            gas,
            tx_pre_processor,
            scr_results,
            coordinator,
        }
    }

    pub fn fund(&self, last: u8, balance: u64) {
        self.accounts
            .save_account(&UserAccount {
                address: address(last),
                nonce: 0,
                balance: U256::from(balance),
            })
            .unwrap();
    }

    pub fn balance(&self, last: u8) -> U256 {
        self.accounts.load_account(&address(last)).unwrap().balance
    }

    pub fn root(&self) -> Hash {
        self.accounts.root_hash().unwrap()
    }
}

/// Address whose last byte picks the shard: even bytes live in shard 0.
pub fn address(last: u8) -> Vec<u8> {
    let mut address = vec![7u8; 32];
    address[31] = last;
    address
}

/// Smart contract address living in shard 0.
pub fn contract_address() -> Vec<u8> {
    let mut address = vec![0u8; 32];
    address[10] = 0xcc;
    address[31] = 2;
    address
}

pub fn transfer(sender: u8, receiver: u8, nonce: u64, value: u64) -> BlockTransaction {
    BlockTransaction::Normal(Transaction {
        nonce,
        value: U256::from(value),
        snd_addr: address(sender),
        rcv_addr: address(receiver),
        gas_price: 1,
        gas_limit: 10,
        ..Default::default()
    })
}

pub fn add(pool: &ShardedDataPool, sender: ShardId, receiver: ShardId, tx: BlockTransaction) -> Hash {
    let hash = tx.hash().unwrap();
    pool.add(&shard_cacher_identifier(sender, receiver), hash, tx);
    hash
}

pub fn always() -> bool {
    true
}

pub fn plenty() -> Duration {
    Duration::from_secs(2)
}
