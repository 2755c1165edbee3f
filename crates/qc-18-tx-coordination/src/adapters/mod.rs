//! # Adapters
//!
//! In-memory implementations of the outbound ports: account store with
//! journal, miniblock and transaction pools, storage units, shard topology,
//! economics, request tracking, executors and the staking registry.

pub mod accounts;
pub mod economics;
pub mod executors;
pub mod miniblock_pool;
pub mod registry;
pub mod request_recorder;
pub mod shard_coordinator;
pub mod storage;
pub mod time_cache;
pub mod tx_cacher;
pub mod tx_pool;

pub use accounts::InMemoryAccounts;
pub use economics::EconomicsData;
pub use executors::{MoveBalanceProcessor, TransactionProcessorStub};
pub use miniblock_pool::MiniBlockPool;
pub use registry::InMemoryStakingRegistry;
pub use request_recorder::{RequestHandlerRecorder, TxRequest};
pub use shard_coordinator::{communication_identifier_between_shards, MultiShardCoordinator};
pub use storage::MemoryTxStorage;
pub use time_cache::TimeCache;
pub use tx_cacher::CurrentBlockTxs;
pub use tx_pool::ShardedDataPool;
