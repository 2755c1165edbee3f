//! Outbound (Driven) ports for the coordination subsystem.
//!
//! These traits define the collaborators the coordinator and its processors
//! depend on: the account store, pools, storage, network requests, the
//! transaction executor and the registry query service.

use shared_types::{BlockTransaction, BlockType, Hash, MiniBlock, ShardId};

use crate::domain::{
    AccountHandler, Result, ScQuery, SnapshotId, StorageUpdate, UnitType, VmOutput,
};

/// Callback invoked with the hash of newly arrived data.
pub type ArrivalHandler = Box<dyn Fn(Hash) + Send + Sync>;

/// Shard topology.
pub trait ShardCoordinator: Send + Sync {
    /// Number of shards (metachain excluded).
    fn number_of_shards(&self) -> u32;

    /// Shard owning an address.
    fn compute_id(&self, address: &[u8]) -> ShardId;

    /// Shard this node belongs to.
    fn self_id(&self) -> ShardId;

    /// True when both addresses live in the same shard.
    fn same_shard(&self, first: &[u8], second: &[u8]) -> bool {
        self.compute_id(first) == self.compute_id(second)
    }

    /// Suffix identifying the channel between this shard and `dest`.
    fn communication_identifier(&self, dest: ShardId) -> String;
}

/// Journal of the account store.
///
/// Snapshots nest: reverting to a snapshot undoes every mutation made after
/// it was taken, including those covered by later snapshots.
pub trait StateJournal: Send + Sync {
    /// Current position of the journal.
    fn snapshot(&self) -> SnapshotId;

    /// Undo every mutation made after `snapshot`.
    fn revert_to_snapshot(&self, snapshot: SnapshotId) -> Result<()>;

    /// Make pending mutations permanent and return the state root.
    fn commit(&self) -> Result<Hash>;

    /// Root hash of the current (possibly uncommitted) state.
    fn root_hash(&self) -> Result<Hash>;
}

/// Account store.
pub trait AccountsAdapter<A: AccountHandler>: StateJournal {
    /// Existing account, or `None`.
    fn get_existing_account(&self, address: &[u8]) -> Result<Option<A>>;

    /// Existing account, or a fresh empty one (not saved until `save_account`).
    fn load_account(&self, address: &[u8]) -> Result<A> {
        Ok(self
            .get_existing_account(address)?
            .unwrap_or_else(|| A::new_empty(address)))
    }

    /// Store an account (journaled).
    fn save_account(&self, account: &A) -> Result<()>;

    /// Delete an account (journaled).
    fn remove_account(&self, address: &[u8]) -> Result<()>;
}

/// Content-addressed miniblock cache.
pub trait MiniBlockCache: Send + Sync {
    /// Miniblock stored under `hash`, if any.
    fn peek(&self, hash: &Hash) -> Option<MiniBlock>;

    /// True when `hash` is cached.
    fn has(&self, hash: &Hash) -> bool {
        self.peek(hash).is_some()
    }

    /// Cache a miniblock. Returns false when it was already present.
    fn put(&self, hash: Hash, mini_block: MiniBlock) -> bool;

    /// Evict a miniblock.
    fn remove(&self, hash: &Hash);

    /// Register a callback run for every newly cached miniblock.
    fn register_handler(&self, handler: ArrivalHandler);
}

/// Transaction pool partitioned by `(sender shard, receiver shard)` cache ids.
pub trait ShardedTxPool: Send + Sync {
    /// Transaction in the given cache.
    fn get(&self, cache_id: &str, hash: &Hash) -> Option<BlockTransaction>;

    /// Transaction in any cache.
    fn search_first(&self, hash: &Hash) -> Option<BlockTransaction>;

    /// Add a transaction to a cache.
    fn add(&self, cache_id: &str, hash: Hash, tx: BlockTransaction);

    /// Remove a transaction from a cache.
    fn remove(&self, cache_id: &str, hash: &Hash);

    /// Remove transactions from every cache.
    fn remove_from_all(&self, hashes: &[Hash]);

    /// Snapshot of a cache's content.
    fn cache_content(&self, cache_id: &str) -> Vec<(Hash, BlockTransaction)>;

    /// Register a callback run for every newly added transaction.
    fn register_handler(&self, handler: ArrivalHandler);
}

/// Network requests for missing data. Fire-and-forget.
pub trait RequestHandler: Send + Sync {
    /// Request transactions of a kind from the shard that produced them.
    fn request_transactions(&self, block_type: BlockType, dest_shard: ShardId, hashes: Vec<Hash>);

    /// Request a miniblock from the shard that produced it.
    fn request_mini_block(&self, dest_shard: ShardId, hash: Hash);
}

/// Tracks outstanding requests so a key is requested once.
pub trait RequestedItemsHandler: Send + Sync {
    /// True while a request for `key` is outstanding.
    fn has(&self, key: &[u8]) -> bool;

    /// Mark `key` as requested.
    fn add(&self, key: &[u8]) -> Result<()>;

    /// Forget expired entries.
    fn sweep(&self);
}

/// Persistent storage of block data, per unit.
pub trait TxStorer: Send + Sync {
    /// Store a value.
    fn put(&self, unit: UnitType, key: &Hash, value: Vec<u8>) -> Result<()>;

    /// Read a value.
    fn get(&self, unit: UnitType, key: &Hash) -> Result<Option<Vec<u8>>>;

    /// Delete a value.
    fn remove(&self, unit: UnitType, key: &Hash) -> Result<()>;
}

/// Executes one transaction against the account store.
pub trait TransactionProcessor: Send + Sync {
    /// Apply a transaction. Structural failures (nonce mismatch, malformed
    /// data) are returned as errors; business failures that still charge a
    /// fee are not.
    fn process_transaction(&self, tx: &BlockTransaction) -> Result<()>;
}

/// Economics of the network.
pub trait FeeHandler: Send + Sync {
    /// Minimum gas a transaction needs: base cost plus payload cost.
    fn compute_gas_limit(&self, tx: &BlockTransaction) -> u64;

    /// Gas ceiling of one block in one shard.
    fn max_gas_limit_per_block(&self) -> u64;

    /// Reject transactions with a gas price or limit outside network bounds.
    fn check_validity_tx_values(&self, tx: &BlockTransaction) -> Result<()>;
}

/// Transactions belonging to the block currently being processed.
pub trait TransactionCacher: Send + Sync {
    /// Remember a transaction of the current block.
    fn add_tx(&self, hash: Hash, tx: BlockTransaction);

    /// Transaction of the current block.
    fn get_tx(&self, hash: &Hash) -> Result<BlockTransaction>;

    /// Forget every transaction.
    fn clean(&self);
}

/// Read-only access to system smart contracts.
pub trait ScQueryService: Send + Sync {
    /// Run a query.
    fn execute_query(&self, query: &ScQuery) -> Result<VmOutput>;
}

/// Parser for `function@hexarg@hexarg` payloads.
pub trait ArgumentParser: Send + Sync {
    /// Function name and decoded arguments of a call payload.
    fn parse_call_data(&self, data: &str) -> Result<(String, Vec<Vec<u8>>)>;

    /// Storage updates encoded as `hexkey@hexvalue@...`.
    fn storage_updates(&self, data: &str) -> Result<Vec<StorageUpdate>>;
}
