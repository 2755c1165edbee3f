//! Transaction pool partitioned by shard cache id.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use shared_types::{BlockTransaction, Hash};

use crate::ports::{ArrivalHandler, ShardedTxPool};

/// In-memory sharded transaction pool.
///
/// Each cache keeps its transactions sorted by hash so pool snapshots are
/// deterministic.
#[derive(Default)]
pub struct ShardedDataPool {
    caches: RwLock<HashMap<String, BTreeMap<Hash, BlockTransaction>>>,
    handlers: RwLock<Vec<ArrivalHandler>>,
}

impl ShardedDataPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions over every cache.
    pub fn len(&self) -> usize {
        self.caches.read().values().map(BTreeMap::len).sum()
    }

    /// True when every cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ShardedTxPool for ShardedDataPool {
    fn get(&self, cache_id: &str, hash: &Hash) -> Option<BlockTransaction> {
        self.caches
            .read()
            .get(cache_id)
            .and_then(|cache| cache.get(hash))
            .cloned()
    }

    fn search_first(&self, hash: &Hash) -> Option<BlockTransaction> {
        self.caches
            .read()
            .values()
            .find_map(|cache| cache.get(hash).cloned())
    }

    fn add(&self, cache_id: &str, hash: Hash, tx: BlockTransaction) {
        let added = self
            .caches
            .write()
            .entry(cache_id.to_string())
            .or_default()
            .insert(hash, tx)
            .is_none();

        if added {
            for handler in self.handlers.read().iter() {
                handler(hash);
            }
        }
    }

    fn remove(&self, cache_id: &str, hash: &Hash) {
        if let Some(cache) = self.caches.write().get_mut(cache_id) {
            cache.remove(hash);
        }
    }

    fn remove_from_all(&self, hashes: &[Hash]) {
        let mut caches = self.caches.write();
        for cache in caches.values_mut() {
            for hash in hashes {
                cache.remove(hash);
            }
        }
    }

    fn cache_content(&self, cache_id: &str) -> Vec<(Hash, BlockTransaction)> {
        self.caches
            .read()
            .get(cache_id)
            .map(|cache| cache.iter().map(|(h, tx)| (*h, tx.clone())).collect())
            .unwrap_or_default()
    }

    fn register_handler(&self, handler: ArrivalHandler) {
        self.handlers.write().push(handler);
    }
}
