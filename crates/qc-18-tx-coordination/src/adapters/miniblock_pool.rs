//! Content-addressed miniblock cache with arrival notifications.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_types::{Hash, MiniBlock};

use crate::ports::{ArrivalHandler, MiniBlockCache};

/// In-memory miniblock pool.
///
/// Handlers run on the thread that inserted the miniblock, after the pool
/// lock is released.
#[derive(Default)]
pub struct MiniBlockPool {
    items: RwLock<HashMap<Hash, MiniBlock>>,
    handlers: RwLock<Vec<ArrivalHandler>>,
}

impl MiniBlockPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached miniblocks.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl MiniBlockCache for MiniBlockPool {
    fn peek(&self, hash: &Hash) -> Option<MiniBlock> {
        self.items.read().get(hash).cloned()
    }

    fn has(&self, hash: &Hash) -> bool {
        self.items.read().contains_key(hash)
    }

    fn put(&self, hash: Hash, mini_block: MiniBlock) -> bool {
        let added = {
            let mut items = self.items.write();
            if items.contains_key(&hash) {
                false
            } else {
                items.insert(hash, mini_block);
                true
            }
        };

        if added {
            for handler in self.handlers.read().iter() {
                handler(hash);
            }
        }
        added
    }

    fn remove(&self, hash: &Hash) {
        self.items.write().remove(hash);
    }

    fn register_handler(&self, handler: ArrivalHandler) {
        self.handlers.write().push(handler);
    }
}
