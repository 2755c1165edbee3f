//! Transactions of the block currently being processed.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_types::{BlockTransaction, Hash};

use crate::domain::{ProcessError, Result};
use crate::ports::TransactionCacher;

/// In-memory current-block transaction cache.
#[derive(Default)]
pub struct CurrentBlockTxs {
    txs: RwLock<HashMap<Hash, BlockTransaction>>,
}

impl CurrentBlockTxs {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionCacher for CurrentBlockTxs {
    fn add_tx(&self, hash: Hash, tx: BlockTransaction) {
        self.txs.write().insert(hash, tx);
    }

    fn get_tx(&self, hash: &Hash) -> Result<BlockTransaction> {
        self.txs
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| ProcessError::missing_transaction(hash))
    }

    fn clean(&self) {
        self.txs.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SmartContractResult;

    #[test]
    fn test_add_get_clean() {
        let cache = CurrentBlockTxs::new();
        let scr = BlockTransaction::SmartContractResult(SmartContractResult::default());
        cache.add_tx([1u8; 32], scr.clone());

        assert_eq!(cache.get_tx(&[1u8; 32]), Ok(scr));

        cache.clean();
        assert!(matches!(
            cache.get_tx(&[1u8; 32]),
            Err(ProcessError::MissingTransaction(_))
        ));
    }
}
