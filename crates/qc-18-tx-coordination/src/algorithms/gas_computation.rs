//! Per-round gas bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{BlockTransaction, Hash, MiniBlock, ShardId};
use tracing::trace;

use super::tx_type::is_smart_contract_address;
use crate::domain::{ProcessError, Result};
use crate::ports::{FeeHandler, GasHandler};

#[derive(Default)]
struct GasLedger {
    consumed: HashMap<Hash, u64>,
    refunded: HashMap<Hash, u64>,
}

/// Gas tracker backed by the network economics.
pub struct GasComputation {
    fee_handler: Arc<dyn FeeHandler>,
    ledger: RwLock<GasLedger>,
}

impl GasComputation {
    /// Create a tracker.
    pub fn new(fee_handler: Option<Arc<dyn FeeHandler>>) -> Result<Self> {
        let fee_handler = fee_handler.ok_or(ProcessError::NilEconomicsFeeHandler)?;
        Ok(Self {
            fee_handler,
            ledger: RwLock::new(GasLedger::default()),
        })
    }
}

impl GasHandler for GasComputation {
    fn init(&self) {
        let mut ledger = self.ledger.write();
        ledger.consumed.clear();
        ledger.refunded.clear();
    }

    fn set_gas_consumed(&self, gas: u64, hash: Hash) {
        self.ledger.write().consumed.insert(hash, gas);
    }

    fn set_gas_refunded(&self, gas: u64, hash: Hash) {
        self.ledger.write().refunded.insert(hash, gas);
    }

    fn gas_consumed(&self, hash: &Hash) -> u64 {
        self.ledger.read().consumed.get(hash).copied().unwrap_or(0)
    }

    fn gas_refunded(&self, hash: &Hash) -> u64 {
        self.ledger.read().refunded.get(hash).copied().unwrap_or(0)
    }

    fn total_gas_consumed(&self) -> u64 {
        self.ledger
            .read()
            .consumed
            .values()
            .fold(0u64, |acc, gas| acc.saturating_add(*gas))
    }

    fn total_gas_refunded(&self) -> u64 {
        self.ledger
            .read()
            .refunded
            .values()
            .fold(0u64, |acc, gas| acc.saturating_add(*gas))
    }

    fn remove_gas_consumed(&self, hashes: &[Hash]) {
        let mut ledger = self.ledger.write();
        for hash in hashes {
            ledger.consumed.remove(hash);
        }
    }

    fn remove_gas_refunded(&self, hashes: &[Hash]) {
        let mut ledger = self.ledger.write();
        for hash in hashes {
            ledger.refunded.remove(hash);
        }
    }

    fn compute_gas_consumed_by_tx(
        &self,
        sender_shard: ShardId,
        receiver_shard: ShardId,
        tx: &BlockTransaction,
    ) -> Result<(u64, u64)> {
        let move_balance_gas = self.fee_handler.compute_gas_limit(tx);
        if tx.gas_limit() < move_balance_gas {
            return Err(ProcessError::InsufficientGasLimitInTx {
                declared: tx.gas_limit(),
                required: move_balance_gas,
            });
        }

        if !is_smart_contract_address(tx.receiver()) {
            return Ok((move_balance_gas, move_balance_gas));
        }

        if sender_shard != receiver_shard {
            // sender shard pays the move, receiver shard runs the call
            let gas_in_receiver = tx.gas_limit() - move_balance_gas;
            return Ok((move_balance_gas, gas_in_receiver));
        }

        Ok((tx.gas_limit(), tx.gas_limit()))
    }

    fn compute_gas_consumed_by_mini_block(
        &self,
        mini_block: &MiniBlock,
        txs: &HashMap<Hash, BlockTransaction>,
    ) -> Result<(u64, u64)> {
        let mut in_sender = 0u64;
        let mut in_receiver = 0u64;

        for hash in &mini_block.tx_hashes {
            let tx = txs
                .get(hash)
                .ok_or_else(|| ProcessError::missing_transaction(hash))?;

            let (snd, rcv) = self.compute_gas_consumed_by_tx(
                mini_block.sender_shard_id,
                mini_block.receiver_shard_id,
                tx,
            )?;
            in_sender = in_sender.saturating_add(snd);
            in_receiver = in_receiver.saturating_add(rcv);
        }

        trace!(
            in_sender,
            in_receiver,
            txs = mini_block.tx_hashes.len(),
            "Gas consumed by miniblock"
        );
        Ok((in_sender, in_receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EconomicsData;
    use crate::config::EconomicsConfig;
    use shared_types::{BlockType, Transaction};

    fn gas_computation() -> GasComputation {
        // min gas limit 10, one gas per data byte
        GasComputation::new(Some(Arc::new(EconomicsData::new(
            EconomicsConfig::for_testing(),
        ))))
        .unwrap()
    }

    fn tx(gas_limit: u64, receiver: Vec<u8>) -> BlockTransaction {
        BlockTransaction::Normal(Transaction {
            gas_limit,
            rcv_addr: receiver,
            ..Default::default()
        })
    }

    fn sc_address() -> Vec<u8> {
        let mut address = vec![0u8; 32];
        address[31] = 1;
        address
    }

    #[test]
    fn test_nil_fee_handler() {
        assert!(matches!(
            GasComputation::new(None),
            Err(ProcessError::NilEconomicsFeeHandler)
        ));
    }

    #[test]
    fn test_init_resets_totals() {
        let gc = gas_computation();
        gc.set_gas_consumed(5, [1u8; 32]);
        gc.set_gas_refunded(2, [1u8; 32]);
        assert_eq!(gc.total_gas_consumed(), 5);
        assert_eq!(gc.total_gas_refunded(), 2);

        gc.init();
        assert_eq!(gc.total_gas_consumed(), 0);
        assert_eq!(gc.total_gas_refunded(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let gc = gas_computation();
        gc.set_gas_consumed(5, [1u8; 32]);
        gc.set_gas_consumed(7, [1u8; 32]);
        gc.set_gas_consumed(3, [2u8; 32]);

        assert_eq!(gc.gas_consumed(&[1u8; 32]), 7);
        assert_eq!(gc.total_gas_consumed(), 10);
    }

    #[test]
    fn test_remove() {
        let gc = gas_computation();
        gc.set_gas_consumed(5, [1u8; 32]);
        gc.set_gas_consumed(6, [2u8; 32]);
        gc.set_gas_refunded(1, [1u8; 32]);

        gc.remove_gas_consumed(&[[1u8; 32]]);
        gc.remove_gas_refunded(&[[1u8; 32]]);

        assert_eq!(gc.total_gas_consumed(), 6);
        assert_eq!(gc.gas_refunded(&[1u8; 32]), 0);
    }

    #[test]
    fn test_insufficient_gas_limit() {
        let gc = gas_computation();
        assert_eq!(
            gc.compute_gas_consumed_by_tx(0, 1, &tx(9, vec![2u8; 32])),
            Err(ProcessError::InsufficientGasLimitInTx {
                declared: 9,
                required: 10
            })
        );
    }

    #[test]
    fn test_non_sc_receiver_pays_move_balance() {
        let gc = gas_computation();
        assert_eq!(
            gc.compute_gas_consumed_by_tx(0, 1, &tx(50, vec![2u8; 32])),
            Ok((10, 10))
        );
    }

    #[test]
    fn test_sc_receiver_in_shard_pays_full_limit() {
        let gc = gas_computation();
        assert_eq!(
            gc.compute_gas_consumed_by_tx(0, 0, &tx(50, sc_address())),
            Ok((50, 50))
        );
    }

    #[test]
    fn test_sc_receiver_cross_shard_splits_limit() {
        let gc = gas_computation();
        assert_eq!(
            gc.compute_gas_consumed_by_tx(0, 1, &tx(50, sc_address())),
            Ok((10, 40))
        );
    }

    #[test]
    fn test_mini_block_missing_transaction() {
        let gc = gas_computation();
        let mut mb = MiniBlock::new(0, 1, BlockType::TxBlock);
        mb.tx_hashes = vec![[1u8; 32]];

        assert!(matches!(
            gc.compute_gas_consumed_by_mini_block(&mb, &HashMap::new()),
            Err(ProcessError::MissingTransaction(_))
        ));
    }

    #[test]
    fn test_mini_block_sums() {
        let gc = gas_computation();
        let mut mb = MiniBlock::new(0, 1, BlockType::TxBlock);
        mb.tx_hashes = vec![[1u8; 32], [2u8; 32]];

        let mut txs = HashMap::new();
        txs.insert([1u8; 32], tx(50, sc_address()));
        txs.insert([2u8; 32], tx(20, vec![2u8; 32]));

        assert_eq!(gc.compute_gas_consumed_by_mini_block(&mb, &txs), Ok((20, 50)));
    }
}
