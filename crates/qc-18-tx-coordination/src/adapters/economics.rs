//! Network economics: minimum gas and fee validity.

use shared_types::BlockTransaction;

use crate::config::EconomicsConfig;
use crate::domain::{ProcessError, Result};
use crate::ports::FeeHandler;

/// Fee handler driven by [`EconomicsConfig`].
#[derive(Debug, Clone)]
pub struct EconomicsData {
    config: EconomicsConfig,
}

impl EconomicsData {
    /// Create a fee handler.
    pub fn new(config: EconomicsConfig) -> Self {
        Self { config }
    }
}

impl FeeHandler for EconomicsData {
    fn compute_gas_limit(&self, tx: &BlockTransaction) -> u64 {
        // results and rewards are generated by the protocol and carry no minimum
        if !matches!(tx, BlockTransaction::Normal(_)) {
            return 0;
        }
        let data_len = tx.data().len() as u64;
        self.config
            .min_gas_limit
            .saturating_add(data_len.saturating_mul(self.config.gas_per_data_byte))
    }

    fn max_gas_limit_per_block(&self) -> u64 {
        self.config.max_gas_limit_per_block
    }

    fn check_validity_tx_values(&self, tx: &BlockTransaction) -> Result<()> {
        if !matches!(tx, BlockTransaction::Normal(_)) {
            return Ok(());
        }
        if tx.gas_price() < self.config.min_gas_price {
            return Err(ProcessError::InsufficientFee);
        }
        if tx.gas_limit() > self.config.max_gas_limit_per_block {
            return Err(ProcessError::MaxGasLimitPerBlockReached);
        }
        Ok(())
    }
}
