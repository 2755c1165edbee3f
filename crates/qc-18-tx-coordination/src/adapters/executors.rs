//! Transaction executors over the in-memory account store.

use std::sync::Arc;

use shared_types::{BlockTransaction, SmartContractResult};
use tracing::trace;

use crate::algorithms::is_smart_contract_address;
use crate::domain::{ProcessError, Result, UserAccount};
use crate::ports::{AccountsAdapter, IntermediateProcessor, TransactionProcessor};

/// Call payload of the result returned to the caller of a contract.
pub const CALL_RESULT_DATA: &[u8] = b"@6f6b";

/// Executor moving value between user accounts.
///
/// User transactions check the sender nonce and balance; smart contract
/// results and rewards credit the receiver. Calls into smart contract
/// addresses return a zero-value result to the caller through the
/// intermediate processor, when one is attached.
pub struct MoveBalanceProcessor {
    accounts: Arc<dyn AccountsAdapter<UserAccount>>,
    results: Option<Arc<dyn IntermediateProcessor>>,
}

impl MoveBalanceProcessor {
    /// Create an executor.
    pub fn new(accounts: Arc<dyn AccountsAdapter<UserAccount>>) -> Self {
        Self {
            accounts,
            results: None,
        }
    }

    /// Emit smart contract results into `results`.
    pub fn with_results(mut self, results: Arc<dyn IntermediateProcessor>) -> Self {
        self.results = Some(results);
        self
    }

    fn credit(&self, address: &[u8], value: primitive_types::U256) -> Result<()> {
        let mut receiver = self.accounts.load_account(address)?;
        receiver.balance = receiver
            .balance
            .checked_add(value)
            .ok_or_else(|| ProcessError::Execution("balance overflow".into()))?;
        self.accounts.save_account(&receiver)
    }
}

impl TransactionProcessor for MoveBalanceProcessor {
    fn process_transaction(&self, tx: &BlockTransaction) -> Result<()> {
        match tx {
            BlockTransaction::Normal(user_tx) => {
                let mut sender = self.accounts.load_account(&user_tx.snd_addr)?;
                if user_tx.nonce < sender.nonce {
                    return Err(ProcessError::LowerNonceInTransaction);
                }
                if user_tx.nonce > sender.nonce {
                    return Err(ProcessError::HigherNonceInTransaction);
                }
                if sender.balance < user_tx.value {
                    return Err(ProcessError::InsufficientFunds);
                }

                sender.balance -= user_tx.value;
                sender.nonce += 1;
                self.accounts.save_account(&sender)?;
                self.credit(&user_tx.rcv_addr, user_tx.value)?;

                if let Some(results) = &self.results {
                    if !user_tx.data.is_empty() && is_smart_contract_address(&user_tx.rcv_addr) {
                        let call_result = SmartContractResult {
                            nonce: user_tx.nonce + 1,
                            rcv_addr: user_tx.snd_addr.clone(),
                            snd_addr: user_tx.rcv_addr.clone(),
                            gas_price: user_tx.gas_price,
                            data: CALL_RESULT_DATA.to_vec(),
                            original_tx_hash: tx.hash()?,
                            ..Default::default()
                        };
                        results.add_intermediate_transactions(vec![call_result.into()])?;
                    }
                }
                Ok(())
            }
            BlockTransaction::SmartContractResult(scr) => self.credit(&scr.rcv_addr, scr.value),
            BlockTransaction::Reward(reward) => {
                trace!(round = reward.round, "Reward credited");
                self.credit(&reward.rcv_addr, reward.value)
            }
        }
    }
}

type ProcessFn = dyn Fn(&BlockTransaction) -> Result<()> + Send + Sync;

/// Executor delegating to a closure.
pub struct TransactionProcessorStub {
    process: Box<ProcessFn>,
}

impl TransactionProcessorStub {
    /// Executor running `process` for every transaction.
    pub fn new(process: impl Fn(&BlockTransaction) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            process: Box::new(process),
        }
    }
}

impl Default for TransactionProcessorStub {
    fn default() -> Self {
        Self::new(|_| Ok(()))
    }
}

impl TransactionProcessor for TransactionProcessorStub {
    fn process_transaction(&self, tx: &BlockTransaction) -> Result<()> {
        (self.process)(tx)
    }
}
