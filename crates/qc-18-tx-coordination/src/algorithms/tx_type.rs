//! Transaction type classification.
//!
//! Pure function of the transaction and the injected topology: address
//! length, built-in function names and the shard partition.

use std::collections::BTreeSet;
use std::sync::Arc;

use shared_types::BlockTransaction;

use crate::config::CoordinationConfig;
use crate::domain::{ProcessError, Result, TransactionType};
use crate::ports::{ArgumentParser, ShardCoordinator, TxTypeHandler};

/// Length of the reserved prefix of a smart contract address.
pub const NUM_INIT_CHARACTERS_FOR_SC_ADDRESS: usize = 10;

/// Bytes of the prefix holding the VM type.
pub const VM_TYPE_LEN: usize = 2;

/// True when `address` follows the smart contract convention: the prefix
/// before the VM type is all zeros.
pub fn is_smart_contract_address(address: &[u8]) -> bool {
    address.len() >= NUM_INIT_CHARACTERS_FOR_SC_ADDRESS
        && address[..NUM_INIT_CHARACTERS_FOR_SC_ADDRESS - VM_TYPE_LEN]
            .iter()
            .all(|b| *b == 0)
}

/// Classifier of user transactions.
pub struct TxTypeClassifier {
    address_len: usize,
    built_in_functions: BTreeSet<String>,
    relayed_tx_function: String,
    shard_coordinator: Arc<dyn ShardCoordinator>,
    argument_parser: Arc<dyn ArgumentParser>,
}

impl TxTypeClassifier {
    /// Create a classifier.
    pub fn new(
        config: &CoordinationConfig,
        shard_coordinator: Option<Arc<dyn ShardCoordinator>>,
        argument_parser: Option<Arc<dyn ArgumentParser>>,
    ) -> Result<Self> {
        let shard_coordinator = shard_coordinator.ok_or(ProcessError::NilShardCoordinator)?;
        let argument_parser = argument_parser.ok_or(ProcessError::NilArgumentParser)?;

        Ok(Self {
            address_len: config.address_len,
            built_in_functions: config.built_in_functions.clone(),
            relayed_tx_function: config.relayed_tx_function.clone(),
            shard_coordinator,
            argument_parser,
        })
    }

    /// Like [`TxTypeHandler::compute_transaction_type`], but rejects invalid
    /// transactions with `WrongTransaction`.
    pub fn compute_transaction_type_checked(
        &self,
        tx: Option<&BlockTransaction>,
    ) -> Result<TransactionType> {
        match self.compute_transaction_type(tx) {
            TransactionType::InvalidTransaction => Err(ProcessError::WrongTransaction),
            tx_type => Ok(tx_type),
        }
    }

    fn is_destination_me(&self, receiver: &[u8]) -> bool {
        self.shard_coordinator.compute_id(receiver) == self.shard_coordinator.self_id()
    }

    fn function_name(&self, data: &[u8]) -> Option<String> {
        let data = std::str::from_utf8(data).ok()?;
        let (function, _) = self.argument_parser.parse_call_data(data).ok()?;
        Some(function)
    }
}

impl TxTypeHandler for TxTypeClassifier {
    fn compute_transaction_type(&self, tx: Option<&BlockTransaction>) -> TransactionType {
        let Some(tx) = tx else {
            return TransactionType::InvalidTransaction;
        };

        let receiver = tx.receiver();
        if receiver.len() != self.address_len {
            return TransactionType::InvalidTransaction;
        }

        if receiver.iter().all(|b| *b == 0) {
            if tx.data().is_empty() {
                return TransactionType::InvalidTransaction;
            }
            return TransactionType::SCDeployment;
        }

        if tx.data().is_empty() {
            return TransactionType::MoveBalance;
        }

        let Some(function) = self.function_name(tx.data()) else {
            return TransactionType::MoveBalance;
        };

        if function == self.relayed_tx_function {
            return TransactionType::RelayedTx;
        }

        let is_built_in = self.built_in_functions.contains(&function);
        if !is_built_in && !self.is_destination_me(receiver) {
            return TransactionType::MoveBalance;
        }
        if is_built_in {
            return TransactionType::BuiltInFunctionCall;
        }
        if is_smart_contract_address(receiver) {
            return TransactionType::SCInvoking;
        }

        TransactionType::MoveBalance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MultiShardCoordinator;
    use crate::algorithms::ArgumentsParser;
    use shared_types::Transaction;

    fn classifier() -> TxTypeClassifier {
        let config = CoordinationConfig::for_testing();
        TxTypeClassifier::new(
            &config,
            Some(Arc::new(MultiShardCoordinator::new(2, 0).unwrap())),
            Some(Arc::new(ArgumentsParser::new())),
        )
        .unwrap()
    }

    fn tx_to(receiver: Vec<u8>, data: &str) -> BlockTransaction {
        BlockTransaction::Normal(Transaction {
            rcv_addr: receiver,
            snd_addr: vec![1u8; 32],
            data: data.as_bytes().to_vec(),
            ..Default::default()
        })
    }

    fn sc_address(last: u8) -> Vec<u8> {
        let mut address = vec![0u8; 32];
        address[10] = 5;
        address[31] = last;
        address
    }

    #[test]
    fn test_nil_dependencies() {
        let config = CoordinationConfig::for_testing();
        assert!(matches!(
            TxTypeClassifier::new(&config, None, Some(Arc::new(ArgumentsParser))),
            Err(ProcessError::NilShardCoordinator)
        ));
        assert!(matches!(
            TxTypeClassifier::new(
                &config,
                Some(Arc::new(MultiShardCoordinator::new(2, 0).unwrap())),
                None
            ),
            Err(ProcessError::NilArgumentParser)
        ));
    }

    #[test]
    fn test_nil_tx_is_invalid() {
        assert_eq!(
            classifier().compute_transaction_type(None),
            TransactionType::InvalidTransaction
        );
    }

    #[test]
    fn test_wrong_address_length_is_invalid() {
        let tx = tx_to(vec![1u8; 31], "");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::InvalidTransaction
        );
    }

    #[test]
    fn test_empty_data_is_move_balance() {
        let tx = tx_to(vec![2u8; 32], "");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::MoveBalance
        );
    }

    #[test]
    fn test_zero_address_with_data_is_deployment() {
        let tx = tx_to(vec![0u8; 32], "code@0500");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::SCDeployment
        );
    }

    #[test]
    fn test_zero_address_without_data_is_invalid() {
        let tx = tx_to(vec![0u8; 32], "");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::InvalidTransaction
        );
        assert_eq!(
            classifier().compute_transaction_type_checked(Some(&tx)),
            Err(ProcessError::WrongTransaction)
        );
    }

    #[test]
    fn test_unparsable_data_is_move_balance() {
        let tx = tx_to(sc_address(0), "@0a");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::MoveBalance
        );
    }

    #[test]
    fn test_relayed() {
        let tx = tx_to(vec![3u8; 32], "relayedTx@0a");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::RelayedTx
        );
    }

    #[test]
    fn test_built_in_regardless_of_shard() {
        // last byte 1 lives in shard 1 of 2
        let tx = tx_to(sc_address(1), "ClaimDeveloperRewards");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::BuiltInFunctionCall
        );
    }

    #[test]
    fn test_sc_call_in_shard() {
        let tx = tx_to(sc_address(0), "doSomething@01");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::SCInvoking
        );
    }

    #[test]
    fn test_sc_call_cross_shard_degrades_to_move_balance() {
        let tx = tx_to(sc_address(1), "doSomething@01");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::MoveBalance
        );
    }

    #[test]
    fn test_call_on_user_address_is_move_balance() {
        let tx = tx_to(vec![2u8; 32], "doSomething");
        assert_eq!(
            classifier().compute_transaction_type(Some(&tx)),
            TransactionType::MoveBalance
        );
    }

    #[test]
    fn test_sc_address_convention() {
        assert!(is_smart_contract_address(&sc_address(3)));
        assert!(!is_smart_contract_address(&[0u8; 9]));
        assert!(!is_smart_contract_address(&vec![1u8; 32]));
    }
}
