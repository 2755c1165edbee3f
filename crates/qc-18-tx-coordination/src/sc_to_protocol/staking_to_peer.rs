//! Staking-to-peer settlement.
//!
//! Mirrors the staking registry's records into the peer accounts read by
//! consensus, once per block, driven by the smart contract results the
//! metachain addressed to the registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{calculate_hash, Body, BlockTransaction, BlockType, Hash, METACHAIN_SHARD_ID};
use tracing::{debug, info_span, trace, warn, Span};

use crate::adapters::registry::GET_FUNCTION;
use crate::domain::{
    PeerAccount, PeerAction, PeerChange, ProcessError, Result, ReturnCode, ScQuery, SignedValue,
    StakingData,
};
use crate::ports::{AccountsAdapter, ArgumentParser, ScQueryService, TransactionCacher};

/// Dependencies of a [`StakingToPeer`].
#[derive(Default)]
pub struct ArgStakingToPeer {
    /// Peer account store.
    pub peer_accounts: Option<Arc<dyn AccountsAdapter<PeerAccount>>>,
    /// Parser for the storage updates carried by registry results.
    pub argument_parser: Option<Arc<dyn ArgumentParser>>,
    /// Transactions of the block being processed.
    pub current_txs: Option<Arc<dyn TransactionCacher>>,
    /// Read-only access to the registry.
    pub sc_query: Option<Arc<dyn ScQueryService>>,
    /// Address of the staking registry contract.
    pub registry_address: Vec<u8>,
}

/// Translates staking registry changes into peer state.
pub struct StakingToPeer {
    peer_accounts: Arc<dyn AccountsAdapter<PeerAccount>>,
    argument_parser: Arc<dyn ArgumentParser>,
    current_txs: Arc<dyn TransactionCacher>,
    sc_query: Arc<dyn ScQueryService>,
    registry_address: Vec<u8>,
    peer_changes: Mutex<HashMap<Hash, PeerChange>>,
    span: Span,
}

impl StakingToPeer {
    /// Create the settlement helper.
    pub fn new(args: ArgStakingToPeer) -> Result<Self> {
        let peer_accounts = args
            .peer_accounts
            .ok_or(ProcessError::NilPeerAccountsAdapter)?;
        let argument_parser = args.argument_parser.ok_or(ProcessError::NilArgumentParser)?;
        let current_txs = args
            .current_txs
            .ok_or(ProcessError::NilTxForCurrentBlockHandler)?;
        let sc_query = args.sc_query.ok_or(ProcessError::NilScQueryService)?;
        if args.registry_address.is_empty() {
            return Err(ProcessError::NilStakingRegistryAddress);
        }

        Ok(Self {
            peer_accounts,
            argument_parser,
            current_txs,
            sc_query,
            registry_address: args.registry_address,
            peer_changes: Mutex::new(HashMap::new()),
            span: info_span!("staking_to_peer"),
        })
    }

    /// Apply the registry changes of `body` to peer state and record the
    /// resulting peer changes.
    ///
    /// Any store or registry failure aborts the settlement and is returned
    /// unchanged.
    pub fn update_protocol(&self, body: &Body, nonce: u64) -> Result<()> {
        let _guard = self.span.enter();
        self.peer_changes.lock().clear();

        // 1. Identities touched by the registry in this block
        let affected = self.modified_identities(body)?;
        debug!(nonce, affected = affected.len(), "Settling staking changes");

        for bls_key in affected {
            // 2. Current peer projection and authoritative record
            let account = self.peer_accounts.load_account(&bls_key)?;
            let Some(record) = self.query_record(&bls_key)? else {
                // 3. Gone from the registry
                self.peer_unregistered(&account, nonce)?;
                self.peer_accounts.remove_account(&bls_key)?;
                continue;
            };

            // 4. Audit record, then field-by-field reconcile
            self.record_peer_change(&record, &account, nonce, &bls_key)?;
            self.update_peer_state(&record, account, &bls_key)?;
        }

        Ok(())
    }

    /// Peer changes of the last `update_protocol`, sorted by address, then
    /// public key, then action.
    pub fn peer_changes(&self) -> Vec<PeerChange> {
        let mut changes: Vec<PeerChange> = self.peer_changes.lock().values().cloned().collect();
        changes.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then_with(|| a.public_key.cmp(&b.public_key))
                .then_with(|| a.action.cmp(&b.action))
        });
        changes
    }

    /// Check that `claimed` is exactly the list this node derived.
    pub fn verify_peer_changes(&self, claimed: &[PeerChange]) -> Result<()> {
        let created = calculate_hash(&self.peer_changes())?;
        let received = calculate_hash(claimed)?;
        if created != received {
            warn!(
                created = %hex::encode(created),
                received = %hex::encode(received),
                "Peer changes mismatch"
            );
            return Err(ProcessError::PeerChangesHashDoesNotMatch);
        }
        Ok(())
    }

    fn modified_identities(&self, body: &Body) -> Result<Vec<Vec<u8>>> {
        let mut seen = BTreeSet::new();
        let mut affected = Vec::new();

        for mini_block in body.mini_blocks.iter().filter(|mb| {
            mb.block_type == BlockType::SmartContractResultBlock
                && mb.sender_shard_id == METACHAIN_SHARD_ID
        }) {
            for hash in &mini_block.tx_hashes {
                let Ok(tx) = self.current_txs.get_tx(hash) else {
                    trace!(hash = %hex::encode(hash), "Result not in current block");
                    continue;
                };
                if tx.receiver() != self.registry_address.as_slice() {
                    continue;
                }

                let BlockTransaction::SmartContractResult(result) = tx else {
                    warn!(hash = %hex::encode(hash), "Non-result transaction addressed to the registry");
                    return Err(ProcessError::WrongTypeAssertion);
                };

                let data = String::from_utf8_lossy(&result.data);
                for update in self.argument_parser.storage_updates(&data)? {
                    if seen.insert(update.key.clone()) {
                        affected.push(update.key);
                    }
                }
            }
        }

        Ok(affected)
    }

    fn query_record(&self, bls_key: &[u8]) -> Result<Option<StakingData>> {
        let output = self.sc_query.execute_query(&ScQuery {
            sc_address: self.registry_address.clone(),
            func_name: GET_FUNCTION.to_string(),
            arguments: vec![bls_key.to_vec()],
        })?;
        if output.return_code != ReturnCode::Ok {
            return Err(ProcessError::Registry(format!(
                "query returned {:?}",
                output.return_code
            )));
        }

        match output.return_data.first() {
            Some(data) if !data.is_empty() => serde_json::from_slice(data)
                .map(Some)
                .map_err(|e| ProcessError::Registry(e.to_string())),
            _ => Ok(None),
        }
    }

    fn insert_change(&self, change: PeerChange) -> Result<()> {
        let hash = calculate_hash(&change)?;
        self.peer_changes.lock().insert(hash, change);
        Ok(())
    }

    fn peer_unregistered(&self, account: &PeerAccount, nonce: u64) -> Result<()> {
        self.insert_change(PeerChange {
            address: account.reward_address.clone(),
            public_key: account.bls_public_key.clone(),
            action: PeerAction::PeerDeregistration,
            timestamp: nonce,
            value_change: SignedValue::positive(account.stake),
        })
    }

    fn record_peer_change(
        &self,
        record: &StakingData,
        account: &PeerAccount,
        nonce: u64,
        bls_key: &[u8],
    ) -> Result<()> {
        if account.reward_address.is_empty() {
            return self.insert_change(PeerChange {
                address: record.reward_address.clone(),
                public_key: bls_key.to_vec(),
                action: PeerAction::PeerRegistration,
                timestamp: record.start_nonce,
                value_change: SignedValue::positive(record.stake_value),
            });
        }

        let value_change = SignedValue::delta(account.stake, record.stake_value);
        let action = if record.unstaked_nonce == nonce {
            PeerAction::PeerUnstaking
        } else if record.start_nonce == nonce {
            PeerAction::PeerRegistration
        } else if value_change.is_zero() {
            PeerAction::PeerNoChange
        } else if value_change.negative {
            PeerAction::PeerSlashed
        } else {
            PeerAction::PeerReStake
        };

        self.insert_change(PeerChange {
            address: account.reward_address.clone(),
            public_key: account.bls_public_key.clone(),
            action,
            timestamp: nonce,
            value_change,
        })
    }

    /// Each differing field is written with its own save.
    fn update_peer_state(
        &self,
        record: &StakingData,
        mut account: PeerAccount,
        bls_key: &[u8],
    ) -> Result<()> {
        if record.reward_address != account.reward_address {
            account.reward_address = record.reward_address.clone();
            self.peer_accounts.save_account(&account)?;
        }

        if bls_key != account.bls_public_key.as_slice() {
            account.bls_public_key = bls_key.to_vec();
            self.peer_accounts.save_account(&account)?;
        }

        if record.stake_value != account.stake {
            account.stake = record.stake_value;
            self.peer_accounts.save_account(&account)?;
        }

        if record.start_nonce != account.nonce {
            account.nonce = record.start_nonce;
            self.peer_accounts.save_account(&account)?;
            account.node_in_waiting_list = true;
            self.peer_accounts.save_account(&account)?;
        }

        if record.unstaked_nonce != account.unstaked_nonce {
            account.unstaked_nonce = record.unstaked_nonce;
            self.peer_accounts.save_account(&account)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;
    use crate::adapters::{CurrentBlockTxs, InMemoryAccounts, InMemoryStakingRegistry};
    use crate::algorithms::ArgumentsParser;
    use crate::ports::StateJournal;
    use shared_types::{MiniBlock, SmartContractResult, Transaction};

    const REGISTRY: [u8; 32] = [0xee; 32];

    struct Fixture {
        peers: Arc<InMemoryAccounts<PeerAccount>>,
        current_txs: Arc<CurrentBlockTxs>,
        registry: Arc<InMemoryStakingRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                peers: Arc::new(InMemoryAccounts::new()),
                current_txs: Arc::new(CurrentBlockTxs::new()),
                registry: Arc::new(InMemoryStakingRegistry::new()),
            }
        }

        fn args(&self) -> ArgStakingToPeer {
            ArgStakingToPeer {
                peer_accounts: Some(self.peers.clone()),
                argument_parser: Some(Arc::new(ArgumentsParser::new())),
                current_txs: Some(self.current_txs.clone()),
                sc_query: Some(self.registry.clone()),
                registry_address: REGISTRY.to_vec(),
            }
        }

        fn settlement(&self) -> StakingToPeer {
            StakingToPeer::new(self.args()).unwrap()
        }

        /// Body with one metachain result touching `keys`.
        fn body_touching(&self, keys: &[[u8; 48]]) -> Body {
            let data = keys
                .iter()
                .map(|key| format!("{}@01", hex::encode(key)))
                .collect::<Vec<_>>()
                .join("@");
            let tx = BlockTransaction::SmartContractResult(SmartContractResult {
                rcv_addr: REGISTRY.to_vec(),
                snd_addr: vec![0u8; 32],
                data: data.into_bytes(),
                ..Default::default()
            });
            let hash = tx.hash().unwrap();
            self.current_txs.add_tx(hash, tx);

            let mut mini_block =
                MiniBlock::new(METACHAIN_SHARD_ID, 0, BlockType::SmartContractResultBlock);
            mini_block.tx_hashes = vec![hash];
            Body::new(vec![mini_block])
        }
    }

    fn staking(start_nonce: u64, stake: u64) -> StakingData {
        StakingData {
            start_nonce,
            unstaked_nonce: 0,
            reward_address: vec![0xaa; 32],
            stake_value: U256::from(stake),
        }
    }

    #[test]
    fn test_nil_dependencies() {
        let fixture = Fixture::new();

        let mut args = fixture.args();
        args.peer_accounts = None;
        assert!(matches!(
            StakingToPeer::new(args),
            Err(ProcessError::NilPeerAccountsAdapter)
        ));

        let mut args = fixture.args();
        args.sc_query = None;
        assert!(matches!(
            StakingToPeer::new(args),
            Err(ProcessError::NilScQueryService)
        ));

        let mut args = fixture.args();
        args.registry_address = Vec::new();
        assert!(matches!(
            StakingToPeer::new(args),
            Err(ProcessError::NilStakingRegistryAddress)
        ));
    }

    #[test]
    fn test_first_registration() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [1u8; 48];
        fixture.registry.set(&key, staking(5, 1_000));

        settlement
            .update_protocol(&fixture.body_touching(&[key]), 5)
            .unwrap();

        let changes = settlement.peer_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, PeerAction::PeerRegistration);
        assert_eq!(changes[0].value_change, SignedValue::positive(U256::from(1_000)));

        let account = fixture.peers.get_existing_account(&key).unwrap().unwrap();
        assert_eq!(account.stake, U256::from(1_000));
        assert_eq!(account.bls_public_key, key.to_vec());
        assert!(account.node_in_waiting_list);
    }

    #[test]
    fn test_stake_decrease_is_slashing() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [2u8; 48];
        fixture.registry.set(&key, staking(1, 1_000));
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 1)
            .unwrap();

        fixture.registry.set(&key, staking(1, 600));
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 9)
            .unwrap();

        let changes = settlement.peer_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, PeerAction::PeerSlashed);
        assert!(changes[0].value_change.negative);
        assert_eq!(changes[0].value_change.magnitude, U256::from(400));
    }

    #[test]
    fn test_unstaking_in_current_round() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [3u8; 48];
        fixture.registry.set(&key, staking(1, 1_000));
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 1)
            .unwrap();

        let mut record = staking(1, 1_000);
        record.unstaked_nonce = 7;
        fixture.registry.set(&key, record);
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 7)
            .unwrap();

        assert_eq!(settlement.peer_changes()[0].action, PeerAction::PeerUnstaking);
        let account = fixture.peers.get_existing_account(&key).unwrap().unwrap();
        assert_eq!(account.unstaked_nonce, 7);
    }

    #[test]
    fn test_deregistration_removes_account() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [4u8; 48];
        fixture.registry.set(&key, staking(1, 1_000));
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 1)
            .unwrap();

        fixture.registry.remove(&key);
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 3)
            .unwrap();

        let changes = settlement.peer_changes();
        assert_eq!(changes[0].action, PeerAction::PeerDeregistration);
        assert_eq!(changes[0].value_change, SignedValue::positive(U256::from(1_000)));
        assert_eq!(changes[0].timestamp, 3);
        assert!(fixture.peers.get_existing_account(&key).unwrap().is_none());
    }

    #[test]
    fn test_unchanged_record_is_still_recorded() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [9u8; 48];
        fixture.registry.set(&key, staking(1, 1_000));
        settlement
            .update_protocol(&fixture.body_touching(&[key]), 1)
            .unwrap();
        let journal_before = fixture.peers.journal_len();

        settlement
            .update_protocol(&fixture.body_touching(&[key]), 6)
            .unwrap();

        let changes = settlement.peer_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, PeerAction::PeerNoChange);
        assert_eq!(changes[0].timestamp, 6);
        assert!(changes[0].value_change.is_zero());
        assert_eq!(fixture.peers.journal_len(), journal_before);
    }

    #[test]
    fn test_non_result_to_registry_is_rejected() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();

        let tx = BlockTransaction::Normal(Transaction {
            rcv_addr: REGISTRY.to_vec(),
            ..Default::default()
        });
        let hash = tx.hash().unwrap();
        fixture.current_txs.add_tx(hash, tx);
        let mut mini_block =
            MiniBlock::new(METACHAIN_SHARD_ID, 0, BlockType::SmartContractResultBlock);
        mini_block.tx_hashes = vec![hash];

        assert_eq!(
            settlement.update_protocol(&Body::new(vec![mini_block]), 1),
            Err(ProcessError::WrongTypeAssertion)
        );
    }

    #[test]
    fn test_results_from_other_shards_are_ignored() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let key = [5u8; 48];
        fixture.registry.set(&key, staking(1, 1_000));

        let mut body = fixture.body_touching(&[key]);
        body.mini_blocks[0].sender_shard_id = 1;
        settlement.update_protocol(&body, 1).unwrap();

        assert!(settlement.peer_changes().is_empty());
        assert_eq!(fixture.peers.journal_len(), 0);
    }

    #[test]
    fn test_verify_peer_changes() {
        let fixture = Fixture::new();
        let settlement = fixture.settlement();
        let first = [6u8; 48];
        let second = [7u8; 48];
        fixture.registry.set(&first, staking(2, 10));
        let mut other = staking(2, 20);
        other.reward_address = vec![0x01; 32];
        fixture.registry.set(&second, other);

        settlement
            .update_protocol(&fixture.body_touching(&[first, second]), 2)
            .unwrap();

        let changes = settlement.peer_changes();
        assert_eq!(changes.len(), 2);
        assert!(changes[0].address < changes[1].address);
        assert!(settlement.verify_peer_changes(&changes).is_ok());

        let reversed: Vec<PeerChange> = changes.iter().rev().cloned().collect();
        assert_eq!(
            settlement.verify_peer_changes(&reversed),
            Err(ProcessError::PeerChangesHashDoesNotMatch)
        );
        assert_eq!(
            settlement.verify_peer_changes(&changes[..1]),
            Err(ProcessError::PeerChangesHashDoesNotMatch)
        );
    }

    #[test]
    fn test_registry_failure_propagates() {
        struct Failing;
        impl ScQueryService for Failing {
            fn execute_query(&self, _query: &ScQuery) -> Result<crate::domain::VmOutput> {
                Err(ProcessError::Registry("unavailable".into()))
            }
        }

        let fixture = Fixture::new();
        let mut args = fixture.args();
        args.sc_query = Some(Arc::new(Failing));
        let settlement = StakingToPeer::new(args).unwrap();

        let body = fixture.body_touching(&[[8u8; 48]]);
        assert_eq!(
            settlement.update_protocol(&body, 1),
            Err(ProcessError::Registry("unavailable".into()))
        );
        let empty = InMemoryAccounts::<PeerAccount>::new();
        assert_eq!(
            fixture.peers.root_hash().unwrap(),
            empty.root_hash().unwrap()
        );
    }
}
