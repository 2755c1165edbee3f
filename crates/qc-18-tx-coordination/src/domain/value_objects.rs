//! Value objects for the coordination domain.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Kind of a user transaction, as decided by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Plain value transfer.
    MoveBalance,
    /// Smart contract deployment.
    SCDeployment,
    /// Call into a smart contract.
    SCInvoking,
    /// Call of a protocol built-in function.
    BuiltInFunctionCall,
    /// Transaction wrapping another, paid by a relayer.
    RelayedTx,
    /// Malformed transaction.
    InvalidTransaction,
}

impl TransactionType {
    /// All kinds, in declaration order.
    pub const ALL: [TransactionType; 6] = [
        TransactionType::MoveBalance,
        TransactionType::SCDeployment,
        TransactionType::SCInvoking,
        TransactionType::BuiltInFunctionCall,
        TransactionType::RelayedTx,
        TransactionType::InvalidTransaction,
    ];
}

/// Action recorded in a peer change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeerAction {
    /// Record refreshed without a stake or status change.
    PeerNoChange,
    /// Validator registered (first time or in this round).
    PeerRegistration,
    /// Validator announced unstaking in this round.
    PeerUnstaking,
    /// Validator removed from the registry.
    PeerDeregistration,
    /// Stake decreased.
    PeerSlashed,
    /// Stake increased.
    PeerReStake,
}

/// A signed difference of two unsigned 256-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignedValue {
    /// True when the value decreased.
    pub negative: bool,
    /// Absolute difference.
    pub magnitude: U256,
}

impl SignedValue {
    /// `new - old`, with sign.
    pub fn delta(old: U256, new: U256) -> Self {
        if new >= old {
            Self {
                negative: false,
                magnitude: new - old,
            }
        } else {
            Self {
                negative: true,
                magnitude: old - new,
            }
        }
    }

    /// A non-negative value.
    pub fn positive(magnitude: U256) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    /// True when the magnitude is zero.
    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }
}

/// Opaque handle on a position of the account journal.
///
/// Only meaningful for the store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(usize);

impl SnapshotId {
    /// Handle for a journal of the given length.
    pub fn from_journal_len(len: usize) -> Self {
        Self(len)
    }

    /// Journal length captured by the handle.
    pub fn journal_len(self) -> usize {
        self.0
    }
}

/// One key/value pair written by a system smart contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUpdate {
    /// Storage key.
    pub key: Vec<u8>,
    /// New value (empty when the key was deleted).
    pub value: Vec<u8>,
}

/// Storage unit holding one kind of block data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitType {
    /// User transactions.
    TransactionUnit,
    /// Smart contract results.
    UnsignedTransactionUnit,
    /// Reward transactions.
    RewardTransactionUnit,
    /// Miniblocks.
    MiniBlockUnit,
}

/// Per-round progress of a pre-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreProcessorState {
    /// Fresh round, nothing requested.
    #[default]
    Idle,
    /// Missing transactions were requested.
    Requested,
    /// Every requested transaction arrived.
    DataPrepared,
    /// Block transactions were processed successfully.
    Processed,
}

/// Read-only query against a system smart contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScQuery {
    /// Contract address.
    pub sc_address: Vec<u8>,
    /// Function to call.
    pub func_name: String,
    /// Raw arguments.
    pub arguments: Vec<Vec<u8>>,
}

/// Return code of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Call succeeded.
    Ok,
    /// Function not found.
    FunctionNotFound,
    /// Contract reported an error.
    UserError,
}

/// Result of a registry query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutput {
    /// Outcome.
    pub return_code: ReturnCode,
    /// Returned values.
    pub return_data: Vec<Vec<u8>>,
}
