//! Error types for the transaction coordination subsystem.

use shared_types::{BlockType, SerializationError};
use thiserror::Error;

/// Result type alias for coordination operations.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Errors raised while coordinating, processing or verifying block transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    // =========================================================================
    // Construction
    // =========================================================================
    /// Shard coordinator not provided.
    #[error("nil shard coordinator")]
    NilShardCoordinator,

    /// Accounts adapter not provided.
    #[error("nil accounts adapter")]
    NilAccountsAdapter,

    /// Peer accounts adapter not provided.
    #[error("nil peer accounts adapter")]
    NilPeerAccountsAdapter,

    /// Miniblock pool not provided.
    #[error("nil miniblock pool")]
    NilMiniBlockPool,

    /// Request handler not provided.
    #[error("nil request handler")]
    NilRequestHandler,

    /// Pre-processor container not provided.
    #[error("nil pre-processors container")]
    NilPreProcessorsContainer,

    /// Intermediate processor container not provided.
    #[error("nil intermediate processor container")]
    NilIntermediateProcessorContainer,

    /// Gas handler not provided.
    #[error("nil gas handler")]
    NilGasHandler,

    /// Requested items tracker not provided.
    #[error("nil requested items handler")]
    NilRequestedItemsHandler,

    /// Transaction data pool not provided.
    #[error("nil transaction data pool")]
    NilTxDataPool,

    /// Transaction storage not provided.
    #[error("nil transaction storage")]
    NilTxStorage,

    /// Transaction executor not provided.
    #[error("nil transaction processor")]
    NilTxProcessor,

    /// Fee handler not provided.
    #[error("nil economics fee handler")]
    NilEconomicsFeeHandler,

    /// Argument parser not provided.
    #[error("nil argument parser")]
    NilArgumentParser,

    /// Current-block transaction cache not provided.
    #[error("nil tx for current block handler")]
    NilTxForCurrentBlockHandler,

    /// Registry query service not provided.
    #[error("nil sc query service")]
    NilScQueryService,

    /// Registry address empty.
    #[error("nil staking registry address")]
    NilStakingRegistryAddress,

    /// Shard count of zero.
    #[error("invalid number of shards: {0}")]
    InvalidNumberOfShards(u32),

    /// Self shard outside the configured shards.
    #[error("invalid shard id: {0}")]
    InvalidShardId(u32),

    /// Block type not handled by the component being built.
    #[error("unsupported block type for this component: {0:?}")]
    UnsupportedBlockType(BlockType),

    // =========================================================================
    // Structural / integrity
    // =========================================================================
    /// A transaction of an unexpected kind was found.
    #[error("wrong type assertion")]
    WrongTypeAssertion,

    /// A transaction that can never be executed.
    #[error("wrong transaction")]
    WrongTransaction,

    /// No broadcast topic exists for the block type.
    #[error("unknown block type: {0:?}")]
    UnknownBlockType(BlockType),

    /// A miniblock names a kind that has no pre-processor.
    #[error("missing pre-processor")]
    MissingPreProcessor,

    /// Cross-shard miniblocks appear after miniblocks created by this shard.
    #[error("miniblocks in wrong order")]
    MiniBlocksInWrongOrder,

    /// A miniblock of another kind was handed to a pre-processor.
    #[error("wrong type in miniblock: expected {expected:?}, got {actual:?}")]
    WrongTypeInMiniBlock {
        /// Kind handled by the processor
        expected: BlockType,
        /// Kind found in the miniblock
        actual: BlockType,
    },

    /// Container already holds a processor for the key.
    #[error("container key already exists: {0:?}")]
    ContainerKeyAlreadyExists(BlockType),

    /// Container holds no processor for the key.
    #[error("invalid container key: {0:?}")]
    InvalidContainerKey(BlockType),

    /// Call data or storage updates could not be parsed.
    #[error("invalid call data: {0}")]
    InvalidCallData(String),

    // =========================================================================
    // Resource insufficiency
    // =========================================================================
    /// Sender balance does not cover value and fee.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Gas price below the network minimum.
    #[error("insufficient fee")]
    InsufficientFee,

    /// Declared gas limit below the minimum cost of the transaction.
    #[error("insufficient gas limit in tx: declared {declared}, required {required}")]
    InsufficientGasLimitInTx {
        /// Gas limit on the transaction
        declared: u64,
        /// Minimum gas required
        required: u64,
    },

    /// Transaction nonce ahead of the account nonce.
    #[error("higher nonce in transaction")]
    HigherNonceInTransaction,

    /// Transaction nonce behind the account nonce.
    #[error("lower nonce in transaction")]
    LowerNonceInTransaction,

    /// Adding the transaction would exceed the per-block gas ceiling.
    #[error("max gas limit per block reached")]
    MaxGasLimitPerBlockReached,

    // =========================================================================
    // Timing
    // =========================================================================
    /// The round's time budget is exhausted.
    #[error("time is out")]
    TimeIsOut,

    // =========================================================================
    // Verification
    // =========================================================================
    /// Receipts hash in the header differs from the locally computed one.
    #[error("receipts hash mismatch")]
    ReceiptsHashMismatch,

    /// A recomputed intermediate miniblock differs from the received one.
    #[error("miniblock hash mismatch")]
    MiniBlockHashMismatch,

    /// Number of intermediate miniblocks differs from the received body.
    #[error("miniblock number mismatch: created {created}, received {received}")]
    MiniBlockNumMismatch {
        /// Locally created cross-shard miniblocks
        created: usize,
        /// Cross-shard miniblocks of the kind in the body
        received: usize,
    },

    /// Claimed peer changes differ from the locally derived ones.
    #[error("peer changes hash does not match")]
    PeerChangesHashDoesNotMatch,

    /// No miniblocks supplied where some were required.
    #[error("nil miniblocks")]
    NilMiniBlocks,

    // =========================================================================
    // Missing data
    // =========================================================================
    /// A referenced transaction is in neither pool nor storage.
    #[error("missing transaction: {0}")]
    MissingTransaction(String),

    /// A referenced miniblock is not available.
    #[error("missing miniblock: {0}")]
    MissingMiniBlock(String),

    // =========================================================================
    // Collaborator failures
    // =========================================================================
    /// Encoding or hashing failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Account state store failure.
    #[error("state error: {0}")]
    State(String),

    /// Storage unit failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Registry query failure.
    #[error("registry query error: {0}")]
    Registry(String),

    /// Executor failure not covered by a dedicated variant.
    #[error("execution error: {0}")]
    Execution(String),
}

/// Error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required dependency was missing at construction.
    Construction,
    /// Malformed block or internal bug.
    Structural,
    /// Business outcome of a single transaction.
    ResourceInsufficiency,
    /// Round time budget exhausted.
    Timing,
    /// Proposed block does not match local recomputation.
    Verification,
    /// Referenced data is not available.
    MissingData,
    /// A collaborator (store, storage, registry, codec) failed.
    Collaborator,
}

impl ProcessError {
    /// Category of the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NilShardCoordinator
            | Self::NilAccountsAdapter
            | Self::NilPeerAccountsAdapter
            | Self::NilMiniBlockPool
            | Self::NilRequestHandler
            | Self::NilPreProcessorsContainer
            | Self::NilIntermediateProcessorContainer
            | Self::NilGasHandler
            | Self::NilRequestedItemsHandler
            | Self::NilTxDataPool
            | Self::NilTxStorage
            | Self::NilTxProcessor
            | Self::NilEconomicsFeeHandler
            | Self::NilArgumentParser
            | Self::NilTxForCurrentBlockHandler
            | Self::NilScQueryService
            | Self::NilStakingRegistryAddress
            | Self::InvalidNumberOfShards(_)
            | Self::InvalidShardId(_)
            | Self::UnsupportedBlockType(_) => ErrorCategory::Construction,

            Self::WrongTypeAssertion
            | Self::WrongTransaction
            | Self::UnknownBlockType(_)
            | Self::MissingPreProcessor
            | Self::MiniBlocksInWrongOrder
            | Self::WrongTypeInMiniBlock { .. }
            | Self::ContainerKeyAlreadyExists(_)
            | Self::InvalidContainerKey(_)
            | Self::InvalidCallData(_) => ErrorCategory::Structural,

            Self::InsufficientFunds
            | Self::InsufficientFee
            | Self::InsufficientGasLimitInTx { .. }
            | Self::HigherNonceInTransaction
            | Self::LowerNonceInTransaction
            | Self::MaxGasLimitPerBlockReached => ErrorCategory::ResourceInsufficiency,

            Self::TimeIsOut => ErrorCategory::Timing,

            Self::ReceiptsHashMismatch
            | Self::MiniBlockHashMismatch
            | Self::MiniBlockNumMismatch { .. }
            | Self::PeerChangesHashDoesNotMatch
            | Self::NilMiniBlocks => ErrorCategory::Verification,

            Self::MissingTransaction(_) | Self::MissingMiniBlock(_) => ErrorCategory::MissingData,

            Self::Serialization(_)
            | Self::State(_)
            | Self::Storage(_)
            | Self::Registry(_)
            | Self::Execution(_) => ErrorCategory::Collaborator,
        }
    }

    /// True when the error rejects the whole block or round.
    ///
    /// Resource-insufficiency errors are per-transaction outcomes and only
    /// abort the enclosing miniblock when raised by a structurally required
    /// transaction.
    pub fn is_fatal_for_block(&self) -> bool {
        self.category() != ErrorCategory::ResourceInsufficiency
    }

    /// Missing transaction error for a hash.
    pub fn missing_transaction(hash: &[u8]) -> Self {
        Self::MissingTransaction(hex::encode(hash))
    }

    /// Missing miniblock error for a hash.
    pub fn missing_mini_block(hash: &[u8]) -> Self {
        Self::MissingMiniBlock(hex::encode(hash))
    }
}
