//! # QC-18: Transaction Coordination Subsystem
//!
//! Coordinates the transactions of one shard's blocks: splits a body by
//! miniblock kind, drives one pre-processor per kind, folds generated smart
//! contract results and rewards back into the proposed block, tracks gas
//! per shard and mirrors the staking registry into peer state.
//!
//! ## Architecture
//!
//! - **Domain**: accounts, peer changes, errors and block invariants
//! - **Algorithms**: transaction classification, gas computation, body
//!   separation, payload parsing, broadcast topics
//! - **Ports**: Inbound (TransactionCoordinatorApi, PreProcessor,
//!   IntermediateProcessor, GasHandler) and Outbound (account store, pools,
//!   storage, requests, executor, registry)
//! - **Pre/Post-processors**: per-kind working sets and result accumulators
//! - **Coordinator**: block-level orchestration
//! - **Settlement**: staking-to-peer state sync
//! - **Adapters**: in-memory collaborators

#![warn(missing_docs)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod ports;
pub mod postprocess;
pub mod preprocess;
pub mod sc_to_protocol;

pub use algorithms::{separate_body_by_type, ArgumentsParser, GasComputation, TxTypeClassifier};
pub use config::{CoordinationConfig, EconomicsConfig};
pub use coordinator::{
    ArgTransactionCoordinator, IntermediateProcessorsContainer, PreProcessorsContainer,
    TransactionCoordinator,
};
pub use domain::errors::{ErrorCategory, ProcessError, Result};
pub use domain::{PeerAccount, PeerAction, PeerChange, TransactionType, UserAccount};
pub use ports::inbound::{
    CrossShardOutcome, GasHandler, HaveTime, IntermediateProcessor, MarshalizedData, PreProcessor,
    TimeRemaining, TransactionCoordinatorApi, TxTypeHandler,
};
pub use postprocess::{ArgIntermediateResultsProcessor, IntermediateResultsProcessor};
pub use preprocess::{ArgTransactionsPreProcessor, TransactionsPreProcessor};
pub use sc_to_protocol::{ArgStakingToPeer, StakingToPeer};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
