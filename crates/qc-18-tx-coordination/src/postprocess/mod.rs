//! # Post-processors
//!
//! Accumulators of the transactions generated while a block executes:
//! smart contract results and rewards.

pub mod intermediate_results;

pub use intermediate_results::{ArgIntermediateResultsProcessor, IntermediateResultsProcessor};
