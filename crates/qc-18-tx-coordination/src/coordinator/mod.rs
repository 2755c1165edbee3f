//! Block-level coordination of the per-kind processors.

pub mod containers;
pub mod service;

pub use containers::{IntermediateProcessorsContainer, PreProcessorsContainer, ProcessorContainer};
pub use service::{ArgTransactionCoordinator, TransactionCoordinator};
