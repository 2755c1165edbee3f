//! # Pre-processors
//!
//! One pre-processor per transaction kind owns the round's working set for
//! that kind: it requests missing transactions, waits for them, executes
//! block miniblocks and packs new ones from the pool.

mod base;
pub mod transactions;

pub use base::{filter_unrequested, storage_unit};
pub use transactions::{ArgTransactionsPreProcessor, TransactionsPreProcessor};
