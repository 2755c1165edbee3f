//! In-memory staking registry answering `get` queries.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{ProcessError, Result, ReturnCode, ScQuery, StakingData, VmOutput};
use crate::ports::ScQueryService;

/// Name of the registry's lookup function.
pub const GET_FUNCTION: &str = "get";

/// Staking registry keyed by BLS public key.
///
/// `get` returns the JSON encoding of the record, or no data once the key is
/// unregistered.
#[derive(Default)]
pub struct InMemoryStakingRegistry {
    records: RwLock<HashMap<Vec<u8>, StakingData>>,
}

impl InMemoryStakingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn set(&self, bls_key: &[u8], record: StakingData) {
        self.records.write().insert(bls_key.to_vec(), record);
    }

    /// Remove a record.
    pub fn remove(&self, bls_key: &[u8]) {
        self.records.write().remove(bls_key);
    }
}

impl ScQueryService for InMemoryStakingRegistry {
    fn execute_query(&self, query: &ScQuery) -> Result<VmOutput> {
        if query.func_name != GET_FUNCTION {
            return Ok(VmOutput {
                return_code: ReturnCode::FunctionNotFound,
                return_data: Vec::new(),
            });
        }

        let Some(key) = query.arguments.first() else {
            return Ok(VmOutput {
                return_code: ReturnCode::UserError,
                return_data: Vec::new(),
            });
        };

        let return_data = match self.records.read().get(key) {
            Some(record) => vec![serde_json::to_vec(record)
                .map_err(|e| ProcessError::Registry(e.to_string()))?],
            None => Vec::new(),
        };

        Ok(VmOutput {
            return_code: ReturnCode::Ok,
            return_data,
        })
    }
}
