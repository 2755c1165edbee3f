//! In-memory storage units.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_types::Hash;

use crate::domain::{Result, UnitType};
use crate::ports::TxStorer;

/// Storage keeping every unit in memory.
#[derive(Default)]
pub struct MemoryTxStorage {
    units: RwLock<HashMap<UnitType, HashMap<Hash, Vec<u8>>>>,
}

impl MemoryTxStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a unit.
    pub fn unit_len(&self, unit: UnitType) -> usize {
        self.units.read().get(&unit).map_or(0, HashMap::len)
    }
}

impl TxStorer for MemoryTxStorage {
    fn put(&self, unit: UnitType, key: &Hash, value: Vec<u8>) -> Result<()> {
        self.units
            .write()
            .entry(unit)
            .or_default()
            .insert(*key, value);
        Ok(())
    }

    fn get(&self, unit: UnitType, key: &Hash) -> Result<Option<Vec<u8>>> {
        Ok(self
            .units
            .read()
            .get(&unit)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn remove(&self, unit: UnitType, key: &Hash) -> Result<()> {
        if let Some(entries) = self.units.write().get_mut(&unit) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_are_isolated() {
        let storage = MemoryTxStorage::new();
        storage
            .put(UnitType::TransactionUnit, &[1u8; 32], vec![1])
            .unwrap();

        assert_eq!(
            storage.get(UnitType::TransactionUnit, &[1u8; 32]).unwrap(),
            Some(vec![1])
        );
        assert!(storage
            .get(UnitType::RewardTransactionUnit, &[1u8; 32])
            .unwrap()
            .is_none());

        storage.remove(UnitType::TransactionUnit, &[1u8; 32]).unwrap();
        assert_eq!(storage.unit_len(UnitType::TransactionUnit), 0);
    }
}
