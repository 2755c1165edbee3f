//! Processor containers keyed by block type.
//!
//! Keys iterate in ascending block type order.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_types::BlockType;

use crate::domain::{ProcessError, Result};
use crate::ports::{IntermediateProcessor, PreProcessor};

/// Processors of one family, at most one per block type.
pub struct ProcessorContainer<P: ?Sized> {
    processors: BTreeMap<BlockType, Arc<P>>,
}

/// Container of pre-processors.
pub type PreProcessorsContainer = ProcessorContainer<dyn PreProcessor>;

/// Container of intermediate processors.
pub type IntermediateProcessorsContainer = ProcessorContainer<dyn IntermediateProcessor>;

impl<P: ?Sized> ProcessorContainer<P> {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            processors: BTreeMap::new(),
        }
    }

    /// Add a processor. Fails when the key is taken.
    pub fn add(&mut self, key: BlockType, processor: Arc<P>) -> Result<()> {
        if self.processors.contains_key(&key) {
            return Err(ProcessError::ContainerKeyAlreadyExists(key));
        }
        self.processors.insert(key, processor);
        Ok(())
    }

    /// Processor registered under `key`.
    pub fn get(&self, key: BlockType) -> Result<Arc<P>> {
        self.processors
            .get(&key)
            .cloned()
            .ok_or(ProcessError::InvalidContainerKey(key))
    }

    /// Insert or replace a processor.
    pub fn replace(&mut self, key: BlockType, processor: Arc<P>) {
        self.processors.insert(key, processor);
    }

    /// Remove a processor.
    pub fn remove(&mut self, key: BlockType) {
        self.processors.remove(&key);
    }

    /// Number of processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Keys, ascending.
    pub fn keys(&self) -> Vec<BlockType> {
        self.processors.keys().copied().collect()
    }

    /// Processors, by ascending key.
    pub fn iter(&self) -> impl Iterator<Item = (BlockType, &Arc<P>)> {
        self.processors.iter().map(|(key, processor)| (*key, processor))
    }
}

impl<P: ?Sized> Default for ProcessorContainer<P> {
    fn default() -> Self {
        Self::new()
    }
}
