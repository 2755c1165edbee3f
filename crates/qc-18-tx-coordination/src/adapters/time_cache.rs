//! Requested-items tracker with expiring entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::{ProcessError, Result};
use crate::ports::RequestedItemsHandler;

/// Keys remembered for a fixed time span.
pub struct TimeCache {
    ttl: Duration,
    entries: Mutex<HashMap<Vec<u8>, Instant>>,
}

impl TimeCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tracked keys, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl RequestedItemsHandler for TimeCache {
    fn has(&self, key: &[u8]) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|added| added.elapsed() < self.ttl)
    }

    fn add(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(ProcessError::Storage("empty requested item key".into()));
        }
        self.entries.lock().insert(key.to_vec(), Instant::now());
        Ok(())
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.lock().retain(|_, added| added.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_has() {
        let cache = TimeCache::new(Duration::from_secs(60));
        assert!(!cache.has(b"k"));
        cache.add(b"k").unwrap();
        assert!(cache.has(b"k"));
        assert!(cache.add(b"").is_err());
    }

    #[test]
    fn test_entries_expire() {
        let cache = TimeCache::new(Duration::from_millis(1));
        cache.add(b"k").unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(!cache.has(b"k"));
        cache.sweep();
        assert!(cache.is_empty());
    }
}
