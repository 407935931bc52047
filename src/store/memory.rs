//! In-memory counter store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;

use super::backend::CounterStore;

/// Counter store backed by a process-local map.
///
/// A single mutex guards the whole map, so every mutating call, including
/// the check-and-increment in [`try_acquire`](CounterStore::try_acquire),
/// runs under one exclusive lock hold. The lock is never held across an
/// await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers currently tracked.
    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }

    /// Whether no identifiers are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, id: &str) -> u64 {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    async fn try_acquire(&self, id: &str, limit: u64) -> Result<bool, StoreError> {
        let mut counts = self.counts.lock();
        let count = counts.get(id).copied().unwrap_or(0);
        if count >= limit {
            return Ok(false);
        }
        counts.insert(id.to_string(), count + 1);
        Ok(true)
    }

    async fn increase(&self, id: &str) -> Result<(), StoreError> {
        let mut counts = self.counts.lock();
        *counts.entry(id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn decrease(&self, id: &str) -> Result<(), StoreError> {
        let mut counts = self.counts.lock();
        match counts.get_mut(id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(id);
                debug!(id, "removed last entry");
            }
            None => {}
        }
        Ok(())
    }

    async fn free(&self, id: &str) -> Result<(), StoreError> {
        self.counts.lock().remove(id);
        Ok(())
    }

    async fn free_all(&self) -> Result<(), StoreError> {
        let mut counts = self.counts.lock();
        let freed = counts.len();
        *counts = HashMap::new();
        debug!(freed, "freed all entries");
        Ok(())
    }
}
