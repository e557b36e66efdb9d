use async_trait::async_trait;
use dashmap::DashMap;

use crate::record::{Payload, Record, RecordKey};
use super::traits::{Predicate, QueryableStore, StoreAdapter, StoreError};

/// In-process store backed by a `DashMap`.
///
/// Implements both [`StoreAdapter`] and [`QueryableStore`], so it can serve
/// any role, including primary for embedded use and tests.
pub struct InMemoryStore<K: RecordKey, P: Payload> {
    data: DashMap<K, Record<K, P>>,
}

impl<K: RecordKey, P: Payload> InMemoryStore<K, P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.clear();
    }

    fn upsert(&self, record: &Record<K, P>) {
        self.data.insert(record.id.clone(), record.clone());
    }
}

impl<K: RecordKey, P: Payload> Default for InMemoryStore<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: RecordKey, P: Payload> StoreAdapter<K, P> for InMemoryStore<K, P> {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.upsert(record);
        Ok(())
    }

    async fn update(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.upsert(record);
        Ok(())
    }

    async fn delete(&self, id: &K) -> Result<(), StoreError> {
        self.data.remove(id);
        Ok(())
    }

    async fn get(&self, id: &K) -> Result<Option<Record<K, P>>, StoreError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn exists(&self, id: &K) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(id))
    }
}

#[async_trait]
impl<K: RecordKey, P: Payload> QueryableStore<K, P> for InMemoryStore<K, P> {
    async fn browse(
        &self,
        predicate: Predicate<'_, K, P>,
    ) -> Result<Vec<Record<K, P>>, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.data.len() as u64)
    }
}
