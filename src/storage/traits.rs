use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{Payload, Record, RecordKey};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Predicate passed to [`QueryableStore::browse`].
pub type Predicate<'a, K, P> = &'a (dyn Fn(&Record<K, P>) -> bool + Send + Sync);

/// Uniform CRUD capability exposed by every backing store.
///
/// Operations are idempotent per key: `add` on an existing key overwrites,
/// `delete` on a missing key succeeds. Adapters never fall back to another
/// store; that is the repository's job.
#[async_trait]
pub trait StoreAdapter<K: RecordKey, P: Payload>: Send + Sync {
    /// Short backend name used in logs (e.g. "redis").
    fn backend(&self) -> &'static str;

    async fn add(&self, record: &Record<K, P>) -> Result<(), StoreError>;
    async fn update(&self, record: &Record<K, P>) -> Result<(), StoreError>;
    async fn delete(&self, id: &K) -> Result<(), StoreError>;
    async fn get(&self, id: &K) -> Result<Option<Record<K, P>>, StoreError>;
    async fn exists(&self, id: &K) -> Result<bool, StoreError>;

    /// Connectivity probe. Default assumes an in-process store.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A store with a query engine rich enough for arbitrary predicates.
///
/// Only the primary is required to implement this.
#[async_trait]
pub trait QueryableStore<K: RecordKey, P: Payload>: StoreAdapter<K, P> {
    async fn browse(
        &self,
        predicate: Predicate<'_, K, P>,
    ) -> Result<Vec<Record<K, P>>, StoreError>;

    /// Count all records. Default implementation browses everything.
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.browse(&|_| true).await?.len() as u64)
    }
}
