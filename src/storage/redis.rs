// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis cache adapter.
//!
//! Each record is stored as a plain Redis STRING holding the record's JSON:
//! ```json
//! {"id": 42, "version": 3, "updated_at": 1767084657058, "payload": {"name": "A"}}
//! ```
//!
//! Keys are namespaced with a per-aggregate prefix (`"tenant:" + id`), and
//! every write refreshes a TTL so an abandoned propagation ages out instead
//! of lingering forever. `add` and `update` are the same `SET`, which keeps
//! a retried propagation idempotent.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::record::{Payload, Record, RecordKey};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{StoreAdapter, StoreError};

/// Default time-to-live for cached records.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

pub struct RedisCacheStore<K, P> {
    connection: ConnectionManager,
    /// Key prefix for namespacing (e.g., "tenant:" → "tenant:42")
    prefix: String,
    /// `None` stores without expiry
    ttl: Option<Duration>,
    op_retry: RetryConfig,
    _marker: PhantomData<fn() -> (K, P)>,
}

impl<K: RecordKey, P: Payload> RedisCacheStore<K, P> {
    /// Connect with the default TTL and no key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_prefix(connection_string, "").await
    }

    /// Connect with a key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use composite_repo::storage::redis::RedisCacheStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be "tenant:1", "tenant:2", ...
    /// let store: RedisCacheStore<u64, serde_json::Value> =
    ///     RedisCacheStore::with_prefix("redis://localhost", "tenant:").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(connection_string)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        tracing::info!(prefix, "Connected Redis cache store");

        Ok(Self::from_connection(connection, prefix))
    }

    /// Wrap an existing connection (shared with other components).
    pub fn from_connection(connection: ConnectionManager, prefix: &str) -> Self {
        Self {
            connection,
            prefix: prefix.to_string(),
            ttl: Some(DEFAULT_TTL),
            op_retry: RetryConfig::none(),
            _marker: PhantomData,
        }
    }

    /// Set the TTL applied on every write. `None` or zero disables expiry.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|d| !d.is_zero());
        self
    }

    /// Retry policy for individual commands (default: single attempt).
    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.op_retry = config;
        self
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    fn prefixed_key(&self, id: &K) -> String {
        format!("{}{}", self.prefix, id)
    }

    async fn write_record(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        let key = self.prefixed_key(&record.id);
        let json = serde_json::to_string(record)?;
        // SETEX takes whole seconds; round sub-second TTLs up so they still expire.
        let ttl_secs = self.ttl.map(|d| d.as_secs().max(1));

        retry("redis_set", &self.op_retry, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            let json = json.clone();
            async move {
                match ttl_secs {
                    Some(secs) => conn.set_ex::<_, _, ()>(&key, &json, secs).await,
                    None => conn.set::<_, _, ()>(&key, &json).await,
                }
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl<K: RecordKey, P: Payload> StoreAdapter<K, P> for RedisCacheStore<K, P> {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn add(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.write_record(record).await
    }

    async fn update(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.write_record(record).await
    }

    async fn delete(&self, id: &K) -> Result<(), StoreError> {
        let key = self.prefixed_key(id);

        retry("redis_delete", &self.op_retry, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { conn.del::<_, ()>(&key).await }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    async fn get(&self, id: &K) -> Result<Option<Record<K, P>>, StoreError> {
        let key = self.prefixed_key(id);

        let json: Option<String> = retry("redis_get", &self.op_retry, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { conn.get::<_, Option<String>>(&key).await }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))?;

        json.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn exists(&self, id: &K) -> Result<bool, StoreError> {
        let key = self.prefixed_key(id);

        retry("redis_exists", &self.op_retry, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { conn.exists::<_, bool>(&key).await }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Backend(e.to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
