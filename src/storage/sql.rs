// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL document adapter.
//!
//! One row per record, payload kept as JSON text:
//! ```sql
//! CREATE TABLE records (
//!   id VARCHAR(255) PRIMARY KEY,  -- JSON-encoded key ("\"tenant-1\"", "42")
//!   version BIGINT NOT NULL,
//!   updated_at BIGINT NOT NULL,   -- epoch millis
//!   payload LONGTEXT NOT NULL     -- JSON
//! )
//! ```
//!
//! The key column holds the key's JSON encoding so any serde key type
//! round-trips without a custom column mapping.
//!
//! ## sqlx Any Driver Quirks
//!
//! TEXT is used instead of native JSON because the `Any` driver has no JSON
//! mapping for MySQL, and MySQL LONGTEXT comes back as bytes. Placeholders are
//! `?`, so SQLite and MySQL are supported.

use std::marker::PhantomData;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use crate::record::{Payload, Record, RecordKey};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{Predicate, QueryableStore, StoreAdapter, StoreError};

/// Default table name.
pub const DEFAULT_TABLE: &str = "records";

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlDocumentStore<K, P> {
    pool: AnyPool,
    table: String,
    is_sqlite: bool,
    _marker: PhantomData<fn() -> (K, P)>,
}

impl<K: RecordKey, P: Payload> SqlDocumentStore<K, P> {
    /// Connect using the default table.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_table(connection_string, DEFAULT_TABLE).await
    }

    /// Connect and create `table` if missing. Connection and schema setup use
    /// startup-mode retry, so a bad URL fails within a few seconds.
    pub async fn with_table(connection_string: &str, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        let store = Self {
            pool,
            table: table.to_string(),
            is_sqlite,
            _marker: PhantomData,
        };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;

        tracing::info!(table, sqlite = is_sqlite, "Connected SQL document store");
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn enable_wal_mode(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let sql = if self.is_sqlite {
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    version INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    payload TEXT NOT NULL
                )",
                self.table
            )
        } else {
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id VARCHAR(255) PRIMARY KEY,
                    version BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    payload LONGTEXT NOT NULL,
                    INDEX idx_updated_at (updated_at)
                )",
                self.table
            )
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    fn encode_key(id: &K) -> Result<String, StoreError> {
        Ok(serde_json::to_string(id)?)
    }

    /// Read a TEXT column: String on SQLite, bytes on MySQL LONGTEXT.
    fn text_column(row: &AnyRow, column: &str) -> Result<String, StoreError> {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .ok_or_else(|| StoreError::Serialization(format!("column '{}' is not text", column)))
    }

    fn decode_row(row: &AnyRow) -> Result<Record<K, P>, StoreError> {
        let id: K = serde_json::from_str(&Self::text_column(row, "id")?)?;
        let version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let updated_at: i64 = row
            .try_get("updated_at")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let payload: P = serde_json::from_str(&Self::text_column(row, "payload")?)?;

        Ok(Record::reconstruct(id, version.max(0) as u64, updated_at, payload))
    }

    async fn upsert(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        let id = Self::encode_key(&record.id)?;
        let version = i64::try_from(record.version)
            .map_err(|_| {
                StoreError::Serialization(format!("version {} exceeds BIGINT", record.version))
            })?;
        let payload = serde_json::to_string(&record.payload)?;

        let sql = if self.is_sqlite {
            format!(
                "INSERT INTO {} (id, version, updated_at, payload) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    version = excluded.version,
                    updated_at = excluded.updated_at,
                    payload = excluded.payload",
                self.table
            )
        } else {
            format!(
                "INSERT INTO {} (id, version, updated_at, payload) VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    version = VALUES(version),
                    updated_at = VALUES(updated_at),
                    payload = VALUES(payload)",
                self.table
            )
        };

        retry("sql_upsert", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(&id)
                .bind(version)
                .bind(record.updated_at)
                .bind(&payload)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && table.len() <= 64
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("Invalid table name: {:?}", table)))
    }
}

#[async_trait]
impl<K: RecordKey, P: Payload> StoreAdapter<K, P> for SqlDocumentStore<K, P> {
    fn backend(&self) -> &'static str {
        "sql"
    }

    async fn add(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.upsert(record).await
    }

    async fn update(&self, record: &Record<K, P>) -> Result<(), StoreError> {
        self.upsert(record).await
    }

    async fn delete(&self, id: &K) -> Result<(), StoreError> {
        let id = Self::encode_key(id)?;
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);

        retry("sql_delete", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    async fn get(&self, id: &K) -> Result<Option<Record<K, P>>, StoreError> {
        let id = Self::encode_key(id)?;
        let sql = format!(
            "SELECT id, version, updated_at, payload FROM {} WHERE id = ?",
            self.table
        );

        let row = retry("sql_get", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn exists(&self, id: &K) -> Result<bool, StoreError> {
        let id = Self::encode_key(id)?;
        let sql = format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", self.table);

        retry("sql_exists", &RetryConfig::query(), || async {
            let row = sqlx::query(&sql)
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(row.is_some())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl<K: RecordKey, P: Payload> QueryableStore<K, P> for SqlDocumentStore<K, P> {
    /// Loads every row and filters in process; predicates are opaque closures.
    async fn browse(
        &self,
        predicate: Predicate<'_, K, P>,
    ) -> Result<Vec<Record<K, P>>, StoreError> {
        let sql = format!(
            "SELECT id, version, updated_at, payload FROM {} ORDER BY updated_at",
            self.table
        );

        let rows = retry("sql_browse", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        let mut matches = Vec::new();
        for row in &rows {
            let record = Self::decode_row(row)?;
            if predicate(&record) {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", self.table);

        let row = retry("sql_count", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        let n: i64 = row
            .try_get("n")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(n.max(0) as u64)
    }
}
