//! # Composite Repository
//!
//! A repository that spreads each entity across three stores with different
//! roles, keeping one authoritative and the others advisory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CompositeRepository                      │
//! │  • add/update/delete/get/exists/browse/count               │
//! │  • Every call raced against a CancellationToken            │
//! └─────────────────────────────────────────────────────────────┘
//!          │ writes (sync)          ▲ reads (final fallback)
//!          ▼                        │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Primary (authoritative)                  │
//! │  • System of record, errors surface to the caller          │
//! │  • Serves browse and count                                 │
//! └─────────────────────────────────────────────────────────────┘
//!          │ propagation (best-effort, inline or background)
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Cache (Redis, advisory)                    │
//! │  • Prefixed JSON values with TTL                           │
//! │  • First stop on get/exists                                │
//! └─────────────────────────────────────────────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Secondary (SQL replica, advisory)             │
//! │  • JSON document table on SQLite or MySQL                  │
//! │  • Second stop on get/exists                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every propagation attempt feeds the [`SyncHealthTracker`], which reports
//! whether replicas are keeping up (failure rate and rolling latency).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use composite_repo::{CompositeConfig, CompositeRepository, InMemoryStore, Record};
//! use serde_json::{json, Value};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), composite_repo::StoreError> {
//!     let config = CompositeConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         sql_url: Some("sqlite://replica.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!
//!     let primary = Arc::new(InMemoryStore::<u64, Value>::new());
//!     let repo = CompositeRepository::<u64, Value>::connect(primary, config).await;
//!     let token = CancellationToken::new();
//!
//!     repo.add(&Record::new(42, json!({"name": "A"})), &token).await?;
//!
//!     // Cache → Secondary → Primary
//!     if let Some(record) = repo.get(&42, &token).await? {
//!         println!("Found: {:?}", record.payload);
//!     }
//!
//!     println!("{:?}", repo.sync_status());
//!     repo.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`repository`]: The [`CompositeRepository`] and its builder
//! - [`storage`]: Store adapters (Redis, SQL, Memory) and their traits
//! - [`sync_health`]: Propagation health tracking
//! - [`resilience`]: Retry and cancellation/timeout guard
//! - [`config`]: Serde-deserializable configuration
//! - [`metrics`]: `metrics` crate instrumentation

pub mod config;
pub mod record;
pub mod storage;
pub mod sync_health;
pub mod repository;
pub mod resilience;
pub mod metrics;

pub use config::{CompositeConfig, PropagationMode};
pub use record::{Payload, Record, RecordKey};
pub use storage::memory::InMemoryStore;
pub use storage::redis::RedisCacheStore;
pub use storage::sql::SqlDocumentStore;
pub use storage::traits::{Predicate, QueryableStore, StoreAdapter, StoreError};
pub use sync_health::{HealthThresholds, SyncHealthTracker, SyncStatus};
pub use repository::{CompositeRepository, CompositeRepositoryBuilder, HealthCheck, StoreRole};
pub use resilience::RetryConfig;
pub use metrics::LatencyTimer;
pub use tokio_util::sync::CancellationToken;
