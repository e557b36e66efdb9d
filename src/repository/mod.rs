// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composite repository coordinator.
//!
//! The [`CompositeRepository`] ties the three store roles together:
//! - **Primary**: durable system of record, written synchronously, authoritative
//! - **Cache**: low-latency key/value store, best-effort
//! - **Secondary**: queryable read replica, best-effort
//!
//! # Write path
//!
//! ```text
//! add/update/delete ──► Primary ──(error)──► caller
//!                          │ ok
//!                          ▼
//!                  Cache ─► Secondary      (timed, counted, errors logged)
//! ```
//!
//! # Read path
//!
//! ```text
//! get/exists ──► Cache ──miss/err──► Secondary ──miss/err──► Primary (final)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use composite_repo::{CompositeRepository, InMemoryStore, Record};
//! use serde_json::{json, Value};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), composite_repo::StoreError> {
//! let primary = Arc::new(InMemoryStore::<u64, Value>::new());
//! let cache = Arc::new(InMemoryStore::<u64, Value>::new());
//! let repo = CompositeRepository::<u64, Value>::builder(primary)
//!     .cache(cache.clone())
//!     .build();
//!
//! let token = CancellationToken::new();
//! repo.add(&Record::new(42, json!({"name": "A"})), &token).await?;
//!
//! assert_eq!(cache.len(), 1);
//! assert!(repo.exists(&42, &token).await?);
//! assert_eq!(repo.sync_status().total_synced, 1);
//! # Ok(())
//! # }
//! ```

mod types;
mod propagation;
mod read;
mod write;

pub use types::{HealthCheck, StoreRole};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CompositeConfig, PropagationMode};
use crate::record::{Payload, RecordKey};
use crate::resilience::guard;
use crate::storage::redis::RedisCacheStore;
use crate::storage::sql::SqlDocumentStore;
use crate::storage::traits::{QueryableStore, StoreAdapter};
use crate::sync_health::{SyncHealthTracker, SyncStatus};

use propagation::{Fanout, Propagator, Replica};

/// Multi-store repository: synchronous primary, best-effort cache and
/// secondary, ordered read fallback.
///
/// # Thread Safety
///
/// `Send + Sync`; share it behind an `Arc`. The only shared mutable state is
/// the [`SyncHealthTracker`] and, in background mode, the propagation queue.
pub struct CompositeRepository<K: RecordKey, P: Payload> {
    pub(super) primary: Arc<dyn QueryableStore<K, P>>,
    pub(super) health: Arc<SyncHealthTracker>,
    pub(super) propagator: Propagator<K, P>,
    pub(super) config: CompositeConfig,
}

/// Builder for [`CompositeRepository`].
pub struct CompositeRepositoryBuilder<K: RecordKey, P: Payload> {
    primary: Arc<dyn QueryableStore<K, P>>,
    cache: Option<Arc<dyn StoreAdapter<K, P>>>,
    secondary: Option<Arc<dyn StoreAdapter<K, P>>>,
    health: Option<Arc<SyncHealthTracker>>,
    config: CompositeConfig,
}

impl<K: RecordKey, P: Payload> CompositeRepositoryBuilder<K, P> {
    /// Low-latency key/value store tried first on reads.
    #[must_use]
    pub fn cache(mut self, store: Arc<dyn StoreAdapter<K, P>>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Read replica tried after the cache.
    #[must_use]
    pub fn secondary(mut self, store: Arc<dyn StoreAdapter<K, P>>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// Share a tracker across repositories (one per process is typical).
    #[must_use]
    pub fn health(mut self, tracker: Arc<SyncHealthTracker>) -> Self {
        self.health = Some(tracker);
        self
    }

    #[must_use]
    pub fn config(mut self, config: CompositeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the repository.
    ///
    /// In [`PropagationMode::Background`] this spawns the propagation worker
    /// on the current tokio runtime; outside a runtime it falls back to
    /// inline propagation.
    pub fn build(self) -> CompositeRepository<K, P> {
        let health = self
            .health
            .unwrap_or_else(|| {
                Arc::new(SyncHealthTracker::with_thresholds(self.config.health_thresholds()))
            });

        let replicas: Vec<Replica<K, P>> = [
            (StoreRole::Cache, self.cache),
            (StoreRole::Secondary, self.secondary),
        ]
        .into_iter()
        .filter_map(|(role, store)| store.map(|store| Replica { role, store }))
        .collect();

        let fanout = Fanout::new(replicas, health.clone(), self.config.replica_timeout());
        let propagator = match self.config.propagation_mode {
            PropagationMode::Inline => Propagator::inline(fanout),
            PropagationMode::Background => {
                Propagator::background(fanout, self.config.propagation_queue_depth)
            }
        };

        info!(
            primary = self.primary.backend(),
            replicas = propagator.fanout().replicas().len(),
            background = propagator.is_background(),
            "Composite repository ready"
        );

        CompositeRepository {
            primary: self.primary,
            health,
            propagator,
            config: self.config,
        }
    }
}

impl<K: RecordKey, P: Payload> CompositeRepository<K, P> {
    /// Start building a repository around `primary`.
    pub fn builder(primary: Arc<dyn QueryableStore<K, P>>) -> CompositeRepositoryBuilder<K, P> {
        CompositeRepositoryBuilder {
            primary,
            cache: None,
            secondary: None,
            health: None,
            config: CompositeConfig::default(),
        }
    }

    /// Build a repository whose cache and secondary come from `config`.
    ///
    /// `redis_url` yields a [`RedisCacheStore`], `sql_url` a
    /// [`SqlDocumentStore`]. A replica that cannot be reached at startup is
    /// logged and left out; only the primary is required.
    pub async fn connect(
        primary: Arc<dyn QueryableStore<K, P>>,
        config: CompositeConfig,
    ) -> CompositeRepository<K, P> {
        let mut builder = Self::builder(primary);

        if let Some(ref url) = config.redis_url {
            match RedisCacheStore::<K, P>::with_prefix(url, &config.redis_key_prefix).await {
                Ok(store) => builder = builder.cache(Arc::new(store.with_ttl(config.redis_ttl()))),
                Err(e) => warn!(error = %e, "Cache unavailable at startup, continuing without it"),
            }
        }

        if let Some(ref url) = config.sql_url {
            match SqlDocumentStore::<K, P>::with_table(url, &config.sql_table).await {
                Ok(store) => builder = builder.secondary(Arc::new(store)),
                Err(e) => {
                    warn!(error = %e, "Secondary unavailable at startup, continuing without it")
                }
            }
        }

        builder.config(config).build()
    }

    /// Propagation health snapshot.
    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.health.status()
    }

    /// The shared health tracker.
    #[must_use]
    pub fn health_tracker(&self) -> &Arc<SyncHealthTracker> {
        &self.health
    }

    #[must_use]
    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    /// Roles configured, in read order (primary last).
    #[must_use]
    pub fn roles(&self) -> Vec<StoreRole> {
        self.propagator
            .fanout()
            .replicas()
            .iter()
            .map(|r| r.role)
            .chain(std::iter::once(StoreRole::Primary))
            .collect()
    }

    /// Ping every configured store and report connectivity with sync health.
    ///
    /// Each probe is bounded by the replica timeout.
    pub async fn health_check(&self, token: &CancellationToken) -> HealthCheck {
        let timeout = self.config.replica_timeout();

        let primary_connected = match guard(token, timeout, self.primary.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(role = %StoreRole::Primary, error = %e, "Health probe failed");
                false
            }
        };
        crate::metrics::set_store_reachable(StoreRole::Primary.as_str(), primary_connected);

        let mut cache_connected = None;
        let mut secondary_connected = None;
        for replica in self.propagator.fanout().replicas() {
            let reachable = match guard(token, timeout, replica.store.ping()).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        role = %replica.role,
                        backend = replica.store.backend(),
                        error = %e,
                        "Health probe failed"
                    );
                    false
                }
            };
            crate::metrics::set_store_reachable(replica.role.as_str(), reachable);
            match replica.role {
                StoreRole::Cache => cache_connected = Some(reachable),
                StoreRole::Secondary => secondary_connected = Some(reachable),
                StoreRole::Primary => {}
            }
        }

        HealthCheck {
            primary_connected,
            cache_connected,
            secondary_connected,
            sync: self.sync_status(),
        }
    }

    /// Drain queued background propagation and stop the worker.
    ///
    /// Safe to call in inline mode (no-op) and more than once. Writes made
    /// after shutdown still propagate, inline.
    pub async fn shutdown(&self) {
        self.propagator.shutdown().await;
        info!("Composite repository shut down");
    }
}
