//! Read path: ordered fallback across the configured stores.
//!
//! `get` and `exists` walk the replicas in role order (cache, then
//! secondary). A hit returns immediately; a miss or a failed replica moves
//! on. The primary is always last and its answer, error included, is final.
//! `browse` and `count` go straight to the primary.

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::LatencyTimer;
use crate::record::{Payload, Record, RecordKey};
use crate::resilience::guard;
use crate::storage::traits::{Predicate, StoreAdapter, StoreError};

use super::types::StoreRole;
use super::CompositeRepository;

impl<K: RecordKey, P: Payload> CompositeRepository<K, P> {
    /// Fetch a record, trying cache → secondary → primary.
    ///
    /// Replica errors are logged and skipped. `Ok(None)` means the primary
    /// does not hold the record. If `token` fires mid-chain the read stops
    /// with [`StoreError::Cancelled`].
    #[tracing::instrument(skip_all, fields(id = %id, tier = tracing::field::Empty))]
    pub async fn get(
        &self,
        id: &K,
        token: &CancellationToken,
    ) -> Result<Option<Record<K, P>>, StoreError> {
        let _timer = LatencyTimer::new("get");
        self.read_through("get", token, Option::is_some, |store| {
            let id = id.clone();
            async move { store.get(&id).await }.boxed()
        })
        .await
    }

    /// Existence check with the same fallback order as [`get`](Self::get).
    #[tracing::instrument(skip_all, fields(id = %id, tier = tracing::field::Empty))]
    pub async fn exists(&self, id: &K, token: &CancellationToken) -> Result<bool, StoreError> {
        let _timer = LatencyTimer::new("exists");
        self.read_through("exists", token, |found: &bool| *found, |store| {
            let id = id.clone();
            async move { store.exists(&id).await }.boxed()
        })
        .await
    }

    /// All primary records matching `predicate`.
    pub async fn browse(
        &self,
        predicate: Predicate<'_, K, P>,
        token: &CancellationToken,
    ) -> Result<Vec<Record<K, P>>, StoreError> {
        let _timer = LatencyTimer::new("browse");
        let records = self.query_primary("browse", token, self.primary.browse(predicate)).await?;
        debug!(matched = records.len(), "Browse served by primary");
        Ok(records)
    }

    /// Number of records held by the primary.
    pub async fn count(&self, token: &CancellationToken) -> Result<u64, StoreError> {
        let _timer = LatencyTimer::new("count");
        self.query_primary("count", token, self.primary.count()).await
    }

    async fn read_through<T, F>(
        &self,
        operation: &'static str,
        token: &CancellationToken,
        is_hit: fn(&T) -> bool,
        read: F,
    ) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'s> Fn(&'s dyn StoreAdapter<K, P>) -> BoxFuture<'s, Result<T, StoreError>>
            + Send
            + Sync,
    {
        let replicas = self.propagator.fanout().replicas();
        for (i, replica) in replicas.iter().enumerate() {
            let next = replicas.get(i + 1).map_or(StoreRole::Primary, |r| r.role);
            match guard(token, self.config.replica_timeout(), read(replica.store.as_ref())).await {
                Ok(value) if is_hit(&value) => {
                    tracing::Span::current().record("tier", replica.role.as_str());
                    debug!(role = %replica.role, backend = replica.store.backend(), "Read hit");
                    crate::metrics::record_read(replica.role.as_str(), operation, "hit");
                    return Ok(value);
                }
                Ok(_) => {
                    crate::metrics::record_read(replica.role.as_str(), operation, "miss");
                }
                Err(_) if token.is_cancelled() => return Err(StoreError::Cancelled),
                Err(e) => {
                    crate::metrics::record_read(replica.role.as_str(), operation, "error");
                    warn!(
                        role = %replica.role,
                        backend = replica.store.backend(),
                        error = %e,
                        "{} read failed, trying {}", replica.role, next
                    );
                }
            }
        }

        tracing::Span::current().record("tier", StoreRole::Primary.as_str());
        let primary: &dyn StoreAdapter<K, P> = self.primary.as_ref();
        let value = self.query_primary(operation, token, read(primary)).await?;
        let outcome = if is_hit(&value) { "hit" } else { "miss" };
        crate::metrics::record_read(StoreRole::Primary.as_str(), operation, outcome);
        Ok(value)
    }

    async fn query_primary<T, Fut>(
        &self,
        operation: &'static str,
        token: &CancellationToken,
        fut: Fut,
    ) -> Result<T, StoreError>
    where
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        guard(token, None, fut).await.map_err(|e| {
            crate::metrics::record_primary_error(operation);
            warn!(operation, backend = self.primary.backend(), error = %e, "Primary read failed");
            e
        })
    }
}
