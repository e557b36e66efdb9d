//! Write path: primary first, then best-effort propagation.
//!
//! The primary's result is the caller's result. Only after it commits is the
//! same operation handed to the propagator; replica failures never reach the
//! caller. Versioning is not checked here, writes are last-writer-wins.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::LatencyTimer;
use crate::record::{Payload, Record, RecordKey};
use crate::resilience::guard;
use crate::storage::traits::StoreError;

use super::types::WriteOp;
use super::CompositeRepository;

impl<K: RecordKey, P: Payload> CompositeRepository<K, P> {
    /// Insert a record.
    ///
    /// Fails only if the primary fails (or `token` fires before it commits),
    /// in which case no replica is touched.
    #[tracing::instrument(skip_all, fields(id = %record.id, version = record.version))]
    pub async fn add(
        &self,
        record: &Record<K, P>,
        token: &CancellationToken,
    ) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("add");
        self.commit("add", token, self.primary.add(record)).await?;
        self.propagator.submit(WriteOp::Add(record.clone()), token).await;
        Ok(())
    }

    /// Replace a record. Same failure semantics as [`add`](Self::add).
    #[tracing::instrument(skip_all, fields(id = %record.id, version = record.version))]
    pub async fn update(
        &self,
        record: &Record<K, P>,
        token: &CancellationToken,
    ) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("update");
        self.commit("update", token, self.primary.update(record)).await?;
        self.propagator.submit(WriteOp::Update(record.clone()), token).await;
        Ok(())
    }

    /// Remove a record. Deleting a missing key succeeds.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn delete(&self, id: &K, token: &CancellationToken) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("delete");
        self.commit("delete", token, self.primary.delete(id)).await?;
        self.propagator.submit(WriteOp::Delete(id.clone()), token).await;
        Ok(())
    }

    async fn commit<F>(
        &self,
        operation: &'static str,
        token: &CancellationToken,
        fut: F,
    ) -> Result<(), StoreError>
    where
        F: std::future::Future<Output = Result<(), StoreError>>,
    {
        match guard(token, None, fut).await {
            Ok(()) => {
                debug!(operation, backend = self.primary.backend(), "Primary committed");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_primary_error(operation);
                warn!(
                    operation,
                    backend = self.primary.backend(),
                    error = %e,
                    "Primary write failed"
                );
                Err(e)
            }
        }
    }
}
