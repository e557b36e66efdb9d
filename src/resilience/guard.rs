// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cancellation and timeout guard for a single adapter call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::storage::traits::StoreError;

/// Await `fut` unless `token` fires or `timeout` elapses first.
///
/// A fired token yields [`StoreError::Cancelled`], an elapsed timeout
/// [`StoreError::Timeout`]. The losing future is dropped, which is how
/// adapters observe cancellation.
pub async fn guard<T, F>(
    token: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if token.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = bounded => result,
    }
}
