// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Best-effort fan-out of committed writes to the cache and secondary.
//!
//! A [`Fanout`] replays one [`WriteOp`] against each replica in order
//! (cache before secondary), timing every attempt and reporting it to the
//! [`SyncHealthTracker`]. Failures are logged and counted, never returned.
//!
//! The [`Propagator`] decides when that happens: inline before the write
//! call returns, or on a single background worker fed by a bounded queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::record::{Payload, RecordKey};
use crate::resilience::guard;
use crate::storage::traits::{StoreAdapter, StoreError};
use crate::sync_health::SyncHealthTracker;

use super::types::{StoreRole, WriteOp};

/// An advisory store and the role it plays.
pub(crate) struct Replica<K: RecordKey, P: Payload> {
    pub(crate) role: StoreRole,
    pub(crate) store: Arc<dyn StoreAdapter<K, P>>,
}

impl<K: RecordKey, P: Payload> Clone for Replica<K, P> {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            store: self.store.clone(),
        }
    }
}

pub(crate) struct Fanout<K: RecordKey, P: Payload> {
    replicas: Vec<Replica<K, P>>,
    health: Arc<SyncHealthTracker>,
    timeout: Option<Duration>,
}

impl<K: RecordKey, P: Payload> Fanout<K, P> {
    pub(crate) fn new(
        replicas: Vec<Replica<K, P>>,
        health: Arc<SyncHealthTracker>,
        timeout: Option<Duration>,
    ) -> Self {
        debug_assert!(
            replicas.iter().all(|r| r.role.is_advisory()),
            "primary cannot be propagated to"
        );
        Self { replicas, health, timeout }
    }

    /// Apply `op` to every replica in order. Never fails.
    pub(crate) async fn run(&self, op: &WriteOp<K, P>, token: &CancellationToken) {
        for replica in &self.replicas {
            let start = Instant::now();
            let result = guard(token, self.timeout, apply(replica.store.as_ref(), op)).await;
            let elapsed = start.elapsed();

            let success = result.is_ok();
            self.health.record_attempt(elapsed, success);
            crate::metrics::record_propagation(replica.role.as_str(), op.name(), success);
            crate::metrics::record_propagation_latency(replica.role.as_str(), op.name(), elapsed);

            match result {
                Ok(()) => debug!(
                    role = %replica.role,
                    backend = replica.store.backend(),
                    operation = op.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Propagated write"
                ),
                Err(e) => warn!(
                    role = %replica.role,
                    backend = replica.store.backend(),
                    operation = op.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Propagation failed, continuing"
                ),
            }
        }
    }

    /// Count a propagation that will never run as one failure per replica.
    pub(crate) fn abandon(&self, op: &WriteOp<K, P>, reason: &str) {
        for replica in &self.replicas {
            self.health.record_attempt(Duration::ZERO, false);
            crate::metrics::record_propagation(replica.role.as_str(), op.name(), false);
        }
        crate::metrics::record_propagation_dropped(op.name());
        warn!(operation = op.name(), reason, "Propagation abandoned");
    }

    pub(crate) fn replicas(&self) -> &[Replica<K, P>] {
        &self.replicas
    }
}

async fn apply<K: RecordKey, P: Payload>(
    store: &dyn StoreAdapter<K, P>,
    op: &WriteOp<K, P>,
) -> Result<(), StoreError> {
    match op {
        WriteOp::Add(record) => store.add(record).await,
        WriteOp::Update(record) => store.update(record).await,
        WriteOp::Delete(id) => store.delete(id).await,
    }
}

pub(crate) struct Job<K, P> {
    op: WriteOp<K, P>,
    token: CancellationToken,
}

/// Schedules fan-outs.
pub(crate) enum Propagator<K: RecordKey, P: Payload> {
    Inline(Arc<Fanout<K, P>>),
    Background {
        fanout: Arc<Fanout<K, P>>,
        /// Taken on shutdown; later writes propagate inline.
        tx: Mutex<Option<mpsc::Sender<Job<K, P>>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    },
}

impl<K: RecordKey, P: Payload> Propagator<K, P> {
    pub(crate) fn inline(fanout: Fanout<K, P>) -> Self {
        Self::Inline(Arc::new(fanout))
    }

    /// Spawn the background worker. Falls back to inline propagation when
    /// called outside a tokio runtime.
    pub(crate) fn background(fanout: Fanout<K, P>, queue_depth: usize) -> Self {
        let fanout = Arc::new(fanout);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime for background propagation, using inline mode");
            return Self::Inline(fanout);
        };

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = handle.spawn(run_worker(fanout.clone(), rx));

        Self::Background {
            fanout,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn fanout(&self) -> &Fanout<K, P> {
        match self {
            Self::Inline(fanout) => fanout,
            Self::Background { fanout, .. } => fanout,
        }
    }

    pub(crate) fn is_background(&self) -> bool {
        matches!(self, Self::Background { .. })
    }

    /// Propagate `op` now or enqueue it.
    pub(crate) async fn submit(&self, op: WriteOp<K, P>, token: &CancellationToken) {
        if self.fanout().replicas().is_empty() {
            return;
        }

        match self {
            Self::Inline(fanout) => fanout.run(&op, token).await,
            Self::Background { fanout, tx, .. } => {
                let job = Job { op, token: token.clone() };
                match enqueue(tx, job) {
                    Ok(()) => {}
                    Err(Rejected::Full(job)) => fanout.abandon(&job.op, "queue full"),
                    Err(Rejected::Closed(job)) => fanout.abandon(&job.op, "worker stopped"),
                    // After shutdown replicas are still kept fresh, on the caller's task.
                    Err(Rejected::ShutDown(job)) => fanout.run(&job.op, token).await,
                }
            }
        }
    }

    /// Stop accepting background work and wait for queued fan-outs to finish.
    pub(crate) async fn shutdown(&self) {
        if let Self::Background { tx, worker, .. } = self {
            drop(tx.lock().take());
            let handle = worker.lock().take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Propagation worker ended abnormally");
                }
            }
        }
    }
}

pub(crate) enum Rejected<K, P> {
    Full(Job<K, P>),
    Closed(Job<K, P>),
    ShutDown(Job<K, P>),
}

fn enqueue<K, P>(
    tx: &Mutex<Option<mpsc::Sender<Job<K, P>>>>,
    job: Job<K, P>,
) -> Result<(), Rejected<K, P>> {
    let slot = tx.lock();
    let Some(sender) = slot.as_ref() else {
        return Err(Rejected::ShutDown(job));
    };

    let result = sender.try_send(job).map_err(|e| match e {
        TrySendError::Full(job) => Rejected::Full(job),
        TrySendError::Closed(job) => Rejected::Closed(job),
    });
    crate::metrics::set_propagation_queue_depth(sender.max_capacity() - sender.capacity());
    result
}

async fn run_worker<K: RecordKey, P: Payload>(
    fanout: Arc<Fanout<K, P>>,
    mut rx: mpsc::Receiver<Job<K, P>>,
) {
    info!(replicas = fanout.replicas().len(), "Propagation worker started");
    while let Some(job) = rx.recv().await {
        fanout.run(&job.op, &job.token).await;
        crate::metrics::set_propagation_queue_depth(rx.len());
    }
    info!("Propagation worker stopped");
}
