//! Chaos Testing for the Composite Repository
//!
//! Failure scenarios driven by in-process wrappers:
//! 1. **FailingStore** - per-operation error injection on any role
//! 2. **Call counters** - prove which stores a read or write touched
//! 3. **Slow stores** - latency injection for timeouts and cancellation
//! 4. **Self-cancelling stores** - adapters reporting `Cancelled` on their own
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use composite_repo::{
    CancellationToken, CompositeConfig, CompositeRepository, InMemoryStore, PropagationMode,
    Predicate, QueryableStore, Record, StoreAdapter, StoreError, SyncHealthTracker,
};

type Rec = Record<u64, Value>;

// =============================================================================
// Failing Store Wrapper - Per-Operation Error Injection
// =============================================================================

#[derive(Default)]
struct Calls {
    add: AtomicU64,
    update: AtomicU64,
    delete: AtomicU64,
    get: AtomicU64,
    exists: AtomicU64,
    browse: AtomicU64,
}

impl Calls {
    fn reads(&self) -> u64 {
        self.get.load(Ordering::SeqCst) + self.exists.load(Ordering::SeqCst)
    }

    fn writes(&self) -> u64 {
        self.add.load(Ordering::SeqCst)
            + self.update.load(Ordering::SeqCst)
            + self.delete.load(Ordering::SeqCst)
    }
}

/// Wraps an in-memory store, counts every call, and fails on demand.
struct FailingStore {
    inner: InMemoryStore<u64, Value>,
    calls: Calls,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    delay: Option<Duration>,
    error_msg: String,
    /// Fail with `StoreError::Cancelled` instead of a backend error.
    report_cancelled: bool,
}

impl FailingStore {
    fn healthy() -> Arc<Self> {
        Arc::new(Self::build(false, false, None))
    }

    fn failing_writes() -> Arc<Self> {
        Arc::new(Self::build(true, false, None))
    }

    fn failing_reads() -> Arc<Self> {
        Arc::new(Self::build(false, true, None))
    }

    fn failing_everything() -> Arc<Self> {
        Arc::new(Self::build(true, true, None))
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(false, false, Some(delay)))
    }

    /// Reads fail with `Cancelled` although the caller never cancelled.
    fn cancelling_reads() -> Arc<Self> {
        Arc::new(Self {
            report_cancelled: true,
            ..Self::build(false, true, None)
        })
    }

    fn build(fail_writes: bool, fail_reads: bool, delay: Option<Duration>) -> Self {
        Self {
            inner: InMemoryStore::new(),
            calls: Calls::default(),
            fail_writes: AtomicBool::new(fail_writes),
            fail_reads: AtomicBool::new(fail_reads),
            delay,
            error_msg: "injected failure".to_string(),
            report_cancelled: false,
        }
    }

    async fn enter(&self, counter: &AtomicU64, fail: &AtomicBool) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if fail.load(Ordering::SeqCst) && self.report_cancelled {
            Err(StoreError::Cancelled)
        } else if fail.load(Ordering::SeqCst) {
            Err(StoreError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreAdapter<u64, Value> for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn add(&self, record: &Rec) -> Result<(), StoreError> {
        self.enter(&self.calls.add, &self.fail_writes).await?;
        self.inner.add(record).await
    }

    async fn update(&self, record: &Rec) -> Result<(), StoreError> {
        self.enter(&self.calls.update, &self.fail_writes).await?;
        self.inner.update(record).await
    }

    async fn delete(&self, id: &u64) -> Result<(), StoreError> {
        self.enter(&self.calls.delete, &self.fail_writes).await?;
        self.inner.delete(id).await
    }

    async fn get(&self, id: &u64) -> Result<Option<Rec>, StoreError> {
        self.enter(&self.calls.get, &self.fail_reads).await?;
        self.inner.get(id).await
    }

    async fn exists(&self, id: &u64) -> Result<bool, StoreError> {
        self.enter(&self.calls.exists, &self.fail_reads).await?;
        self.inner.exists(id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StoreError::Backend("unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueryableStore<u64, Value> for FailingStore {
    async fn browse(&self, predicate: Predicate<'_, u64, Value>) -> Result<Vec<Rec>, StoreError> {
        self.enter(&self.calls.browse, &self.fail_reads).await?;
        self.inner.browse(predicate).await
    }
}

fn record(id: u64, name: &str) -> Rec {
    Record::new(id, json!({"name": name}))
}

struct Harness {
    repo: CompositeRepository<u64, Value>,
    primary: Arc<FailingStore>,
    cache: Arc<FailingStore>,
    secondary: Arc<FailingStore>,
    token: CancellationToken,
}

fn harness(
    primary: Arc<FailingStore>,
    cache: Arc<FailingStore>,
    secondary: Arc<FailingStore>,
) -> Harness {
    harness_with(primary, cache, secondary, CompositeConfig::default())
}

fn harness_with(
    primary: Arc<FailingStore>,
    cache: Arc<FailingStore>,
    secondary: Arc<FailingStore>,
    config: CompositeConfig,
) -> Harness {
    let repo = CompositeRepository::<u64, Value>::builder(primary.clone())
        .cache(cache.clone())
        .secondary(secondary.clone())
        .health(Arc::new(SyncHealthTracker::new()))
        .config(config)
        .build();
    Harness {
        repo,
        primary,
        cache,
        secondary,
        token: CancellationToken::new(),
    }
}

// =============================================================================
// Write Path
// =============================================================================

#[tokio::test]
async fn test_secondary_failure_does_not_fail_add() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::healthy(),
        FailingStore::failing_writes(),
    );

    h.repo.add(&record(42, "A"), &h.token).await.unwrap();

    let status = h.repo.sync_status();
    assert_eq!(status.total_synced, 1);
    assert_eq!(status.total_failed, 1);
    assert!(!status.is_healthy);

    // Cache still holds it, so get succeeds without reaching the secondary.
    let found = h.repo.get(&42, &h.token).await.unwrap().unwrap();
    assert_eq!(found.payload["name"], "A");
    assert_eq!(h.secondary.calls.get.load(Ordering::SeqCst), 0);
    assert_eq!(h.primary.calls.get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_replicas_failing_still_serves_from_primary() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::failing_everything(),
        FailingStore::failing_everything(),
    );

    h.repo.add(&record(7, "B"), &h.token).await.unwrap();
    assert_eq!(h.repo.sync_status().total_failed, 2);

    let found = h.repo.get(&7, &h.token).await.unwrap();
    assert_eq!(found.unwrap().payload["name"], "B");
    assert_eq!(h.cache.calls.get.load(Ordering::SeqCst), 1);
    assert_eq!(h.secondary.calls.get.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.calls.get.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_primary_failure_aborts_write() {
    let h = harness(
        FailingStore::failing_writes(),
        FailingStore::healthy(),
        FailingStore::healthy(),
    );

    let err = h.repo.add(&record(1, "X"), &h.token).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(ref msg) if msg == "injected failure"));

    assert_eq!(h.cache.calls.writes(), 0);
    assert_eq!(h.secondary.calls.writes(), 0);
    assert_eq!(h.repo.sync_status().total_attempts(), 0);

    assert!(h.repo.update(&record(1, "Y"), &h.token).await.is_err());
    assert!(h.repo.delete(&1, &h.token).await.is_err());
    assert_eq!(h.cache.calls.writes(), 0);
}

#[tokio::test]
async fn test_update_and_delete_propagate_in_order() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());

    let first = record(5, "v1");
    h.repo.add(&first, &h.token).await.unwrap();
    h.repo.update(&first.clone().revise(json!({"name": "v2"})), &h.token).await.unwrap();

    let cached = h.cache.inner.get(&5).await.unwrap().unwrap();
    assert_eq!(cached.version, 2);
    assert_eq!(h.secondary.inner.get(&5).await.unwrap().unwrap().version, 2);

    h.repo.delete(&5, &h.token).await.unwrap();
    assert!(h.cache.inner.is_empty());
    assert!(h.secondary.inner.is_empty());
    assert!(h.primary.inner.is_empty());

    let status = h.repo.sync_status();
    assert_eq!(status.total_synced, 6);
    assert_eq!(status.total_failed, 0);
    assert!(status.is_healthy);
}

#[tokio::test]
async fn test_delete_of_primary_only_record() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());

    // Written behind the repository's back: only the primary has it.
    h.primary.inner.add(&record(9, "orphan")).await.unwrap();

    h.repo.delete(&9, &h.token).await.unwrap();
    assert!(h.repo.get(&9, &h.token).await.unwrap().is_none());
    assert!(!h.repo.exists(&9, &h.token).await.unwrap());
}

#[tokio::test]
async fn test_cancelled_token_fails_before_primary() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());
    h.token.cancel();

    let err = h.repo.add(&record(1, "X"), &h.token).await.unwrap_err();
    assert!(matches!(err, StoreError::Cancelled));
    assert_eq!(h.primary.calls.writes(), 0);
    assert_eq!(h.cache.calls.writes(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_propagation_is_a_counted_failure() {
    let primary = FailingStore::healthy();
    let cache = FailingStore::slow(Duration::from_millis(500));
    let secondary = FailingStore::healthy();
    let h = harness(primary, cache, secondary);

    let token = h.token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    // Primary commits first, so the write still succeeds.
    h.repo.add(&record(3, "C"), &h.token).await.unwrap();
    assert!(h.primary.inner.get(&3).await.unwrap().is_some());

    let status = h.repo.sync_status();
    assert_eq!(status.total_synced, 0);
    assert_eq!(status.total_failed, 2);
    assert_eq!(h.secondary.calls.add.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_replica_timeout_is_a_counted_failure() {
    let config = CompositeConfig {
        replica_timeout_ms: 20,
        ..Default::default()
    };
    let h = harness_with(
        FailingStore::healthy(),
        FailingStore::slow(Duration::from_millis(500)),
        FailingStore::healthy(),
        config,
    );

    h.repo.add(&record(4, "D"), &h.token).await.unwrap();

    let status = h.repo.sync_status();
    assert_eq!(status.total_synced, 1);
    assert_eq!(status.total_failed, 1);
    assert!(h.secondary.inner.get(&4).await.unwrap().is_some());
}

// =============================================================================
// Read Path
// =============================================================================

#[tokio::test]
async fn test_cache_hit_skips_secondary_and_primary() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());
    h.repo.add(&record(1, "A"), &h.token).await.unwrap();

    assert!(h.repo.get(&1, &h.token).await.unwrap().is_some());
    assert!(h.repo.exists(&1, &h.token).await.unwrap());

    assert_eq!(h.cache.calls.reads(), 2);
    assert_eq!(h.secondary.calls.reads(), 0);
    assert_eq!(h.primary.calls.reads(), 0);
}

#[tokio::test]
async fn test_cache_error_falls_back_to_secondary() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::failing_reads(),
        FailingStore::healthy(),
    );
    h.repo.add(&record(1, "A"), &h.token).await.unwrap();

    let found = h.repo.get(&1, &h.token).await.unwrap();
    assert_eq!(found.unwrap().payload["name"], "A");

    assert_eq!(h.cache.calls.get.load(Ordering::SeqCst), 1);
    assert_eq!(h.secondary.calls.get.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.calls.get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_error_falls_back_to_secondary_for_exists() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::failing_reads(),
        FailingStore::healthy(),
    );
    h.repo.add(&record(42, "A"), &h.token).await.unwrap();

    assert!(h.repo.exists(&42, &h.token).await.unwrap());

    assert_eq!(h.cache.calls.exists.load(Ordering::SeqCst), 1);
    assert_eq!(h.secondary.calls.exists.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.calls.exists.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_replica_reporting_cancelled_is_skipped_while_token_is_live() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::cancelling_reads(),
        FailingStore::healthy(),
    );
    h.repo.add(&record(42, "A"), &h.token).await.unwrap();

    let found = h.repo.get(&42, &h.token).await.unwrap();
    assert_eq!(found.unwrap().payload["name"], "A");
    assert!(h.repo.exists(&42, &h.token).await.unwrap());
    assert!(!h.token.is_cancelled());

    assert_eq!(h.cache.calls.reads(), 2);
    assert_eq!(h.secondary.calls.reads(), 2);
    assert_eq!(h.primary.calls.reads(), 0);
}

#[tokio::test]
async fn test_replica_reporting_cancelled_falls_through_to_primary() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::cancelling_reads(),
        FailingStore::cancelling_reads(),
    );
    h.primary.inner.add(&record(42, "A")).await.unwrap();

    let found = h.repo.get(&42, &h.token).await.unwrap();
    assert_eq!(found.unwrap().payload["name"], "A");
    assert_eq!(h.primary.calls.get.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_during_slow_cache_read_stops_the_chain() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::slow(Duration::from_millis(500)),
        FailingStore::healthy(),
    );
    h.secondary.inner.add(&record(42, "A")).await.unwrap();
    h.primary.inner.add(&record(42, "A")).await.unwrap();

    let token = h.token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = h.repo.get(&42, &h.token).await.unwrap_err();
    assert!(matches!(err, StoreError::Cancelled));
    assert!(matches!(h.repo.exists(&42, &h.token).await, Err(StoreError::Cancelled)));

    assert_eq!(h.cache.calls.get.load(Ordering::SeqCst), 1);
    assert_eq!(h.secondary.calls.reads(), 0);
    assert_eq!(h.primary.calls.reads(), 0);
}

#[tokio::test]
async fn test_miss_everywhere_asks_primary_last() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());

    assert!(h.repo.get(&404, &h.token).await.unwrap().is_none());
    assert!(!h.repo.exists(&404, &h.token).await.unwrap());

    assert_eq!(h.cache.calls.reads(), 2);
    assert_eq!(h.secondary.calls.reads(), 2);
    assert_eq!(h.primary.calls.reads(), 2);
}

#[tokio::test]
async fn test_primary_read_error_is_final() {
    let h = harness(
        FailingStore::failing_reads(),
        FailingStore::healthy(),
        FailingStore::healthy(),
    );

    let err = h.repo.get(&1, &h.token).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert!(h.repo.exists(&1, &h.token).await.is_err());
}

#[tokio::test]
async fn test_browse_and_count_use_primary_only() {
    let h = harness(FailingStore::healthy(), FailingStore::healthy(), FailingStore::healthy());
    for i in 0..6 {
        h.repo.add(&record(i, if i % 2 == 0 { "even" } else { "odd" }), &h.token).await.unwrap();
    }

    let evens = h
        .repo
        .browse(&|r: &Rec| r.payload["name"] == "even", &h.token)
        .await
        .unwrap();
    assert_eq!(evens.len(), 3);
    assert_eq!(h.repo.count(&h.token).await.unwrap(), 6);

    assert_eq!(h.primary.calls.browse.load(Ordering::SeqCst), 2);
    assert_eq!(h.cache.calls.reads(), 0);
    assert_eq!(h.secondary.calls.reads(), 0);
}

#[tokio::test]
async fn test_primary_only_repository() {
    let primary = Arc::new(InMemoryStore::<u64, Value>::new());
    let repo = CompositeRepository::<u64, Value>::builder(primary.clone()).build();
    let token = CancellationToken::new();

    repo.add(&record(1, "solo"), &token).await.unwrap();
    assert!(repo.exists(&1, &token).await.unwrap());
    assert_eq!(repo.sync_status().total_attempts(), 0);
    assert_eq!(repo.roles().len(), 1);
}

// =============================================================================
// Background Propagation
// =============================================================================

#[tokio::test]
async fn test_background_mode_drains_on_shutdown() {
    let config = CompositeConfig {
        propagation_mode: PropagationMode::Background,
        ..Default::default()
    };
    let h = harness_with(
        FailingStore::healthy(),
        FailingStore::healthy(),
        FailingStore::failing_writes(),
        config,
    );

    for i in 0..20 {
        h.repo.add(&record(i, "bg"), &h.token).await.unwrap();
    }
    h.repo.shutdown().await;

    assert_eq!(h.cache.inner.len(), 20);
    let status = h.repo.sync_status();
    assert_eq!(status.total_synced, 20);
    assert_eq!(status.total_failed, 20);

    // After shutdown, writes propagate inline.
    h.repo.add(&record(100, "late"), &h.token).await.unwrap();
    assert!(h.cache.inner.get(&100).await.unwrap().is_some());
    assert_eq!(h.repo.sync_status().total_synced, 21);

    // Second shutdown is a no-op.
    h.repo.shutdown().await;
}

#[tokio::test]
async fn test_background_full_queue_counts_failures() {
    let config = CompositeConfig {
        propagation_mode: PropagationMode::Background,
        propagation_queue_depth: 1,
        ..Default::default()
    };
    let h = harness_with(
        FailingStore::healthy(),
        FailingStore::slow(Duration::from_millis(200)),
        FailingStore::healthy(),
        config,
    );

    for i in 0..5 {
        h.repo.add(&record(i, "burst"), &h.token).await.unwrap();
    }
    h.repo.shutdown().await;

    // Every write reached the primary regardless of the queue.
    assert_eq!(h.primary.inner.len(), 5);
    let status = h.repo.sync_status();
    assert_eq!(status.total_attempts(), 10);
    assert!(status.total_failed >= 2, "dropped fan-outs count per replica: {status:?}");
    assert_eq!(status.total_failed % 2, 0);
}

// =============================================================================
// Health Check
// =============================================================================

#[tokio::test]
async fn test_health_check_reports_each_role() {
    let h = harness(
        FailingStore::healthy(),
        FailingStore::failing_reads(),
        FailingStore::healthy(),
    );

    let check = h.repo.health_check(&h.token).await;
    assert!(check.primary_connected);
    assert_eq!(check.cache_connected, Some(false));
    assert_eq!(check.secondary_connected, Some(true));
    assert!(check.is_ready());
    assert!(!check.is_fully_healthy());
}
