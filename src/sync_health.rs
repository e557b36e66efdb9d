// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Propagation health tracking.
//!
//! Every best-effort write to the cache or secondary reports its outcome
//! here. The tracker keeps lifetime success/failure counters and a ring
//! buffer of the most recent latencies, and derives a [`SyncStatus`]:
//!
//! ```text
//! failure_rate = failed / (synced + failed)      (0 when nothing attempted)
//! healthy      = failure_rate <= 5%  AND  mean(last 100 latencies) < 1s
//! ```
//!
//! # Thread Safety
//!
//! One `parking_lot::Mutex` guards all state. It is held only for O(1)
//! updates and never across an await point, so contention stays flat
//! regardless of request volume. Callers only ever see copied snapshots.
//!
//! # Example
//!
//! ```
//! use composite_repo::SyncHealthTracker;
//! use std::time::Duration;
//!
//! let tracker = SyncHealthTracker::new();
//! tracker.record_attempt(Duration::from_millis(4), true);
//! tracker.record_attempt(Duration::from_millis(6), false);
//!
//! let status = tracker.status();
//! assert_eq!(status.total_synced, 1);
//! assert_eq!(status.total_failed, 1);
//! assert_eq!(status.average_sync_latency, Duration::from_millis(5));
//! assert!(!status.is_healthy); // 50% failure rate
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::record::now_millis;

/// Limits that decide whether propagation is healthy.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    /// Latency samples kept for the rolling average
    pub window: usize,
    /// Highest failure rate still considered healthy (inclusive)
    pub max_failure_rate: f64,
    /// Average latency must stay strictly below this
    pub max_avg_latency: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            window: 100,
            max_failure_rate: 0.05,
            max_avg_latency: Duration::from_secs(1),
        }
    }
}

/// Point-in-time propagation health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    /// Epoch millis of the most recent attempt, `None` before the first
    pub last_sync_time: Option<i64>,
    pub total_synced: u64,
    pub total_failed: u64,
    /// Mean of the retained latency window (zero when empty)
    pub average_sync_latency: Duration,
    pub is_healthy: bool,
}

impl SyncStatus {
    /// Failed share of all attempts, 0.0 when none were made.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        failure_rate(self.total_synced, self.total_failed)
    }

    /// Total propagation attempts.
    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.total_synced + self.total_failed
    }
}

fn failure_rate(synced: u64, failed: u64) -> f64 {
    let total = synced + failed;
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}

struct Inner {
    total_synced: u64,
    total_failed: u64,
    last_sync_time: Option<i64>,
    samples: VecDeque<Duration>,
    /// Running sum of `samples`, kept exact (integer nanos) on evict.
    sample_sum: Duration,
}

impl Inner {
    fn new(window: usize) -> Self {
        Self {
            total_synced: 0,
            total_failed: 0,
            last_sync_time: None,
            samples: VecDeque::with_capacity(window),
            sample_sum: Duration::ZERO,
        }
    }

    fn average(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.sample_sum / n,
            Err(_) => Duration::ZERO,
        }
    }
}

/// Process-wide propagation health tracker. Share it with `Arc`.
pub struct SyncHealthTracker {
    thresholds: HealthThresholds,
    inner: Mutex<Inner>,
}

impl SyncHealthTracker {
    /// Tracker with the default thresholds (100 samples, 5%, 1s).
    #[must_use]
    pub fn new() -> Self {
        Self::with_thresholds(HealthThresholds::default())
    }

    #[must_use]
    pub fn with_thresholds(mut thresholds: HealthThresholds) -> Self {
        thresholds.window = thresholds.window.max(1);
        Self {
            inner: Mutex::new(Inner::new(thresholds.window)),
            thresholds,
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Record one propagation attempt.
    pub fn record_attempt(&self, latency: Duration, success: bool) {
        let status = {
            let mut inner = self.inner.lock();
            if success {
                inner.total_synced += 1;
            } else {
                inner.total_failed += 1;
            }

            if inner.samples.len() == self.thresholds.window {
                if let Some(evicted) = inner.samples.pop_front() {
                    inner.sample_sum = inner.sample_sum.saturating_sub(evicted);
                }
            }
            inner.samples.push_back(latency);
            inner.sample_sum = inner.sample_sum.saturating_add(latency);
            inner.last_sync_time = Some(now_millis());

            self.snapshot(&inner)
        };

        crate::metrics::set_sync_health(&status);
    }

    /// Current health snapshot.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let inner = self.inner.lock();
        self.snapshot(&inner)
    }

    /// Number of latency samples currently retained.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Forget all counters and samples.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::new(self.thresholds.window);
    }

    fn snapshot(&self, inner: &Inner) -> SyncStatus {
        let average_sync_latency = inner.average();
        let rate = failure_rate(inner.total_synced, inner.total_failed);
        SyncStatus {
            last_sync_time: inner.last_sync_time,
            total_synced: inner.total_synced,
            total_failed: inner.total_failed,
            average_sync_latency,
            is_healthy: rate <= self.thresholds.max_failure_rate
                && average_sync_latency < self.thresholds.max_avg_latency,
        }
    }
}

impl Default for SyncHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
