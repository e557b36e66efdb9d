// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the composite repository.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `composite_repo_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `role`: primary, cache, secondary
//! - `operation`: add, update, delete, get, exists, browse, count
//! - `status` / `outcome`: success, error, hit, miss

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::sync_health::SyncStatus;

/// Record a best-effort propagation attempt to a replica
pub fn record_propagation(role: &str, operation: &str, success: bool) {
    counter!(
        "composite_repo_propagations_total",
        "role" => role.to_string(),
        "operation" => operation.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record propagation latency
pub fn record_propagation_latency(role: &str, operation: &str, duration: Duration) {
    histogram!(
        "composite_repo_propagation_seconds",
        "role" => role.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a read probe against one store in the fallback chain
pub fn record_read(role: &str, operation: &str, outcome: &str) {
    counter!(
        "composite_repo_reads_total",
        "role" => role.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record end-to-end latency of a repository call
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "composite_repo_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a primary failure surfaced to the caller
pub fn record_primary_error(operation: &str) {
    counter!(
        "composite_repo_primary_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a propagation dropped because the background queue was full
pub fn record_propagation_dropped(operation: &str) {
    counter!(
        "composite_repo_propagations_dropped_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set background propagation queue depth
pub fn set_propagation_queue_depth(depth: usize) {
    gauge!("composite_repo_propagation_queue_depth").set(depth as f64);
}

/// Publish the latest sync health snapshot
pub fn set_sync_health(status: &SyncStatus) {
    gauge!("composite_repo_sync_healthy").set(if status.is_healthy { 1.0 } else { 0.0 });
    gauge!("composite_repo_sync_failure_rate").set(status.failure_rate());
    gauge!("composite_repo_sync_avg_latency_seconds")
        .set(status.average_sync_latency.as_secs_f64());
}

/// Set store connectivity (1 = reachable, 0 = unreachable)
pub fn set_store_reachable(role: &str, reachable: bool) {
    gauge!(
        "composite_repo_store_reachable",
        "role" => role.to_string()
    )
    .set(if reachable { 1.0 } else { 0.0 });
}

/// Timer that records a repository call's latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: std::time::Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
