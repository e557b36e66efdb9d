//! Configuration for the composite repository.
//!
//! # Example
//!
//! ```
//! use composite_repo::{CompositeConfig, PropagationMode};
//!
//! // Minimal config (uses defaults)
//! let config = CompositeConfig::default();
//! assert_eq!(config.health_window, 100);
//! assert_eq!(config.propagation_mode, PropagationMode::Inline);
//!
//! // Deserialized from a host's settings file
//! let config: CompositeConfig = serde_json::from_str(r#"{
//!     "redis_url": "redis://localhost:6379",
//!     "redis_key_prefix": "tenant:",
//!     "propagation_mode": "background"
//! }"#).unwrap();
//! assert_eq!(config.redis_ttl_secs, 3600);
//! assert_eq!(config.propagation_mode, PropagationMode::Background);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::sync_health::HealthThresholds;

/// When best-effort propagation to the cache and secondary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Fan out before the write call returns. Caller latency is the sum of
    /// all three stores; sync status reflects the write on return.
    #[default]
    Inline,
    /// Queue the fan-out for a background worker. Caller latency is the
    /// primary's alone.
    Background,
}

/// Configuration for the composite repository.
///
/// All fields have defaults. Backend URLs are only read by
/// [`crate::repository::CompositeRepository::connect`]; callers wiring
/// their own adapters can ignore them.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositeConfig {
    /// Inline or background fan-out
    #[serde(default)]
    pub propagation_mode: PropagationMode,

    /// Capacity of the background propagation queue
    #[serde(default = "default_propagation_queue_depth")]
    pub propagation_queue_depth: usize,

    /// Per-call timeout for cache/secondary reads and writes in millis (0 = none)
    #[serde(default = "default_replica_timeout_ms")]
    pub replica_timeout_ms: u64,

    /// Number of propagation latency samples kept for the health average
    #[serde(default = "default_health_window")]
    pub health_window: usize,

    /// Failure rate above which sync is unhealthy
    #[serde(default = "default_health_max_failure_rate")]
    pub health_max_failure_rate: f64,

    /// Average propagation latency in millis at or above which sync is unhealthy
    #[serde(default = "default_health_max_avg_latency_ms")]
    pub health_max_avg_latency_ms: u64,

    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Redis key namespace (e.g., "tenant:")
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,

    /// TTL applied to cached records in seconds (0 = no expiry)
    #[serde(default = "default_redis_ttl_secs")]
    pub redis_ttl_secs: u64,

    /// SQL connection string for the secondary (e.g., "sqlite:replica.db")
    #[serde(default)]
    pub sql_url: Option<String>,

    /// Table used by the SQL secondary
    #[serde(default = "default_sql_table")]
    pub sql_table: String,
}

fn default_propagation_queue_depth() -> usize { 1024 }
fn default_replica_timeout_ms() -> u64 { 2000 }
fn default_health_window() -> usize { 100 }
fn default_health_max_failure_rate() -> f64 { 0.05 }
fn default_health_max_avg_latency_ms() -> u64 { 1000 }
fn default_redis_key_prefix() -> String { "record:".to_string() }
fn default_redis_ttl_secs() -> u64 { 3600 }
fn default_sql_table() -> String { crate::storage::sql::DEFAULT_TABLE.to_string() }

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            propagation_mode: PropagationMode::default(),
            propagation_queue_depth: default_propagation_queue_depth(),
            replica_timeout_ms: default_replica_timeout_ms(),
            health_window: default_health_window(),
            health_max_failure_rate: default_health_max_failure_rate(),
            health_max_avg_latency_ms: default_health_max_avg_latency_ms(),
            redis_url: None,
            redis_key_prefix: default_redis_key_prefix(),
            redis_ttl_secs: default_redis_ttl_secs(),
            sql_url: None,
            sql_table: default_sql_table(),
        }
    }
}

impl CompositeConfig {
    /// Per-call replica timeout, `None` when disabled.
    #[must_use]
    pub fn replica_timeout(&self) -> Option<Duration> {
        (self.replica_timeout_ms > 0).then(|| Duration::from_millis(self.replica_timeout_ms))
    }

    /// Cache TTL, `None` when disabled.
    #[must_use]
    pub fn redis_ttl(&self) -> Option<Duration> {
        (self.redis_ttl_secs > 0).then(|| Duration::from_secs(self.redis_ttl_secs))
    }

    /// Health thresholds derived from this config.
    #[must_use]
    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            window: self.health_window.max(1),
            max_failure_rate: self.health_max_failure_rate,
            max_avg_latency: Duration::from_millis(self.health_max_avg_latency_ms),
        }
    }
}
