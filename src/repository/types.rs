//! Public types for the composite repository.

use serde::Serialize;

use crate::record::Record;
use crate::sync_health::SyncStatus;

/// Role a store plays in the composite.
///
/// Selects behaviour, it is never stored with data: the primary is written
/// synchronously and is authoritative; cache and secondary are best-effort
/// and advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    Primary,
    Cache,
    Secondary,
}

impl StoreRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Cache => "cache",
            Self::Secondary => "secondary",
        }
    }

    /// Whether failures in this role are swallowed.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        !matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write to replay against each replica after the primary commits.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp<K, P> {
    Add(Record<K, P>),
    Update(Record<K, P>),
    Delete(K),
}

impl<K, P> WriteOp<K, P> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Connectivity of each configured store plus propagation health.
///
/// Returned by [`super::CompositeRepository::health_check()`]. A role that
/// is not configured reports `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    pub primary_connected: bool,
    pub cache_connected: Option<bool>,
    pub secondary_connected: Option<bool>,
    pub sync: SyncStatus,
}

impl HealthCheck {
    /// Ready to serve: the primary answers. Replicas only degrade latency.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.primary_connected
    }

    /// Every configured store answers and propagation is healthy.
    #[must_use]
    pub fn is_fully_healthy(&self) -> bool {
        self.primary_connected
            && self.cache_connected.unwrap_or(true)
            && self.secondary_connected.unwrap_or(true)
            && self.sync.is_healthy
    }
}
