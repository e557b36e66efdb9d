//! Record data structure.
//!
//! The [`Record`] is the unit conveyed between the repository and its stores.
//! Each record has a key, a version, a timestamp, and a typed payload.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bounds a record key must satisfy.
///
/// Blanket-implemented; any `String`, `u64`, `Uuid`-like newtype qualifies
/// as long as it serializes and renders with `Display` (used for cache keys).
pub trait RecordKey:
    Clone + Eq + Hash + Display + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> RecordKey for T where
    T: Clone + Eq + Hash + Display + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Bounds a record payload must satisfy.
pub trait Payload: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Payload for T where
    T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// An entity as held by a store.
///
/// # Example
///
/// ```
/// use composite_repo::Record;
/// use serde_json::json;
///
/// let record = Record::new(42u64, json!({"name": "A"}));
/// assert_eq!(record.id, 42);
/// assert_eq!(record.version, 1);
///
/// let next = record.revise(json!({"name": "B"}));
/// assert_eq!(next.version, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<K, P> {
    /// Unique key
    pub id: K,
    /// Monotonically increasing version. Checked by callers, never by the repository.
    pub version: u64,
    /// Last update timestamp (epoch millis)
    pub updated_at: i64,
    /// Domain payload
    pub payload: P,
}

impl<K, P> Record<K, P> {
    /// Create a first-version record stamped with the current time.
    pub fn new(id: K, payload: P) -> Self {
        Self {
            id,
            version: 1,
            updated_at: now_millis(),
            payload,
        }
    }

    /// Rebuild a record from stored fields (used by adapters).
    pub fn reconstruct(id: K, version: u64, updated_at: i64, payload: P) -> Self {
        Self {
            id,
            version,
            updated_at,
            payload,
        }
    }

    /// Produce the next version of this record carrying `payload`.
    #[must_use]
    pub fn revise(self, payload: P) -> Self {
        Self {
            id: self.id,
            version: self.version.saturating_add(1),
            updated_at: now_millis().max(self.updated_at),
            payload,
        }
    }
}

/// Current wall-clock time in epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
