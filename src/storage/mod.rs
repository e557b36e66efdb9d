//! Store adapters.
//!
//! - [`traits`]: the [`StoreAdapter`](traits::StoreAdapter) and
//!   [`QueryableStore`](traits::QueryableStore) capabilities
//! - [`memory`]: `DashMap`-backed store, usable in any role
//! - [`redis`]: Redis cache adapter (JSON values with TTL)
//! - [`sql`]: SQL document adapter (SQLite / MySQL via sqlx `Any`)

pub mod traits;
pub mod memory;
pub mod redis;
pub mod sql;
