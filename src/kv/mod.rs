//! KV/Queue Adapter: the thin semantic layer over the store. `KvStore` is
//! the single typed interface; `memory` and `redis_backend` are
//! interchangeable implementations. Every component above this layer
//! (registry, job store, lock manager, chunk aggregator) talks to the
//! store only through this trait — nothing reaches for a backend-specific
//! type.

mod keys;
mod memory;
mod redis_backend;

pub use keys::Keys;
pub use memory::MemoryStore;
pub use redis_backend::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Sentinel returned by `ttl` for a key that does not exist, matching the
/// Redis convention the sweeper relies on to detect an expired lease.
pub const TTL_MISSING: i64 = -2;
/// Sentinel returned by `ttl` for a key with no expiration set.
pub const TTL_NO_EXPIRY: i64 = -1;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()>;
    /// Atomic set-if-absent. Returns `true` if the key was set by this call.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> anyhow::Result<bool>;
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;
    /// Atomic compare-and-delete: removes `key` only if its current value
    /// equals `expected`. Returns `true` iff the delete happened.
    async fn compare_delete(&self, key: &str, expected: &str) -> anyhow::Result<bool>;
    /// Remaining TTL in seconds, or `TTL_NO_EXPIRY`/`TTL_MISSING`.
    async fn ttl(&self, key: &str) -> anyhow::Result<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> anyhow::Result<()>;
    async fn hash_get_all(&self, key: &str) -> anyhow::Result<HashMap<String, String>>;
    async fn hash_delete_key(&self, key: &str) -> anyhow::Result<()>;

    /// Add/update a member's score in a sorted set.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()>;
    async fn zrem(&self, key: &str, member: &str) -> anyhow::Result<()>;
    /// Members with `min <= score <= max`, ascending. `f64::MIN`/`MAX` for
    /// unbounded ends.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> anyhow::Result<Vec<String>>;
    /// First `limit` members in ascending score order (ties broken by the
    /// backend's own lexicographic ordering — unspecified to callers).
    async fn zrange(&self, key: &str, limit: usize) -> anyhow::Result<Vec<String>>;
    async fn zcard(&self, key: &str) -> anyhow::Result<usize>;

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>>;

    /// Keys matching a glob-style pattern (`prefix:*`). Used sparingly —
    /// only by maintenance passes, never on a request hot path.
    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>>;
}
