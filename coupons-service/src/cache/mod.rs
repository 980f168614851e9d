//! # Cache Plane
//!
//! Distributed dedup flags and mutual-exclusion locks, keyed by
//! `(feature, resource)`. Backed by Redis, but never authoritative: a
//! cache failure degrades the concurrency protocol's latency, never its
//! correctness, because the persistence plane's row locks and version
//! column are the final arbiter.
//!
//! Key layout: `<namespace>:<feature>:<resource>` with namespaces
//! `dedup` and `locks`.

pub mod redis_cache;

pub use redis_cache::RedisCachePlane;

use async_trait::async_trait;
use std::time::Duration;

/// Dedup flags and locks, both set-if-absent-with-TTL primitives over
/// distinct namespaces.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CachePlane: Send + Sync {
    /// Sets a dedup flag. Returns `true` if it was inserted (i.e. this
    /// caller is the first to set it), `false` if it was already present.
    async fn set_dedup(&self, feature: &str, resource: &str, ttl: Duration) -> bool;

    /// Checks whether a dedup flag is currently set.
    async fn has_dedup(&self, feature: &str, resource: &str) -> bool;

    /// Clears a dedup flag. Idempotent; errors are logged and swallowed.
    async fn clear_dedup(&self, feature: &str, resource: &str);

    /// Acquires a lock. Returns `true` if acquired, `false` if already
    /// held or if the cache itself failed (fail-closed).
    async fn acquire_lock(&self, feature: &str, resource: &str, ttl: Duration) -> bool;

    /// Releases a lock. Idempotent; errors are logged and swallowed — the
    /// TTL is the backstop if release never runs.
    async fn release_lock(&self, feature: &str, resource: &str);
}
