//! Redis-backed [`CachePlane`] adapter.

use std::time::Duration;

use async_trait::async_trait;
use shared::redis_client::RedisClient;
use tracing::warn;

use super::CachePlane;

fn key(namespace: &str, feature: &str, resource: &str) -> String {
    format!("{namespace}:{feature}:{resource}")
}

/// Wraps [`shared::redis_client::RedisClient`]'s generic primitives with
/// the dedup/lock namespacing and failure policy from the concurrency
/// protocol: acquisition fails closed, release never propagates an error.
#[derive(Clone)]
pub struct RedisCachePlane {
    redis: RedisClient,
}

impl RedisCachePlane {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CachePlane for RedisCachePlane {
    async fn set_dedup(&self, feature: &str, resource: &str, ttl: Duration) -> bool {
        let k = key("dedup", feature, resource);
        self.redis.set_nx(&k, ttl).await.unwrap_or(false)
    }

    async fn has_dedup(&self, feature: &str, resource: &str) -> bool {
        let k = key("dedup", feature, resource);
        self.redis.exists(&k).await.unwrap_or(false)
    }

    async fn clear_dedup(&self, feature: &str, resource: &str) {
        let k = key("dedup", feature, resource);
        if let Err(e) = self.redis.delete(&k).await {
            warn!(error = %e, key = %k, "failed to clear dedup flag");
        }
    }

    async fn acquire_lock(&self, feature: &str, resource: &str, ttl: Duration) -> bool {
        let k = key("locks", feature, resource);
        self.redis.set_nx(&k, ttl).await.unwrap_or(false)
    }

    async fn release_lock(&self, feature: &str, resource: &str) {
        let k = key("locks", feature, resource);
        if let Err(e) = self.redis.delete(&k).await {
            warn!(error = %e, key = %k, "failed to release lock, relying on TTL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_namespace_feature_resource() {
        assert_eq!(key("dedup", "coupon-redeem", "ABC123:user-1"), "dedup:coupon-redeem:ABC123:user-1");
        assert_eq!(key("locks", "coupon-lock", "ABC123"), "locks:coupon-lock:ABC123");
    }
}
