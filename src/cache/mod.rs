//! Read-through cache for search results.
//!
//! Values are stored as serialized JSON with a per-entry TTL. The cache is
//! never invalidated by ingestion; entries go stale for at most their TTL.

pub mod keys;

pub use keys::CacheKey;

use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A serialized value together with the TTL it was stored with.
#[derive(Debug, Clone)]
struct CachedPayload {
    body: Arc<str>,
    ttl: Duration,
}

struct PayloadExpiry;

impl Expiry<String, CachedPayload> for PayloadExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPayload,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct SearchCache {
    cache: Cache<String, CachedPayload>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PayloadExpiry)
            .build();

        Self { cache, ttl }
    }

    /// Default TTL applied by `get_or_compute`.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        self.cache.get(key).await.map(|payload| payload.body)
    }

    pub async fn set(&self, key: &str, value: impl Into<Arc<str>>, ttl: Duration) {
        let payload = CachedPayload {
            body: value.into(),
            ttl,
        };
        self.cache.insert(key.to_string(), payload).await;
    }

    /// Cached value under `key`; undecodable entries count as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let body = self.get(&key).await?;
        match serde_json::from_str(&body) {
            Ok(value) => {
                debug!("Cache hit for {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let key = key.to_string();
        match serde_json::to_string(value) {
            Ok(body) => {
                self.set(&key, body, self.ttl).await;
                debug!("Cached {}", key);
            }
            Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
        }
    }

    /// Serve `key` from the cache, or run `compute` and store its result.
    /// Errors from `compute` are returned and never cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_json(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.set_json(key, &value).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn computes_once_then_serves_from_cache() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let key = CacheKey::SupportedChains;
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let chains: Result<Vec<String>, ()> = cache
                .get_or_compute(&key, || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["bitcoin".to_string(), "ethereum".to_string()])
                })
                .await;
            assert_eq!(chains.unwrap().len(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.get(&key.to_string()).await.as_deref(),
            Some(r#"["bitcoin","ethereum"]"#)
        );
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let key = CacheKey::SupportedChains;

        let failed: Result<Vec<String>, &str> =
            cache.get_or_compute(&key, || async { Err("store down") }).await;
        assert!(failed.is_err());
        assert!(cache.get(&key.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        cache.set("short", "1", Duration::from_millis(50)).await;
        cache.set("long", "2", Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("short").await.is_none());
        assert_eq!(cache.get("long").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn undecodable_entries_are_a_miss() {
        let cache = SearchCache::new(100, Duration::from_secs(60));
        let key = CacheKey::SupportedChains;
        cache.set(&key.to_string(), "not json", cache.ttl()).await;

        let chains: Option<Vec<String>> = cache.get_json(&key).await;
        assert!(chains.is_none());
    }
}
