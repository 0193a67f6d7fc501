//! Read strategy implementations using enum dispatch.

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::hybrid::HybridCache;

/// Read strategy enum - determines cache/source access pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Check both cache tiers, fall back to the source on miss and populate
    #[default]
    CacheFirst,
    /// Only read from the source of truth, skip the cache
    SourceOnly,
    /// Only read from the cache, never hit the source
    CacheOnly,
}

impl ReadStrategy {
    /// Execute a read according to the strategy.
    ///
    /// - `key`: cache key for the value
    /// - `ttl`: lifetime given to a value freshly loaded from the source
    /// - `load`: async function reading the source of truth
    ///
    /// Cache-tier failures never surface under `CacheFirst`; only the
    /// loader's error does. The loader runs outside every cache lock.
    pub async fn read<T, LoadFut>(
        &self,
        cache: &HybridCache,
        key: &str,
        ttl: Duration,
        load: impl FnOnce() -> LoadFut,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        LoadFut: Future<Output = Result<T>>,
    {
        match self {
            Self::CacheFirst => {
                match cache.get::<T>(key).await {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_miss() => {
                        tracing::debug!(key = %key, "Cache miss, falling back to source");
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Cache error, falling back to source");
                    }
                }

                let value = load().await?;

                if let Err(e) = cache.set(key, &value, Some(ttl)).await {
                    tracing::warn!(key = %key, error = %e, "Failed to populate cache");
                }

                Ok(value)
            }

            Self::SourceOnly => load().await,

            Self::CacheOnly => cache.get(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::local::LocalStore;
    use crate::remote::RemoteCacheClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn local_only() -> HybridCache {
        HybridCache::new(LocalStore::new(16), RemoteCacheClient::disabled(TTL), TTL)
    }

    #[tokio::test]
    async fn test_cache_first_hit() {
        let cache = local_only();
        cache.set("k", &42, Some(TTL)).await.unwrap();

        let result: i32 = ReadStrategy::CacheFirst
            .read(&cache, "k", TTL, || async { Ok(99) })
            .await
            .unwrap();

        assert_eq!(result, 42); // Should return cache value
    }

    #[tokio::test]
    async fn test_cache_first_miss_populates() {
        let cache = local_only();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let result: i32 = ReadStrategy::CacheFirst
                .read(&cache, "k", TTL, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(99)
                })
                .await
                .unwrap();
            assert_eq!(result, 99);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1); // Later reads are cached
    }

    #[tokio::test]
    async fn test_cache_first_source_error_is_not_cached() {
        let cache = local_only();
        let err = ReadStrategy::CacheFirst
            .read::<i32, _>(&cache, "k", TTL, || async {
                Err(CacheError::NotFound {
                    entity_type: "user".to_string(),
                    key: "k".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::NotFound { .. }));
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_source_only() {
        let cache = local_only();
        cache.set("k", &42, Some(TTL)).await.unwrap();

        let result: i32 = ReadStrategy::SourceOnly
            .read(&cache, "k", TTL, || async { Ok(99) })
            .await
            .unwrap();

        assert_eq!(result, 99); // Should skip cache
    }

    #[tokio::test]
    async fn test_cache_only_miss() {
        let cache = local_only();
        let err = ReadStrategy::CacheOnly
            .read::<i32, _>(&cache, "k", TTL, || async { Ok(99) })
            .await
            .unwrap_err();

        assert!(err.is_miss());
    }
}
