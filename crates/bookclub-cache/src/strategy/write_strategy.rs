//! Write strategy implementations using enum dispatch.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::hybrid::HybridCache;

/// Write strategy enum - determines how the cache follows a source write.
///
/// The source of truth is always written first; a failed source write
/// leaves the cache untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Write the source, then invalidate the cached copies
    #[default]
    WriteAround,
    /// Write the source, then overwrite the cached copies
    WriteThrough,
}

impl WriteStrategy {
    /// Execute a write according to the strategy.
    ///
    /// - `keys`: every cache key holding a copy of `value`
    /// - `ttl`: lifetime of the refreshed copies under `WriteThrough`
    /// - `persist`: async function writing the source of truth
    pub async fn write<T, PersistFut>(
        &self,
        cache: &HybridCache,
        keys: &[String],
        ttl: Duration,
        value: &T,
        persist: impl FnOnce(&T) -> PersistFut,
    ) -> Result<()>
    where
        T: Serialize,
        PersistFut: Future<Output = Result<()>>,
    {
        persist(value).await?;

        match self {
            Self::WriteAround => {
                cache.delete_many(keys).await;
            }

            Self::WriteThrough => {
                for key in keys {
                    if let Err(e) = cache.set(key, value, Some(ttl)).await {
                        tracing::warn!(key = %key, error = %e, "Failed to refresh cache, invalidating");
                        cache.delete(key).await;
                    }
                }
            }
        }

        Ok(())
    }
}
