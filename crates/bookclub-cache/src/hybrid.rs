//! # Hybrid Coordinator
//!
//! Two-tier cache: the local store answers first, the remote tier second.
//!
//! ```text
//! get ─► LocalStore ──hit──► value
//!            │ miss
//!            ▼
//!       RemoteCacheClient ──hit──► backfill local (backfill TTL) ─► value
//!            │ miss / error / disabled
//!            ▼
//!        CacheMiss  (caller falls back to the source of truth)
//! ```
//!
//! Writes are local-authoritative: the remote write is attempted first but
//! its failure is only logged, and the local write always happens.

use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::local::LocalStore;
use crate::metrics::{self, Tier};
use crate::remote::{KeyTtl, RemoteCacheClient, RemotePoolStats};

/// Hit/miss bookkeeping. Every event goes to the metrics recorder and to
/// the per-instance totals reported through [`CacheStats`].
#[derive(Debug, Default)]
struct Counters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_errors: AtomicU64,
}

impl Counters {
    fn hit(&self, tier: Tier) {
        let counter = match tier {
            Tier::Local => &self.local_hits,
            Tier::Remote => &self.remote_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit(tier);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
    }

    fn remote_error(&self, op: &'static str) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_remote_error(op);
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            local_hits: self.local_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    /// Remote calls that failed and were degraded to local-only behaviour
    pub remote_errors: u64,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub remote_enabled: bool,
    pub local_entry_count: usize,
    pub local_capacity: usize,
    pub local_evictions: u64,
    pub remote_pool: Option<RemotePoolStats>,
    pub counters: CounterSnapshot,
}

/// Local + remote cache coordinator.
pub struct HybridCache {
    local: Arc<LocalStore>,
    remote: RemoteCacheClient,
    backfill_ttl: Duration,
    counters: Counters,
    sweeper: Option<JoinHandle<()>>,
}

/// Shared coordinator handle
pub type SharedHybridCache = Arc<HybridCache>;

impl HybridCache {
    /// Build both tiers from configuration.
    ///
    /// The remote tier is probed once here; if the probe fails the
    /// coordinator runs local-only for its whole lifetime. Starts the
    /// expiry sweeper when `sweep_interval` is set, which requires a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if the configuration fails
    /// validation. Remote connectivity problems are never an error here.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let remote = RemoteCacheClient::connect(&config.remote).await;
        let mut cache = Self::new(
            LocalStore::new(config.local_capacity),
            remote,
            config.backfill_ttl,
        );
        if let Some(every) = config.sweep_interval {
            cache.start_sweeper(every);
        }

        tracing::info!(
            remote_enabled = cache.is_remote_enabled(),
            local_capacity = config.local_capacity,
            "Hybrid cache initialized"
        );
        Ok(cache)
    }

    /// Assemble a coordinator from already-built tiers.
    pub fn new(local: LocalStore, remote: RemoteCacheClient, backfill_ttl: Duration) -> Self {
        Self {
            local: Arc::new(local),
            remote,
            backfill_ttl,
            counters: Counters::default(),
            sweeper: None,
        }
    }

    /// Start (or restart) the periodic expiry sweep of the local tier.
    pub fn start_sweeper(&mut self, every: Duration) {
        if let Some(previous) = self.sweeper.take() {
            previous.abort();
        }
        self.sweeper = Some(self.local.spawn_sweeper(every));
    }

    #[must_use]
    pub fn into_shared(self) -> SharedHybridCache {
        Arc::new(self)
    }

    #[must_use]
    pub const fn is_remote_enabled(&self) -> bool {
        self.remote.is_enabled()
    }

    /// Direct access to the remote tier, for operations with no local
    /// counterpart.
    #[must_use]
    pub const fn remote(&self) -> &RemoteCacheClient {
        &self.remote
    }

    #[must_use]
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    // =========================================================================
    // KEY/VALUE
    // =========================================================================

    /// Read through both tiers.
    ///
    /// # Errors
    ///
    /// [`CacheError::CacheMiss`] when neither tier has a usable value, remote
    /// failures included. [`CacheError::Deserialization`] when a cached
    /// payload does not decode as `T`; the local copy is dropped.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        if let Some(payload) = self.local.get(key) {
            return match serde_json::from_slice(&payload) {
                Ok(value) => {
                    self.counters.hit(Tier::Local);
                    tracing::debug!(key = %key, "cache hit (local)");
                    Ok(value)
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to decode local cache entry");
                    self.local.delete(key);
                    Err(CacheError::Deserialization(e.to_string()))
                }
            };
        }

        if !self.remote.is_enabled() {
            return Err(self.miss(key));
        }

        match self.remote.get_raw(key).await {
            Ok(Some(payload)) => match serde_json::from_slice(&payload) {
                Ok(value) => {
                    self.counters.hit(Tier::Remote);
                    tracing::debug!(key = %key, "cache hit (remote), backfilling local");
                    self.local.set(key, payload, self.backfill_ttl);
                    Ok(value)
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to decode remote cache entry");
                    Err(CacheError::Deserialization(e.to_string()))
                }
            },
            Ok(None) => Err(self.miss(key)),
            Err(e) => {
                self.counters.remote_error("get");
                tracing::warn!(key = %key, error = %e, "Remote cache get failed, treating as miss");
                Err(self.miss(key))
            }
        }
    }

    fn miss(&self, key: &str) -> CacheError {
        self.counters.miss();
        tracing::debug!(key = %key, "cache miss");
        CacheError::CacheMiss(key.to_string())
    }

    /// Write `value` to both tiers; `None` uses the remote default TTL.
    ///
    /// A remote failure is logged and counted but does not fail the call:
    /// the local tier always receives the value.
    ///
    /// # Errors
    ///
    /// Only [`CacheError::Serialization`], before either tier is touched.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value).map_err(|e| {
            tracing::error!(key = %key, error = %e, "Failed to encode cache value");
            CacheError::Serialization(e.to_string())
        })?;
        let ttl = ttl.unwrap_or_else(|| self.remote.default_ttl());

        if self.remote.is_enabled() {
            if let Err(e) = self.remote.set_raw(key, &payload, Some(ttl)).await {
                self.counters.remote_error("set");
                tracing::warn!(key = %key, error = %e, "Remote cache set failed, caching locally only");
            }
        }

        self.local.set(key, payload, ttl);
        tracing::debug!(key = %key, ttl_ms = ttl.as_millis(), "cache set");
        Ok(())
    }

    /// Best-effort removal from both tiers. Never fails.
    pub async fn delete(&self, key: &str) {
        self.delete_many(&[key.to_string()]).await;
    }

    /// Best-effort removal of several keys from both tiers. Never fails.
    pub async fn delete_many(&self, keys: &[String]) {
        for key in keys {
            self.local.delete(key);
        }
        if self.remote.is_enabled() {
            if let Err(e) = self.remote.delete(keys).await {
                self.counters.remote_error("delete");
                tracing::warn!(keys = ?keys, error = %e, "Remote cache delete failed");
            }
        }
    }

    /// Local first, then remote; remote errors read as absent.
    pub async fn exists(&self, key: &str) -> bool {
        if self.local.contains(key) {
            return true;
        }
        if !self.remote.is_enabled() {
            return false;
        }
        match self.remote.exists(&[key.to_string()]).await {
            Ok(count) => count > 0,
            Err(e) => {
                self.counters.remote_error("exists");
                tracing::warn!(key = %key, error = %e, "Remote cache exists failed");
                false
            }
        }
    }

    // =========================================================================
    // REMOTE-ONLY OPERATIONS
    // =========================================================================
    //
    // Counters, sets and sorted sets live only in the remote tier: the
    // local tier cannot make them atomic across processes.

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.remote.incr(key).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        self.remote.decr(key).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.remote.incr_by(key, delta).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.remote.expire(key, ttl).await
    }

    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.remote.ttl(key).await
    }

    pub async fn set_add<M: ToString>(&self, key: &str, members: &[M]) -> Result<u64> {
        self.remote.set_add(key, members).await
    }

    pub async fn set_add_expiring<M: ToString>(
        &self,
        key: &str,
        members: &[M],
        ttl: Duration,
    ) -> Result<u64> {
        self.remote.set_add_expiring(key, members, ttl).await
    }

    pub async fn set_remove<M: ToString>(&self, key: &str, members: &[M]) -> Result<u64> {
        self.remote.set_remove(key, members).await
    }

    pub async fn set_is_member(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.remote.set_is_member(key, member).await
    }

    pub async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.remote.set_cardinality(key).await
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.remote.set_members(key).await
    }

    pub async fn zadd<M: ToString>(&self, key: &str, members: &[(f64, M)]) -> Result<u64> {
        self.remote.zadd(key, members).await
    }

    pub async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.remote.zrange_by_score(key, min, max).await
    }

    pub async fn zrev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.remote.zrev_range(key, start, stop).await
    }

    // =========================================================================
    // STATS
    // =========================================================================

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            remote_enabled: self.remote.is_enabled(),
            local_entry_count: self.local.len(),
            local_capacity: self.local.capacity(),
            local_evictions: self.local.evictions(),
            remote_pool: self.remote.pool_stats(),
            counters: self.counters.snapshot(),
        }
    }
}

impl Drop for HybridCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}
