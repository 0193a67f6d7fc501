//! # Remote Tier
//!
//! Shared, network-accessible cache reached through the [`RemoteStore`]
//! seam. [`RemoteCacheClient`] adds typed (serde) access and the
//! enabled/disabled decision taken once at startup.

pub mod client;
pub mod memory;
pub mod redis_client;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::Result;

pub use client::RemoteCacheClient;
pub use memory::InMemoryRemote;
pub use redis_client::RedisStore;

/// Remaining lifetime of a remote key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key exists and expires after the given duration
    Expiring(Duration),
    /// Key exists without an expiry
    Persistent,
    /// Key does not exist
    Missing,
}

impl KeyTtl {
    /// Decode a `PTTL` reply (`-2` missing, `-1` persistent).
    #[must_use]
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => Self::Missing,
            ms if ms < 0 => Self::Persistent,
            ms => Self::Expiring(Duration::from_millis(ms.unsigned_abs())),
        }
    }
}

/// Connection pool snapshot. Opaque to the coordinator; reported by `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemotePoolStats {
    pub max_size: u64,
    pub size: u64,
    pub available: u64,
    pub waiting: u64,
}

/// Byte-level operations of the remote cache service.
///
/// Every call may fail on its own; implementations surface connectivity
/// problems and deadline expiry as `CacheError::RemoteUnavailable`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;

    /// Open up to `connections` connections ahead of demand.
    async fn warm_up(&self, _connections: usize) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()>;

    /// Store only if `key` is absent; returns whether the write happened.
    async fn set_if_absent(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<bool>;

    /// Store several payloads without expiry.
    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Returns how many of `keys` exist.
    async fn exists(&self, keys: &[String]) -> Result<u64>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Atomically add `delta`, creating the counter at zero.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64>;

    /// Add `members` and set the key's expiry in one atomic step, so the set
    /// is never visible without a TTL.
    async fn set_add_expiring(&self, key: &str, members: &[String], ttl: Duration) -> Result<u64>;

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool>;

    async fn set_cardinality(&self, key: &str) -> Result<u64>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Add or rescore sorted-set members; returns how many were new.
    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64>;

    /// Members scored within `min..=max`, lowest score first.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Members ranked `start..=stop` by descending score. Negative indexes
    /// count from the lowest-ranked member.
    async fn zrev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    fn pool_stats(&self) -> Option<RemotePoolStats> {
        None
    }
}

/// TTL in whole milliseconds, never below one.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pttl_decoding() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(1500),
            KeyTtl::Expiring(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_ttl_millis_floor() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
