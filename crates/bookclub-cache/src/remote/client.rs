//! Typed client for the remote tier.

use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;

use super::{KeyTtl, RedisStore, RemotePoolStats, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};

/// Remote cache client.
///
/// Whether the remote tier is used is decided once, when the client is
/// built: the configuration must enable it and the startup probe must
/// succeed. The decision never changes afterwards; a later outage makes
/// individual calls fail with [`CacheError::RemoteUnavailable`] instead.
#[derive(Clone)]
pub struct RemoteCacheClient {
    store: Option<Arc<dyn RemoteStore>>,
    default_ttl: Duration,
}

impl RemoteCacheClient {
    /// Build the Redis-backed client and run the startup probe.
    ///
    /// A failed probe or an unbuildable pool leaves the client disabled; it
    /// never aborts startup.
    pub async fn connect(config: &RemoteConfig) -> Self {
        if !config.enabled {
            tracing::info!("Remote cache disabled by configuration, using local tier only");
            return Self::disabled(config.default_ttl);
        }

        tracing::info!(endpoint = %config.endpoint(), "Connecting to Redis");

        let store = match RedisStore::new(config) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build Redis pool, using local tier only");
                return Self::disabled(config.default_ttl);
            }
        };

        let client = Self::probe(Arc::new(store), config.default_ttl).await;
        if client.is_enabled() && config.min_idle_conns > 0 {
            if let Some(store) = &client.store {
                if let Err(e) = store.warm_up(config.min_idle_conns).await {
                    tracing::warn!(error = %e, "Failed to pre-open idle Redis connections");
                }
            }
        }
        client
    }

    /// Wrap an arbitrary store, enabling it only if it answers the probe.
    pub async fn probe(store: Arc<dyn RemoteStore>, default_ttl: Duration) -> Self {
        match store.ping().await {
            Ok(()) => {
                tracing::info!("Remote cache probe succeeded");
                Self {
                    store: Some(store),
                    default_ttl,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote cache probe failed, using local tier only");
                Self::disabled(default_ttl)
            }
        }
    }

    /// A client whose every operation reports the tier as unavailable.
    #[must_use]
    pub const fn disabled(default_ttl: Duration) -> Self {
        Self {
            store: None,
            default_ttl,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn store(&self) -> Result<&Arc<dyn RemoteStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| CacheError::RemoteUnavailable("remote tier is disabled".to_string()))
    }

    // =========================================================================
    // KEY/VALUE
    // =========================================================================

    /// Serialize `value` as JSON and store it; `None` uses the default TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let store = self.store()?;
        let payload =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        store
            .set(key, &payload, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Serialize and store only if `key` is absent; returns whether it was written.
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let store = self.store()?;
        let payload =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        store
            .set_if_absent(key, &payload, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Store an already-encoded payload; `None` uses the default TTL.
    pub async fn set_raw(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.store()?
            .set(key, payload, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Fetch and decode a JSON value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let payload = self
            .get_raw(key)
            .await?
            .ok_or_else(|| CacheError::CacheMiss(key.to_string()))?;
        serde_json::from_slice(&payload).map_err(|e| CacheError::Deserialization(e.to_string()))
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store()?.get(key).await
    }

    /// Store several values at once, without expiry.
    pub async fn mset<T: Serialize>(&self, pairs: &[(String, T)]) -> Result<()> {
        let store = self.store()?;
        let encoded = pairs
            .iter()
            .map(|(key, value)| {
                serde_json::to_vec(value)
                    .map(|payload| (key.clone(), payload))
                    .map_err(|e| CacheError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        store.mset(&encoded).await
    }

    /// Fetch several values; absent or undecodable entries come back as `None`.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>> {
        let payloads = self.store()?.mget(keys).await?;
        Ok(payloads
            .into_iter()
            .zip(keys)
            .map(|(payload, key)| {
                payload.and_then(|bytes| match serde_json::from_slice(&bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!(key = %key, error = %e, "Failed to decode remote value");
                        None
                    }
                })
            })
            .collect())
    }

    pub async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.store()?.delete(keys).await
    }

    pub async fn exists(&self, keys: &[String]) -> Result<u64> {
        self.store()?.exists(keys).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.store()?.expire(key, ttl).await
    }

    pub async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.store()?.ttl(key).await
    }

    // =========================================================================
    // COUNTERS
    // =========================================================================

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1).await
    }

    pub async fn decr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, -1).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.store()?.incr_by(key, delta).await
    }

    // =========================================================================
    // SETS
    // =========================================================================

    pub async fn set_add<M: ToString>(&self, key: &str, members: &[M]) -> Result<u64> {
        let store = self.store()?;
        store.set_add(key, &to_strings(members)).await
    }

    /// Add members and set the expiry atomically.
    pub async fn set_add_expiring<M: ToString>(
        &self,
        key: &str,
        members: &[M],
        ttl: Duration,
    ) -> Result<u64> {
        let store = self.store()?;
        store.set_add_expiring(key, &to_strings(members), ttl).await
    }

    pub async fn set_remove<M: ToString>(&self, key: &str, members: &[M]) -> Result<u64> {
        let store = self.store()?;
        store.set_remove(key, &to_strings(members)).await
    }

    pub async fn set_is_member(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.store()?.set_is_member(key, &member.to_string()).await
    }

    pub async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.store()?.set_cardinality(key).await
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.store()?.set_members(key).await
    }

    // =========================================================================
    // SORTED SETS
    // =========================================================================

    /// Add or rescore `(score, member)` pairs; returns how many were new.
    pub async fn zadd<M: ToString>(&self, key: &str, members: &[(f64, M)]) -> Result<u64> {
        let store = self.store()?;
        let scored: Vec<(f64, String)> = members
            .iter()
            .map(|(score, member)| (*score, member.to_string()))
            .collect();
        store.zadd(key, &scored).await
    }

    /// Members scored within `min..=max`, ascending. Infinite bounds are open.
    pub async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.store()?.zrange_by_score(key, min, max).await
    }

    /// Top of the ranking: members `start..=stop` by descending score.
    pub async fn zrev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.store()?.zrev_range(key, start, stop).await
    }

    /// Pool snapshot, `None` when disabled or the backend has no pool.
    #[must_use]
    pub fn pool_stats(&self) -> Option<RemotePoolStats> {
        self.store.as_ref().and_then(|store| store.pool_stats())
    }
}

fn to_strings<M: ToString>(members: &[M]) -> Vec<String> {
    members.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemote;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Review {
        id: u64,
        tags: Vec<String>,
    }

    async fn enabled_client() -> (Arc<InMemoryRemote>, RemoteCacheClient) {
        let remote = Arc::new(InMemoryRemote::new());
        let client = RemoteCacheClient::probe(remote.clone(), Duration::from_secs(60)).await;
        (remote, client)
    }

    #[tokio::test]
    async fn test_disabled_client_rejects_everything() {
        let client = RemoteCacheClient::disabled(Duration::from_secs(60));
        assert!(!client.is_enabled());
        assert!(client.set("k", &1, None).await.unwrap_err().is_unavailable());
        assert!(client.get::<i64>("k").await.unwrap_err().is_unavailable());
        assert!(client.incr("k").await.unwrap_err().is_unavailable());
        assert!(client.set_add("s", &[1]).await.unwrap_err().is_unavailable());
        assert!(client.zadd("z", &[(1.0, 1)]).await.unwrap_err().is_unavailable());
        assert!(client.zrev_range("z", 0, -1).await.unwrap_err().is_unavailable());
        assert!(client.pool_stats().is_none());
    }

    #[tokio::test]
    async fn test_failed_probe_disables_for_good() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.set_available(false);
        let client = RemoteCacheClient::probe(remote.clone(), Duration::from_secs(60)).await;
        assert!(!client.is_enabled());

        // Recovery after startup does not re-enable the tier.
        remote.set_available(true);
        assert!(!client.is_enabled());
        assert!(client.get::<i64>("k").await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_outage_after_startup_fails_per_call() {
        let (remote, client) = enabled_client().await;
        remote.set_available(false);
        assert!(client.is_enabled());
        assert!(client.get::<i64>("k").await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_typed_round_trip_and_miss() {
        let (_, client) = enabled_client().await;
        let review = Review {
            id: 3,
            tags: vec!["scifi".to_string()],
        };
        client.set("review:3", &review, None).await.unwrap();
        assert_eq!(client.get::<Review>("review:3").await.unwrap(), review);
        assert!(client.get::<Review>("review:4").await.unwrap_err().is_miss());
        assert!(matches!(
            client.ttl("review:3").await.unwrap(),
            KeyTtl::Expiring(ttl) if ttl <= Duration::from_secs(60)
        ));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_deserialization_error() {
        let (_, client) = enabled_client().await;
        client.set("k", &"not a review", None).await.unwrap();
        assert!(matches!(
            client.get::<Review>("k").await,
            Err(CacheError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn test_counter_value_reads_back_as_json() {
        let (_, client) = enabled_client().await;
        assert_eq!(client.incr("likes").await.unwrap(), 1);
        assert_eq!(client.incr_by("likes", 9).await.unwrap(), 10);
        assert_eq!(client.decr("likes").await.unwrap(), 9);
        assert_eq!(client.get::<i64>("likes").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_mset_mget() {
        let (_, client) = enabled_client().await;
        client
            .mset(&[("a".to_string(), 1_i64), ("b".to_string(), 2)])
            .await
            .unwrap();
        let values: Vec<Option<i64>> = client
            .mget(&["a".to_string(), "x".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(1), None, Some(2)]);
        assert_eq!(client.ttl("a").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test]
    async fn test_set_membership_with_numeric_ids() {
        let (_, client) = enabled_client().await;
        assert_eq!(client.set_add("user:1:following", &[2_u64, 3]).await.unwrap(), 2);
        assert!(client.set_is_member("user:1:following", 2_u64).await.unwrap());
        assert!(!client.set_is_member("user:1:following", 4_u64).await.unwrap());
        assert_eq!(client.set_cardinality("user:1:following").await.unwrap(), 2);
        assert_eq!(client.set_remove("user:1:following", &[2_u64]).await.unwrap(), 1);
        assert_eq!(
            client.set_members("user:1:following").await.unwrap(),
            vec!["3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_expiring_set_load() {
        let (_, client) = enabled_client().await;
        let ttl = Duration::from_secs(30);
        assert_eq!(client.set_add_expiring("user:1:following", &[2_u64, 3], ttl).await.unwrap(), 2);
        assert!(matches!(
            client.ttl("user:1:following").await.unwrap(),
            KeyTtl::Expiring(left) if left <= ttl
        ));
    }

    #[tokio::test]
    async fn test_leaderboard() {
        let (_, client) = enabled_client().await;
        let reviews = [(12.0, 7_u64), (40.0, 3), (25.0, 9)];
        assert_eq!(client.zadd("board:reviews", &reviews).await.unwrap(), 3);

        assert_eq!(client.zrev_range("board:reviews", 0, 1).await.unwrap(), vec!["3", "9"]);
        assert_eq!(
            client.zrange_by_score("board:reviews", 20.0, f64::INFINITY).await.unwrap(),
            vec!["9", "3"]
        );
        assert!(client.zrev_range("board:none", 0, -1).await.unwrap().is_empty());
    }
}
