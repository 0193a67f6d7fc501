//! Follower counter cache.
//!
//! With the remote tier enabled the counter under `user:<id>:follower_count`
//! is the live value: it is seeded from the source once, then moved only by
//! atomic increments. Without it every change is a read-increment-write on
//! the source, which is not atomic across processes.

use std::sync::Arc;

use bookclub_domain::{UserId, keys};

use super::{FacadeTtl, UserSource};
use crate::error::Result;
use crate::hybrid::SharedHybridCache;

/// Follower counts per user.
pub struct CounterCache {
    cache: SharedHybridCache,
    source: Arc<dyn UserSource>,
    ttl: FacadeTtl,
}

impl CounterCache {
    pub fn new(cache: SharedHybridCache, source: Arc<dyn UserSource>) -> Self {
        Self {
            cache,
            source,
            ttl: FacadeTtl::default(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: FacadeTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current follower count.
    pub async fn follower_count(&self, id: UserId) -> Result<i64> {
        if !self.cache.is_remote_enabled() {
            return self.source.follower_count(id).await;
        }

        let key = keys::follower_count(id);
        match self.cache.remote().get::<i64>(&key).await {
            Ok(count) => return Ok(count),
            Err(e) if e.is_miss() => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Remote counter read failed, asking source");
            }
        }

        let count = self.source.follower_count(id).await?;
        if let Err(e) = self
            .cache
            .remote()
            .set_if_absent(&key, &count, Some(self.ttl.follower_count))
            .await
        {
            tracing::warn!(key = %key, error = %e, "Failed to seed remote counter");
        }
        Ok(count)
    }

    pub async fn increment_follower_count(&self, id: UserId) -> Result<i64> {
        self.adjust(id, 1).await
    }

    pub async fn decrement_follower_count(&self, id: UserId) -> Result<i64> {
        self.adjust(id, -1).await
    }

    /// Drop the remote counter so the next read reseeds from the source.
    pub async fn invalidate(&self, id: UserId) {
        self.cache.delete(&keys::follower_count(id)).await;
    }

    async fn adjust(&self, id: UserId, delta: i64) -> Result<i64> {
        let key = keys::follower_count(id);
        if self.cache.is_remote_enabled() {
            match self.adjust_remote(&key, id, delta).await {
                Ok(count) => {
                    // INCRBY has landed; its result is the live value whatever
                    // happens to the expiry refresh.
                    if let Err(e) = self.cache.expire(&key, self.ttl.follower_count).await {
                        tracing::warn!(key = %key, error = %e, "Failed to refresh counter expiry");
                    }
                    return Ok(count);
                }
                Err(e) => {
                    tracing::warn!(user_id = id, error = %e, "Remote counter update failed, updating source");
                }
            }
        }

        let count = self.source.follower_count(id).await? + delta;
        self.source.set_follower_count(id, count).await?;
        if self.cache.is_remote_enabled() {
            // A seeded counter no longer matches the source.
            self.cache.delete(&key).await;
        }
        Ok(count)
    }

    /// Seed the remote counter if needed, then apply `delta` atomically.
    async fn adjust_remote(&self, key: &str, id: UserId, delta: i64) -> Result<i64> {
        let remote = self.cache.remote();

        if remote.exists(&[key.to_string()]).await? == 0 {
            // NX: a concurrent seeder or incrementer may already have won.
            let seed = self.source.follower_count(id).await?;
            remote
                .set_if_absent(key, &seed, Some(self.ttl.follower_count))
                .await?;
        }

        self.cache.incr_by(key, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::source::fakes::MemoryUsers;
    use crate::hybrid::HybridCache;
    use crate::local::LocalStore;
    use crate::remote::{InMemoryRemote, RemoteCacheClient, RemoteStore};
    use bookclub_domain::UserProfile;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(3600);

    fn alice_with(followers: i64) -> UserProfile {
        let mut alice = UserProfile::new(42, "alice");
        alice.follower_count = followers;
        alice
    }

    async fn setup(remote_enabled: bool) -> (Arc<MemoryUsers>, Arc<InMemoryRemote>, Arc<CounterCache>) {
        let users = Arc::new(MemoryUsers::with([alice_with(10)]));
        let remote = Arc::new(InMemoryRemote::new());
        let client = if remote_enabled {
            RemoteCacheClient::probe(remote.clone(), TTL).await
        } else {
            RemoteCacheClient::disabled(TTL)
        };
        let cache = HybridCache::new(LocalStore::new(64), client, TTL).into_shared();
        (users.clone(), remote, Arc::new(CounterCache::new(cache, users)))
    }

    #[tokio::test]
    async fn test_remote_counter_seeded_from_source() {
        let (users, _, counters) = setup(true).await;
        assert_eq!(counters.follower_count(42).await.unwrap(), 10);
        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 11);
        assert_eq!(counters.follower_count(42).await.unwrap(), 11);
        assert_eq!(users.reads(), 1);
        // Source of truth is not written while the remote counter is live
        assert_eq!(users.stored(42).unwrap().follower_count, 10);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (_, _, counters) = setup(true).await;
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let counters = counters.clone();
                tokio::spawn(async move { counters.increment_follower_count(42).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(counters.follower_count(42).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_counter_never_enters_local_tier() {
        let (_, _, counters) = setup(true).await;
        counters.increment_follower_count(42).await.unwrap();
        assert!(counters.cache.local().is_empty());
    }

    #[tokio::test]
    async fn test_local_only_writes_source() {
        let (users, remote, counters) = setup(false).await;
        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 11);
        assert_eq!(counters.decrement_follower_count(42).await.unwrap(), 10);
        assert_eq!(counters.decrement_follower_count(42).await.unwrap(), 9);
        assert_eq!(users.stored(42).unwrap().follower_count, 9);
        assert_eq!(counters.follower_count(42).await.unwrap(), 9);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_outage_falls_back_to_source() {
        let (users, remote, counters) = setup(true).await;
        remote.set_available(false);
        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 11);
        assert_eq!(users.stored(42).unwrap().follower_count, 11);
        assert_eq!(counters.follower_count(42).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_invalidate_reseeds() {
        let (users, _, counters) = setup(true).await;
        counters.increment_follower_count(42).await.unwrap();
        counters.invalidate(42).await;
        users.set_follower_count(42, 99).await.unwrap();
        assert_eq!(counters.follower_count(42).await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_lost_expiry_refresh_keeps_remote_count() {
        let (users, remote, counters) = setup(true).await;
        remote.fail_command("pexpire");

        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 11);
        assert_eq!(remote.get("user:42:follower_count").await.unwrap(), Some(b"11".to_vec()));
        assert_eq!(users.stored(42).unwrap().follower_count, 10);

        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 12);
        assert_eq!(users.stored(42).unwrap().follower_count, 10);
    }

    #[tokio::test]
    async fn test_failed_increment_updates_source_once() {
        let (users, remote, counters) = setup(true).await;
        remote.fail_command("incrby");

        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 11);
        assert_eq!(users.stored(42).unwrap().follower_count, 11);

        // The seeded remote copy was dropped, so the next read reseeds
        remote.restore_command("incrby");
        assert_eq!(remote.get("user:42:follower_count").await.unwrap(), None);
        assert_eq!(counters.follower_count(42).await.unwrap(), 11);
        assert_eq!(counters.increment_follower_count(42).await.unwrap(), 12);
    }
}
