//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bookclub_cache::remote::InMemoryRemote;
use bookclub_cache::{
    CacheError, HybridCache, LocalStore, RemoteCacheClient, Result, SharedHybridCache, UserSource,
};
use bookclub_domain::{UserId, UserProfile};

pub const BACKFILL_TTL: Duration = Duration::from_secs(3600);

/// Coordinator over a fresh in-memory remote tier.
pub async fn hybrid(capacity: usize) -> (Arc<InMemoryRemote>, SharedHybridCache) {
    let remote = Arc::new(InMemoryRemote::new());
    let client = RemoteCacheClient::probe(remote.clone(), BACKFILL_TTL).await;
    assert!(client.is_enabled());
    let cache = HybridCache::new(LocalStore::new(capacity), client, BACKFILL_TTL);
    (remote, cache.into_shared())
}

/// User table kept in memory.
#[derive(Default)]
pub struct UserTable {
    rows: Mutex<HashMap<UserId, UserProfile>>,
    reads: AtomicUsize,
}

impl UserTable {
    pub fn seeded(profiles: impl IntoIterator<Item = UserProfile>) -> Arc<Self> {
        let table = Self::default();
        table
            .rows
            .lock()
            .extend(profiles.into_iter().map(|p| (p.id, p)));
        Arc::new(table)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn row(&self, id: UserId) -> Result<UserProfile> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| CacheError::not_found("user", id.to_string()))
    }
}

#[async_trait]
impl UserSource for UserTable {
    async fn find_by_id(&self, id: UserId) -> Result<UserProfile> {
        self.row(id)
    }

    async fn find_by_username(&self, username: &str) -> Result<UserProfile> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .values()
            .find(|p| p.username == username)
            .cloned()
            .ok_or_else(|| CacheError::not_found("user", username))
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<()> {
        self.rows.lock().insert(profile.id, profile.clone());
        Ok(())
    }

    async fn follower_count(&self, id: UserId) -> Result<i64> {
        self.row(id).map(|p| p.follower_count)
    }

    async fn set_follower_count(&self, id: UserId, count: i64) -> Result<()> {
        self.rows
            .lock()
            .get_mut(&id)
            .map(|p| p.follower_count = count)
            .ok_or_else(|| CacheError::not_found("user", id.to_string()))
    }
}
