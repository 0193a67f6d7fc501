//! Follow relationship cache.
//!
//! The set of ids a user follows is kept as a remote set under
//! `user:<id>:following`, loaded from the source on first use. Mutations go
//! to the source and drop the set; the next read reloads it.

use std::sync::Arc;

use bookclub_domain::{UserId, keys};

use super::{FacadeTtl, FollowSource};
use crate::error::Result;
use crate::hybrid::SharedHybridCache;

/// Cached follow graph lookups.
pub struct FollowCache {
    cache: SharedHybridCache,
    source: Arc<dyn FollowSource>,
    ttl: FacadeTtl,
}

impl FollowCache {
    pub fn new(cache: SharedHybridCache, source: Arc<dyn FollowSource>) -> Self {
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

    /// Record the relationship, then drop the cached set.
    pub async fn follow(&self, user: UserId, target: UserId) -> Result<()> {
        self.source.follow(user, target).await?;
        self.invalidate(user).await;
        Ok(())
    }

    /// Remove the relationship, then drop the cached set.
    pub async fn unfollow(&self, user: UserId, target: UserId) -> Result<()> {
        self.source.unfollow(user, target).await?;
        self.invalidate(user).await;
        Ok(())
    }

    pub async fn is_following(&self, user: UserId, target: UserId) -> Result<bool> {
        if let Some(key) = self.materialize(user).await {
            match self.cache.set_is_member(&key, target).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Remote set lookup failed, asking source");
                }
            }
        }
        self.source.is_following(user, target).await
    }

    pub async fn following_count(&self, user: UserId) -> Result<u64> {
        if let Some(key) = self.materialize(user).await {
            match self.cache.set_cardinality(&key).await {
                Ok(count) => return Ok(count),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Remote set count failed, asking source");
                }
            }
        }
        Ok(self.source.following(user).await?.len() as u64)
    }

    /// Ids `user` follows, in no particular order.
    pub async fn following(&self, user: UserId) -> Result<Vec<UserId>> {
        if let Some(key) = self.materialize(user).await {
            match self.cache.set_members(&key).await {
                Ok(members) => {
                    return Ok(members
                        .iter()
                        .filter_map(|member| match member.parse() {
                            Ok(id) => Some(id),
                            Err(_) => {
                                tracing::warn!(key = %key, member = %member, "Skipping non-numeric set member");
                                None
                            }
                        })
                        .collect());
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Remote set read failed, asking source");
                }
            }
        }
        self.source.following(user).await
    }

    /// Drop the cached set. Never fails.
    pub async fn invalidate(&self, user: UserId) {
        self.cache.delete(&keys::following(user)).await;
    }

    /// Make sure the remote set for `user` exists, loading it if needed.
    ///
    /// Returns the key when the set can be served remotely. An empty
    /// following list cannot be stored as a set, so it is always served by
    /// the source.
    async fn materialize(&self, user: UserId) -> Option<String> {
        if !self.cache.is_remote_enabled() {
            return None;
        }
        let key = keys::following(user);

        match self.cache.remote().exists(std::slice::from_ref(&key)).await {
            Ok(count) if count > 0 => return Some(key),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Remote exists failed");
                return None;
            }
        }

        let ids = match self.source.following(user).await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(user_id = user, error = %e, "Failed to load following list");
                return None;
            }
        };

        match self
            .cache
            .set_add_expiring(&key, &ids, self.ttl.following_set)
            .await
        {
            Ok(_) => {
                tracing::debug!(key = %key, members = ids.len(), "Loaded following set");
                Some(key)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to load following set");
                // The reply may have been lost after the set was written.
                self.cache.delete(&key).await;
                None
            }
        }
    }
}
