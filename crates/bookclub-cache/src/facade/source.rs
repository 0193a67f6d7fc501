//! # Source-of-Truth Traits
//!
//! Interfaces to the relational store, implemented outside this crate.
//! The cache never writes through these; facades do, then invalidate.

use async_trait::async_trait;

use crate::error::Result;
use bookclub_domain::{UserId, UserProfile};

// =============================================================================
// USER SOURCE
// =============================================================================

/// Canonical user records
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Get user by ID, `CacheError::NotFound` if absent
    async fn find_by_id(&self, id: UserId) -> Result<UserProfile>;

    /// Get user by username, `CacheError::NotFound` if absent
    async fn find_by_username(&self, username: &str) -> Result<UserProfile>;

    /// Persist profile changes
    async fn update_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Current follower count column
    async fn follower_count(&self, id: UserId) -> Result<i64>;

    /// Overwrite the follower count column
    async fn set_follower_count(&self, id: UserId, count: i64) -> Result<()>;
}

// =============================================================================
// FOLLOW SOURCE
// =============================================================================

/// Canonical follow relationships
#[async_trait]
pub trait FollowSource: Send + Sync {
    /// Record that `user` follows `target`
    async fn follow(&self, user: UserId, target: UserId) -> Result<()>;

    /// Remove the relationship, no-op if absent
    async fn unfollow(&self, user: UserId, target: UserId) -> Result<()>;

    async fn is_following(&self, user: UserId, target: UserId) -> Result<bool>;

    /// Ids `user` follows
    async fn following(&self, user: UserId) -> Result<Vec<UserId>>;
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory sources that count how often they are consulted.

    use super::*;
    use crate::error::CacheError;
    use parking_lot::Mutex;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct MemoryUsers {
        users: Mutex<HashMap<UserId, UserProfile>>,
        pub reads: AtomicUsize,
        pub writes: AtomicUsize,
    }

    impl MemoryUsers {
        pub fn with(profiles: impl IntoIterator<Item = UserProfile>) -> Self {
            let users = Self::default();
            for profile in profiles {
                users.users.lock().insert(profile.id, profile);
            }
            users
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn stored(&self, id: UserId) -> Option<UserProfile> {
            self.users.lock().get(&id).cloned()
        }
    }

    #[async_trait]
    impl UserSource for MemoryUsers {
        async fn find_by_id(&self, id: UserId) -> Result<UserProfile> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.stored(id)
                .ok_or_else(|| CacheError::not_found("user", id.to_string()))
        }

        async fn find_by_username(&self, username: &str) -> Result<UserProfile> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.users
                .lock()
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or_else(|| CacheError::not_found("user", username))
        }

        async fn update_profile(&self, profile: &UserProfile) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.users.lock().insert(profile.id, profile.clone());
            Ok(())
        }

        async fn follower_count(&self, id: UserId) -> Result<i64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.stored(id)
                .map(|u| u.follower_count)
                .ok_or_else(|| CacheError::not_found("user", id.to_string()))
        }

        async fn set_follower_count(&self, id: UserId, count: i64) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut users = self.users.lock();
            let user = users
                .get_mut(&id)
                .ok_or_else(|| CacheError::not_found("user", id.to_string()))?;
            user.follower_count = count;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryFollows {
        edges: Mutex<BTreeSet<(UserId, UserId)>>,
        pub reads: AtomicUsize,
    }

    impl MemoryFollows {
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FollowSource for MemoryFollows {
        async fn follow(&self, user: UserId, target: UserId) -> Result<()> {
            self.edges.lock().insert((user, target));
            Ok(())
        }

        async fn unfollow(&self, user: UserId, target: UserId) -> Result<()> {
            self.edges.lock().remove(&(user, target));
            Ok(())
        }

        async fn is_following(&self, user: UserId, target: UserId) -> Result<bool> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.edges.lock().contains(&(user, target)))
        }

        async fn following(&self, user: UserId) -> Result<Vec<UserId>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .edges
                .lock()
                .iter()
                .filter(|(from, _)| *from == user)
                .map(|(_, to)| *to)
                .collect())
        }
    }
}
