//! # Domain Cache Facades
//!
//! Entity-specific helpers built on the hybrid coordinator. Each facade
//! owns its key conventions (from [`bookclub_domain::keys`]) and TTLs, and
//! follows one pattern:
//!
//! ```text
//! read:    coordinator get ─hit─► value
//!               │ miss
//!               ▼
//!          source of truth ─► coordinator set (facade TTL) ─► value
//!
//! write:   source of truth ─► invalidate (or refresh) cached copies
//! ```
//!
//! Counters and relationship sets are remote-only: they are never held in
//! the per-process tier, where concurrent increments would diverge.

pub mod counter;
pub mod follow;
pub mod source;
pub mod user;

use std::time::Duration;

pub use counter::CounterCache;
pub use follow::FollowCache;
pub use source::{FollowSource, UserSource};
pub use user::UserCache;

/// Facade TTL configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacadeTtl {
    pub user_profile: Duration,
    pub username_lookup: Duration,
    pub follower_count: Duration,
    pub following_set: Duration,
}

impl Default for FacadeTtl {
    fn default() -> Self {
        Self {
            user_profile: Duration::from_secs(15 * 60),
            username_lookup: Duration::from_secs(10 * 60),
            follower_count: Duration::from_secs(30 * 60),
            following_set: Duration::from_secs(30 * 60),
        }
    }
}
