//! # BookClub Domain Model
//!
//! Entity snapshots and cache key conventions shared by the cache
//! subsystem and the services that call into it. These types are what gets
//! serialized into both cache tiers, so their serde shape is the cache
//! payload format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user identifier as issued by the relational store.
pub type UserId = u64;

// =============================================================================
// ENTITIES
// =============================================================================

/// Cached snapshot of a user's public profile.
///
/// This is deliberately flat: counters are copied in at read time and may lag
/// the live counter keys by up to the profile TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Minimal profile with zeroed counters, stamped now.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            avatar_url: None,
            signature: None,
            follower_count: 0,
            following_count: 0,
            review_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cache keys that hold a copy of this profile.
    #[must_use]
    pub fn cache_keys(&self) -> Vec<String> {
        vec![keys::user(self.id), keys::user_by_name(&self.username)]
    }
}

// =============================================================================
// KEY NAMESPACE
// =============================================================================

/// Key builders for the flat `entity-type:id[:sub-resource]` namespace.
///
/// Every logical resource has exactly one builder here; callers should never
/// format cache keys by hand.
pub mod keys {
    use super::UserId;

    /// `user:<id>` - profile snapshot.
    #[must_use]
    pub fn user(id: UserId) -> String {
        format!("user:{id}")
    }

    /// `user:name:<username>` - profile snapshot looked up by username.
    #[must_use]
    pub fn user_by_name(username: &str) -> String {
        format!("user:name:{username}")
    }

    /// `user:<id>:follower_count` - atomic counter.
    #[must_use]
    pub fn follower_count(id: UserId) -> String {
        format!("user:{id}:follower_count")
    }

    /// `user:<id>:following` - set of followed user ids.
    #[must_use]
    pub fn following(id: UserId) -> String {
        format!("user:{id}:following")
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Check that a username is usable as a key segment.
///
/// # Errors
///
/// Returns [`DomainError::InvalidUsername`] for empty names, names containing
/// whitespace, or names containing the `:` segment separator.
pub fn validate_username(username: &str) -> Result<(), DomainError> {
    if username.is_empty() {
        return Err(DomainError::InvalidUsername("username is empty".to_string()));
    }
    if username.contains(':') || username.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidUsername(format!(
            "'{username}' contains a reserved character"
        )));
    }
    Ok(())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
}
