//! User profile cache.

use std::sync::Arc;

use bookclub_domain::{UserId, UserProfile, keys, validate_username};

use super::{FacadeTtl, UserSource};
use crate::error::Result;
use crate::hybrid::SharedHybridCache;
use crate::strategy::{ReadStrategy, WriteStrategy};

/// Cached access to user profiles by id and by username.
pub struct UserCache {
    cache: SharedHybridCache,
    source: Arc<dyn UserSource>,
    ttl: FacadeTtl,
    read_strategy: ReadStrategy,
    write_strategy: WriteStrategy,
}

impl UserCache {
    /// Create a user cache with default strategies and TTLs.
    pub fn new(cache: SharedHybridCache, source: Arc<dyn UserSource>) -> Self {
        Self::with_strategies(
            cache,
            source,
            ReadStrategy::CacheFirst,
            WriteStrategy::WriteAround,
        )
    }

    /// Create with custom strategies.
    pub fn with_strategies(
        cache: SharedHybridCache,
        source: Arc<dyn UserSource>,
        read_strategy: ReadStrategy,
        write_strategy: WriteStrategy,
    ) -> Self {
        Self {
            cache,
            source,
            ttl: FacadeTtl::default(),
            read_strategy,
            write_strategy,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: FacadeTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set read strategy.
    pub fn set_read_strategy(&mut self, strategy: ReadStrategy) {
        self.read_strategy = strategy;
    }

    /// Set write strategy.
    pub fn set_write_strategy(&mut self, strategy: WriteStrategy) {
        self.write_strategy = strategy;
    }

    /// Profile by id, cached under `user:<id>`.
    pub async fn get_by_id(&self, id: UserId) -> Result<UserProfile> {
        self.read_strategy
            .read(&self.cache, &keys::user(id), self.ttl.user_profile, || {
                self.source.find_by_id(id)
            })
            .await
    }

    /// Profile by username, cached under `user:name:<username>`.
    pub async fn get_by_username(&self, username: &str) -> Result<UserProfile> {
        validate_username(username)?;
        self.read_strategy
            .read(
                &self.cache,
                &keys::user_by_name(username),
                self.ttl.username_lookup,
                || self.source.find_by_username(username),
            )
            .await
    }

    /// Persist `profile`, then invalidate or refresh its cached copies.
    ///
    /// A rename also drops the lookup key of the previous username when
    /// the old profile is still cached.
    pub async fn update_profile(&self, profile: &UserProfile) -> Result<()> {
        validate_username(&profile.username)?;

        let previous_name = match self.cache.get::<UserProfile>(&keys::user(profile.id)).await {
            Ok(cached) if cached.username != profile.username => Some(cached.username),
            _ => None,
        };

        self.write_strategy
            .write(
                &self.cache,
                &profile.cache_keys(),
                self.ttl.user_profile,
                profile,
                |_| self.source.update_profile(profile),
            )
            .await?;

        if let Some(name) = previous_name {
            tracing::debug!(user_id = profile.id, old = %name, "Dropping renamed username lookup");
            self.cache.delete(&keys::user_by_name(&name)).await;
        }
        Ok(())
    }

    /// Drop every cached copy of the user. Never fails.
    pub async fn invalidate(&self, id: UserId, username: &str) {
        self.cache
            .delete_many(&[keys::user(id), keys::user_by_name(username)])
            .await;
    }
}
