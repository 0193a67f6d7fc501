//! # BookClub Cache Library
//!
//! Two-tier cache for the BookClub backend: a bounded in-process LRU in
//! front of a shared Redis tier, plus entity facades that fall back to the
//! relational store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Cache Facades                      │
//! │          (UserCache, FollowCache, CounterCache)              │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │      HybridCache        │   │   UserSource / FollowSource  │
//! │  (read/write strategy)  │   │      (source of truth)       │
//! └─────────────────────────┘   └──────────────────────────────┘
//!        │            │
//!        ▼            ▼
//! ┌────────────┐ ┌──────────────────┐
//! │ LocalStore │ │ RemoteCacheClient│
//! │ (LRU, TTL) │ │ (deadpool-redis) │
//! └────────────┘ └──────────────────┘
//! ```
//!
//! The remote tier is optional. It is probed once at startup; if disabled
//! or unreachable, the coordinator serves from the local tier alone and
//! counters and relationship sets fall through to the source of truth.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bookclub_cache::{CacheConfig, HybridCache, UserCache};
//!
//! let cache = HybridCache::connect(&CacheConfig::from_env()).await?.into_shared();
//! let users = UserCache::new(cache.clone(), Arc::new(PgUserSource::new(pool)));
//!
//! let profile = users.get_by_id(42).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod facade;
pub mod hybrid;
pub mod local;
pub mod metrics;
pub mod remote;
pub mod strategy;

// Re-export commonly used types
pub use config::{CacheConfig, RemoteConfig};
pub use error::{CacheError, Result};
pub use facade::{CounterCache, FacadeTtl, FollowCache, FollowSource, UserCache, UserSource};
pub use hybrid::{CacheStats, CounterSnapshot, HybridCache, SharedHybridCache};
pub use local::LocalStore;
pub use remote::{KeyTtl, RemoteCacheClient, RemotePoolStats, RemoteStore};
pub use strategy::{ReadStrategy, WriteStrategy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a shared coordinator from environment configuration.
///
/// # Errors
///
/// Returns [`CacheError::InvalidConfig`] if the environment describes an
/// unusable configuration. An unreachable Redis is not an error.
pub async fn init_from_env() -> Result<SharedHybridCache> {
    let config = CacheConfig::from_env();
    Ok(HybridCache::connect(&config).await?.into_shared())
}
