//! # Strategy Module
//!
//! Enum-based cache/source access strategies used by the domain facades.
//!
//! ## Available Strategies
//!
//! ### Read Strategies
//! - `CacheFirst` - Check both tiers, fall back to the source on miss (default)
//! - `SourceOnly` - Skip the cache entirely
//! - `CacheOnly` - Never hit the source
//!
//! ### Write Strategies
//! - `WriteAround` - Write the source, invalidate cached copies (default)
//! - `WriteThrough` - Write the source, then refresh cached copies
//!
//! ## Example
//!
//! ```rust,ignore
//! use bookclub_cache::strategy::ReadStrategy;
//!
//! let profile = ReadStrategy::CacheFirst
//!     .read(&cache, &keys::user(42), Duration::from_secs(900), || source.find_by_id(42))
//!     .await?;
//! ```

pub mod read_strategy;
pub mod write_strategy;

pub use read_strategy::ReadStrategy;
pub use write_strategy::WriteStrategy;
