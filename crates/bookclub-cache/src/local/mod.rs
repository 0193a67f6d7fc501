//! # Local Tier
//!
//! In-process, fixed-capacity cache of serialized payloads.

pub mod store;

pub use store::LocalStore;
