//! # BookClub Cache Operator Tool
//!
//! Loads the cache configuration from the environment, connects both tiers
//! (running the remote startup probe), and reports their state.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod metrics;
pub mod smoke;

pub use config::{Config, LogFormat};
pub use smoke::SmokeReport;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
