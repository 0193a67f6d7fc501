//! Cache metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded until the
//! embedding binary installs a recorder (see `cachectl --metrics-addr`).

use metrics::counter;

/// Metric names.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "bookclub_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "bookclub_cache_misses_total";
    pub const CACHE_REMOTE_ERRORS_TOTAL: &str = "bookclub_cache_remote_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "bookclub_cache_local_evictions_total";
}

/// Tier that answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Local,
    Remote,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

pub fn record_cache_hit(tier: Tier) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier.as_str()).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a remote call that failed and was degraded.
pub fn record_remote_error(op: &'static str) {
    counter!(names::CACHE_REMOTE_ERRORS_TOTAL, "op" => op).increment(1);
}

pub fn record_local_eviction() {
    counter!(names::CACHE_EVICTIONS_TOTAL).increment(1);
}
