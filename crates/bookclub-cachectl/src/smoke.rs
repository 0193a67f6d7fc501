//! Smoke round-trip against the configured tiers.

use serde::Serialize;
use std::time::{Duration, Instant};

use bookclub_cache::{HybridCache, Result};
use bookclub_domain::{UserId, UserProfile, keys};

/// Lifetime of the probe entry, in case the final delete is lost.
const SMOKE_TTL: Duration = Duration::from_secs(30);

/// Outcome of one smoke run.
#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    pub key: String,
    pub remote_enabled: bool,
    /// The value read back equals the value written
    pub round_trip: bool,
    /// Counter value after one increment, when the remote tier is on
    pub remote_counter: Option<i64>,
    /// Why the remote increment failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
    /// The key reads as a miss after delete
    pub deleted: bool,
    pub elapsed_ms: u64,
}

impl SmokeReport {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.round_trip && self.deleted && (!self.remote_enabled || self.remote_counter.is_some())
    }
}

/// Id outside the range the relational store hands out.
fn probe_id() -> UserId {
    UserId::MAX - UserId::from(std::process::id())
}

/// Write, read back, count and delete a throwaway profile.
///
/// # Errors
///
/// Only serialization failures. Tier failures are reported through the
/// returned [`SmokeReport`].
pub async fn run(cache: &HybridCache) -> Result<SmokeReport> {
    let started = Instant::now();
    let id = probe_id();
    let key = keys::user(id);
    let profile = UserProfile::new(id, "cachectl-smoke");

    cache.set(&key, &profile, Some(SMOKE_TTL)).await?;
    let round_trip = cache
        .get::<UserProfile>(&key)
        .await
        .is_ok_and(|read| read == profile);

    let mut remote_error = None;
    let remote_counter = if cache.is_remote_enabled() {
        let counter_key = keys::follower_count(id);
        let counted = cache.incr(&counter_key).await;
        cache.delete(&counter_key).await;
        match counted {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %counter_key, error = %e, "Remote counter increment failed");
                remote_error = Some(e.to_string());
                None
            }
        }
    } else {
        None
    };

    cache.delete(&key).await;
    let deleted = cache
        .get::<UserProfile>(&key)
        .await
        .is_err_and(|e| e.is_miss());

    let report = SmokeReport {
        key,
        remote_enabled: cache.is_remote_enabled(),
        round_trip,
        remote_counter,
        remote_error,
        deleted,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        passed = report.passed(),
        elapsed_ms = report.elapsed_ms,
        "Smoke round-trip finished"
    );
    Ok(report)
}
