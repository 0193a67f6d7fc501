//! # Cache Configuration
//!
//! Environment-based configuration for both cache tiers.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Remote tier (Redis) configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Use the remote tier at all. When false the probe is skipped.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index
    pub db: i64,
    /// Maximum pooled connections
    pub pool_size: usize,
    /// Connections opened eagerly after a successful probe
    pub min_idle_conns: usize,
    /// Extra attempts for connection-class failures
    pub max_retries: u32,
    /// Deadline applied to every remote call
    pub request_timeout: Duration,
    /// TTL used when a caller passes none
    pub default_ttl: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            pool_size: 10,
            min_idle_conns: 2,
            max_retries: 3,
            request_timeout: Duration::from_millis(500),
            default_ttl: Duration::from_secs(3600),
        }
    }
}

impl RemoteConfig {
    /// Connection URL for the configured endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Endpoint without credentials, for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{} (db {})", self.host, self.port, self.db)
    }
}

/// Full cache subsystem configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub remote: RemoteConfig,
    /// Maximum entries held by the local tier
    pub local_capacity: usize,
    /// TTL applied when a remote hit is copied into the local tier
    pub backfill_ttl: Duration,
    /// Period of the expired-entry sweeper; `None` disables it
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            local_capacity: 5000,
            backfill_ttl: Duration::from_secs(3600),
            sweep_interval: Some(Duration::from_secs(60)),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let remote = defaults.remote;

        Self {
            remote: RemoteConfig {
                enabled: env::var("REDIS_ENABLED")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(remote.enabled),
                host: env::var("REDIS_HOST").unwrap_or(remote.host),
                port: parse_var("REDIS_PORT").unwrap_or(remote.port),
                password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
                db: parse_var("REDIS_DB").unwrap_or(remote.db),
                pool_size: parse_var("REDIS_POOL_SIZE").unwrap_or(remote.pool_size),
                min_idle_conns: parse_var("REDIS_MIN_IDLE_CONNS")
                    .unwrap_or(remote.min_idle_conns),
                max_retries: parse_var("REDIS_MAX_RETRIES").unwrap_or(remote.max_retries),
                request_timeout: parse_var("REDIS_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(remote.request_timeout),
                default_ttl: parse_var("REDIS_DEFAULT_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(remote.default_ttl),
            },

            local_capacity: parse_var("CACHE_LOCAL_CAPACITY").unwrap_or(defaults.local_capacity),

            backfill_ttl: parse_var("CACHE_BACKFILL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.backfill_ttl),

            sweep_interval: match parse_var::<u64>("CACHE_SWEEP_INTERVAL_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.sweep_interval,
            },
        }
    }

    /// Reject settings the tiers cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "local_capacity must be at least 1".to_string(),
            ));
        }
        if self.backfill_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "backfill_ttl must be non-zero".to_string(),
            ));
        }
        if self.remote.enabled {
            if self.remote.pool_size == 0 {
                return Err(CacheError::InvalidConfig(
                    "pool_size must be at least 1".to_string(),
                ));
            }
            if self.remote.min_idle_conns > self.remote.pool_size {
                return Err(CacheError::InvalidConfig(format!(
                    "min_idle_conns ({}) exceeds pool_size ({})",
                    self.remote.min_idle_conns, self.remote.pool_size
                )));
            }
            if self.remote.request_timeout.is_zero() {
                return Err(CacheError::InvalidConfig(
                    "request_timeout must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.local_capacity, 5000);
        assert_eq!(config.remote.default_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_url_with_and_without_password() {
        let mut remote = RemoteConfig::default();
        assert_eq!(remote.url(), "redis://127.0.0.1:6379/0");

        remote.password = Some("s3cret".to_string());
        remote.db = 3;
        assert_eq!(remote.url(), "redis://:s3cret@127.0.0.1:6379/3");
        assert!(!remote.endpoint().contains("s3cret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CacheConfig {
            local_capacity: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());

        config.local_capacity = 10;
        config.remote.min_idle_conns = 20;
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));

        // pool settings are irrelevant once the remote tier is switched off
        config.remote.enabled = false;
        assert!(config.validate().is_ok());
    }
}
