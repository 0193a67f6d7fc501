//! Cache subsystem error types

use thiserror::Error;

/// Cache subsystem errors.
///
/// Only [`CacheError::NotFound`] and [`CacheError::Source`] describe the
/// source of truth; every other variant is a cache-tier condition that
/// callers degrade on ("treat as miss" or "local only").
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache miss for key: {0}")]
    CacheMiss(String),

    #[error("Remote cache unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote cache command failed: {0}")]
    RemoteCommand(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },

    #[error("Source of truth error: {0}")]
    Source(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// True for the expected "nothing cached" outcome.
    #[must_use]
    pub const fn is_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }

    /// True when the remote tier could not be reached at all.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }

    pub fn not_found(entity_type: &str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            key: key.into(),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Self::RemoteUnavailable(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            Self::Deserialization(err.to_string())
        } else {
            Self::RemoteCommand(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        match err {
            deadpool_redis::PoolError::Backend(e) => e.into(),
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}

impl From<bookclub_domain::DomainError> for CacheError {
    fn from(err: bookclub_domain::DomainError) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_display() {
        let error = CacheError::CacheMiss("user:42".to_string());
        assert_eq!(error.to_string(), "Cache miss for key: user:42");
        assert!(error.is_miss());
        assert!(!error.is_unavailable());
    }

    #[test]
    fn test_not_found_display() {
        let error = CacheError::not_found("user", "user:7");
        assert_eq!(error.to_string(), "Entity not found: user with key user:7");
    }

    #[test]
    fn test_io_error_maps_to_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error: CacheError = redis::RedisError::from(io).into();
        assert!(error.is_unavailable());
    }

    #[test]
    fn test_type_error_maps_to_deserialization() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::TypeError, "bad type"));
        let error: CacheError = redis_err.into();
        assert!(matches!(error, CacheError::Deserialization(_)));
    }
}
