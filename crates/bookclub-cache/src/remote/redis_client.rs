//! # Redis Remote Store
//!
//! Pooled Redis backend for the remote tier. Every command runs under the
//! configured request deadline and is retried a bounded number of times
//! when the failure is connection-class. Commands that are not safe to
//! apply twice are only retried while no connection was handed to them.

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::{AsyncCommands, RedisResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{KeyTtl, RemotePoolStats, RemoteStore, ttl_millis};
use crate::config::RemoteConfig;
use crate::error::{CacheError, Result};

/// Backoff step between retries; multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Whether a command may be sent again after an ambiguous failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Applying the command twice leaves the same state.
    Safe,
    /// Once sent, a lost reply does not mean the command was not applied.
    Unsafe,
}

/// Deadline and retry budget for a single command.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    deadline: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Run `command` on a connection from `acquire`, each attempt bounded by
    /// the deadline.
    ///
    /// Connection-class failures are retried with a linear backoff. A
    /// [`Replay::Unsafe`] command is retried only if it failed before it
    /// got a connection.
    async fn run<C, T, A, AFut, F, Fut>(
        &self,
        op: &'static str,
        replay: Replay,
        acquire: A,
        command: F,
    ) -> Result<T>
    where
        A: Fn() -> AFut,
        AFut: Future<Output = Result<C>>,
        F: Fn(C) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let sent = AtomicBool::new(false);
            let outcome = tokio::time::timeout(self.deadline, async {
                let conn = acquire().await?;
                sent.store(true, Ordering::SeqCst);
                command(conn).await
            })
            .await;

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => CacheError::RemoteUnavailable(format!(
                    "{op} exceeded {}ms deadline",
                    self.deadline.as_millis()
                )),
            };

            let ambiguous = replay == Replay::Unsafe && sent.load(Ordering::SeqCst);
            if !err.is_unavailable() || ambiguous || attempt >= self.max_retries {
                if ambiguous {
                    tracing::warn!(op, error = %err, "Not retrying command that may have been applied");
                }
                return Err(err);
            }
            attempt += 1;
            tracing::debug!(op, attempt, error = %err, "Retrying Redis command");
            tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        }
    }
}

/// Redis-backed [`RemoteStore`] with a bounded connection pool.
pub struct RedisStore {
    pool: Pool,
    retry: RetryPolicy,
}

impl RedisStore {
    /// Build the pool. No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if the pool cannot be created
    /// from the configured endpoint.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(config.request_timeout),
            create: Some(config.request_timeout),
            recycle: Some(config.request_timeout),
        };

        let mut redis_config = deadpool_redis::Config::from_url(config.url());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::InvalidConfig(format!("redis pool: {e}")))?;

        Ok(Self {
            pool,
            retry: RetryPolicy {
                deadline: config.request_timeout,
                max_retries: config.max_retries,
            },
        })
    }

    /// Run an idempotent command on a pooled connection.
    async fn execute<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.dispatch(op, Replay::Safe, command).await
    }

    /// Run a command that must not be applied twice.
    async fn execute_once<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.dispatch(op, Replay::Unsafe, command).await
    }

    async fn dispatch<T, F, Fut>(&self, op: &'static str, replay: Replay, command: F) -> Result<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        self.retry
            .run(
                op,
                replay,
                || async move { self.pool.get().await.map_err(CacheError::from) },
                |conn| {
                    let pending = command(conn);
                    async move { pending.await.map_err(CacheError::from) }
                },
            )
            .await
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let _pong: String = self
            .execute("ping", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn warm_up(&self, connections: usize) -> Result<()> {
        // Holding every handle forces the pool to open distinct connections.
        let mut held = Vec::with_capacity(connections);
        for _ in 0..connections {
            let conn = tokio::time::timeout(self.retry.deadline, self.pool.get())
                .await
                .map_err(|_| CacheError::RemoteUnavailable("warm-up timed out".to_string()))??;
            held.push(conn);
        }
        tracing::debug!(connections = held.len(), "Redis pool warmed up");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.execute("get", |mut conn| async move {
            conn.get::<_, Option<Vec<u8>>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        let millis = ttl_millis(ttl);
        self.execute("set", |mut conn| async move {
            conn.pset_ex::<_, _, ()>(key, payload, millis).await
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(ttl);
        // A replayed NX would report our own first write as a conflict.
        let reply: Option<String> = self
            .execute_once("set_nx", |mut conn| async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(payload)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.execute("mset", |mut conn| async move {
            conn.mset::<_, _, ()>(pairs).await
        })
        .await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        // Explicit MGET: the typed helper degrades to GET for a single key.
        self.execute("mget", |mut conn| async move {
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.execute("del", |mut conn| async move {
            conn.del::<_, u64>(keys).await
        })
        .await
    }

    async fn exists(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.execute("exists", |mut conn| async move {
            conn.exists::<_, u64>(keys).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        self.execute("pexpire", |mut conn| async move {
            conn.pexpire::<_, bool>(key, millis).await
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let millis: i64 = self
            .execute("pttl", |mut conn| async move {
                conn.pttl::<_, i64>(key).await
            })
            .await?;
        Ok(KeyTtl::from_pttl(millis))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.execute_once("incrby", |mut conn| async move {
            conn.incr::<_, _, i64>(key, delta).await
        })
        .await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.execute("sadd", |mut conn| async move {
            conn.sadd::<_, _, u64>(key, members).await
        })
        .await
    }

    async fn set_add_expiring(&self, key: &str, members: &[String], ttl: Duration) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let millis = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let (added,): (u64,) = self
            .execute("sadd_pexpire", |mut conn| async move {
                redis::pipe()
                    .atomic()
                    .sadd(key, members)
                    .pexpire(key, millis)
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(added)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.execute("srem", |mut conn| async move {
            conn.srem::<_, _, u64>(key, members).await
        })
        .await
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        self.execute("sismember", |mut conn| async move {
            conn.sismember::<_, _, bool>(key, member).await
        })
        .await
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.execute("scard", |mut conn| async move {
            conn.scard::<_, u64>(key).await
        })
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.execute("smembers", |mut conn| async move {
            conn.smembers::<_, Vec<String>>(key).await
        })
        .await
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        self.execute("zadd", |mut conn| async move {
            conn.zadd_multiple::<_, _, _, u64>(key, members).await
        })
        .await
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.execute("zrangebyscore", |mut conn| async move {
            conn.zrangebyscore::<_, _, _, Vec<String>>(key, min, max).await
        })
        .await
    }

    async fn zrev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.execute("zrevrange", |mut conn| async move {
            conn.zrevrange::<_, Vec<String>>(key, start, stop).await
        })
        .await
    }

    fn pool_stats(&self) -> Option<RemotePoolStats> {
        let status = self.pool.status();
        Some(RemotePoolStats {
            max_size: status.max_size as u64,
            size: status.size as u64,
            available: status.available as u64,
            waiting: status.waiting as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    const POLICY: RetryPolicy = RetryPolicy {
        deadline: Duration::from_millis(50),
        max_retries: 2,
    };

    async fn connected() -> Result<()> {
        Ok(())
    }

    fn dropped() -> CacheError {
        CacheError::RemoteUnavailable("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_safe_command_is_retried() {
        let sends = &AtomicU32::new(0);
        let result: Result<()> = POLICY
            .run("get", Replay::Safe, connected, |()| async move {
                sends.fetch_add(1, Ordering::SeqCst);
                Err(dropped())
            })
            .await;
        assert!(result.unwrap_err().is_unavailable());
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unsafe_command_is_sent_once() {
        let sends = &AtomicU32::new(0);
        let result: Result<i64> = POLICY
            .run("incrby", Replay::Unsafe, connected, |()| async move {
                sends.fetch_add(1, Ordering::SeqCst);
                Err(dropped())
            })
            .await;
        assert!(result.unwrap_err().is_unavailable());
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsafe_command_not_resent_after_deadline() {
        let sends = &AtomicU32::new(0);
        let result: Result<i64> = POLICY
            .run("incrby", Replay::Unsafe, connected, |()| async move {
                sends.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            })
            .await;
        assert!(result.unwrap_err().is_unavailable());
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsafe_command_retried_while_unsent() {
        let acquires = &AtomicU32::new(0);
        let sends = &AtomicU32::new(0);
        let result: Result<i64> = POLICY
            .run(
                "incrby",
                Replay::Unsafe,
                || async move {
                    if acquires.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(dropped())
                    } else {
                        Ok(())
                    }
                },
                |()| async move {
                    sends.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                },
            )
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(acquires.load(Ordering::SeqCst), 2);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_command_errors_are_not_retried() {
        let sends = &AtomicU32::new(0);
        let result: Result<()> = POLICY
            .run("get", Replay::Safe, connected, |()| async move {
                sends.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::RemoteCommand("WRONGTYPE".to_string()))
            })
            .await;
        assert!(matches!(result, Err(CacheError::RemoteCommand(_))));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    fn unreachable_config() -> RemoteConfig {
        // Port 1 on loopback refuses immediately on every CI host we run on.
        RemoteConfig {
            port: 1,
            max_retries: 1,
            request_timeout: Duration::from_millis(200),
            ..RemoteConfig::default()
        }
    }

    #[tokio::test]
    async fn test_pool_is_lazy_and_bounded() {
        let store = RedisStore::new(&unreachable_config()).unwrap();
        let stats = store.pool_stats().unwrap();
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let store = RedisStore::new(&unreachable_config()).unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");

        let err = store.get("user:1").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_empty_batches_skip_the_network() {
        let store = RedisStore::new(&unreachable_config()).unwrap();
        assert_eq!(store.delete(&[]).await.unwrap(), 0);
        assert_eq!(store.exists(&[]).await.unwrap(), 0);
        assert!(store.mget(&[]).await.unwrap().is_empty());
        assert_eq!(store.set_add("s", &[]).await.unwrap(), 0);
    }
}
