//! In-process stand-in for the remote tier.
//!
//! Mirrors the Redis semantics the cache relies on (expiring strings, atomic
//! integer counters, sets and sorted sets, type errors). It can be switched
//! "down" to simulate an outage, or made to fail single commands to simulate
//! a connection dropping between two calls. Used by tests and by local
//! development without Redis.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering as ScoreOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{KeyTtl, RemoteStore};
use crate::error::{CacheError, Result};
use crate::local::store::MAX_TTL;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
    Sorted(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

/// Expiry instant for `ttl` from `now`, clamped so it cannot overflow.
fn deadline(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now <= at)
    }
}

/// Remote tier kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    slots: Mutex<HashMap<String, Slot>>,
    down: AtomicBool,
    failing: Mutex<HashSet<&'static str>>,
    calls: AtomicU64,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the service going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    /// Make every later `command` (Redis name, lowercase) fail as if the
    /// connection dropped, while other commands keep working.
    pub fn fail_command(&self, command: &'static str) {
        self.failing.lock().insert(command);
    }

    /// Undo [`fail_command`](Self::fail_command).
    pub fn restore_command(&self, command: &'static str) {
        self.failing.lock().remove(command);
    }

    /// Number of operations attempted, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Live keys currently stored.
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().values().filter(|s| s.is_live(now)).count()
    }

    fn check(&self, command: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::RemoteUnavailable(
                "in-memory remote is down".to_string(),
            ));
        }
        self.injected(command)
    }

    fn injected(&self, command: &str) -> Result<()> {
        if self.failing.lock().contains(command) {
            return Err(CacheError::RemoteUnavailable(format!(
                "{command} failed: connection reset"
            )));
        }
        Ok(())
    }

    /// Run `f` on the live slot map, purging the key if it expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(Option<&mut Slot>) -> T) -> T {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        f(slots.get_mut(key))
    }

    fn with_set<T>(
        &self,
        key: &str,
        create: bool,
        f: impl FnOnce(Option<&mut HashSet<String>>) -> T,
    ) -> Result<T> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        if create && !slots.contains_key(key) {
            slots.insert(
                key.to_string(),
                Slot {
                    value: Value::Set(HashSet::new()),
                    expires_at: None,
                },
            );
        }
        match slots.get_mut(key) {
            None => Ok(f(None)),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(f(Some(set))),
            Some(_) => Err(CacheError::RemoteCommand(WRONGTYPE.to_string())),
        }
    }

    /// Members of a live sorted set ordered by score, then member.
    fn sorted_members(&self, key: &str) -> Result<Vec<(f64, String)>> {
        self.with_live(key, |slot| match slot {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Sorted(scores),
                ..
            }) => {
                let mut ranked: Vec<(f64, String)> = scores
                    .iter()
                    .map(|(member, score)| (*score, member.clone()))
                    .collect();
                ranked.sort_by(|a, b| match a.0.total_cmp(&b.0) {
                    ScoreOrdering::Equal => a.1.cmp(&b.1),
                    other => other,
                });
                Ok(ranked)
            }
            Some(_) => Err(CacheError::RemoteCommand(WRONGTYPE.to_string())),
        })
    }
}

/// Resolve a Redis `start..=stop` rank range over `len` items.
fn rank_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start.unsigned_abs(), stop.unsigned_abs()))
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn ping(&self) -> Result<()> {
        self.check("ping")
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check("get")?;
        self.with_live(key, |slot| match slot {
            None => Ok(None),
            Some(Slot {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(CacheError::RemoteCommand(WRONGTYPE.to_string())),
        })
    }

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<()> {
        self.check("psetex")?;
        let slot = Slot {
            value: Value::Bytes(payload.to_vec()),
            expires_at: Some(deadline(Instant::now(), ttl)),
        };
        self.slots.lock().insert(key.to_string(), slot);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, payload: &[u8], ttl: Duration) -> Result<bool> {
        self.check("set")?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| slot.is_live(now)) {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: Value::Bytes(payload.to_vec()),
                expires_at: Some(deadline(now, ttl)),
            },
        );
        Ok(true)
    }

    async fn mset(&self, pairs: &[(String, Vec<u8>)]) -> Result<()> {
        self.check("mset")?;
        let mut slots = self.slots.lock();
        for (key, payload) in pairs {
            slots.insert(
                key.clone(),
                Slot {
                    value: Value::Bytes(payload.clone()),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.check("mget")?;
        // MGET reports non-string values as nil rather than failing.
        Ok(keys
            .iter()
            .map(|key| {
                self.with_live(key, |slot| match slot {
                    Some(Slot {
                        value: Value::Bytes(bytes),
                        ..
                    }) => Some(bytes.clone()),
                    _ => None,
                })
            })
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check("del")?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let removed = keys
            .iter()
            .filter_map(|key| slots.remove(key))
            .filter(|slot| slot.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, keys: &[String]) -> Result<u64> {
        self.check("exists")?;
        let found = keys
            .iter()
            .filter(|key| self.with_live(key, |slot| slot.is_some()))
            .count();
        Ok(found as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check("pexpire")?;
        Ok(self.with_live(key, |slot| {
            slot.map(|slot| slot.expires_at = Some(deadline(Instant::now(), ttl)))
                .is_some()
        }))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.check("pttl")?;
        Ok(self.with_live(key, |slot| match slot {
            None => KeyTtl::Missing,
            Some(Slot {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expiring(at.saturating_duration_since(Instant::now())),
        }))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.check("incrby")?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Bytes(b"0".to_vec()),
            expires_at: None,
        });
        let Value::Bytes(bytes) = &mut slot.value else {
            return Err(CacheError::RemoteCommand(WRONGTYPE.to_string()));
        };
        let current: i64 = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                CacheError::RemoteCommand("ERR value is not an integer or out of range".to_string())
            })?;
        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::RemoteCommand("ERR increment or decrement would overflow".to_string())
        })?;
        *bytes = next.to_string().into_bytes();
        Ok(next)
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64> {
        self.check("sadd")?;
        if members.is_empty() {
            return Ok(0);
        }
        self.with_set(key, true, |set| {
            set.map_or(0, |set| {
                members.iter().filter(|m| set.insert((*m).clone())).count() as u64
            })
        })
    }

    async fn set_add_expiring(&self, key: &str, members: &[String], ttl: Duration) -> Result<u64> {
        // MULTI/EXEC: either command failing leaves nothing behind.
        self.check("sadd")?;
        self.injected("pexpire")?;
        if members.is_empty() {
            return Ok(0);
        }
        let added = self.with_set(key, true, |set| {
            set.map_or(0, |set| {
                members.iter().filter(|m| set.insert((*m).clone())).count() as u64
            })
        })?;
        self.with_live(key, |slot| {
            if let Some(slot) = slot {
                slot.expires_at = Some(deadline(Instant::now(), ttl));
            }
        });
        Ok(added)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64> {
        self.check("srem")?;
        let (removed, now_empty) = self.with_set(key, false, |set| {
            set.map_or((0, false), |set| {
                let removed = members.iter().filter(|m| set.remove(*m)).count() as u64;
                (removed, set.is_empty())
            })
        })?;
        // Redis drops a set once its last member goes.
        if now_empty {
            self.slots.lock().remove(key);
        }
        Ok(removed)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        self.check("sismember")?;
        self.with_set(key, false, |set| set.is_some_and(|set| set.contains(member)))
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.check("scard")?;
        self.with_set(key, false, |set| set.map_or(0, |set| set.len() as u64))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check("smembers")?;
        self.with_set(key, false, |set| {
            set.map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64> {
        self.check("zadd")?;
        if members.iter().any(|(score, _)| score.is_nan()) {
            return Err(CacheError::RemoteCommand(
                "ERR value is not a valid float".to_string(),
            ));
        }
        if members.is_empty() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Sorted(HashMap::new()),
            expires_at: None,
        });
        let Value::Sorted(scores) = &mut slot.value else {
            return Err(CacheError::RemoteCommand(WRONGTYPE.to_string()));
        };
        let added = members
            .iter()
            .filter(|(score, member)| scores.insert(member.clone(), *score).is_none())
            .count();
        Ok(added as u64)
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.check("zrangebyscore")?;
        Ok(self
            .sorted_members(key)?
            .into_iter()
            .filter(|(score, _)| (min..=max).contains(score))
            .map(|(_, member)| member)
            .collect())
    }

    async fn zrev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.check("zrevrange")?;
        let mut ranked = self.sorted_members(key)?;
        ranked.reverse();
        Ok(match rank_range(ranked.len(), start, stop) {
            Some((from, to)) => ranked
                .drain(from..=to)
                .map(|(_, member)| member)
                .collect(),
            None => Vec::new(),
        })
    }
}
