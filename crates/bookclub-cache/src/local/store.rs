//! Bounded, recency-evicting byte store with per-entry expiry.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Upper bound on a single entry's lifetime, so `now + ttl` cannot overflow.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Debug)]
struct LocalEntry {
    payload: Arc<[u8]>,
    expire_at: Instant,
    /// Logical clock value of the last read or write.
    last_touch: AtomicU64,
    /// Stamp this entry is filed under in the recency index. Lags
    /// `last_touch` after reads until the next eviction pass.
    indexed_at: u64,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expire_at
    }
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, LocalEntry>,
    recency: BTreeMap<u64, String>,
}

impl Slots {
    fn insert(&mut self, key: &str, entry: LocalEntry) {
        self.recency.insert(entry.indexed_at, key.to_string());
        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.recency.remove(&previous.indexed_at);
        }
    }

    fn remove(&mut self, key: &str) -> Option<LocalEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.indexed_at);
        Some(entry)
    }

    /// Pop the least recently touched key.
    ///
    /// Reads only bump the entry's atomic stamp, so the oldest index slot
    /// may be stale: such an entry is refiled under its real stamp and the
    /// scan goes on. Real stamps never fall below indexed ones, so the
    /// first entry whose stamps agree is the true minimum.
    fn pop_lru(&mut self) -> Option<String> {
        while let Some((stamp, key)) = self.recency.pop_first() {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            let touched = entry.last_touch.load(Ordering::Relaxed);
            if touched == stamp {
                self.entries.remove(&key);
                return Some(key);
            }
            entry.indexed_at = touched;
            self.recency.insert(touched, key);
        }
        None
    }
}

/// Fixed-capacity local cache tier.
///
/// Reads share a read lock and record recency through per-entry atomics, so
/// concurrent lookups of unrelated keys never wait on each other. Inserts,
/// evictions and expiry purges take the write lock.
#[derive(Debug)]
pub struct LocalStore {
    slots: RwLock<Slots>,
    capacity: usize,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl LocalStore {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: RwLock::new(Slots {
                entries: HashMap::with_capacity(capacity),
                recency: BTreeMap::new(),
            }),
            capacity,
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `payload` under `key`, expiring `ttl` from now.
    ///
    /// Inserting a new key into a full store evicts the least recently
    /// touched entry.
    pub fn set(&self, key: &str, payload: impl Into<Arc<[u8]>>, ttl: Duration) {
        let mut slots = self.slots.write();
        // Stamped under the write lock so index keys stay unique.
        let stamp = self.tick();
        let entry = LocalEntry {
            payload: payload.into(),
            expire_at: Instant::now() + ttl.min(MAX_TTL),
            last_touch: AtomicU64::new(stamp),
            indexed_at: stamp,
        };

        if !slots.entries.contains_key(key) && slots.entries.len() >= self.capacity {
            if let Some(victim) = slots.pop_lru() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_local_eviction();
                tracing::trace!(key = %victim, "Evicted least recently used local entry");
            }
        }
        slots.insert(key, entry);
    }

    /// Look up a live entry; expired entries are removed on the way out.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        {
            let slots = self.slots.read();
            match slots.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    entry.last_touch.store(self.tick(), Ordering::Relaxed);
                    return Some(Arc::clone(&entry.payload));
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a writer may have refreshed the key.
        let mut slots = self.slots.write();
        if slots.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            slots.remove(key);
        }
        None
    }

    /// True if `key` holds a live entry. Does not count as a touch.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.slots
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove `key`; no-op when absent.
    pub fn delete(&self, key: &str) {
        self.slots.write().remove(key);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let expired: Vec<String> = slots
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            slots.remove(key);
        }
        expired.len()
    }

    /// Entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted for capacity since construction.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Spawn a task purging expired entries every `every`.
    ///
    /// The task holds only a weak reference and ends once the store is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(live) = store.upgrade() else {
                    break;
                };
                let purged = live.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = live.len(), "Swept expired local entries");
                }
            }
        })
    }
}
