//! Bounded Cache - LRU + TTL
//!
//! Fixed-capacity key/value store. Freshness is judged per entry from its
//! TTL; capacity is enforced by evicting the least recently used entry.
//!
//! # Design
//!
//! - `HashMap` holds the entries, each stamped with the tick of its last touch
//! - `VecDeque` holds `(tick, key)` in touch order; a touch pushes a new
//!   record and leaves the old one behind
//! - Records whose tick no longer matches the entry are skipped when popping
//!   the oldest, and swept out once they outnumber live entries
//!
//! Touch and evict are O(1) amortized.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::entry::CacheEntry;
use super::CacheGauge;

/// Extra order records tolerated before a sweep
const COMPACT_SLACK: usize = 32;

struct Slot<V> {
    entry: CacheEntry<V>,
    tick: u64,
}

struct Inner<K, V> {
    map: HashMap<K, Slot<V>>,
    order: VecDeque<(u64, K)>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            tick: 0,
        }
    }

    /// Move `key` to the most recently used position
    fn touch(&mut self, key: &K) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(slot) = self.map.get_mut(key) {
            slot.tick = tick;
            self.order.push_back((tick, key.clone()));
            self.maybe_compact();
        }
    }

    /// Remove and return the least recently used key
    fn pop_oldest(&mut self) -> Option<K> {
        while let Some((tick, key)) = self.order.pop_front() {
            let live = self.map.get(&key).is_some_and(|slot| slot.tick == tick);
            if live {
                self.map.remove(&key);
                return Some(key);
            }
        }
        None
    }

    fn maybe_compact(&mut self) {
        if self.order.len() <= self.map.len() * 2 + COMPACT_SLACK {
            return;
        }
        let map = &self.map;
        self.order
            .retain(|(tick, key)| map.get(key).is_some_and(|slot| slot.tick == *tick));
    }

    /// Keys in LRU to MRU order
    fn live_keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter().filter_map(|(tick, key)| {
            self.map
                .get(key)
                .filter(|slot| slot.tick == *tick)
                .map(|_| key)
        })
    }
}

/// LRU + TTL cache with a fixed entry capacity.
///
/// Every instance carries its own lock; no method holds it longer than a
/// single map operation, so instances are safe to share across tasks.
pub struct BoundedCache<K, V> {
    name: String,
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(Inner::new(capacity)),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a fresh value.
    ///
    /// A hit promotes the key to most recently used and bumps its hit
    /// counter. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.map.get(key).map(|slot| slot.entry.is_fresh()) {
            Some(true) => {
                let value = inner.map.get_mut(key).map(|slot| {
                    slot.entry.record_hit();
                    slot.entry.value.clone()
                });
                inner.touch(key);
                value
            }
            Some(false) => {
                inner.map.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Get the raw entry, fresh or not, without touching order or hits
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        self.inner.lock().map.get(key).map(|slot| slot.entry.clone())
    }

    /// Insert or overwrite at the most recently used position.
    ///
    /// When full and `key` is new, the least recently used entry is
    /// evicted first.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();

        if !inner.map.contains_key(&key)
            && inner.map.len() >= self.capacity
            && inner.pop_oldest().is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        inner.map.insert(
            key.clone(),
            Slot {
                entry: CacheEntry::new(value, ttl),
                tick: 0,
            },
        );
        inner.touch(&key);
    }

    /// True when the key is absent or its entry has expired
    pub fn is_stale(&self, key: &K) -> bool {
        self.inner
            .lock()
            .map
            .get(key)
            .map_or(true, |slot| slot.entry.is_expired())
    }

    /// True when a fresh entry exists
    pub fn contains_fresh(&self, key: &K) -> bool {
        !self.is_stale(key)
    }

    /// Remove an entry, returning its value if present
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.inner.lock().map.remove(key).map(|slot| slot.entry.value)
    }

    /// Fresh values in LRU to MRU order, without touching order or hits
    pub fn fresh_values(&self) -> Vec<V> {
        let inner = self.inner.lock();
        inner
            .live_keys()
            .filter_map(|key| inner.map.get(key))
            .filter(|slot| slot.entry.is_fresh())
            .map(|slot| slot.entry.value.clone())
            .collect()
    }

    /// Keys in LRU to MRU order, fresh or not
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().live_keys().cloned().collect()
    }

    /// Number of entries, fresh or not
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of hit counters across resident entries
    pub fn total_hits(&self) -> u64 {
        self.inner.lock().map.values().map(|slot| slot.entry.hits).sum()
    }

    /// Lookups that found nothing fresh
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries dropped to make room
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Name used in stats and logs
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K, V> CacheGauge for BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn name(&self) -> &str {
        BoundedCache::name(self)
    }

    fn len(&self) -> usize {
        BoundedCache::len(self)
    }

    fn capacity(&self) -> usize {
        BoundedCache::capacity(self)
    }

    fn total_hits(&self) -> u64 {
        BoundedCache::total_hits(self)
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.inner.lock().map.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
