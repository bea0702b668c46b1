//! Bounded key-value store with TTL expiry and LRU eviction.
//!
//! Each agent owns its cache exclusively; the internal mutex only guards
//! concurrent calls into the *same* agent instance, keeping the
//! evict-then-read/write sequence atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency order: front = least recently used, back = most recently used.
    order: VecDeque<String>,
}

pub struct TtlLruCache<V> {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlLruCache<V> {
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up `key`. A hit promotes the entry to most-recently-used; a miss
    /// is a normal, silent outcome.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        Self::evict(&mut inner, self.ttl, self.max_size);

        if inner.entries.contains_key(key) {
            promote(&mut inner.order, key);
            tracing::debug!(key = %key, "cache hit");
            return inner.entries.get(key).map(|e| e.value.clone());
        }

        tracing::debug!(key = %key, "cache miss");
        None
    }

    /// Insert or replace `key`. The entry becomes most-recently-used either
    /// way.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut inner = self.lock();
        Self::evict(&mut inner, self.ttl, self.max_size);

        if inner.entries.remove(&key).is_some() {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Pure existence check: runs expiry but does not count as a use, so it
    /// never changes the recency ordering.
    pub fn contains_key(&self, key: &str) -> bool {
        let mut inner = self.lock();
        Self::evict(&mut inner, self.ttl, self.max_size);
        inner.entries.contains_key(key)
    }

    pub fn size(&self) -> usize {
        let mut inner = self.lock();
        Self::evict(&mut inner, self.ttl, self.max_size);
        inner.entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Lazy eviction, run at the head of every read/write:
    /// first drop everything past its TTL regardless of recency, then trim
    /// least-recently-used entries until the size bound holds.
    fn evict(inner: &mut CacheInner<V>, ttl: Duration, max_size: usize) {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.inserted_at) > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            tracing::debug!(key = %key, "cache entry expired");
        }

        while inner.entries.len() > max_size {
            let Some(lru) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&lru);
            tracing::debug!(key = %lru, "cache entry evicted (lru)");
        }
    }
}

fn promote(order: &mut VecDeque<String>, key: &str) {
    order.retain(|k| k != key);
    order.push_back(key.to_string());
}
