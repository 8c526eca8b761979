//! Capacity-bounded TTL store for successful responses.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::key::CacheKey;
use crate::observability::metrics;

/// Eviction priority of a cached response. High-priority entries are
/// evicted last and therefore stay available for stale reads longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    #[default]
    Normal,
    High,
}

/// A cache read result handed back to the executor.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub payload: Value,
    pub source_endpoint: String,
    /// False when the entry was past its TTL and served on a stale read.
    pub fresh: bool,
    pub age: Duration,
}

/// Counters exposed through the admin status view.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_serves: u64,
    pub evictions: u64,
}

struct Entry {
    payload: Value,
    source_endpoint: String,
    cached_at: Instant,
    ttl: Duration,
    priority: CachePriority,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) <= self.ttl
    }
}

struct CacheInner {
    map: HashMap<CacheKey, Entry>,
    /// Keys in insertion order, front = oldest. A refreshing put counts as
    /// a re-insertion and moves the key to the back.
    order: VecDeque<CacheKey>,
}

/// TTL response cache with priority-aware, insertion-ordered eviction.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up `key`. Returns a fresh entry when one exists; with
    /// `allow_stale`, an expired entry still in the store is returned
    /// instead of nothing.
    pub fn get(&self, key: &CacheKey, allow_stale: bool) -> Option<CachedResponse> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        let now = Instant::now();

        let Some(entry) = inner.map.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("miss");
            return None;
        };

        let fresh = entry.is_fresh(now);
        if !fresh && !allow_stale {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("miss");
            return None;
        }

        if fresh {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("hit");
        } else {
            self.stale_serves.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("stale");
        }

        Some(CachedResponse {
            payload: entry.payload.clone(),
            source_endpoint: entry.source_endpoint.clone(),
            fresh,
            age: now.duration_since(entry.cached_at),
        })
    }

    /// Inserts or refreshes an entry, then evicts down to capacity.
    pub fn put(
        &self,
        key: CacheKey,
        payload: Value,
        ttl: Duration,
        priority: CachePriority,
        source_endpoint: &str,
    ) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");

        let entry = Entry {
            payload,
            source_endpoint: source_endpoint.to_string(),
            cached_at: Instant::now(),
            ttl,
            priority,
        };

        if inner.map.insert(key.clone(), entry).is_some() {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key);

        while inner.map.len() > self.capacity {
            let Some(victim) = pick_victim(&inner) else {
                break;
            };
            inner.map.remove(&victim);
            inner.order.retain(|k| k != &victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_event("evict");
            tracing::debug!(key = %victim, "Evicted cache entry");
        }

        metrics::record_cache_entries(inner.map.len());
    }

    /// Drops every entry. Operator action (admin clear, config reload).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let dropped = inner.map.len();
        inner.map.clear();
        inner.order.clear();
        metrics::record_cache_entries(0);
        tracing::info!(dropped, "Response cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Oldest-inserted Normal-priority key, or the oldest key outright when
/// everything left is High priority.
fn pick_victim(inner: &CacheInner) -> Option<CacheKey> {
    inner
        .order
        .iter()
        .find(|k| {
            inner
                .map
                .get(*k)
                .is_some_and(|e| e.priority == CachePriority::Normal)
        })
        .or_else(|| inner.order.front())
        .cloned()
}
