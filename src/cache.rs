//! Bounded evaluation cache keyed by position hash.
//!
//! Eviction is first-in first-out: once the cache is over capacity the oldest
//! insertion is dropped, regardless of how often it was hit. A single mutex
//! guards lookups and inserts; evaluator calls dominate the cost anyway.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::info;

use crate::config::CACHE_ENTRY_SIZE;
use crate::constants::{MAX_CACHE_COUNT, MIN_CACHE_COUNT};
use crate::network::NetResult;

/// A cached evaluator result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: NetResult,
}

struct Inner {
    map: HashMap<u64, CacheEntry>,
    order: VecDeque<u64>,
    capacity: usize,
    hits: u64,
    lookups: u64,
    inserts: u64,
}

impl Inner {
    fn evict_to_capacity(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
    }
}

/// FIFO cache of evaluator outputs.
pub struct EvalCache {
    inner: Mutex<Inner>,
}

impl Default for EvalCache {
    fn default() -> Self {
        Self::new(MAX_CACHE_COUNT)
    }
}

impl EvalCache {
    pub fn new(capacity: usize) -> Self {
        EvalCache {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
                hits: 0,
                lookups: 0,
                inserts: 0,
            }),
        }
    }

    /// Cached output for `hash`, if any.
    pub fn lookup(&self, hash: u64) -> Option<NetResult> {
        let mut inner = self.inner.lock();
        inner.lookups += 1;
        let result = inner.map.get(&hash).map(|entry| entry.result.clone());
        if result.is_some() {
            inner.hits += 1;
        }
        result
    }

    /// Store `result` under `hash`. An existing entry is kept as is.
    pub fn insert(&self, hash: u64, result: NetResult) {
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&hash) {
            return;
        }
        inner.map.insert(hash, CacheEntry { result });
        inner.order.push_back(hash);
        inner.inserts += 1;
        inner.evict_to_capacity();
    }

    /// Change the capacity, evicting the oldest entries if needed.
    pub fn resize(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity;
        inner.evict_to_capacity();
    }

    /// Size the cache for about three moves worth of playouts.
    pub fn set_size_from_playouts(&self, max_playouts: i32) {
        let wanted = 3usize.saturating_mul(max_playouts.max(0) as usize);
        self.resize(wanted.clamp(MIN_CACHE_COUNT, MAX_CACHE_COUNT));
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Fraction of lookups that hit, or 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.lookups == 0 {
            0.0
        } else {
            inner.hits as f64 / inner.lookups as f64
        }
    }

    /// Approximate memory held by the entries, in bytes.
    pub fn estimated_size(&self) -> usize {
        self.len() * CACHE_ENTRY_SIZE
    }

    pub fn dump_stats(&self) {
        let inner = self.inner.lock();
        let rate = if inner.lookups == 0 {
            0.0
        } else {
            100.0 * inner.hits as f64 / inner.lookups as f64
        };
        info!(
            "Cache: {}/{} hits/lookups = {:.1}% hitrate, {} inserts, {} size",
            inner.hits,
            inner.lookups,
            rate,
            inner.inserts,
            inner.order.len()
        );
    }
}
