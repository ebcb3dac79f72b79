use std::time::{Duration, Instant};

use analysis_core::{MarketRecord, Symbol};
use dashmap::DashMap;

/// Internal cache entry with timestamps
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Bounded in-process TTL store, safe for concurrent readers and writers.
///
/// Expired entries are invisible to [`get`](Self::get) but stay in the map
/// until capacity pressure or [`purge_expired`](Self::purge_expired) removes
/// them, so [`get_stale`](Self::get_stale) can still hand out the last known
/// value.
pub struct TtlCache<V> {
    map: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            map: DashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fresh value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.map
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Value for `key` whether or not it has expired.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.map.get(key).map(|entry| entry.value.clone())
    }

    /// Insert with `ttl`, or the default TTL when `None`. Evicts expired
    /// entries first, then the oldest insertion, when the store is full.
    pub fn put(&self, key: &str, value: V, ttl: Option<Duration>) {
        if !self.map.contains_key(key) && self.map.len() >= self.max_entries {
            self.purge_expired();
            if self.map.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        let now = Instant::now();
        self.map.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::debug!("Cache full, evicting {}", key);
            self.map.remove(&key);
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Resolved market records keyed by symbol.
pub struct MarketCache {
    records: TtlCache<MarketRecord>,
}

impl MarketCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            records: TtlCache::new(default_ttl, max_entries),
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<MarketRecord> {
        self.records.get(symbol.as_str())
    }

    /// Last record stored for `symbol`, even if expired.
    pub fn get_stale(&self, symbol: &Symbol) -> Option<MarketRecord> {
        self.records.get_stale(symbol.as_str())
    }

    pub fn put(&self, record: MarketRecord, ttl: Duration) {
        let key = record.symbol.as_str().to_string();
        self.records.put(&key, record, Some(ttl));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
