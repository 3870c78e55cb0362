//! In-memory response store with TTL expiry and LRU eviction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::cache::entry::{current_timestamp_ms, CacheEntry, CachedResponse};
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::observability::metrics;

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    /// Position in the LRU index.
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    /// Access tick → key; the first entry is the least recently used.
    lru: BTreeMap<u64, String>,
    next_tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.entries.remove(key)?;
        self.lru.remove(&slot.tick);
        Some(slot.entry)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.lru.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn insert(&mut self, entry: CacheEntry) {
        let tick = self.bump();
        self.lru.insert(tick, entry.key.clone());
        self.entries.insert(entry.key.clone(), Slot { entry, tick });
    }
}

/// Bounded response cache.
///
/// All operations take one mutex and never await while holding it.
#[derive(Debug)]
pub struct ResponseCache {
    max_size: usize,
    default_ttl: Duration,
    max_entry_bytes: usize,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(max_size: usize, default_ttl: Duration, max_entry_bytes: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            default_ttl,
            max_entry_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_size,
            Duration::from_secs(config.default_ttl_secs),
            config.max_entry_bytes,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a fresh entry. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.lock();
        let now = current_timestamp_ms();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                metrics::record_cache_event("miss");
                return None;
            }
            Some(slot) => slot.entry.is_expired_at(now),
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            metrics::record_cache_event("expired");
            metrics::record_cache_event("miss");
            metrics::record_cache_size(inner.entries.len());
            return None;
        }

        let tick = inner.bump();
        let Inner { entries, lru, stats, .. } = &mut *inner;
        let slot = entries.get_mut(key)?;
        lru.remove(&slot.tick);
        lru.insert(tick, key.to_string());
        slot.tick = tick;
        slot.entry.last_access_ms = now;
        slot.entry.hit_count += 1;
        stats.hits += 1;
        metrics::record_cache_event("hit");
        Some(slot.entry.value.clone())
    }

    /// Store a response. Uses the default TTL when `ttl` is `None`.
    ///
    /// Returns false when the body exceeds the entry size limit. When the
    /// cache is full, the least recently accessed entry is evicted first.
    pub fn set(&self, key: &str, value: CachedResponse, ttl: Option<Duration>) -> bool {
        if value.body.len() > self.max_entry_bytes {
            tracing::debug!(key = %key, size = value.body.len(), limit = self.max_entry_bytes, "Response too large to cache");
            return false;
        }

        let entry = CacheEntry::new(key.to_string(), value, ttl.unwrap_or(self.default_ttl));
        let mut inner = self.lock();
        inner.remove(key);
        while inner.entries.len() >= self.max_size {
            match inner.evict_lru() {
                Some(evicted) => {
                    inner.stats.evictions += 1;
                    metrics::record_cache_event("evicted");
                    tracing::trace!(key = %evicted, "Evicted least recently used entry");
                }
                None => break,
            }
        }
        inner.insert(entry);
        inner.stats.insertions += 1;
        metrics::record_cache_size(inner.entries.len());
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.remove(key).is_some();
        metrics::record_cache_size(inner.entries.len());
        removed
    }

    /// Drop an entry that could not be decoded.
    ///
    /// The preceding `get` counted a hit; the client got a miss, so the
    /// count moves over.
    pub fn purge_corrupt(&self, key: &str) {
        let mut inner = self.lock();
        if inner.remove(key).is_some() {
            inner.stats.hits = inner.stats.hits.saturating_sub(1);
            inner.stats.misses += 1;
        }
        inner.stats.corrupt_entries += 1;
        metrics::record_cache_event("corrupt");
        tracing::warn!(key = %key, "Purged corrupt cache entry");
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.lru.clear();
        metrics::record_cache_size(0);
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        metrics::record_cache_size(inner.entries.len());
        keys.len()
    }

    /// Remove every expired entry regardless of access.
    pub fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;
        metrics::record_cache_size(inner.entries.len());
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.size = inner.entries.len();
        stats.max_size = self.max_size;
        stats.hit_rate = stats.compute_hit_rate();
        stats
    }

    /// Live entries, least recently used first.
    pub fn export(&self) -> Vec<CacheEntry> {
        let now = current_timestamp_ms();
        let inner = self.lock();
        inner
            .lru
            .values()
            .filter_map(|key| inner.entries.get(key))
            .filter(|slot| !slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Load entries in order, keeping their original timestamps.
    /// Expired and oversized entries are skipped.
    pub fn import(&self, entries: Vec<CacheEntry>) -> usize {
        let now = current_timestamp_ms();
        let mut inner = self.lock();
        let mut loaded = 0;
        for entry in entries {
            if entry.is_expired_at(now) || entry.size_bytes() > self.max_entry_bytes {
                continue;
            }
            inner.remove(&entry.key);
            while inner.entries.len() >= self.max_size {
                if inner.evict_lru().is_none() {
                    break;
                }
            }
            inner.insert(entry);
            loaded += 1;
        }
        metrics::record_cache_size(inner.entries.len());
        loaded
    }
}
