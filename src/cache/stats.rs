//! Cache counters.

use serde::Serialize;

/// Cache performance counters, reported by `/stats`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (LRU).
    pub evictions: u64,
    /// Entries removed because their TTL elapsed (lazily or by the sweeper).
    pub expirations: u64,
    pub insertions: u64,
    pub corrupt_entries: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    /// hits / (hits + misses), or 0.0 before the first lookup.
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
