//! C1: the in-process reference-data cache. Four independent LRU maps,
//! one per entity kind, safe under concurrent access from worker tasks
//! (§4.1, §5).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

pub const MAX_PER_KIND: usize = 12_500;
pub const MAX_TOTAL: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    CruiseLine,
    Ship,
    Port,
    Region,
}

const KINDS: [Kind; 4] = [Kind::CruiseLine, Kind::Ship, Kind::Port, Kind::Region];

struct Map {
    kind: Kind,
    entries: Mutex<LruCache<String, Uuid>>,
}

impl Map {
    fn new(kind: Kind) -> Self {
        Map {
            kind,
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(MAX_PER_KIND).unwrap())),
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Bounded, process-scoped cache mapping `(kind, provider_identifier)` to
/// an internal catalog UUID. Clearable and statisics-resettable via the
/// control API (§6.3).
pub struct ReferenceCache {
    cruise_lines: Map,
    ships: Map,
    ports: Map,
    regions: Map,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub cruise_lines: usize,
    pub ships: usize,
    pub ports: usize,
    pub regions: usize,
    pub total: usize,
    pub max_total: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceCache {
    pub fn new() -> Self {
        ReferenceCache {
            cruise_lines: Map::new(Kind::CruiseLine),
            ships: Map::new(Kind::Ship),
            ports: Map::new(Kind::Port),
            regions: Map::new(Kind::Region),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn map(&self, kind: Kind) -> &Map {
        match kind {
            Kind::CruiseLine => &self.cruise_lines,
            Kind::Ship => &self.ships,
            Kind::Port => &self.ports,
            Kind::Region => &self.regions,
        }
    }

    pub fn get(&self, kind: Kind, key: &str) -> Option<Uuid> {
        let map = self.map(kind);
        let mut entries = map.entries.lock().unwrap();
        let found = entries.get(key).copied();
        drop(entries);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Inserts `key -> id`, evicting the per-kind LRU entry at capacity, and
    /// then the global-LRU-of-the-largest-map entry if the cache-wide total
    /// exceeds `MAX_TOTAL` (§4.1).
    pub fn set(&self, kind: Kind, key: &str, id: Uuid) {
        {
            let map = self.map(kind);
            let mut entries = map.entries.lock().unwrap();
            entries.put(key.to_string(), id);
        }
        self.evict_if_over_total();
    }

    fn evict_if_over_total(&self) {
        let total: usize = KINDS.iter().map(|k| self.map(*k).len()).sum();
        if total <= MAX_TOTAL {
            return;
        }
        let largest = KINDS
            .iter()
            .copied()
            .max_by_key(|k| self.map(*k).len())
            .unwrap();
        let map = self.map(largest);
        let mut entries = map.entries.lock().unwrap();
        entries.pop_lru();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let cruise_lines = self.cruise_lines.len();
        let ships = self.ships.len();
        let ports = self.ports.len();
        let regions = self.regions.len();
        CacheStats {
            cruise_lines,
            ships,
            ports,
            regions,
            total: cruise_lines + ships + ports + regions,
            max_total: MAX_TOTAL,
            hits,
            misses,
            hit_rate: if total_requests == 0 {
                0.0
            } else {
                hits as f64 / total_requests as f64
            },
        }
    }

    pub fn clear(&self) {
        for kind in KINDS {
            self.map(kind).entries.lock().unwrap().clear();
        }
        self.reset_stats();
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hit_then_miss_updates_counters_and_hit_rate() {
        let cache = ReferenceCache::new();
        assert_eq!(cache.get(Kind::Port, "ABC"), None);

        let id = Uuid::new_v4();
        cache.set(Kind::Port, "ABC", id);
        assert_eq!(cache.get(Kind::Port, "ABC"), Some(id));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.ports, 1);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn empty_cache_has_zero_hit_rate() {
        let cache = ReferenceCache::new();
        assert_eq!(cache.stats().hit_rate, 0.0);
    }

    #[test]
    fn clear_resets_entries_and_stats() {
        let cache = ReferenceCache::new();
        cache.set(Kind::Region, "R1", Uuid::new_v4());
        let _ = cache.get(Kind::Region, "R1");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn reset_stats_preserves_entries() {
        let cache = ReferenceCache::new();
        cache.set(Kind::Ship, "S1", Uuid::new_v4());
        let _ = cache.get(Kind::Ship, "S1");
        cache.reset_stats();
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.ships, 1);
    }

    #[test]
    fn per_kind_eviction_caps_at_max_per_kind() {
        let cache = ReferenceCache::new();
        for i in 0..(MAX_PER_KIND + 10) {
            cache.set(Kind::Port, &format!("P{i}"), Uuid::new_v4());
        }
        assert_eq!(cache.stats().ports, MAX_PER_KIND);
    }
}
