//! Bounded Caches
//!
//! Generic LRU + TTL storage shared by every other component.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      BoundedCache<K, V>                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  HashMap<K, Slot>            VecDeque<(tick, K)>              │
//! │  ┌──────────────────────┐    ┌───────────────────────────┐   │
//! │  │ CacheEntry {          │    │ LRU ─────────────────▶ MRU │   │
//! │  │   value, fetched_at,  │    │ stale ticks skipped and   │   │
//! │  │   ttl, hits }         │    │ swept lazily              │   │
//! │  └──────────────────────┘    └───────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Freshness is evaluated on read; there is no background expiry task.
//! `peek` is the only way to observe an expired entry.

mod bounded;
mod entry;
mod proptest;

pub use bounded::BoundedCache;
pub use entry::CacheEntry;

/// Read-only occupancy view of a cache, used by the stats collector.
pub trait CacheGauge: Send + Sync {
    /// Name shown in reports
    fn name(&self) -> &str;

    /// Resident entries, fresh or not
    fn len(&self) -> usize;

    /// Maximum number of entries
    fn capacity(&self) -> usize;

    /// Sum of hit counters across resident entries
    fn total_hits(&self) -> u64;

    /// Check if the cache is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_gauge_object_safety() {
        let cache: Arc<BoundedCache<u32, String>> = Arc::new(BoundedCache::new("records", 8));
        cache.set(1, "one".to_string(), Duration::from_secs(60));
        cache.get(&1);

        let gauge: Arc<dyn CacheGauge> = cache;
        assert_eq!(gauge.name(), "records");
        assert_eq!(gauge.len(), 1);
        assert_eq!(gauge.capacity(), 8);
        assert_eq!(gauge.total_hits(), 1);
        assert!(!gauge.is_empty());
    }
}
