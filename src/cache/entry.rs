//! Cache Entry Types
//!
//! A value plus the bookkeeping needed to judge its freshness.

use std::time::Duration;

use tokio::time::Instant;

/// Cache entry: a value, when it was stored and how long it stays fresh.
///
/// Staleness is a continuous function of time; nothing expires an entry in
/// the background. Readers compare `fetched_at + ttl` with the Tokio clock,
/// which follows `std::time::Instant` unless a test pauses it.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value
    pub value: V,
    /// When the value was stored
    pub fetched_at: Instant,
    /// Freshness window measured from `fetched_at`
    pub ttl: Duration,
    /// Number of fresh reads served from this entry
    pub hits: u64,
}

impl<V> CacheEntry<V> {
    /// Create a new entry stamped with the current instant
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            ttl,
            hits: 0,
        }
    }

    /// Time elapsed since the value was stored
    #[inline]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Fresh while `now - fetched_at <= ttl`
    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.age() <= self.ttl
    }

    /// Inverse of [`CacheEntry::is_fresh`]
    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.is_fresh()
    }

    /// Record a fresh read and return the new count
    #[inline]
    pub fn record_hit(&mut self) -> u64 {
        self.hits += 1;
        self.hits
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("payload", Duration::from_secs(60));
        assert_eq!(entry.value, "payload");
        assert_eq!(entry.hits, 0);
        assert!(entry.is_fresh());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_hit_tracking() {
        let mut entry = CacheEntry::new(1u32, Duration::from_secs(60));
        assert_eq!(entry.record_hit(), 1);
        assert_eq!(entry.record_hit(), 2);
        assert_eq!(entry.hits, 2);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let entry = CacheEntry::new(1u32, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(entry.is_expired());
        assert!(entry.age() >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_follows_paused_clock() {
        let entry = CacheEntry::new(1u32, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(entry.is_fresh());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(entry.is_expired());
    }

    #[test]
    fn test_entry_clone_keeps_timestamp() {
        let entry = CacheEntry::new(vec![1, 2, 3], Duration::from_secs(5));
        let cloned = entry.clone();
        assert_eq!(cloned.fetched_at, entry.fetched_at);
        assert_eq!(cloned.value, vec![1, 2, 3]);
    }
}
