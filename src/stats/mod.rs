//! Stats Collection
//!
//! Lock-free counters recorded by every component, a rolling window of fetch
//! timings and occupancy gauges for each registered cache, folded into one
//! reportable snapshot.

mod window;

pub use window::RollingWindow;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::cache::CacheGauge;
use crate::gate::{PACKED_STATE_BYTES, VERBOSE_STATE_BYTES};

/// Default number of timing samples kept
pub const DEFAULT_TIMING_WINDOW: usize = 100;

/// Shared stats sink
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    network_fetches: AtomicU64,
    background_refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    build_failures: AtomicU64,
    skips: AtomicU64,
    timings_ms: Mutex<RollingWindow<f64>>,
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
    caches: RwLock<Vec<Arc<dyn CacheGauge>>>,
    packed: RwLock<Option<Arc<dyn CacheGauge>>>,
}

impl StatsCollector {
    /// Create a collector keeping `timing_window` samples
    pub fn new(timing_window: usize) -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            background_refreshes: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            build_failures: AtomicU64::new(0),
            skips: AtomicU64::new(0),
            timings_ms: Mutex::new(RollingWindow::new(timing_window)),
            last_refresh_at: RwLock::new(None),
            caches: RwLock::new(Vec::new()),
            packed: RwLock::new(None),
        }
    }

    /// Include a cache in the per-cache occupancy table
    pub fn register_cache(&self, cache: Arc<dyn CacheGauge>) {
        self.caches.write().push(cache);
    }

    /// Register the packed-state cache; its occupancy drives the byte
    /// savings estimate
    pub fn register_packed_cache(&self, cache: Arc<dyn CacheGauge>) {
        *self.packed.write() = Some(Arc::clone(&cache));
        self.register_cache(cache);
    }

    // Counters

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A stale value was served while a refresh runs; counts as a hit
    pub fn record_stale_serve(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_fetch(&self) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_background_refresh(&self) {
        self.background_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_failure(&self) {
        self.build_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a duration to the rolling timing window
    pub fn record_timing(&self, duration: Duration) {
        self.timings_ms.lock().push(duration.as_secs_f64() * 1000.0);
    }

    /// Remember when the latest ingestion batch completed
    pub fn mark_refresh(&self, at: DateTime<Utc>) {
        *self.last_refresh_at.write() = Some(at);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn skip_count(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn network_fetches(&self) -> u64 {
        self.network_fetches.load(Ordering::Relaxed)
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh_at.read()
    }

    /// hits / (hits + misses), 0 when nothing was requested
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Mean of the timing window in milliseconds
    pub fn avg_timing_ms(&self) -> f64 {
        self.timings_ms.lock().mean()
    }

    /// Bytes saved by holding packed states instead of verbose objects
    pub fn estimated_bytes_saved(&self) -> u64 {
        let entries = self.packed.read().as_ref().map_or(0, |cache| cache.len());
        (entries * (VERBOSE_STATE_BYTES - PACKED_STATE_BYTES)) as u64
    }

    /// Get snapshot of all stats
    pub fn snapshot(&self) -> StatsSnapshot {
        let caches = self
            .caches
            .read()
            .iter()
            .map(|cache| CacheOccupancy {
                name: cache.name().to_string(),
                entries: cache.len(),
                capacity: cache.capacity(),
                hits: cache.total_hits(),
            })
            .collect();

        StatsSnapshot {
            caches,
            hits: self.hits(),
            misses: self.misses(),
            hit_rate: self.hit_rate(),
            avg_timing_ms: self.avg_timing_ms(),
            skip_count: self.skip_count(),
            last_refresh_at: self.last_refresh_at(),
            estimated_bytes_saved: self.estimated_bytes_saved(),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            network_fetches: self.network_fetches(),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            build_failures: self.build_failures.load(Ordering::Relaxed),
        }
    }

    /// Human-readable table of the current snapshot
    pub fn format_report(&self) -> String {
        self.snapshot().to_string()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMING_WINDOW)
    }
}

impl std::fmt::Debug for StatsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCollector")
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("skips", &self.skip_count())
            .finish()
    }
}

/// Occupancy of one cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheOccupancy {
    pub name: String,
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
}

/// Snapshot of all stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub caches: Vec<CacheOccupancy>,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_timing_ms: f64,
    pub skip_count: u64,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub estimated_bytes_saved: u64,
    pub stale_serves: u64,
    pub network_fetches: u64,
    pub background_refreshes: u64,
    pub refresh_failures: u64,
    pub build_failures: u64,
}

impl StatsSnapshot {
    /// Occupancy of the cache named `name`
    pub fn cache(&self, name: &str) -> Option<&CacheOccupancy> {
        self.caches.iter().find(|c| c.name == name)
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌──────────────────────┬──────────┬──────────┬──────────┐")?;
        writeln!(
            f,
            "│ {:<20} │ {:>8} │ {:>8} │ {:>8} │",
            "cache", "entries", "capacity", "hits"
        )?;
        writeln!(f, "├──────────────────────┼──────────┼──────────┼──────────┤")?;
        for cache in &self.caches {
            writeln!(
                f,
                "│ {:<20} │ {:>8} │ {:>8} │ {:>8} │",
                cache.name, cache.entries, cache.capacity, cache.hits
            )?;
        }
        writeln!(f, "└──────────────────────┴──────────┴──────────┴──────────┘")?;

        let last_refresh = self
            .last_refresh_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        writeln!(f, "  hit rate:          {:.1}%", self.hit_rate * 100.0)?;
        writeln!(f, "  requests:          {} hits / {} misses", self.hits, self.misses)?;
        writeln!(f, "  avg fetch time:    {:.2} ms", self.avg_timing_ms)?;
        writeln!(f, "  network fetches:   {}", self.network_fetches)?;
        writeln!(
            f,
            "  refreshes:         {} background / {} failed",
            self.background_refreshes, self.refresh_failures
        )?;
        writeln!(f, "  skipped updates:   {}", self.skip_count)?;
        writeln!(f, "  build failures:    {}", self.build_failures)?;
        writeln!(f, "  last refresh:      {}", last_refresh)?;
        write!(f, "  est. bytes saved:  {}", self.estimated_bytes_saved)
    }
}

// =============================================================================
// Tests
// =============================================================================
