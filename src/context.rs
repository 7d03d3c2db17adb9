//! The cache context
//!
//! [`SkyCache`] owns one instance of every cache and component and is
//! handed to whoever needs it. Build one per process, or one per test.
//!
//! ```text
//! ┌──────────────────────────── SkyCache ────────────────────────────┐
//! │                                                                  │
//! │  PriorityFetchScheduler ──▶ FetchCoordinator ──▶ "responses"     │
//! │           │                                                      │
//! │           ▼                                                      │
//! │   IngestionEngine ──▶ "records" ─┬─▶ invalidates "handles"       │
//! │                                  └─▶ invalidates "packed_states" │
//! │                                                                  │
//! │   HandleStore ──▶ "handles"     DeltaPropagationGate ──▶ "packed"│
//! │                                                                  │
//! │   StatsCollector ◀── every component                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::cache::BoundedCache;
use crate::config::SkyCacheConfig;
use crate::error::{FetchError, Result};
use crate::fetch::{FetchCoordinator, HttpTransport, JsonTransport};
use crate::gate::{DeltaPropagationGate, GateMode, Observation, PackedState};
use crate::ingest::{ElementSetRecord, IngestionEngine};
use crate::propagate::{HandleStore, Propagator, StateVector};
use crate::scheduler::{GroupDescriptor, PriorityFetchScheduler, ScheduleReport};
use crate::stats::{StatsCollector, StatsSnapshot};

/// Caching and freshness engine for element sets and their derived data
pub struct SkyCache<P: Propagator> {
    config: SkyCacheConfig,
    stats: Arc<StatsCollector>,
    engine: Arc<IngestionEngine<P::Handle>>,
    handles: HandleStore<P>,
    gate: DeltaPropagationGate,
    coordinator: FetchCoordinator,
    scheduler: PriorityFetchScheduler<P::Handle>,
}

impl<P: Propagator> SkyCache<P> {
    /// Build a context fetching over HTTP
    pub fn new(config: SkyCacheConfig, propagator: P) -> Result<Self> {
        let transport = HttpTransport::new(config.fetch_timeout, &config.user_agent)?;
        Self::with_transport(config, propagator, Arc::new(transport))
    }

    /// Build a context fetching through `transport`
    pub fn with_transport(
        config: SkyCacheConfig,
        propagator: P,
        transport: Arc<dyn JsonTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(StatsCollector::new(config.timing_window));

        let records = Arc::new(BoundedCache::new("records", config.record_capacity));
        let handles = Arc::new(BoundedCache::new("handles", config.handle_capacity));
        let packed = Arc::new(BoundedCache::new("packed_states", config.packed_capacity));

        stats.register_cache(records.clone());
        stats.register_cache(handles.clone());
        stats.register_packed_cache(packed.clone());

        let engine = Arc::new(IngestionEngine::new(
            records.clone(),
            handles.clone(),
            packed.clone(),
            config.record_ttl,
            stats.clone(),
        ));

        let handle_store = HandleStore::new(
            Arc::new(propagator),
            handles,
            records,
            engine.handle_epochs(),
            config.handle_ttl,
            stats.clone(),
        );

        let gate = DeltaPropagationGate::new(
            packed,
            config.delta_threshold_deg,
            config.packed_ttl,
            stats.clone(),
        );

        let coordinator = FetchCoordinator::new(
            transport,
            config.fetch_capacity,
            config.fetch_timeout,
            stats.clone(),
        );

        let scheduler = PriorityFetchScheduler::new(coordinator.clone(), engine.clone());

        info!(
            "Cache context ready: {} records, {} handles, {} packed states",
            config.record_capacity, config.handle_capacity, config.packed_capacity
        );

        Ok(Self {
            config,
            stats,
            engine,
            handles: handle_store,
            gate,
            coordinator,
            scheduler,
        })
    }

    // Records

    pub fn ingest_batch(&self, records: &[ElementSetRecord]) -> usize {
        self.engine.ingest_batch(records)
    }

    pub fn get_record(&self, id: u32) -> Option<ElementSetRecord> {
        self.engine.get_record(id)
    }

    pub fn get_all_records(&self) -> Vec<ElementSetRecord> {
        self.engine.get_all_records()
    }

    pub fn last_ingest_at(&self) -> Option<DateTime<Utc>> {
        self.engine.last_ingest_at()
    }

    // Propagation

    /// Cached or freshly built handle; `None` if the build failed
    pub fn get_handle(&self, record: &ElementSetRecord) -> Option<Arc<P::Handle>> {
        self.handles.get_handle(record)
    }

    pub fn propagate(&self, record: &ElementSetRecord, at: DateTime<Utc>) -> Option<StateVector> {
        self.handles.propagate(record, at)
    }

    // Delta gate

    pub fn needs_update(&self, id: u32, latitude: f64, longitude: f64) -> bool {
        self.gate.needs_update(id, latitude, longitude)
    }

    pub fn set_packed_state(&self, id: u32, state: PackedState) {
        self.gate.set_packed_state(id, state)
    }

    pub fn get_packed_state(&self, id: u32) -> Option<PackedState> {
        self.gate.get_packed_state(id)
    }

    pub fn observe<F>(&self, id: u32, latitude: f64, longitude: f64, mode: GateMode, compute: F) -> Observation
    where
        F: FnOnce() -> PackedState,
    {
        self.gate.observe(id, latitude, longitude, mode, compute)
    }

    // Remote feeds

    /// Fetch any JSON document through the shared coordinator
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str, ttl: Duration) -> std::result::Result<T, FetchError> {
        self.coordinator.fetch(url, ttl).await
    }

    pub async fn fetch_groups<F>(&self, groups: &[GroupDescriptor], on_group_loaded: F) -> ScheduleReport
    where
        F: Fn(&str, &[ElementSetRecord]) + Send + Sync,
    {
        self.scheduler.fetch_groups(groups, on_group_loaded).await
    }

    // Reporting

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn format_report(&self) -> String {
        self.stats.format_report()
    }

    pub fn collector(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &SkyCacheConfig {
        &self.config
    }
}

impl<P: Propagator> std::fmt::Debug for SkyCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkyCache")
            .field("engine", &self.engine)
            .field("gate", &self.gate)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, Error, PropagationError};
    use crate::fetch::ScriptedTransport;
    use assert_matches::assert_matches;

    struct EpochPropagator;

    impl Propagator for EpochPropagator {
        type Handle = String;

        fn build_handle(&self, record: &ElementSetRecord) -> std::result::Result<String, BuildError> {
            Ok(record.handle_key().to_string())
        }

        fn propagate(&self, _: &String, _: DateTime<Utc>) -> std::result::Result<StateVector, PropagationError> {
            Ok(StateVector::default())
        }
    }

    fn context() -> SkyCache<EpochPropagator> {
        SkyCache::with_transport(
            SkyCacheConfig::default(),
            EpochPropagator,
            Arc::new(ScriptedTransport::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SkyCacheConfig {
            record_capacity: 0,
            ..Default::default()
        };
        let result = SkyCache::with_transport(config, EpochPropagator, Arc::new(ScriptedTransport::new()));
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_epoch_change_drops_handle_and_packed_state() {
        let sky = context();
        let e1 = ElementSetRecord::new(25544, "E1");
        sky.ingest_batch(&[e1.clone()]);

        let handle = sky.get_handle(&e1).unwrap();
        assert_eq!(handle.as_str(), "25544@E1");
        sky.set_packed_state(25544, PackedState::pack(10.0, 20.0, 420.0, 7.66, 51.6, 92.9, 1.0));

        assert_eq!(sky.ingest_batch(&[ElementSetRecord::new(25544, "E2")]), 1);

        assert!(sky.get_packed_state(25544).is_none());
        assert!(sky.needs_update(25544, 10.0, 20.0));

        // The old epoch is superseded, so its rebuilt handle is not cached
        let stats_before = sky.stats();
        sky.get_handle(&e1);
        assert_eq!(sky.stats().cache("handles").map(|c| c.entries), Some(0));
        assert_eq!(sky.stats().misses, stats_before.misses + 1);
    }

    #[test]
    fn test_report_lists_every_cache() {
        let sky = context();
        let stats = sky.stats();
        for name in ["records", "handles", "packed_states", "responses"] {
            assert!(stats.cache(name).is_some(), "missing {}", name);
        }
        assert!(sky.format_report().contains("packed_states"));
    }

    #[test]
    fn test_packed_states_drive_byte_savings() {
        let sky = context();
        assert_eq!(sky.stats().estimated_bytes_saved, 0);
        sky.set_packed_state(1, PackedState::default());
        sky.set_packed_state(2, PackedState::default());
        assert!(sky.stats().estimated_bytes_saved > 0);
    }
}
