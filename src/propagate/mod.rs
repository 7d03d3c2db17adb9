//! Propagation handles
//!
//! The orbital mechanics live behind [`Propagator`]. This module only
//! decides when a handle is built and how long it is kept: handles are
//! cached by `(catalog id, epoch)`, at most one per catalog id, and dropped
//! by the ingestion engine when the epoch moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::BoundedCache;
use crate::error::{BuildError, PropagationError};
use crate::ingest::{ElementSetRecord, HandleEpochs, HandleKey};
use crate::stats::StatsCollector;

/// Position and velocity in an Earth-centred inertial frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StateVector {
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
}

impl StateVector {
    /// Inertial speed, km/s
    pub fn speed(&self) -> f64 {
        self.velocity_km_s.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Distance from the frame origin, km
    pub fn radius(&self) -> f64 {
        self.position_km.iter().map(|p| p * p).sum::<f64>().sqrt()
    }
}

/// External propagation library.
///
/// Building a handle is expensive; propagating an existing one is cheap.
/// Both failures are recoverable.
pub trait Propagator: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn build_handle(&self, record: &ElementSetRecord) -> Result<Self::Handle, BuildError>;

    fn propagate(&self, handle: &Self::Handle, at: DateTime<Utc>) -> Result<StateVector, PropagationError>;
}

/// Lazily built, cached propagation handles
pub struct HandleStore<P: Propagator> {
    propagator: Arc<P>,
    handles: Arc<BoundedCache<HandleKey, Arc<P::Handle>>>,
    records: Arc<BoundedCache<u32, ElementSetRecord>>,
    epochs: HandleEpochs,
    ttl: Duration,
    stats: Arc<StatsCollector>,
}

impl<P: Propagator> HandleStore<P> {
    pub fn new(
        propagator: Arc<P>,
        handles: Arc<BoundedCache<HandleKey, Arc<P::Handle>>>,
        records: Arc<BoundedCache<u32, ElementSetRecord>>,
        epochs: HandleEpochs,
        ttl: Duration,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            propagator,
            handles,
            records,
            epochs,
            ttl,
            stats,
        }
    }

    /// Handle for `record`, building it on first need.
    ///
    /// A record the store already knows under a newer epoch gets a handle
    /// but the handle is not cached. Caching a handle replaces any handle
    /// of another epoch for the same id. Build failures yield `None` and
    /// leave the record in place for a later retry.
    pub fn get_handle(&self, record: &ElementSetRecord) -> Option<Arc<P::Handle>> {
        let key = record.handle_key();

        if let Some(handle) = self.handles.get(&key) {
            self.stats.record_hit();
            return Some(handle);
        }
        self.stats.record_miss();

        let handle = match self.propagator.build_handle(record) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!("{}", e);
                self.stats.record_build_failure();
                return None;
            }
        };

        // Excludes ingestion between the epoch check and the insert
        let mut epochs = self.epochs.lock();

        let superseded = self
            .records
            .peek(&record.norad_cat_id)
            .is_some_and(|entry| entry.value.epoch != record.epoch);

        if superseded {
            debug!(%key, "Not caching handle for superseded epoch");
            return Some(handle);
        }

        if let Some(previous) = epochs.insert(record.norad_cat_id, record.epoch.clone()) {
            if previous != record.epoch {
                self.handles.invalidate(&HandleKey::new(record.norad_cat_id, previous));
            }
        }
        self.handles.set(key, Arc::clone(&handle), self.ttl);

        Some(handle)
    }

    /// Propagate `record` to `at`
    pub fn propagate(&self, record: &ElementSetRecord, at: DateTime<Utc>) -> Option<StateVector> {
        let handle = self.get_handle(record)?;
        match self.propagator.propagate(&handle, at) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    pub fn propagator(&self) -> &Arc<P> {
        &self.propagator
    }
}

impl<P: Propagator> std::fmt::Debug for HandleStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleStore")
            .field("handles", &self.handles.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    /// Fixed circular state; refuses records with eccentricity >= 1
    #[derive(Default)]
    struct FixedPropagator {
        builds: AtomicUsize,
    }

    struct FixedHandle {
        catalog_id: u32,
        epoch: String,
    }

    impl Propagator for FixedPropagator {
        type Handle = FixedHandle;

        fn build_handle(&self, record: &ElementSetRecord) -> Result<FixedHandle, BuildError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if record.eccentricity >= 1.0 {
                return Err(BuildError {
                    catalog_id: record.norad_cat_id,
                    epoch: record.epoch.clone(),
                    reason: "not a closed orbit".to_string(),
                });
            }
            Ok(FixedHandle {
                catalog_id: record.norad_cat_id,
                epoch: record.epoch.clone(),
            })
        }

        fn propagate(&self, handle: &FixedHandle, _at: DateTime<Utc>) -> Result<StateVector, PropagationError> {
            if handle.catalog_id == 0 {
                return Err(PropagationError {
                    catalog_id: 0,
                    reason: "decayed".to_string(),
                });
            }
            Ok(StateVector {
                position_km: [6778.0, 0.0, 0.0],
                velocity_km_s: [0.0, 7.66, 0.0],
            })
        }
    }

    fn store() -> (HandleStore<FixedPropagator>, Arc<BoundedCache<u32, ElementSetRecord>>, Arc<StatsCollector>) {
        let stats = Arc::new(StatsCollector::default());
        let records = Arc::new(BoundedCache::new("records", 16));
        let store = HandleStore::new(
            Arc::new(FixedPropagator::default()),
            Arc::new(BoundedCache::new("handles", 16)),
            records.clone(),
            HandleEpochs::default(),
            HOUR,
            stats.clone(),
        );
        (store, records, stats)
    }

    fn builds(store: &HandleStore<FixedPropagator>) -> usize {
        store.propagator().builds.load(Ordering::SeqCst)
    }

    #[test]
    fn test_handle_built_once() {
        let (store, _, _) = store();
        let record = ElementSetRecord::new(25544, "E1");

        let a = store.get_handle(&record).unwrap();
        let b = store.get_handle(&record).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.epoch, "E1");
        assert_eq!(builds(&store), 1);
    }

    #[test]
    fn test_new_epoch_builds_new_handle() {
        let (store, _, _) = store();
        store.get_handle(&ElementSetRecord::new(1, "E1")).unwrap();
        let h = store.get_handle(&ElementSetRecord::new(1, "E2")).unwrap();

        assert_eq!(h.epoch, "E2");
        assert_eq!(builds(&store), 2);
    }

    #[test]
    fn test_build_failure_is_none() {
        let (store, _, stats) = store();
        let mut record = ElementSetRecord::new(3, "E1");
        record.eccentricity = 1.2;

        assert!(store.get_handle(&record).is_none());
        assert!(store.propagate(&record, Utc::now()).is_none());
        assert_eq!(stats.snapshot().build_failures, 2);
    }

    #[test]
    fn test_one_handle_per_catalog_id() {
        let (store, _, _) = store();
        store.get_handle(&ElementSetRecord::new(6, "E1")).unwrap();
        store.get_handle(&ElementSetRecord::new(6, "E2")).unwrap();

        assert_eq!(store.handles.len(), 1);
        assert!(!store.handles.contains_fresh(&HandleKey::new(6, "E1")));
        assert_eq!(store.epochs.lock().get(&6).map(String::as_str), Some("E2"));
    }

    #[test]
    fn test_superseded_epoch_not_cached() {
        let (store, records, _) = store();
        records.set(4, ElementSetRecord::new(4, "E2"), HOUR);

        let old = ElementSetRecord::new(4, "E1");
        assert!(store.get_handle(&old).is_some());
        assert!(store.get_handle(&old).is_some());

        assert_eq!(builds(&store), 2);
    }

    #[test]
    fn test_propagate() {
        let (store, _, _) = store();
        let state = store.propagate(&ElementSetRecord::new(25544, "E1"), Utc::now()).unwrap();

        assert!((state.speed() - 7.66).abs() < 1e-9);
        assert!((state.radius() - 6778.0).abs() < 1e-9);
    }

    #[test]
    fn test_propagation_failure_is_none() {
        let (store, _, _) = store();
        assert!(store.propagate(&ElementSetRecord::new(0, "E1"), Utc::now()).is_none());
    }
}
