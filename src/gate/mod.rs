//! Delta Propagation Gate
//!
//! Decides whether a satellite moved enough since its last computed state to
//! justify recomputing derived values. The gate only answers the question;
//! callers choose whether to ask it (see [`GateMode`]).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::BoundedCache;
use crate::stats::StatsCollector;

/// Default angular threshold in degrees
pub const DEFAULT_THRESHOLD_DEG: f64 = 0.05;

/// Size of one [`PackedState`]
pub const PACKED_STATE_BYTES: usize = std::mem::size_of::<PackedState>();

/// Estimated size of the same seven fields held as a keyed object: key
/// string plus boxed number per field, and the object header
pub const VERBOSE_STATE_BYTES: usize = 7 * (24 + 16) + 56;

// =============================================================================
// Packed State
// =============================================================================

/// Last computed state of one satellite, packed into seven `f32`s.
///
/// Used for delta comparison and fast reconstruction; the authoritative
/// state is always recomputed from the element set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[repr(C)]
pub struct PackedState {
    /// Geodetic latitude, degrees
    pub latitude: f32,
    /// Geodetic longitude, degrees
    pub longitude: f32,
    /// Altitude above the ellipsoid, km
    pub altitude: f32,
    /// Inertial speed, km/s
    pub speed: f32,
    /// Orbital inclination, degrees
    pub inclination: f32,
    /// Orbital period, minutes
    pub period: f32,
    /// Time since element set epoch, hours
    pub age: f32,
}

impl PackedState {
    /// Pack full-precision values
    pub fn pack(
        latitude: f64,
        longitude: f64,
        altitude: f64,
        speed: f64,
        inclination: f64,
        period: f64,
        age: f64,
    ) -> Self {
        Self {
            latitude: latitude as f32,
            longitude: longitude as f32,
            altitude: altitude as f32,
            speed: speed as f32,
            inclination: inclination as f32,
            period: period as f32,
            age: age as f32,
        }
    }

    /// Fields in declaration order
    pub fn to_array(self) -> [f32; 7] {
        [
            self.latitude,
            self.longitude,
            self.altitude,
            self.speed,
            self.inclination,
            self.period,
            self.age,
        ]
    }

    /// Inverse of [`PackedState::to_array`]
    pub fn from_array(fields: [f32; 7]) -> Self {
        let [latitude, longitude, altitude, speed, inclination, period, age] = fields;
        Self {
            latitude,
            longitude,
            altitude,
            speed,
            inclination,
            period,
            age,
        }
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Whether a call site consults the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateMode {
    /// Always recompute
    #[default]
    Always,
    /// Reuse the packed state when the position barely moved
    SkipUnchanged,
}

/// Result of [`DeltaPropagationGate::observe`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// State was recomputed and stored
    Computed(PackedState),
    /// Recomputation skipped; the previous state is still current
    Skipped(PackedState),
}

impl Observation {
    /// The state either way
    pub fn state(&self) -> PackedState {
        match self {
            Observation::Computed(state) | Observation::Skipped(state) => *state,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, Observation::Skipped(_))
    }
}

/// Position-delta gate over the packed-state cache
pub struct DeltaPropagationGate {
    packed: Arc<BoundedCache<u32, PackedState>>,
    threshold_deg: f64,
    ttl: Duration,
    stats: Arc<StatsCollector>,
}

impl DeltaPropagationGate {
    pub fn new(
        packed: Arc<BoundedCache<u32, PackedState>>,
        threshold_deg: f64,
        ttl: Duration,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            packed,
            threshold_deg,
            ttl,
            stats,
        }
    }

    /// True unless both coordinate deltas against the stored state are
    /// strictly below the threshold. Without a fresh stored state there is
    /// no baseline and the answer is always true.
    pub fn needs_update(&self, id: u32, latitude: f64, longitude: f64) -> bool {
        let Some(entry) = self.packed.peek(&id).filter(|e| e.is_fresh()) else {
            return true;
        };

        let d_lat = (latitude - f64::from(entry.value.latitude)).abs();
        let d_lon = (longitude - f64::from(entry.value.longitude)).abs();

        if d_lat < self.threshold_deg && d_lon < self.threshold_deg {
            self.stats.record_skip();
            false
        } else {
            true
        }
    }

    /// Store the state computed for `id`
    pub fn set_packed_state(&self, id: u32, state: PackedState) {
        self.packed.set(id, state, self.ttl);
    }

    /// Fresh stored state for `id`
    pub fn get_packed_state(&self, id: u32) -> Option<PackedState> {
        self.packed.get(&id)
    }

    /// Recompute through `compute` unless `mode` allows skipping and the
    /// gate says the position is unchanged
    pub fn observe<F>(&self, id: u32, latitude: f64, longitude: f64, mode: GateMode, compute: F) -> Observation
    where
        F: FnOnce() -> PackedState,
    {
        if mode == GateMode::SkipUnchanged && !self.needs_update(id, latitude, longitude) {
            if let Some(entry) = self.packed.peek(&id) {
                return Observation::Skipped(entry.value);
            }
        }

        let state = compute();
        self.set_packed_state(id, state);
        Observation::Computed(state)
    }

    /// Number of skipped recomputations
    pub fn skip_count(&self) -> u64 {
        self.stats.skip_count()
    }

    pub fn threshold_deg(&self) -> f64 {
        self.threshold_deg
    }
}

impl std::fmt::Debug for DeltaPropagationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaPropagationGate")
            .field("threshold_deg", &self.threshold_deg)
            .field("states", &self.packed.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DeltaPropagationGate {
        let packed = Arc::new(BoundedCache::new("packed_states", 64));
        DeltaPropagationGate::new(
            packed,
            DEFAULT_THRESHOLD_DEG,
            Duration::from_secs(600),
            Arc::new(StatsCollector::default()),
        )
    }

    fn at(lat: f64, lon: f64) -> PackedState {
        PackedState::pack(lat, lon, 420.0, 7.66, 51.64, 92.9, 3.5)
    }

    #[test]
    fn test_packed_state_is_compact() {
        assert_eq!(PACKED_STATE_BYTES, 28);
        assert!(VERBOSE_STATE_BYTES > PACKED_STATE_BYTES);
    }

    #[test]
    fn test_pack_array_roundtrip() {
        let state = at(10.0, 20.0);
        assert_eq!(PackedState::from_array(state.to_array()), state);
    }

    #[test]
    fn test_no_baseline_needs_update() {
        let gate = gate();
        assert!(gate.needs_update(100, 10.00, 20.00));
        assert_eq!(gate.skip_count(), 0);
    }

    #[test]
    fn test_small_delta_skips() {
        let gate = gate();
        gate.set_packed_state(100, at(10.00, 20.00));

        assert!(!gate.needs_update(100, 10.02, 20.01));
        assert_eq!(gate.skip_count(), 1);
    }

    #[test]
    fn test_large_latitude_delta_updates() {
        let gate = gate();
        gate.set_packed_state(100, at(10.00, 20.00));

        assert!(gate.needs_update(100, 10.10, 20.01));
        assert_eq!(gate.skip_count(), 0);
    }

    #[test]
    fn test_large_longitude_delta_updates() {
        let gate = gate();
        gate.set_packed_state(100, at(10.00, 20.00));

        assert!(gate.needs_update(100, 10.00, 19.90));
        assert_eq!(gate.skip_count(), 0);
    }

    #[test]
    fn test_delta_at_threshold_updates() {
        let gate = gate();
        gate.set_packed_state(7, at(0.0, 0.0));

        assert!(gate.needs_update(7, 0.05, 0.0));
        assert!(gate.needs_update(7, 0.0, -0.05));
        assert_eq!(gate.skip_count(), 0);
    }

    #[test]
    fn test_expired_state_is_no_baseline() {
        let packed = Arc::new(BoundedCache::new("packed_states", 4));
        let gate = DeltaPropagationGate::new(
            packed,
            DEFAULT_THRESHOLD_DEG,
            Duration::from_millis(1),
            Arc::new(StatsCollector::default()),
        );
        gate.set_packed_state(1, at(10.0, 20.0));
        std::thread::sleep(Duration::from_millis(10));

        assert!(gate.needs_update(1, 10.0, 20.0));
    }

    #[test]
    fn test_needs_update_does_not_count_cache_hits() {
        let gate = gate();
        gate.set_packed_state(1, at(10.0, 20.0));
        gate.needs_update(1, 10.0, 20.0);
        assert_eq!(gate.packed.total_hits(), 0);
    }

    #[test]
    fn test_observe_always_recomputes() {
        let gate = gate();
        gate.set_packed_state(1, at(10.0, 20.0));

        let mut calls = 0;
        let obs = gate.observe(1, 10.0, 20.0, GateMode::Always, || {
            calls += 1;
            at(10.0, 20.0)
        });

        assert_eq!(calls, 1);
        assert!(!obs.was_skipped());
        assert_eq!(gate.skip_count(), 0);
    }

    #[test]
    fn test_observe_skip_unchanged() {
        let gate = gate();
        let first = gate.observe(1, 10.0, 20.0, GateMode::SkipUnchanged, || at(10.0, 20.0));
        assert!(!first.was_skipped());

        let second = gate.observe(1, 10.01, 20.01, GateMode::SkipUnchanged, || {
            panic!("should not recompute")
        });
        assert!(second.was_skipped());
        assert_eq!(second.state(), at(10.0, 20.0));

        let third = gate.observe(1, 11.0, 20.0, GateMode::SkipUnchanged, || at(11.0, 20.0));
        assert_eq!(third, Observation::Computed(at(11.0, 20.0)));
        assert_eq!(gate.get_packed_state(1), Some(at(11.0, 20.0)));
    }
}
