//! Runtime configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::gate::DEFAULT_THRESHOLD_DEG;
use crate::stats::DEFAULT_TIMING_WINDOW;

/// Sizes, lifetimes and limits for every cache in a [`crate::SkyCache`]
#[derive(Debug, Clone, PartialEq)]
pub struct SkyCacheConfig {
    /// Maximum element set records held
    pub record_capacity: usize,

    /// Maximum propagation handles held
    pub handle_capacity: usize,

    /// Maximum packed states held
    pub packed_capacity: usize,

    /// Maximum feed responses held
    pub fetch_capacity: usize,

    /// Lifetime of an ingested record
    pub record_ttl: Duration,

    /// Lifetime of a propagation handle
    pub handle_ttl: Duration,

    /// Lifetime of a packed state
    pub packed_ttl: Duration,

    /// Lifetime of a feed response
    pub fetch_ttl: Duration,

    /// Bound on each network operation
    pub fetch_timeout: Duration,

    /// Fetch timing samples kept for the average
    pub timing_window: usize,

    /// Angular movement below which recomputation is skipped, degrees
    pub delta_threshold_deg: f64,

    /// User agent sent with feed requests
    pub user_agent: String,
}

impl Default for SkyCacheConfig {
    fn default() -> Self {
        Self {
            record_capacity: 20_000,
            handle_capacity: 5_000,
            packed_capacity: 20_000,
            fetch_capacity: 64,
            record_ttl: Duration::from_secs(2 * 3600),
            handle_ttl: Duration::from_secs(2 * 3600),
            packed_ttl: Duration::from_secs(10 * 60),
            fetch_ttl: Duration::from_secs(2 * 3600),
            fetch_timeout: Duration::from_secs(15),
            timing_window: DEFAULT_TIMING_WINDOW,
            delta_threshold_deg: DEFAULT_THRESHOLD_DEG,
            user_agent: format!("skycache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SkyCacheConfig {
    /// Reject configurations no cache could run with
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("record_capacity", self.record_capacity),
            ("handle_capacity", self.handle_capacity),
            ("packed_capacity", self.packed_capacity),
            ("fetch_capacity", self.fetch_capacity),
            ("timing_window", self.timing_window),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", name)));
            }
        }

        if self.fetch_timeout.is_zero() {
            return Err(Error::Config("fetch_timeout must be positive".to_string()));
        }

        if !(self.delta_threshold_deg.is_finite() && self.delta_threshold_deg > 0.0) {
            return Err(Error::Config(format!(
                "delta_threshold_deg must be a positive angle, got {}",
                self.delta_threshold_deg
            )));
        }

        Ok(())
    }
}
