//! Element set records as published in GP JSON feeds

use serde::{Deserialize, Serialize};

/// One orbital element set.
///
/// Identity is the catalog number; a record with the same identity and a
/// different epoch supersedes the stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ElementSetRecord {
    pub norad_cat_id: u32,
    pub epoch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Revolutions per day
    #[serde(default)]
    pub mean_motion: f64,
    #[serde(default)]
    pub eccentricity: f64,
    /// Degrees
    #[serde(default)]
    pub inclination: f64,
    /// Degrees
    #[serde(default)]
    pub ra_of_asc_node: f64,
    /// Degrees
    #[serde(default)]
    pub arg_of_pericenter: f64,
    /// Degrees
    #[serde(default)]
    pub mean_anomaly: f64,
    #[serde(default)]
    pub bstar: f64,
}

impl ElementSetRecord {
    /// Minimal record with only identity and epoch set
    pub fn new(norad_cat_id: u32, epoch: impl Into<String>) -> Self {
        Self {
            norad_cat_id,
            epoch: epoch.into(),
            object_name: None,
            object_id: None,
            mean_motion: 0.0,
            eccentricity: 0.0,
            inclination: 0.0,
            ra_of_asc_node: 0.0,
            arg_of_pericenter: 0.0,
            mean_anomaly: 0.0,
            bstar: 0.0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = Some(name.into());
        self
    }

    /// Key of the propagation handle derived from this record
    pub fn handle_key(&self) -> HandleKey {
        HandleKey {
            catalog_id: self.norad_cat_id,
            epoch: self.epoch.clone(),
        }
    }

    /// Orbital period in minutes, if the mean motion is known
    pub fn period_minutes(&self) -> Option<f64> {
        (self.mean_motion > 0.0).then(|| 1440.0 / self.mean_motion)
    }
}

/// `(catalog id, epoch)` pair identifying a propagation handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    pub catalog_id: u32,
    pub epoch: String,
}

impl HandleKey {
    pub fn new(catalog_id: u32, epoch: impl Into<String>) -> Self {
        Self {
            catalog_id,
            epoch: epoch.into(),
        }
    }
}

impl std::fmt::Display for HandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.catalog_id, self.epoch)
    }
}
