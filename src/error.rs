//! Error types for skycache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in skycache
#[derive(Error, Debug)]
pub enum Error {
    /// Remote feed could not be fetched and no cached value existed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Network Failures
// =============================================================================

/// Failure of a single network operation.
///
/// Cloneable so that every caller joined on the same in-flight request
/// observes an identical error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Endpoint answered with a non-success status
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Operation exceeded its fixed timeout
    #[error("GET {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// Connection, TLS or body transfer failure
    #[error("GET {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Body was not the expected JSON shape
    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    /// URL of the failed operation
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }

    /// Map a reqwest error onto the taxonomy
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                after: timeout,
            };
        }
        if let Some(status) = err.status() {
            return FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return FetchError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            };
        }
        FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Propagation Failures
// =============================================================================

/// Propagation handle could not be constructed from an element set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot build propagation handle for catalog {catalog_id} at epoch {epoch}: {reason}")]
pub struct BuildError {
    pub catalog_id: u32,
    pub epoch: String,
    pub reason: String,
}

/// Propagation of an existing handle failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Propagation failed for catalog {catalog_id}: {reason}")]
pub struct PropagationError {
    pub catalog_id: u32,
    pub reason: String,
}
