//! skycache - Caching and Data-Freshness Engine for Orbital Element Sets
//!
//! Ingests short-lived element sets from public feeds, keeps them and the
//! values derived from them in bounded, time-limited caches, and avoids
//! recomputing derived values that would not change.
//!
//! # Architecture
//!
//! ```text
//! feed ──▶ FetchCoordinator ──▶ IngestionEngine ──▶ caches ──▶ DeltaPropagationGate
//!          (dedup + SWR)        (epoch deltas,       (records,   (skip small moves)
//!                                cascade invalidate)  handles,
//!                                                     packed)
//! ```
//!
//! The orbital mechanics themselves are not part of this crate; they are
//! plugged in through [`Propagator`].
//!
//! # Modules
//!
//! - [`cache`] - Generic LRU + TTL cache
//! - [`config`] - Runtime configuration
//! - [`context`] - The [`SkyCache`] context wiring everything together
//! - [`error`] - Error types
//! - [`fetch`] - Deduplicating stale-while-revalidate fetcher
//! - [`gate`] - Position-delta recomputation gate
//! - [`ingest`] - Element set records and batch ingestion
//! - [`propagate`] - Propagation handle caching
//! - [`scheduler`] - Two-tier group loading
//! - [`stats`] - Counters, timings and reports

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod ingest;
pub mod propagate;
pub mod scheduler;
pub mod stats;

// Re-export commonly used types
pub use cache::{BoundedCache, CacheEntry};
pub use config::SkyCacheConfig;
pub use context::SkyCache;
pub use error::{BuildError, Error, FetchError, PropagationError, Result};
pub use fetch::{FetchCoordinator, HttpTransport, JsonTransport};
#[cfg(feature = "scripted-transport")]
pub use fetch::ScriptedTransport;
pub use gate::{DeltaPropagationGate, GateMode, Observation, PackedState};
pub use ingest::{ElementSetRecord, HandleKey, IngestionEngine};
pub use propagate::{HandleStore, Propagator, StateVector};
pub use scheduler::{GroupDescriptor, PriorityFetchScheduler, ScheduleReport};
pub use stats::{StatsCollector, StatsSnapshot};
