//! Fetch Coordinator
//!
//! Stale-while-revalidate reads of remote JSON endpoints with one network
//! operation per URL at a time.
//!
//! # Lookup flow
//!
//! ```text
//! fetch(url, ttl)
//!   ├─ fresh entry ──────────────▶ return cached value
//!   ├─ stale entry ──────────────▶ return stale value
//!   │                               └─ join / launch background refresh
//!   └─ no entry ─────────────────▶ join / launch, await, return or fail
//! ```
//!
//! An operation is a `Shared` future stored in the in-flight map and spawned
//! onto the runtime, so it settles even when every waiter goes away. On
//! settlement it writes the cache (success only) and then clears its own
//! slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::transport::JsonTransport;
use crate::cache::BoundedCache;
use crate::error::FetchError;
use crate::stats::StatsCollector;

/// Outcome observed by every waiter of one operation
type FetchOutcome = Result<Arc<Value>, FetchError>;

/// Handle to an in-flight network operation
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlight {
    id: u64,
    op: SharedFetch,
}

struct CoordinatorInner {
    transport: Arc<dyn JsonTransport>,
    cache: Arc<BoundedCache<String, Arc<Value>>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_op: AtomicU64,
    timeout: Duration,
    stats: Arc<StatsCollector>,
}

/// Request-deduplicating, stale-while-revalidate fetcher.
///
/// Cheap to clone; clones share the cache and the in-flight map. Must be
/// used from within a Tokio runtime.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl FetchCoordinator {
    /// Create a coordinator over `transport`, caching up to `capacity`
    /// response bodies
    pub fn new(
        transport: Arc<dyn JsonTransport>,
        capacity: usize,
        timeout: Duration,
        stats: Arc<StatsCollector>,
    ) -> Self {
        let cache = Arc::new(BoundedCache::new("responses", capacity));
        stats.register_cache(cache.clone());

        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                cache,
                in_flight: Mutex::new(HashMap::new()),
                next_op: AtomicU64::new(1),
                timeout,
                stats,
            }),
        }
    }

    /// Fetch and decode a JSON document.
    ///
    /// Network failures reach the caller only when nothing, fresh or
    /// stale, is cached for `url`.
    ///
    /// `ttl` applies to the value stored by the operation this call
    /// launches. A call that joins an operation already in flight for
    /// `url` has its `ttl` ignored; the launching call's `ttl` is cached.
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str, ttl: Duration) -> Result<T, FetchError> {
        let value = self.fetch_value(url, ttl).await?;
        decode(url, &value)
    }

    /// Fetch the raw JSON document
    #[instrument(skip(self))]
    pub async fn fetch_value(&self, url: &str, ttl: Duration) -> FetchOutcome {
        let key = url.to_string();

        if let Some(entry) = self.inner.cache.peek(&key) {
            if entry.is_fresh() {
                if let Some(value) = self.inner.cache.get(&key) {
                    self.inner.stats.record_hit();
                    return Ok(value);
                }
                // Expired between peek and get; fall through to stale
            }

            debug!(age_ms = entry.age().as_millis() as u64, "Serving stale value");
            self.inner.stats.record_stale_serve();
            self.refresh_in_background(&key, ttl);
            return Ok(entry.value);
        }

        self.inner.stats.record_miss();
        let (op, _) = self.join_or_launch(&key, ttl);
        op.await
    }

    /// Drop the cached body for `url`
    pub fn invalidate(&self, url: &str) -> bool {
        self.inner.cache.invalidate(&url.to_string()).is_some()
    }

    /// Number of operations currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Whether `url` has an operation in flight
    pub fn is_in_flight(&self, url: &str) -> bool {
        self.inner.in_flight.lock().contains_key(url)
    }

    /// The response cache
    pub fn cache(&self) -> &Arc<BoundedCache<String, Arc<Value>>> {
        &self.inner.cache
    }

    fn refresh_in_background(&self, key: &str, ttl: Duration) {
        let (op, launched) = self.join_or_launch(key, ttl);
        if !launched {
            return;
        }

        self.inner.stats.record_background_refresh();
        let stats = Arc::clone(&self.inner.stats);
        let url = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = op.await {
                warn!("Background refresh of {} failed, keeping stale value: {}", url, e);
                stats.record_refresh_failure();
            }
        });
    }

    /// Return the in-flight operation for `key`, launching one if none
    /// exists. Check and insert happen under one lock.
    fn join_or_launch(&self, key: &str, ttl: Duration) -> (SharedFetch, bool) {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some(existing) = in_flight.get(key) {
            debug!("Joining in-flight fetch of {}", key);
            return (existing.op.clone(), false);
        }

        let id = self.inner.next_op.fetch_add(1, Ordering::Relaxed);
        let op = Self::operation(Arc::clone(&self.inner), key.to_string(), ttl, id)
            .boxed()
            .shared();

        in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                op: op.clone(),
            },
        );

        // Drive to completion regardless of waiters
        tokio::spawn(op.clone());

        (op, true)
    }

    async fn operation(inner: Arc<CoordinatorInner>, url: String, ttl: Duration, id: u64) -> FetchOutcome {
        inner.stats.record_network_fetch();
        let started = Instant::now();

        let result = match tokio::time::timeout(inner.timeout, inner.transport.get_json(&url)).await {
            Ok(result) => result.map(Arc::new),
            Err(_) => Err(FetchError::Timeout {
                url: url.clone(),
                after: inner.timeout,
            }),
        };

        inner.stats.record_timing(started.elapsed());

        match &result {
            Ok(value) => {
                inner.cache.set(url.clone(), Arc::clone(value), ttl);
                debug!("Cached {} for {:?}", url, ttl);
            }
            Err(e) => debug!("Fetch of {} failed: {}", url, e),
        }

        let mut in_flight = inner.in_flight.lock();
        if in_flight.get(&url).is_some_and(|slot| slot.id == id) {
            in_flight.remove(&url);
        }

        result
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("cached", &self.inner.cache.len())
            .field("in_flight", &self.in_flight_count())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: &Value) -> Result<T, FetchError> {
    T::deserialize(value).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
