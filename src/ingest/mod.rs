//! Ingestion Engine
//!
//! Applies batches of element set records to the record cache and cascades
//! invalidation into the caches derived from them.
//!
//! ```text
//! incoming record ──▶ same epoch as stored? ── yes ──▶ untouched
//!                               │
//!                               no / absent
//!                               ▼
//!          invalidate handle (id, previous epoch)
//!          invalidate packed state (id)
//!          store record, count update
//! ```
//!
//! A whole batch runs under one ingestion lock, and derived entries are
//! removed before the record is overwritten, so no reader sees the new
//! record next to a derived value built from the old one.
//!
//! The record cache alone cannot name the handle to drop once the previous
//! record has been evicted or has expired, so the epoch of every cached
//! handle is also kept in [`HandleEpochs`]. Its lock is the ingestion lock.

mod record;

pub use record::{ElementSetRecord, HandleKey};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::cache::BoundedCache;
use crate::gate::PackedState;
use crate::stats::StatsCollector;

/// Epoch of the cached propagation handle, per catalog id.
///
/// Shared between ingestion and handle caching; holding the lock excludes
/// a running batch.
pub type HandleEpochs = Arc<Mutex<HashMap<u32, String>>>;

/// Delta-detecting record ingestion over the shared caches
pub struct IngestionEngine<H> {
    records: Arc<BoundedCache<u32, ElementSetRecord>>,
    handles: Arc<BoundedCache<HandleKey, Arc<H>>>,
    packed: Arc<BoundedCache<u32, PackedState>>,
    record_ttl: Duration,
    handle_epochs: HandleEpochs,
    last_ingest_at: RwLock<Option<DateTime<Utc>>>,
    stats: Arc<StatsCollector>,
}

impl<H> IngestionEngine<H> {
    pub fn new(
        records: Arc<BoundedCache<u32, ElementSetRecord>>,
        handles: Arc<BoundedCache<HandleKey, Arc<H>>>,
        packed: Arc<BoundedCache<u32, PackedState>>,
        record_ttl: Duration,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            records,
            handles,
            packed,
            record_ttl,
            handle_epochs: Arc::new(Mutex::new(HashMap::new())),
            last_ingest_at: RwLock::new(None),
            stats,
        }
    }

    /// Apply `records` in order and return how many were new or changed.
    ///
    /// A stored record whose TTL ran out is stored again and counted even
    /// when its epoch matches; its derived entries stay valid.
    #[instrument(skip(self, records), fields(batch = records.len()))]
    pub fn ingest_batch(&self, records: &[ElementSetRecord]) -> usize {
        let mut handle_epochs = self.handle_epochs.lock();
        let mut updated = 0;

        for record in records {
            let previous = self.records.peek(&record.norad_cat_id);

            match previous {
                Some(entry) if entry.value.epoch == record.epoch => {
                    if entry.is_fresh() {
                        continue;
                    }
                    debug!(id = record.norad_cat_id, "Re-storing expired record");
                }
                Some(entry) => {
                    debug!(
                        id = record.norad_cat_id,
                        from = %entry.value.epoch,
                        to = %record.epoch,
                        "Epoch changed"
                    );
                    self.handles.invalidate(&entry.value.handle_key());
                    self.drop_other_handle(&mut handle_epochs, record);
                    self.packed.invalidate(&record.norad_cat_id);
                }
                None => {
                    self.drop_other_handle(&mut handle_epochs, record);
                    self.packed.invalidate(&record.norad_cat_id);
                }
            }

            self.records.set(record.norad_cat_id, record.clone(), self.record_ttl);
            updated += 1;
        }

        let now = Utc::now();
        *self.last_ingest_at.write() = Some(now);
        self.stats.mark_refresh(now);

        info!("Ingested {} records, {} updated", records.len(), updated);
        updated
    }

    /// Invalidate the cached handle for `record`'s id if it was built from
    /// another epoch
    fn drop_other_handle(&self, handle_epochs: &mut HashMap<u32, String>, record: &ElementSetRecord) {
        let id = record.norad_cat_id;
        if handle_epochs.get(&id).is_some_and(|epoch| *epoch != record.epoch) {
            if let Some(epoch) = handle_epochs.remove(&id) {
                debug!(id, %epoch, "Dropping handle of previous epoch");
                self.handles.invalidate(&HandleKey::new(id, epoch));
            }
        }
    }

    /// Index of cached handle epochs, shared with the handle store
    pub fn handle_epochs(&self) -> HandleEpochs {
        Arc::clone(&self.handle_epochs)
    }

    /// Fresh record for `id`
    pub fn get_record(&self, id: u32) -> Option<ElementSetRecord> {
        let record = self.records.get(&id);
        match record {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        record
    }

    /// Every fresh record, least recently used first
    pub fn get_all_records(&self) -> Vec<ElementSetRecord> {
        self.records.fresh_values()
    }

    /// Wall-clock time of the last batch, even one with no updates
    pub fn last_ingest_at(&self) -> Option<DateTime<Utc>> {
        *self.last_ingest_at.read()
    }

    /// Records currently held, fresh or not
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl<H> std::fmt::Debug for IngestionEngine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionEngine")
            .field("records", &self.records.len())
            .field("handles", &self.handles.len())
            .field("last_ingest_at", &self.last_ingest_at())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
