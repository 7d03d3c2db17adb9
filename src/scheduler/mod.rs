//! Priority Fetch Scheduler
//!
//! Loads element set groups from remote feeds in two tiers.
//!
//! ```text
//! tier 1 (priority == 1)      tier 2 (everything else)
//! ┌────┐   ┌────┐   ┌────┐    ┌────┐
//! │ g1 │──▶│ g2 │──▶│ g3 │──▶ │ g4 │ ┐
//! └────┘   └────┘   └────┘    │ g5 │ ├─ join_all
//!   one at a time, each        │ g6 │ ┘
//!   loaded and ingested        └────┘
//! ```
//!
//! A failed group is reported and never stops its siblings.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::FetchError;
use crate::fetch::FetchCoordinator;
use crate::ingest::{ElementSetRecord, IngestionEngine};

/// Tier that is loaded sequentially before any other group starts
pub const FIRST_TIER: u8 = 1;

/// One remote group of element sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub key: String,
    pub url: String,
    pub priority: u8,
    pub ttl: Duration,
}

impl GroupDescriptor {
    pub fn new(key: impl Into<String>, url: impl Into<String>, priority: u8, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            priority,
            ttl,
        }
    }

    pub fn is_first_tier(&self) -> bool {
        self.priority == FIRST_TIER
    }
}

/// Outcome of one [`PriorityFetchScheduler::fetch_groups`] call
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Keys of groups that loaded, in completion order per tier
    pub loaded: Vec<String>,
    /// Groups that failed and why
    pub failed: Vec<(String, FetchError)>,
    /// Records new or changed across all groups
    pub updated: usize,
}

impl ScheduleReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, key: &str, outcome: Result<usize, FetchError>) {
        match outcome {
            Ok(updated) => {
                self.loaded.push(key.to_string());
                self.updated += updated;
            }
            Err(e) => {
                warn!("Group {} failed: {}", key, e);
                self.failed.push((key.to_string(), e));
            }
        }
    }
}

/// Two-tier group loader over the fetch coordinator and ingestion engine
pub struct PriorityFetchScheduler<H> {
    coordinator: FetchCoordinator,
    engine: Arc<IngestionEngine<H>>,
}

impl<H: Send + Sync> PriorityFetchScheduler<H> {
    pub fn new(coordinator: FetchCoordinator, engine: Arc<IngestionEngine<H>>) -> Self {
        Self { coordinator, engine }
    }

    /// Load every group; returns once all of them settled.
    ///
    /// `on_group_loaded` runs for each loaded group before its records are
    /// ingested.
    #[instrument(skip_all, fields(groups = groups.len()))]
    pub async fn fetch_groups<F>(&self, groups: &[GroupDescriptor], on_group_loaded: F) -> ScheduleReport
    where
        F: Fn(&str, &[ElementSetRecord]) + Send + Sync,
    {
        let (first, rest): (Vec<&GroupDescriptor>, Vec<&GroupDescriptor>) =
            groups.iter().partition(|g| g.is_first_tier());

        let mut report = ScheduleReport::default();

        for group in first {
            let outcome = self.load_group(group, &on_group_loaded).await;
            report.absorb(&group.key, outcome);
        }

        let outcomes = join_all(rest.iter().map(|group| self.load_group(group, &on_group_loaded))).await;
        for (group, outcome) in rest.iter().zip(outcomes) {
            report.absorb(&group.key, outcome);
        }

        info!(
            "Loaded {} groups ({} failed), {} records updated",
            report.loaded.len(),
            report.failed.len(),
            report.updated
        );
        report
    }

    async fn load_group<F>(&self, group: &GroupDescriptor, on_group_loaded: &F) -> Result<usize, FetchError>
    where
        F: Fn(&str, &[ElementSetRecord]) + Send + Sync,
    {
        let records: Vec<ElementSetRecord> = self.coordinator.fetch(&group.url, group.ttl).await?;
        on_group_loaded(&group.key, &records);
        Ok(self.engine.ingest_batch(&records))
    }
}

impl<H> std::fmt::Debug for PriorityFetchScheduler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityFetchScheduler")
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
    use crate::cache::BoundedCache;
    use crate::fetch::ScriptedTransport;
    use crate::stats::StatsCollector;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    fn url(key: &str) -> String {
        format!("https://feeds.test/gp?GROUP={key}&FORMAT=json")
    }

    fn group(key: &str, priority: u8) -> GroupDescriptor {
        GroupDescriptor::new(key, url(key), priority, HOUR)
    }

    fn scheduler(transport: Arc<ScriptedTransport>) -> (PriorityFetchScheduler<()>, Arc<IngestionEngine<()>>) {
        let stats = Arc::new(StatsCollector::default());
        let coordinator = FetchCoordinator::new(transport, 16, Duration::from_secs(5), stats.clone());
        let engine = Arc::new(IngestionEngine::new(
            Arc::new(BoundedCache::new("records", 64)),
            Arc::new(BoundedCache::new("handles", 64)),
            Arc::new(BoundedCache::new("packed_states", 64)),
            HOUR,
            stats,
        ));
        (PriorityFetchScheduler::new(coordinator, engine.clone()), engine)
    }

    fn records(ids: &[u32]) -> serde_json::Value {
        json!(ids
            .iter()
            .map(|id| json!({"NORAD_CAT_ID": id, "EPOCH": "E1"}))
            .collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_first_tier_settles_before_second_tier_starts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_after(&url("stations"), records(&[25544]), Duration::from_millis(40));
        transport.respond_after(&url("visual"), records(&[1, 2]), Duration::from_millis(20));
        transport.respond(&url("weather"), records(&[3]));
        transport.respond(&url("gps"), records(&[4, 5]));

        let (scheduler, engine) = scheduler(transport.clone());
        let seen = Mutex::new(Vec::new());

        let groups = vec![
            group("weather", 2),
            group("stations", 1),
            group("gps", 3),
            group("visual", 1),
        ];
        let report = scheduler
            .fetch_groups(&groups, |key, _| {
                let second_tier_calls = transport.calls(&url("weather")) + transport.calls(&url("gps"));
                seen.lock().push((key.to_string(), second_tier_calls));
            })
            .await;

        let seen = seen.into_inner();
        assert_eq!(seen[0], ("stations".to_string(), 0));
        assert_eq!(seen[1], ("visual".to_string(), 0));
        assert_eq!(seen.len(), 4);

        assert_eq!(report.loaded[..2], ["stations".to_string(), "visual".to_string()]);
        assert!(report.is_complete());
        assert_eq!(report.updated, 6);
        assert_eq!(engine.record_count(), 6);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail(&url("stations"), 503);
        transport.respond(&url("visual"), records(&[1]));
        transport.fail(&url("weather"), 500);
        transport.respond_after(&url("gps"), records(&[2, 3]), Duration::from_millis(10));

        let (scheduler, engine) = scheduler(transport);
        let groups = vec![
            group("stations", 1),
            group("visual", 1),
            group("weather", 2),
            group("gps", 2),
        ];

        let report = scheduler.fetch_groups(&groups, |_, _| {}).await;

        assert_eq!(report.loaded, vec!["visual".to_string(), "gps".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert_matches!(&report.failed[0], (key, FetchError::Status { status: 503, .. }) if key == "stations");
        assert_matches!(&report.failed[1], (key, FetchError::Status { status: 500, .. }) if key == "weather");
        assert_eq!(engine.record_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_tier_runs_concurrently() {
        let transport = Arc::new(ScriptedTransport::new());
        for key in ["a", "b", "c", "d"] {
            transport.respond_after(&url(key), records(&[]), Duration::from_millis(100));
        }

        let (scheduler, _) = scheduler(transport);
        let groups: Vec<_> = ["a", "b", "c", "d"].iter().map(|k| group(k, 2)).collect();

        let started = tokio::time::Instant::now();
        let report = scheduler.fetch_groups(&groups, |_, _| {}).await;

        assert_eq!(report.loaded.len(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_callback_receives_records() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&url("stations"), records(&[25544, 48274]));

        let (scheduler, _) = scheduler(transport);
        let received = Mutex::new(Vec::new());

        scheduler
            .fetch_groups(&[group("stations", 1)], |key, recs| {
                received
                    .lock()
                    .push((key.to_string(), recs.iter().map(|r| r.norad_cat_id).collect::<Vec<_>>()));
            })
            .await;

        assert_eq!(received.into_inner(), vec![("stations".to_string(), vec![25544, 48274])]);
    }

    #[tokio::test]
    async fn test_malformed_group_is_decode_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&url("broken"), json!({"not": "an array"}));

        let (scheduler, _) = scheduler(transport);
        let report = scheduler.fetch_groups(&[group("broken", 2)], |_, _| {}).await;

        assert_matches!(&report.failed[0].1, FetchError::Decode { .. });
    }

    #[tokio::test]
    async fn test_refetch_of_unchanged_groups_updates_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&url("stations"), records(&[1, 2]));

        let (scheduler, _) = scheduler(transport.clone());
        let groups = [group("stations", 1)];

        assert_eq!(scheduler.fetch_groups(&groups, |_, _| {}).await.updated, 2);
        assert_eq!(scheduler.fetch_groups(&groups, |_, _| {}).await.updated, 0);
        assert_eq!(transport.calls(&url("stations")), 1);
    }
}
