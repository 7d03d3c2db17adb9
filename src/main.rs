//! skycache
//!
//! Loads element set groups from a GP JSON feed through the cache engine and
//! reports cache occupancy, hit rates and fetch timings.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          skycache                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐   │
//! │  │   Priority   │───▶│    Other     │───▶│    Stats     │   │
//! │  │    groups    │    │    groups    │    │    report    │   │
//! │  │ (one by one) │    │ (concurrent) │    │              │   │
//! │  └──────────────┘    └──────────────┘    └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                 repeated every --watch-secs until Ctrl-C
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skycache::error::{BuildError, Error, PropagationError, Result};
use skycache::scheduler::FIRST_TIER;
use skycache::{ElementSetRecord, GroupDescriptor, Propagator, SkyCache, SkyCacheConfig, StateVector};

// =============================================================================
// CLI Arguments
// =============================================================================

/// skycache - Cached element set loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GP feed endpoint; groups are requested as `?GROUP=<name>&FORMAT=json`
    #[arg(
        long,
        env = "SKYCACHE_FEED_URL",
        default_value = "https://celestrak.org/NORAD/elements/gp.php"
    )]
    feed_base_url: String,

    /// Groups loaded first, one at a time
    #[arg(long, env = "SKYCACHE_PRIORITY_GROUPS", value_delimiter = ',', default_values = ["stations"])]
    priority_group: Vec<String>,

    /// Groups loaded concurrently after the priority groups
    #[arg(long, env = "SKYCACHE_GROUPS", value_delimiter = ',', default_values = ["visual", "weather", "gps-ops"])]
    group: Vec<String>,

    /// How long a loaded group stays fresh, in minutes
    #[arg(long, env = "SKYCACHE_GROUP_TTL_MINUTES", default_value = "120")]
    group_ttl_minutes: u64,

    /// Timeout for each feed request in seconds
    #[arg(long, env = "SKYCACHE_TIMEOUT_SECONDS", default_value = "15")]
    timeout_secs: u64,

    /// Print the stats snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Reload every N seconds until interrupted (0 = run once)
    #[arg(long, env = "SKYCACHE_WATCH_SECONDS", default_value = "0")]
    watch_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn groups(&self, ttl: Duration) -> Vec<GroupDescriptor> {
        let priority = self.priority_group.iter().map(|g| (g, FIRST_TIER));
        let rest = self.group.iter().map(|g| (g, FIRST_TIER + 1));

        priority
            .chain(rest)
            .map(|(name, tier)| {
                let url = format!("{}?GROUP={}&FORMAT=json", self.feed_base_url, name);
                GroupDescriptor::new(name.as_str(), url, tier, ttl)
            })
            .collect()
    }
}

// =============================================================================
// Propagation
// =============================================================================

/// Stand-in used when no propagation library is linked into the binary.
/// Loading and caching work; handle builds fail and are reported as misses.
struct Unlinked;

impl Propagator for Unlinked {
    type Handle = ();

    fn build_handle(&self, record: &ElementSetRecord) -> std::result::Result<(), BuildError> {
        Err(BuildError {
            catalog_id: record.norad_cat_id,
            epoch: record.epoch.clone(),
            reason: "no propagation library linked".to_string(),
        })
    }

    fn propagate(&self, _: &(), _: DateTime<Utc>) -> std::result::Result<StateVector, PropagationError> {
        Err(PropagationError {
            catalog_id: 0,
            reason: "no propagation library linked".to_string(),
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting skycache");
    info!("  Feed: {}", args.feed_base_url);
    info!("  Priority groups: {}", args.priority_group.join(", "));
    info!("  Other groups: {}", args.group.join(", "));
    info!("  Timeout: {}s", args.timeout_secs);

    let config = SkyCacheConfig {
        fetch_timeout: Duration::from_secs(args.timeout_secs),
        fetch_ttl: Duration::from_secs(args.group_ttl_minutes * 60),
        ..Default::default()
    };
    let groups = args.groups(config.fetch_ttl);
    let sky = SkyCache::new(config, Unlinked)?;

    loop {
        let report = sky
            .fetch_groups(&groups, |key, records| {
                info!("Loaded group {} ({} records)", key, records.len());
            })
            .await;

        for (key, e) in &report.failed {
            error!("Group {} failed: {}", key, e);
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&sky.stats())?);
        } else {
            println!("{}", sky.format_report());
        }

        if args.watch_secs == 0 {
            // Nothing could be served at all
            if report.loaded.is_empty() {
                if let Some((_, e)) = report.failed.into_iter().next() {
                    return Err(Error::Fetch(e));
                }
            }
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.watch_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!("skycache finished");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_urls_and_tiers() {
        let args = Args::parse_from([
            "skycache",
            "--feed-base-url",
            "https://feeds.test/gp.php",
            "--priority-group",
            "stations",
            "--group",
            "visual,weather",
        ]);

        let groups = args.groups(Duration::from_secs(args.group_ttl_minutes * 60));
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].url, "https://feeds.test/gp.php?GROUP=stations&FORMAT=json");
        assert!(groups[0].is_first_tier());
        assert!(!groups[1].is_first_tier());
        assert_eq!(groups[2].key, "weather");
        assert_eq!(groups[2].ttl, Duration::from_secs(7200));
    }

    #[test]
    fn test_unlinked_propagator_fails_builds() {
        assert!(Unlinked.build_handle(&ElementSetRecord::new(1, "E1")).is_err());
    }
}
