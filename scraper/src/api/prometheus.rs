use std::path::Path;

use anyhow::Context;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use shared::ActivityKind;

/// Where a piece of data came from. Used both as a metric label and in logs.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue, strum::Display)]
pub enum Source {
    #[strum(to_string = "events")]
    Events,
    #[strum(to_string = "merge events")]
    MergeEvents,
    #[strum(to_string = "open pulls")]
    OpenPulls,
    #[strum(to_string = "discussions")]
    Discussions,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventRecord {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchRecord {
    pub source: Source,
    pub success: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RetryRecord {
    pub source: Source,
}

pub struct ScraperMetrics {
    registry: Registry,
    events: Family<EventRecord, Counter>,
    skipped_events: Counter,
    fetches: Family<FetchRecord, Counter>,
    retries: Family<RetryRecord, Counter>,
    users: Gauge,
    run_duration: Histogram,
}

impl std::fmt::Debug for ScraperMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperMetrics").finish_non_exhaustive()
    }
}

impl Default for ScraperMetrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        let events = Family::default();
        let skipped_events = Counter::default();
        let fetches = Family::default();
        let retries = Family::default();
        let users = Gauge::default();
        // 1 second up to a bit more than an hour
        let run_duration = Histogram::new(exponential_buckets(1.0, 2.0, 13));

        registry.register(
            "scraper_events",
            "Timeline events turned into activity records",
            events.clone(),
        );
        registry.register(
            "scraper_skipped_events",
            "Timeline events of a tracked kind that could not be parsed",
            skipped_events.clone(),
        );
        registry.register(
            "scraper_github_fetches",
            "GitHub fetches by data source and outcome",
            fetches.clone(),
        );
        registry.register(
            "scraper_github_retries",
            "Retries of transient GitHub failures",
            retries.clone(),
        );
        registry.register(
            "scraper_users",
            "Users discovered in the last run",
            users.clone(),
        );
        registry.register(
            "scraper_run_duration_seconds",
            "Wall time of a scraper run",
            run_duration.clone(),
        );

        Self {
            registry,
            events,
            skipped_events,
            fetches,
            retries,
            users,
            run_duration,
        }
    }
}

impl ScraperMetrics {
    pub fn record_event(&self, kind: ActivityKind) {
        self.events
            .get_or_create(&EventRecord {
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn record_skipped_event(&self) {
        self.skipped_events.inc();
    }

    pub fn record_fetch(&self, source: Source, success: bool) {
        self.fetches
            .get_or_create(&FetchRecord {
                source,
                success: success as u32,
            })
            .inc();
    }

    pub fn record_retry(&self, source: Source) {
        self.retries.get_or_create(&RetryRecord { source }).inc();
    }

    pub fn set_users(&self, value: usize) {
        self.users.set(value as i64);
    }

    pub fn observe_run(&self, duration: std::time::Duration) {
        self.run_duration.observe(duration.as_secs_f64());
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let body = self.encode()?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))
    }
}
