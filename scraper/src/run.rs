use std::{path::Path, sync::Arc, time::Instant};

use anyhow::Context as _;
use chrono::Utc;
use shared::{DateWindow, ProcessData};
use tracing::{error, info, instrument};

use crate::{
    api::{ActivitySource, ScraperMetrics, Source},
    discussions::DiscussionScraper,
    error::FetchError,
    events::parse_events,
    store::merged_data,
    supplemental::{enrich, SupplementReport},
};

/// Collaborators of a single run.
#[derive(Clone)]
pub struct Context {
    pub github: Arc<dyn ActivitySource>,
    /// `None` skips the discussion step.
    pub discussions: Option<Arc<dyn DiscussionScraper>>,
    pub prometheus: Arc<ScraperMetrics>,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub users: usize,
    pub stored_users: usize,
    pub supplements: SupplementReport,
    pub discussions_saved: bool,
}

/// Fetches and parses the window's events, then adds per-user supplemental data.
///
/// Only the event fetch can fail the whole scrape.
#[instrument(skip(source, metrics))]
pub async fn scrape_github(
    source: &dyn ActivitySource,
    org: &str,
    window: &DateWindow,
    concurrency: usize,
    metrics: &ScraperMetrics,
) -> Result<(ProcessData, usize, SupplementReport), FetchError> {
    let events = match source.fetch_events(org, window).await {
        Ok(events) => {
            metrics.record_fetch(Source::Events, true);
            events
        }
        Err(e) => {
            metrics.record_fetch(Source::Events, false);
            return Err(e);
        }
    };

    let data = parse_events(&events, metrics);
    metrics.set_users(data.len());
    info!("Found {} active users in {} events", data.len(), events.len());

    let (data, report) = enrich(source, org, data, concurrency, metrics).await;
    Ok((data, events.len(), report))
}

/// One full scrape of `org` for `window` merged into `data_dir`.
pub async fn run(
    context: &Context,
    org: &str,
    data_dir: &Path,
    window: DateWindow,
) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    info!("Scraping GitHub data for {org} from {window}");

    let (data, events, supplements) = scrape_github(
        context.github.as_ref(),
        org,
        &window,
        context.concurrency,
        &context.prometheus,
    )
    .await
    .with_context(|| format!("Failed to fetch events for {org}"))?;
    let users = data.len();
    info!("Scraping completed");

    let stored = merged_data(data_dir, data, Utc::now())
        .await
        .context("Failed to save activity data")?;

    let mut discussions_saved = false;
    if let Some(discussions) = &context.discussions {
        match discussions
            .scrape_discussions(org, data_dir, window.end, window.start)
            .await
        {
            Ok(()) => {
                context.prometheus.record_fetch(Source::Discussions, true);
                discussions_saved = true;
            }
            Err(e) => {
                context.prometheus.record_fetch(Source::Discussions, false);
                error!(
                    org,
                    source = %Source::Discussions,
                    "Failed to scrape discussions for {org}: {e:#}"
                );
            }
        }
    }

    context.prometheus.observe_run(started.elapsed());
    info!("Done");

    Ok(RunSummary {
        events,
        users,
        stored_users: stored.len(),
        supplements,
        discussions_saved,
    })
}
