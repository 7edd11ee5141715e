use futures::{stream, StreamExt};
use shared::{ActivityRecord, GithubHandle, ProcessData, PullSummary};
use tracing::{debug, error, info, instrument};

use crate::{
    api::{ActivitySource, ScraperMetrics, Source},
    error::FetchError,
};

/// Outcome of both per-user fetches. Each side fails on its own.
#[derive(Debug)]
pub struct UserSupplement {
    pub user: GithubHandle,
    pub merge_events: Result<Vec<ActivityRecord>, FetchError>,
    pub open_pulls: Result<Vec<PullSummary>, FetchError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SupplementReport {
    pub users: usize,
    pub failed_merge_events: usize,
    pub failed_open_pulls: usize,
}

async fn fetch_user(source: &dyn ActivitySource, org: &str, user: GithubHandle) -> UserSupplement {
    let merge_events = source.fetch_merge_events(&user, org).await;
    let open_pulls = source.fetch_open_pulls(&user, org).await;
    UserSupplement {
        user,
        merge_events,
        open_pulls,
    }
}

/// Runs the per-user fetches for every user of `data` on at most `concurrency` workers.
#[instrument(skip(source, data))]
pub async fn fetch_supplements(
    source: &dyn ActivitySource,
    org: &str,
    data: &ProcessData,
    concurrency: usize,
) -> Vec<UserSupplement> {
    let users = data.keys().cloned().collect::<Vec<_>>();
    debug!("Fetching supplemental data for {} users", users.len());

    stream::iter(users)
        .map(|user| fetch_user(source, org, user))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Folds fetch outcomes into the aggregate. Failures are logged and count as no records.
pub fn apply_supplements(
    mut data: ProcessData,
    org: &str,
    supplements: Vec<UserSupplement>,
    metrics: &ScraperMetrics,
) -> (ProcessData, SupplementReport) {
    let mut report = SupplementReport::default();

    for supplement in supplements {
        report.users += 1;
        let aggregate = data.entry(supplement.user.clone()).or_default();

        match supplement.merge_events {
            Ok(records) => {
                metrics.record_fetch(Source::MergeEvents, true);
                aggregate.authored_issue_and_pr.extend(records);
            }
            Err(e) => {
                metrics.record_fetch(Source::MergeEvents, false);
                report.failed_merge_events += 1;
                error!(
                    user = %supplement.user,
                    org,
                    source = %Source::MergeEvents,
                    "Error fetching merge events for {}: {e}",
                    supplement.user
                );
            }
        }

        match supplement.open_pulls {
            Ok(pulls) => {
                metrics.record_fetch(Source::OpenPulls, true);
                aggregate.open_prs.extend(pulls);
            }
            Err(e) => {
                metrics.record_fetch(Source::OpenPulls, false);
                report.failed_open_pulls += 1;
                error!(
                    user = %supplement.user,
                    org,
                    source = %Source::OpenPulls,
                    "Error fetching open pulls for {}: {e}",
                    supplement.user
                );
            }
        }
    }

    info!(
        "Supplemental data fetched for {} users ({} merge event failures, {} open pull failures)",
        report.users, report.failed_merge_events, report.failed_open_pulls
    );
    (data, report)
}

pub async fn enrich(
    source: &dyn ActivitySource,
    org: &str,
    data: ProcessData,
    concurrency: usize,
    metrics: &ScraperMetrics,
) -> (ProcessData, SupplementReport) {
    let supplements = fetch_supplements(source, org, &data, concurrency).await;
    apply_supplements(data, org, supplements, metrics)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use shared::{ActivityKind, RepoInfo, UserAggregate};

    use super::*;
    use crate::tests::FakeSource;

    fn record(number: u64, kind: ActivityKind) -> ActivityRecord {
        let info = RepoInfo::new("acme".to_string(), "widgets".to_string(), number);
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ActivityRecord::new(kind, &info, None, None, ts)
    }

    fn users(names: &[&str]) -> ProcessData {
        names
            .iter()
            .map(|name| (name.to_string(), UserAggregate::default()))
            .collect()
    }

    #[tokio::test]
    async fn failures_are_isolated_per_user_and_source() {
        let metrics = ScraperMetrics::default();
        let source = FakeSource::default()
            .with_merge_events("a", vec![record(1, ActivityKind::PrMerged)])
            .with_merge_events("b", vec![record(2, ActivityKind::PrMerged)])
            .with_merge_events("c", vec![record(3, ActivityKind::IssueOpened)])
            .with_open_pulls_failure("b")
            .with_merge_events_failure("a");

        let (data, report) = enrich(&source, "acme", users(&["a", "b", "c"]), 2, &metrics).await;

        assert_eq!(report.users, 3);
        assert_eq!(report.failed_merge_events, 1);
        assert_eq!(report.failed_open_pulls, 1);
        assert!(data["a"].authored_issue_and_pr.is_empty());
        assert_eq!(data["b"].authored_issue_and_pr.len(), 1);
        assert_eq!(data["c"].authored_issue_and_pr[0].number, 3);
        assert!(data["b"].open_prs.is_empty());
    }

    #[tokio::test]
    async fn every_user_is_fetched_once() {
        let source = FakeSource::default();
        let names = (0..20).map(|n| format!("user{n}")).collect::<Vec<_>>();
        let data = names
            .iter()
            .map(|name| (name.clone(), UserAggregate::default()))
            .collect::<ProcessData>();

        let supplements = fetch_supplements(&source, "acme", &data, 4).await;

        assert_eq!(supplements.len(), 20);
        let mut fetched = source.merge_calls();
        fetched.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let metrics = ScraperMetrics::default();
        let source = FakeSource::default();
        let (data, report) = enrich(&source, "acme", users(&["a"]), 0, &metrics).await;
        assert_eq!(report.users, 1);
        assert!(data.contains_key("a"));
    }
}
