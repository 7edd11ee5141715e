use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::{ActivityKind, ActivityRecord, DateWindow, ProcessData, PullSummary, RepoInfo};

use crate::{
    api::{ActivitySource, RawEvent, ScraperMetrics},
    discussions::DiscussionScraper,
    error::FetchError,
    events::tests::{pr_opened, raw_event},
    run,
    store::{read_json_or_default, ACTIVITY_FILE},
    Context,
};

/// In-memory stand-in for GitHub. Users without configured data get empty results.
#[derive(Default)]
pub struct FakeSource {
    events: Vec<RawEvent>,
    events_fail: bool,
    merge_events: HashMap<String, Vec<ActivityRecord>>,
    open_pulls: HashMap<String, Vec<PullSummary>>,
    merge_failures: HashSet<String>,
    open_failures: HashSet<String>,
    merge_calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_events(mut self, events: Vec<RawEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_events_failure(mut self) -> Self {
        self.events_fail = true;
        self
    }

    pub fn with_merge_events(mut self, user: &str, records: Vec<ActivityRecord>) -> Self {
        self.merge_events.insert(user.to_string(), records);
        self
    }

    pub fn with_merge_events_failure(mut self, user: &str) -> Self {
        self.merge_failures.insert(user.to_string());
        self
    }

    pub fn with_open_pulls(mut self, user: &str, pulls: Vec<PullSummary>) -> Self {
        self.open_pulls.insert(user.to_string(), pulls);
        self
    }

    pub fn with_open_pulls_failure(mut self, user: &str) -> Self {
        self.open_failures.insert(user.to_string());
        self
    }

    pub fn merge_calls(&self) -> Vec<String> {
        self.merge_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn fetch_events(
        &self,
        _org: &str,
        window: &DateWindow,
    ) -> Result<Vec<RawEvent>, FetchError> {
        if self.events_fail {
            return Err(FetchError::Permanent("404 Not Found".to_string()));
        }
        Ok(self
            .events
            .iter()
            .filter(|event| window.contains(&event.created_at))
            .cloned()
            .collect())
    }

    async fn fetch_merge_events(
        &self,
        user: &str,
        _org: &str,
    ) -> Result<Vec<ActivityRecord>, FetchError> {
        self.merge_calls.lock().unwrap().push(user.to_string());
        tokio::task::yield_now().await;
        if self.merge_failures.contains(user) {
            return Err(FetchError::Transient("502 Bad Gateway".to_string()));
        }
        Ok(self.merge_events.get(user).cloned().unwrap_or_default())
    }

    async fn fetch_open_pulls(
        &self,
        user: &str,
        _org: &str,
    ) -> Result<Vec<PullSummary>, FetchError> {
        if self.open_failures.contains(user) {
            return Err(FetchError::Permanent("422 Validation Failed".to_string()));
        }
        Ok(self.open_pulls.get(user).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeDiscussions {
    fail: bool,
    calls: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
}

#[async_trait]
impl DiscussionScraper for FakeDiscussions {
    async fn scrape_discussions(
        &self,
        org: &str,
        _data_dir: &Path,
        end: DateTime<Utc>,
        start: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((org.to_string(), end, start));
        if self.fail {
            anyhow::bail!("GraphQL search is unavailable");
        }
        Ok(())
    }
}

fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

fn window() -> DateWindow {
    DateWindow::ending_at(day(3), 2).unwrap()
}

fn merged(number: u64) -> ActivityRecord {
    let info = RepoInfo::new("acme".to_string(), "widgets".to_string(), number);
    ActivityRecord::new(
        ActivityKind::PrMerged,
        &info,
        Some("Add sprockets".to_string()),
        None,
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
    )
}

fn context(source: FakeSource, discussions: Option<Arc<FakeDiscussions>>) -> Context {
    Context {
        github: Arc::new(source),
        discussions: discussions.map(|d| d as Arc<dyn DiscussionScraper>),
        prometheus: Arc::new(ScraperMetrics::default()),
        concurrency: 4,
    }
}

fn stored(data_dir: &Path) -> ProcessData {
    read_json_or_default(&data_dir.join(ACTIVITY_FILE)).unwrap()
}

#[tokio::test]
async fn single_user_window_is_collected_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::default()
        .with_events(vec![pr_opened("1", "alice", 10, "2024-01-02T10:00:00Z")])
        .with_merge_events("alice", vec![merged(10)]);

    let summary = run(&context(source, None), "acme", dir.path(), window())
        .await
        .unwrap();

    assert_eq!(summary.events, 1);
    assert_eq!(summary.users, 1);
    let data = stored(dir.path());
    let alice = &data["alice"];
    assert_eq!(alice.activity.len(), 1);
    assert_eq!(alice.activity[0].kind, ActivityKind::PrOpened);
    assert_eq!(alice.activity[0].reference, "acme/widgets/10");
    assert_eq!(alice.authored_issue_and_pr.len(), 1);
    assert_eq!(alice.authored_issue_and_pr[0].kind, ActivityKind::PrMerged);
    assert!(alice.open_prs.is_empty());
    assert!(DateTime::parse_from_rfc3339(&alice.last_updated).is_ok());
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let make_source = || {
        FakeSource::default()
            .with_events(vec![pr_opened("1", "alice", 10, "2024-01-02T10:00:00Z")])
            .with_merge_events("alice", vec![merged(10)])
    };

    run(&context(make_source(), None), "acme", dir.path(), window())
        .await
        .unwrap();
    let first = stored(dir.path());
    run(&context(make_source(), None), "acme", dir.path(), window())
        .await
        .unwrap();
    let second = stored(dir.path());

    assert_eq!(first["alice"].activity, second["alice"].activity);
    assert_eq!(
        first["alice"].authored_issue_and_pr,
        second["alice"].authored_issue_and_pr
    );
}

#[tokio::test]
async fn review_comments_in_the_same_second_are_all_saved() {
    let dir = tempfile::tempdir().unwrap();
    let comment = |id: &str, discussion: u32| {
        let url = format!("https://github.com/acme/widgets/pull/4#discussion_r{discussion}");
        raw_event(
            id,
            "PullRequestReviewCommentEvent",
            "alice",
            "2024-01-02T10:00:00Z",
            serde_json::json!({
                "action": "created",
                "comment": { "html_url": url },
                "pull_request": { "number": 4 }
            }),
        )
    };
    let make_source = || {
        FakeSource::default().with_events(vec![
            comment("101", 1),
            comment("102", 2),
            comment("103", 3),
        ])
    };

    run(&context(make_source(), None), "acme", dir.path(), window())
        .await
        .unwrap();
    assert_eq!(stored(dir.path())["alice"].activity.len(), 3);

    run(&context(make_source(), None), "acme", dir.path(), window())
        .await
        .unwrap();
    let activity = &stored(dir.path())["alice"].activity;
    assert_eq!(activity.len(), 3);
    assert!(activity
        .iter()
        .all(|record| record.kind == ActivityKind::PrReviewComment));
}

#[tokio::test]
async fn failing_user_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let info = RepoInfo::new("acme".to_string(), "widgets".to_string(), 12);
    let open = PullSummary::new(
        &info,
        "Refactor gears".to_string(),
        "https://github.com/acme/widgets/pull/12".to_string(),
        day(1),
    );
    let source = FakeSource::default()
        .with_events(vec![
            pr_opened("1", "bob", 11, "2024-01-01T08:00:00Z"),
            pr_opened("2", "carol", 12, "2024-01-02T08:00:00Z"),
        ])
        .with_open_pulls_failure("bob")
        .with_open_pulls("carol", vec![open.clone()]);

    let summary = run(&context(source, None), "acme", dir.path(), window())
        .await
        .unwrap();

    assert_eq!(summary.supplements.failed_open_pulls, 1);
    let data = stored(dir.path());
    assert!(data["bob"].open_prs.is_empty());
    assert_eq!(data["bob"].activity.len(), 1);
    assert_eq!(data["carol"].open_prs, vec![open]);
}

#[tokio::test]
async fn events_failure_aborts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let discussions = Arc::new(FakeDiscussions::default());
    let source = FakeSource::default().with_events_failure();

    let result = run(
        &context(source, Some(discussions.clone())),
        "acme",
        &data_dir,
        window(),
    )
    .await;

    assert!(result.is_err());
    assert!(!data_dir.join(ACTIVITY_FILE).exists());
    assert!(discussions.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn events_outside_window_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::default().with_events(vec![
        pr_opened("1", "alice", 10, "2023-12-31T23:59:59Z"),
        pr_opened("2", "alice", 11, "2024-01-03T00:00:00Z"),
    ]);

    let summary = run(&context(source, None), "acme", dir.path(), window())
        .await
        .unwrap();

    assert_eq!(summary.users, 0);
    assert!(stored(dir.path()).is_empty());
}

#[tokio::test]
async fn discussions_run_after_activity_with_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let discussions = Arc::new(FakeDiscussions::default());
    let source = FakeSource::default()
        .with_events(vec![pr_opened("1", "alice", 10, "2024-01-02T10:00:00Z")]);

    let summary = run(
        &context(source, Some(discussions.clone())),
        "acme",
        dir.path(),
        window(),
    )
    .await
    .unwrap();

    assert!(summary.discussions_saved);
    assert_eq!(
        *discussions.calls.lock().unwrap(),
        vec![("acme".to_string(), day(3), day(1))]
    );
}

#[tokio::test]
async fn discussion_failure_keeps_the_run_successful() {
    let dir = tempfile::tempdir().unwrap();
    let discussions = Arc::new(FakeDiscussions {
        fail: true,
        ..Default::default()
    });
    let source = FakeSource::default()
        .with_events(vec![pr_opened("1", "alice", 10, "2024-01-02T10:00:00Z")]);

    let summary = run(
        &context(source, Some(discussions)),
        "acme",
        dir.path(),
        window(),
    )
    .await
    .unwrap();

    assert!(!summary.discussions_saved);
    assert!(stored(dir.path()).contains_key("alice"));
}

#[tokio::test]
async fn run_metrics_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::default()
        .with_events(vec![pr_opened("1", "alice", 10, "2024-01-02T10:00:00Z")]);
    let context = context(source, None);

    run(&context, "acme", dir.path(), window()).await.unwrap();

    let encoded = context.prometheus.encode().unwrap();
    assert!(encoded.contains("scraper_users 1"));
    assert!(encoded.contains("scraper_run_duration_seconds"));
}
