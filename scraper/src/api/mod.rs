use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use http::Uri;
use octocrab::{models::issues::Issue, Octocrab, Page};
use serde::Serialize;
use shared::{ActivityKind, ActivityRecord, DateWindow, PullSummary};
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;

pub mod paging;
pub mod prometheus;
mod types;

pub use paging::{walk_pages, PageOf, Walked};
pub use prometheus::{ScraperMetrics, Source};
pub use types::*;

const PAGE_SIZE: u8 = 100;
const DISCUSSION_PAGE_SIZE: u32 = 50;

const DISCUSSION_QUERY: &str = r#"
query($query: String!, $first: Int!, $after: String) {
  search(query: $query, type: DISCUSSION, first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on Discussion {
        number
        title
        url
        createdAt
        updatedAt
        author { login }
        repository { nameWithOwner }
        category { name }
        comments { totalCount }
      }
    }
  }
}
"#;

/// Remote operations the pipeline needs from the hosting platform.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Every organization timeline event inside `window`.
    /// Fails rather than returning a partial window.
    async fn fetch_events(&self, org: &str, window: &DateWindow)
        -> Result<Vec<RawEvent>, FetchError>;

    /// Merged pull requests and authored issues of `user` in `org`.
    async fn fetch_merge_events(
        &self,
        user: &str,
        org: &str,
    ) -> Result<Vec<ActivityRecord>, FetchError>;

    /// Pull requests of `user` in `org` that are open right now.
    async fn fetch_open_pulls(&self, user: &str, org: &str)
        -> Result<Vec<PullSummary>, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Multiplied by the attempt number before each retry.
    pub retry_delay: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Runs `request` under the policy timeout, retrying transient failures.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RequestPolicy,
    source: Source,
    metrics: &ScraperMetrics,
    mut request: F,
) -> Result<T, FetchError>
where
    E: Into<FetchError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, request()).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(FetchError::Timeout(policy.timeout)),
        };

        match result {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    "Retrying {source} request ({attempt}/{}) after: {e}",
                    policy.max_retries
                );
                metrics.record_retry(source);
                tokio::time::sleep(policy.retry_delay * attempt).await;
            }
            result => return result,
        }
    }
}

#[derive(Serialize)]
struct PageParams {
    per_page: u8,
}

#[derive(Clone)]
pub struct GithubClient {
    octocrab: Octocrab,
    policy: RequestPolicy,
    prometheus: Arc<ScraperMetrics>,
}

impl GithubClient {
    pub fn new(
        github_token: Option<String>,
        policy: RequestPolicy,
        prometheus: Arc<ScraperMetrics>,
    ) -> anyhow::Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = github_token {
            builder = builder.personal_token(token);
        }

        Ok(Self {
            octocrab: builder.build()?,
            policy,
            prometheus,
        })
    }

    async fn request<T, Fut>(
        &self,
        source: Source,
        request: impl FnMut() -> Fut,
    ) -> Result<T, FetchError>
    where
        Fut: Future<Output = octocrab::Result<T>>,
    {
        with_retries(&self.policy, source, &self.prometheus, request).await
    }

    /// One REST page as a [`PageOf`], following `next` when a cursor is given.
    async fn page<T, F, Fut>(
        &self,
        source: Source,
        cursor: Option<Uri>,
        first: F,
    ) -> Result<PageOf<T, Uri>, FetchError>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = octocrab::Result<Page<T>>>,
    {
        let page = match cursor {
            None => Some(self.request(source, first).await?),
            Some(uri) => {
                let next = Some(uri);
                self.request(source, || self.octocrab.get_page::<T>(&next))
                    .await?
            }
        };

        Ok(match page {
            Some(mut page) => PageOf {
                items: page.take_items(),
                next: page.next,
            },
            None => PageOf::last(Vec::new()),
        })
    }

    #[instrument(skip(self))]
    async fn search_issues(&self, source: Source, query: &str) -> Result<Vec<Issue>, FetchError> {
        let walked = walk_pages(
            move |cursor| {
                self.page::<Issue, _, _>(source, cursor, move || {
                    self.octocrab
                        .search()
                        .issues_and_pull_requests(query)
                        .per_page(PAGE_SIZE)
                        .send()
                })
            },
            |_: &[Issue]| true,
        )
        .await?;
        debug!("Search `{query}` returned {} items", walked.items.len());
        Ok(walked.items)
    }

    /// Discussions in `org` updated inside `window`.
    #[instrument(skip(self))]
    pub async fn search_discussions(
        &self,
        org: &str,
        window: &DateWindow,
    ) -> Result<Vec<DiscussionRecord>, FetchError> {
        let query = format!(
            "org:{org} updated:{}..{}",
            window.start_date().format("%Y-%m-%d"),
            window.last_date().format("%Y-%m-%d")
        );
        let query = query.as_str();

        let walked = walk_pages(
            move |cursor: Option<String>| async move {
                let payload = serde_json::json!({
                    "query": DISCUSSION_QUERY,
                    "variables": {
                        "query": query,
                        "first": DISCUSSION_PAGE_SIZE,
                        "after": cursor,
                    },
                });
                let response: GraphqlResponse<DiscussionSearchData> = self
                    .request(Source::Discussions, || self.octocrab.graphql(&payload))
                    .await?;
                discussion_page(response, window)
            },
            |_: &[DiscussionRecord]| true,
        )
        .await?;

        info!("Found {} discussions in {org}", walked.items.len());
        Ok(walked.items)
    }
}

/// Newest-first event pages reach back far enough once the oldest event predates `window`.
fn needs_older_events(events: &[RawEvent], window: &DateWindow) -> bool {
    events
        .last()
        .is_some_and(|event| event.created_at >= window.start)
}

fn events_in_window(org: &str, window: &DateWindow, walked: Walked<RawEvent>) -> Vec<RawEvent> {
    let Walked {
        items: mut events,
        exhausted,
    } = walked;

    if exhausted && needs_older_events(&events, window) {
        if let Some(oldest) = events.last() {
            warn!(
                org,
                "Event history for {org} ends at {} before the window start {}, \
                 older activity is missing",
                oldest.created_at,
                window.start
            );
        }
    }

    let total = events.len();
    events.retain(|event| window.contains(&event.created_at));
    info!(
        "Fetched {total} events for {org}, {} inside the window",
        events.len()
    );
    events
}

/// GraphQL `errors` and a missing `data` both fail the search.
fn discussion_page(
    response: GraphqlResponse<DiscussionSearchData>,
    window: &DateWindow,
) -> Result<PageOf<DiscussionRecord, String>, FetchError> {
    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        let messages = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FetchError::Permanent(format!(
            "Discussion search failed: {messages}"
        )));
    }
    let Some(data) = response.data else {
        return Err(FetchError::Permanent(
            "Discussion search returned no data".to_string(),
        ));
    };

    let items = data
        .search
        .nodes
        .into_iter()
        .flatten()
        .filter_map(DiscussionNode::into_record)
        .filter(|discussion| window.contains(&discussion.updated_at))
        .collect();
    let next = match data.search.page_info {
        PageInfo {
            has_next_page: true,
            end_cursor,
        } => end_cursor,
        _ => None,
    };
    Ok(PageOf { items, next })
}

#[async_trait]
impl ActivitySource for GithubClient {
    #[instrument(skip(self))]
    async fn fetch_events(
        &self,
        org: &str,
        window: &DateWindow,
    ) -> Result<Vec<RawEvent>, FetchError> {
        let route = format!("/orgs/{org}/events");
        let route = route.as_str();
        let params = &PageParams {
            per_page: PAGE_SIZE,
        };

        let walked = walk_pages(
            move |cursor| {
                self.page::<RawEvent, _, _>(Source::Events, cursor, move || {
                    self.octocrab.get(route, Some(params))
                })
            },
            |events: &[RawEvent]| needs_older_events(events, window),
        )
        .await?;

        Ok(events_in_window(org, window, walked))
    }

    #[instrument(skip(self))]
    async fn fetch_merge_events(
        &self,
        user: &str,
        org: &str,
    ) -> Result<Vec<ActivityRecord>, FetchError> {
        let merged = self
            .search_issues(
                Source::MergeEvents,
                &format!("is:pr is:merged author:{user} org:{org}"),
            )
            .await?;
        let issues = self
            .search_issues(
                Source::MergeEvents,
                &format!("is:issue author:{user} org:{org}"),
            )
            .await?;

        Ok(merged
            .iter()
            .filter_map(|pr| ActivityRecord::from_issue(pr, ActivityKind::PrMerged))
            .chain(
                issues.iter().filter_map(|issue| {
                    ActivityRecord::from_issue(issue, ActivityKind::IssueOpened)
                }),
            )
            .collect())
    }

    #[instrument(skip(self))]
    async fn fetch_open_pulls(
        &self,
        user: &str,
        org: &str,
    ) -> Result<Vec<PullSummary>, FetchError> {
        let pulls = self
            .search_issues(
                Source::OpenPulls,
                &format!("is:pr is:open author:{user} org:{org}"),
            )
            .await?;

        Ok(pulls
            .iter()
            .filter_map(|pr| match PullSummary::try_from(pr) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    debug!("Skipping open pull search item: {e}");
                    None
                }
            })
            .collect())
    }
}
