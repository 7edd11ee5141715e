use serde::de::DeserializeOwned;
use shared::{ActivityKind, ActivityRecord, GithubHandle, ProcessData, RepoInfo};
use tracing::{debug, trace};

use crate::{
    api::{
        IssueCommentPayload, IssuesPayload, PayloadItem, PullRequestPayload, RawEvent,
        ReviewPayload, ScraperMetrics,
    },
    error::ParseError,
};

/// Activity derived from a single timeline event.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub user: GithubHandle,
    pub record: ActivityRecord,
}

/// Builds the per-user activity map from raw timeline events.
///
/// Events of kinds we don't track are dropped silently, malformed ones are
/// logged and dropped. Activity of each user ends up ordered by time.
pub fn parse_events(events: &[RawEvent], metrics: &ScraperMetrics) -> ProcessData {
    let mut data = ProcessData::new();

    for event in events {
        match parse_event(event) {
            Ok(Some(parsed)) => {
                metrics.record_event(parsed.record.kind);
                data.entry(parsed.user)
                    .or_default()
                    .activity
                    .push(parsed.record);
            }
            Ok(None) => {
                trace!("Ignoring event {} of type {}", event.id, event.event_type);
            }
            Err(e) => {
                debug!("Skipping event: {e}");
                metrics.record_skipped_event();
            }
        }
    }

    for aggregate in data.values_mut() {
        aggregate.activity.sort_by_key(|record| record.timestamp);
    }

    data
}

/// `Ok(None)` for event kinds outside of what we collect.
pub fn parse_event(event: &RawEvent) -> Result<Option<ParsedEvent>, ParseError> {
    let Some((kind, item, comment_url)) = classify(event)? else {
        return Ok(None);
    };

    let user = event
        .actor
        .as_ref()
        .map(|actor| actor.login.clone())
        .filter(|login| !login.is_empty())
        .ok_or_else(|| missing(event, "actor"))?;
    let repo_name = event
        .repo
        .as_ref()
        .map(|repo| repo.name.as_str())
        .ok_or_else(|| missing(event, "repository"))?;
    let repo_info =
        RepoInfo::from_repo_name(repo_name, item.number).ok_or_else(|| ParseError::Payload {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            reason: format!("unexpected repository name `{repo_name}`"),
        })?;

    let record = ActivityRecord::new(
        kind,
        &repo_info,
        item.title,
        comment_url.or(item.html_url),
        event.created_at,
    )
    .with_event_id(event.id.clone());
    Ok(Some(ParsedEvent { user, record }))
}

type Classified = (ActivityKind, PayloadItem, Option<String>);

fn classify(event: &RawEvent) -> Result<Option<Classified>, ParseError> {
    let classified = match event.event_type.as_str() {
        "IssuesEvent" => {
            let payload: IssuesPayload = payload(event)?;
            let kind = match payload.action.as_str() {
                "opened" => ActivityKind::IssueOpened,
                "closed" => ActivityKind::IssueClosed,
                "reopened" => ActivityKind::IssueReopened,
                _ => return Ok(None),
            };
            (kind, payload.issue, None)
        }
        "PullRequestEvent" => {
            let payload: PullRequestPayload = payload(event)?;
            let kind = match payload.action.as_str() {
                "opened" => ActivityKind::PrOpened,
                "reopened" => ActivityKind::PrReopened,
                "closed" if payload.pull_request.merged == Some(true) => ActivityKind::PrMerged,
                "closed" => ActivityKind::PrClosed,
                _ => return Ok(None),
            };
            (kind, payload.pull_request, None)
        }
        "IssueCommentEvent" => {
            let payload: IssueCommentPayload = payload(event)?;
            if payload.action != "created" {
                return Ok(None);
            }
            let kind = if payload.issue.pull_request.is_some() {
                ActivityKind::PrComment
            } else {
                ActivityKind::IssueComment
            };
            let url = payload.comment.and_then(|comment| comment.html_url);
            (kind, payload.issue, url)
        }
        "PullRequestReviewEvent" => {
            let payload: ReviewPayload = payload(event)?;
            let url = payload.review.and_then(|review| review.html_url);
            (ActivityKind::PrReview, payload.pull_request, url)
        }
        "PullRequestReviewCommentEvent" => {
            let payload: ReviewPayload = payload(event)?;
            if payload.action.as_deref().is_some_and(|action| action != "created") {
                return Ok(None);
            }
            let url = payload.comment.and_then(|comment| comment.html_url);
            (ActivityKind::PrReviewComment, payload.pull_request, url)
        }
        _ => return Ok(None),
    };

    Ok(Some(classified))
}

fn payload<T: DeserializeOwned>(event: &RawEvent) -> Result<T, ParseError> {
    serde_json::from_value(event.payload.clone()).map_err(|e| ParseError::Payload {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        reason: e.to_string(),
    })
}

fn missing(event: &RawEvent, field: &'static str) -> ParseError {
    ParseError::MissingField {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        field,
    }
}
