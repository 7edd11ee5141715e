use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::RepoInfo;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    IssueOpened,
    IssueClosed,
    IssueReopened,
    IssueComment,
    PrOpened,
    PrClosed,
    PrMerged,
    PrReopened,
    PrComment,
    PrReview,
    PrReviewComment,
}

/// A single action of a user on an issue or pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRecord {
    pub kind: ActivityKind,
    /// `owner/repo/number`
    pub reference: String,
    pub repo: String,
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Id of the timeline event the record came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        kind: ActivityKind,
        repo_info: &RepoInfo,
        title: Option<String>,
        url: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            reference: repo_info.full_id.clone(),
            repo: repo_info.repo_full_name(),
            number: repo_info.number,
            title,
            url,
            event_id: None,
            timestamp,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn authored_key(&self) -> (String, ActivityKind) {
        (self.reference.clone(), self.kind)
    }

    /// Distinct events sharing a second and a target only differ by event id,
    /// or by url for records stored without one.
    pub fn activity_key(&self) -> (DateTime<Utc>, ActivityKind, String, Option<String>) {
        (
            self.timestamp,
            self.kind,
            self.reference.clone(),
            self.event_id.clone().or_else(|| self.url.clone()),
        )
    }
}

/// Snapshot of a pull request that was open when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullSummary {
    pub reference: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl PullSummary {
    pub fn new(
        repo_info: &RepoInfo,
        title: String,
        url: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reference: repo_info.full_id.clone(),
            repo: repo_info.repo_full_name(),
            number: repo_info.number,
            title,
            url,
            created_at,
        }
    }
}
