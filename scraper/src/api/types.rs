use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organization timeline event as returned by `GET /orgs/{org}/events`.
///
/// Only the envelope is typed; the payload differs per event type and is
/// decoded by the parser for the types it understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub repo: Option<EventRepo>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRepo {
    /// `owner/repo`
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PayloadItem {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub merged: Option<bool>,
    /// Present on issues that are in fact pull requests.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PayloadComment {
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IssuesPayload {
    pub action: String,
    pub issue: PayloadItem,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PullRequestPayload {
    pub action: String,
    pub pull_request: PayloadItem,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IssueCommentPayload {
    pub action: String,
    pub issue: PayloadItem,
    #[serde(default)]
    pub comment: Option<PayloadComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReviewPayload {
    #[serde(default)]
    pub action: Option<String>,
    pub pull_request: PayloadItem,
    #[serde(default)]
    pub review: Option<PayloadComment>,
    #[serde(default)]
    pub comment: Option<PayloadComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscussionRecord {
    pub url: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub comments: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphqlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphqlError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscussionSearchData {
    pub search: DiscussionSearch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscussionSearch {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<Option<DiscussionNode>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Login {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryName {
    pub name_with_owner: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TotalCount {
    pub total_count: u64,
}

/// Search nodes that are not discussions come back as empty objects, so every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscussionNode {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub author: Option<Login>,
    pub repository: Option<RepositoryName>,
    pub category: Option<Named>,
    pub comments: Option<TotalCount>,
}

impl DiscussionNode {
    pub fn into_record(self) -> Option<DiscussionRecord> {
        Some(DiscussionRecord {
            url: self.url?,
            repo: self.repository?.name_with_owner,
            number: self.number?,
            title: self.title?,
            author: self.author.map(|author| author.login),
            category: self.category.map(|category| category.name),
            created_at: self.created_at?,
            updated_at: self.updated_at?,
            comments: self.comments.map(|c| c.total_count).unwrap_or_default(),
        })
    }
}
