use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod activity;
mod window;

#[cfg(feature = "github")]
pub mod github;

pub use activity::*;
pub use window::*;

pub type GithubHandle = String;

/// Username to aggregate. Kept ordered so the persisted file is stable between runs.
pub type ProcessData = BTreeMap<GithubHandle, UserAggregate>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserAggregate {
    #[serde(default)]
    pub authored_issue_and_pr: Vec<ActivityRecord>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub activity: Vec<ActivityRecord>,
    #[serde(default)]
    pub open_prs: Vec<PullSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub full_id: String,
}

impl RepoInfo {
    pub fn new(owner: String, repo: String, number: u64) -> Self {
        let full_id = format!("{}/{}/{}", owner, repo, number);
        Self {
            owner,
            repo,
            number,
            full_id,
        }
    }

    /// Builds the reference from a `owner/repo` name as GitHub events report it.
    pub fn from_repo_name(name: &str, number: u64) -> Option<Self> {
        let (owner, repo) = name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner.to_string(), repo.to_string(), number))
    }

    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}
