use octocrab::models::issues::Issue;

use crate::{ActivityKind, ActivityRecord, PullSummary, RepoInfo};

impl RepoInfo {
    /// Search results only carry the API url of the repository
    /// (`https://api.github.com/repos/{owner}/{repo}`).
    pub fn from_issue(issue: &Issue) -> Option<Self> {
        let mut segments = issue
            .repository_url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .rev();
        let repo = segments.next()?.to_string();
        let owner = segments.next()?.to_string();
        Some(Self::new(owner, repo, issue.number))
    }
}

impl ActivityRecord {
    /// Authored issue or merged pull request as returned by the search API.
    pub fn from_issue(issue: &Issue, kind: ActivityKind) -> Option<Self> {
        let repo_info = RepoInfo::from_issue(issue)?;
        let timestamp = match kind {
            ActivityKind::PrMerged | ActivityKind::PrClosed | ActivityKind::IssueClosed => {
                issue.closed_at.unwrap_or(issue.updated_at)
            }
            _ => issue.created_at,
        };
        Some(Self::new(
            kind,
            &repo_info,
            Some(issue.title.clone()),
            Some(issue.html_url.to_string()),
            timestamp,
        ))
    }
}

impl TryFrom<&Issue> for PullSummary {
    type Error = String;

    fn try_from(issue: &Issue) -> Result<Self, Self::Error> {
        if issue.pull_request.is_none() {
            return Err(format!("{} is not a pull request", issue.html_url));
        }
        let repo_info = RepoInfo::from_issue(issue)
            .ok_or_else(|| format!("Can't extract repository from {}", issue.repository_url))?;
        Ok(Self::new(
            &repo_info,
            issue.title.clone(),
            issue.html_url.to_string(),
            issue.created_at,
        ))
    }
}
