use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use shared::DateWindow;
use tracing::{info, instrument};

use crate::{
    api::{DiscussionRecord, GithubClient},
    store::{read_json_or_default, write_json_atomic, DataDirLock},
};

pub const DISCUSSIONS_FILE: &str = "github_discussions.json";

/// Collects organization discussions into the data directory.
///
/// Runs after the activity file is saved and has its own failure domain.
#[async_trait]
pub trait DiscussionScraper: Send + Sync {
    async fn scrape_discussions(
        &self,
        org: &str,
        data_dir: &Path,
        end: DateTime<Utc>,
        start: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Discussions keyed by url; a fresh copy replaces the stored one.
pub fn merge_discussions(
    existing: Vec<DiscussionRecord>,
    fresh: Vec<DiscussionRecord>,
) -> Vec<DiscussionRecord> {
    existing
        .into_iter()
        .chain(fresh)
        .map(|discussion| (discussion.url.clone(), discussion))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .sorted_by_key(|discussion| discussion.updated_at)
        .collect()
}

pub async fn save_discussions(
    data_dir: &Path,
    fresh: Vec<DiscussionRecord>,
) -> anyhow::Result<usize> {
    let _lock = DataDirLock::acquire(data_dir).await?;
    let path = data_dir.join(DISCUSSIONS_FILE);
    let existing: Vec<DiscussionRecord> = read_json_or_default(&path)?;
    let merged = merge_discussions(existing, fresh);
    write_json_atomic(&path, &merged)?;
    Ok(merged.len())
}

#[async_trait]
impl DiscussionScraper for GithubClient {
    #[instrument(skip(self))]
    async fn scrape_discussions(
        &self,
        org: &str,
        data_dir: &Path,
        end: DateTime<Utc>,
        start: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let window = DateWindow::new(start, end)
            .ok_or_else(|| anyhow::anyhow!("Discussion window starts after it ends"))?;
        let discussions = self.search_discussions(org, &window).await?;
        let found = discussions.len();
        let total = save_discussions(data_dir, discussions).await?;
        info!("Saved {found} discussions for {org} ({total} stored)");
        Ok(())
    }
}
