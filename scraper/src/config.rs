use std::{fmt, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::api::RequestPolicy;

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

/// Settings read from the process environment (and `.env`).
#[derive(Clone, Deserialize)]
pub struct Env {
    pub github_token: Option<String>,
    #[serde(default = "default_concurrency")]
    pub scraper_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub scraper_request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub scraper_max_retries: u32,
    #[serde(default)]
    pub scraper_skip_discussions: bool,
    pub scraper_metrics_file: Option<PathBuf>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scraper_concurrency", &self.scraper_concurrency)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field("scraper_skip_discussions", &self.scraper_skip_discussions)
            .field("scraper_metrics_file", &self.scraper_metrics_file)
            .finish()
    }
}

impl Env {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Ok(envy::from_env::<Env>()?)
    }

    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Env>(vars)?)
    }

    pub fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_secs(self.scraper_request_timeout_secs),
            max_retries: self.scraper_max_retries,
            ..Default::default()
        }
    }
}
