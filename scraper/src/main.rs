use std::sync::Arc;

use clap::Parser;
use github_activity_scraper::{
    api::{GithubClient, ScraperMetrics},
    cli::Cli,
    config::Env,
    discussions::DiscussionScraper,
    run, Context,
};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = Env::load()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    debug!("Loaded {env:?}");

    let window = cli.window()?;
    if env.github_token.is_none() {
        warn!("GITHUB_TOKEN is not set, requests are unauthenticated and heavily rate limited");
    }

    let prometheus: Arc<ScraperMetrics> = Default::default();
    let github = Arc::new(GithubClient::new(
        env.github_token.clone(),
        env.request_policy(),
        prometheus.clone(),
    )?);
    let discussions = (!env.scraper_skip_discussions)
        .then(|| github.clone() as Arc<dyn DiscussionScraper>);

    let context = Context {
        github,
        discussions,
        prometheus: prometheus.clone(),
        concurrency: env.scraper_concurrency,
    };

    let result = run(&context, &cli.org, &cli.data_dir, window).await;

    if let Some(path) = &env.scraper_metrics_file {
        if let Err(e) = prometheus.write_to(path) {
            warn!("Failed to write metrics to {}: {e:#}", path.display());
        }
    }

    result.map(|_| ())
}
