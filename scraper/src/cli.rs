use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use shared::{parse_window_end, today, DateWindow};

/// Collects activity of an organization's members for a window of days
/// and merges it into the dataset in DATA_DIR.
#[derive(Debug, Parser)]
#[command(name = "github-activity-scraper", version, about, long_about = None)]
pub struct Cli {
    /// GitHub organization to scrape.
    pub org: String,

    /// Directory with the persisted dataset.
    pub data_dir: PathBuf,

    /// End of the window, exclusive (`YYYY-MM-DD` or RFC 3339). Defaults to today.
    #[arg(value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,

    /// Number of days before DATE to collect.
    #[arg(default_value_t = 1)]
    pub num_days: u32,
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    parse_window_end(value).ok_or_else(|| format!("Invalid date value: {value}"))
}

impl Cli {
    pub fn window(&self) -> anyhow::Result<DateWindow> {
        let end = self.date.unwrap_or_else(today);
        DateWindow::ending_at(end, self.num_days).ok_or_else(|| {
            anyhow::anyhow!("{} days before {end} is out of range", self.num_days)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn org_and_data_dir_are_required() {
        let error = Cli::try_parse_from(["github-activity-scraper", "acme"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
        assert!(error.to_string().contains("Usage"));

        let error = Cli::try_parse_from(["github-activity-scraper"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn defaults_to_one_day_ending_today() {
        let cli = Cli::try_parse_from(["github-activity-scraper", "acme", "data"]).unwrap();
        let window = cli.window().unwrap();

        assert_eq!(cli.num_days, 1);
        assert_eq!(window.end, today());
        assert_eq!(window.end - window.start, chrono::Duration::days(1));
    }

    #[test]
    fn explicit_date_and_days() {
        let cli =
            Cli::try_parse_from(["github-activity-scraper", "acme", "data", "2024-01-03", "2"])
                .unwrap();
        let window = cli.window().unwrap();

        assert_eq!(cli.org, "acme");
        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn invalid_date_is_rejected() {
        let error =
            Cli::try_parse_from(["github-activity-scraper", "acme", "data", "not-a-date"])
                .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn invalid_day_count_is_rejected() {
        assert!(Cli::try_parse_from([
            "github-activity-scraper",
            "acme",
            "data",
            "2024-01-03",
            "-1"
        ])
        .is_err());
    }
}
