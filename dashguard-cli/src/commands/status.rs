//! Status command - detection, cache and cookie state.
//!
//! Reads the persisted state only; no browser is started.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use dashguard_store::{
    CacheStore, CookieStore, DetectionMonitor, Settings, DEFAULT_PATTERN_WINDOW_MINUTES,
};

use super::load_settings;
use crate::output::{CookieReport, JsonFormatter, StatusReport, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Failure pattern window in minutes.
    #[arg(long, short, default_value_t = DEFAULT_PATTERN_WINDOW_MINUTES)]
    pub window: i64,
}

/// Runs the status command.
pub async fn run(args: &StatusArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    let report = collect(&settings, args.window).await?;

    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_status(&report));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&report)?);
        }
    }

    Ok(ExitCode::Success)
}

/// Gathers the report from the stores under the settings' data directory.
pub async fn collect(settings: &Settings, window_minutes: i64) -> Result<StatusReport> {
    let now = Utc::now();

    let monitor = DetectionMonitor::load(settings.detection_state_path(), settings.detection_config()).await;
    let cache = CacheStore::open(settings.cache_dir(), settings.cache_ttl_secs)
        .await
        .context("failed to open the cache")?;
    let cookies = CookieStore::new(settings.cookie_dir(), settings.cookie_max_age_hours);

    Ok(StatusReport {
        detection: monitor.stats_at(now).await,
        pattern: monitor.classify_failure_pattern_at(window_minutes, now).await,
        cache: cache.stats_at(now).await,
        cookies: CookieReport {
            status: cookies.status_at(&settings.cookie_id, now).await,
            info: cookies.info_at(&settings.cookie_id, now).await,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashguard_core::FailureKind;
    use dashguard_store::{CookieStatus, PatternKind, StoredCookie};
    use serde_json::json;
    use tempfile::TempDir;

    fn settings_in(temp: &TempDir) -> Settings {
        Settings {
            data_dir: Some(temp.path().to_path_buf()),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_collect_fresh_directory() {
        let temp = TempDir::new().unwrap();
        let report = collect(&settings_in(&temp), DEFAULT_PATTERN_WINDOW_MINUTES).await.unwrap();

        assert_eq!(report.detection.total_requests, 0);
        assert!(!report.detection.defensive);
        assert_eq!(report.pattern.pattern, PatternKind::None);
        assert_eq!(report.cache.total_entries, 0);
        assert_eq!(report.cookies.status, CookieStatus::Missing);
        assert!(report.cookies.info.is_none());
    }

    #[tokio::test]
    async fn test_collect_reads_persisted_state() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);

        let monitor = DetectionMonitor::load(settings.detection_state_path(), settings.detection_config()).await;
        for _ in 0..3 {
            monitor.record_failure(FailureKind::RateLimited, "429").await;
        }
        let cache = CacheStore::open(settings.cache_dir(), settings.cache_ttl_secs).await.unwrap();
        cache.set(&settings.cache_key, json!({"data": []})).await;
        let cookies = CookieStore::new(settings.cookie_dir(), settings.cookie_max_age_hours);
        cookies
            .save(&settings.cookie_id, &[StoredCookie::new("sid", "abc")])
            .await
            .unwrap();

        let report = collect(&settings, DEFAULT_PATTERN_WINDOW_MINUTES).await.unwrap();

        assert!(report.detection.defensive);
        assert_eq!(report.detection.consecutive_failures, 3);
        assert_eq!(report.pattern.pattern, PatternKind::RateLimited);
        assert_eq!(report.cache.valid_entries, 1);
        assert_eq!(report.cookies.status, CookieStatus::Valid);
        assert_eq!(report.cookies.info.map(|i| i.count), Some(1));
    }
}
