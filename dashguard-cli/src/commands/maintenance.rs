//! Maintenance commands for the cache, cookie and detection stores.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dashguard_store::{CacheStore, CookieStore, DetectionMonitor, Settings};
use serde_json::json;
use tracing::info;

use super::load_settings;
use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the cache command.
#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands.
#[derive(Subcommand, Clone, Copy)]
pub enum CacheAction {
    /// Delete every cached payload.
    Clear,
    /// Delete expired payloads only.
    Cleanup,
}

/// Arguments for the cookies command.
#[derive(Args)]
pub struct CookiesArgs {
    #[command(subcommand)]
    pub action: CookiesAction,
}

/// Cookie subcommands.
#[derive(Subcommand, Clone, Copy)]
pub enum CookiesAction {
    /// Delete the saved dashboard session.
    Clear,
    /// Delete expired or unreadable snapshots.
    Cleanup,
}

/// Arguments for the monitor command.
#[derive(Args)]
pub struct MonitorArgs {
    #[command(subcommand)]
    pub action: MonitorAction,
}

/// Monitor subcommands.
#[derive(Subcommand, Clone, Copy)]
pub enum MonitorAction {
    /// Zero the counters and leave defensive mode.
    Reset,
}

/// Runs the cache command.
pub async fn run_cache(args: &CacheArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    let removed = cache_action(&settings, args.action).await?;
    report(cli, "cache", removed)?;
    Ok(ExitCode::Success)
}

/// Runs the cookies command.
pub async fn run_cookies(args: &CookiesArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    let removed = cookies_action(&settings, args.action).await?;
    report(cli, "cookies", removed)?;
    Ok(ExitCode::Success)
}

/// Runs the monitor command.
pub async fn run_monitor(args: &MonitorArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    match args.action {
        MonitorAction::Reset => {
            let monitor =
                DetectionMonitor::load(settings.detection_state_path(), settings.detection_config()).await;
            monitor.reset_stats().await;
        }
    }

    match cli.format {
        OutputFormat::Text => println!("Detection monitor reset"),
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&json!({ "reset": true }))?);
        }
    }
    Ok(ExitCode::Success)
}

async fn cache_action(settings: &Settings, action: CacheAction) -> Result<usize> {
    let cache = CacheStore::open(settings.cache_dir(), settings.cache_ttl_secs)
        .await
        .context("failed to open the cache")?;

    let removed = match action {
        CacheAction::Clear => cache.clear().await.context("failed to clear the cache")?,
        CacheAction::Cleanup => cache.cleanup().await,
    };
    info!(removed, "Cache maintenance done");
    Ok(removed)
}

async fn cookies_action(settings: &Settings, action: CookiesAction) -> Result<usize> {
    let cookies = CookieStore::new(settings.cookie_dir(), settings.cookie_max_age_hours);

    let removed = match action {
        CookiesAction::Clear => {
            let deleted = cookies
                .delete(&settings.cookie_id)
                .await
                .context("failed to delete cookies")?;
            usize::from(deleted)
        }
        CookiesAction::Cleanup => cookies.cleanup_expired().await,
    };
    info!(removed, "Cookie maintenance done");
    Ok(removed)
}

fn report(cli: &Cli, store: &str, removed: usize) -> Result<()> {
    match cli.format {
        OutputFormat::Text => println!("Removed {removed} {store} file(s)"),
        OutputFormat::Json => {
            let output = json!({ "store": store, "removed": removed });
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }
    Ok(())
}
