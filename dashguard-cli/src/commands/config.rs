//! Config command - inspect and initialize configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dashguard_store::{default_config_dir, Settings};
use tracing::info;

use super::settings_store;
use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration and data paths.
    Path,

    /// Write the current settings (defaults if none) to the settings file.
    Init,

    /// Check the settings for values that would break the engine.
    Validate,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<ExitCode> {
    match args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli).await,
        ConfigAction::Init => init_config(cli).await,
        ConfigAction::Validate => validate_config(cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<ExitCode> {
    let settings = settings_store(cli).await.get().await;

    match cli.format {
        OutputFormat::Text => print!("{}", describe(&settings)),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&settings)?),
    }
    Ok(ExitCode::Success)
}

fn describe(settings: &Settings) -> String {
    let mut lines = vec![
        "DashGuard Configuration".to_string(),
        "─".repeat(40),
        String::new(),
        format!("Dashboard:        {}", settings.dashboard.base_url),
        format!("Analytics API:    {}", settings.dashboard.api_url),
        format!("WebDriver:        {} (headless: {})", settings.webdriver_url, settings.headless),
        String::new(),
        format!("Interval:         {}s (+ up to {}s jitter)", settings.acquisition_interval_secs, settings.jitter_max_secs),
        format!("Keep-alive:       {}s", settings.keep_alive_interval_secs),
        format!("Cache TTL:        {}s (key: {})", settings.cache_ttl_secs, settings.cache_key),
        format!("Cookie max age:   {}h (id: {})", settings.cookie_max_age_hours, settings.cookie_id),
        format!(
            "Detection:        {} failures, {} min cooldown",
            settings.detection_threshold, settings.cooldown_minutes
        ),
        format!("Retry attempts:   {}", settings.retry.max_attempts),
        format!("Data dir:         {}", settings.data_dir().display()),
    ];
    lines.push(String::new());
    lines.join("\n")
}

async fn show_paths(cli: &Cli) -> Result<ExitCode> {
    let store = settings_store(cli).await;
    let settings = store.get().await;
    let config_dir = default_config_dir();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", store.path().display());
            println!("Data dir:      {}", settings.data_dir().display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": store.path().display().to_string(),
                "data_dir": settings.data_dir().display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&paths)?);
        }
    }
    Ok(ExitCode::Success)
}

async fn init_config(cli: &Cli) -> Result<ExitCode> {
    let store = settings_store(cli).await;
    store.save().await.context("failed to write settings")?;
    info!(path = %store.path().display(), "Settings written");
    println!("Wrote {}", store.path().display());
    Ok(ExitCode::Success)
}

async fn validate_config(cli: &Cli) -> Result<ExitCode> {
    let store = settings_store(cli).await;
    store
        .get()
        .await
        .validate()
        .with_context(|| format!("invalid settings in {}", store.path().display()))?;
    println!("Settings OK: {}", store.path().display());
    Ok(ExitCode::Success)
}
