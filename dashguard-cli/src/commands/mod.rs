//! CLI command implementations.

pub mod config;
pub mod fetch;
pub mod maintenance;
pub mod run;
pub mod status;
pub mod token;

use anyhow::{Context, Result};
use dashguard_fetch::{AcquisitionContext, Credentials};
use dashguard_store::{default_settings_path, Settings, SettingsStore};
use tracing::debug;

use crate::Cli;

/// Login email variable.
pub const EMAIL_VAR: &str = "DASHGUARD_EMAIL";
/// Login password variable.
pub const PASSWORD_VAR: &str = "DASHGUARD_PASSWORD";
/// Bearer token variable.
pub const BEARER_VAR: &str = "DASHGUARD_BEARER";

/// Loads the settings store from `--config` or the default location.
pub async fn settings_store(cli: &Cli) -> SettingsStore {
    let path = cli.config.clone().unwrap_or_else(default_settings_path);
    SettingsStore::load(path).await
}

/// Loads and validates settings.
pub async fn load_settings(cli: &Cli) -> Result<Settings> {
    let store = settings_store(cli).await;
    let settings = store.get().await;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", store.path().display()))?;
    Ok(settings)
}

/// Reads login credentials from the environment.
pub fn credentials_from_env() -> Option<Credentials> {
    credentials_from(std::env::var(EMAIL_VAR).ok(), std::env::var(PASSWORD_VAR).ok())
}

fn credentials_from(email: Option<String>, password: Option<String>) -> Option<Credentials> {
    match (email, password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            Some(Credentials::new(email.trim(), password))
        }
        _ => {
            debug!("No login credentials in the environment");
            None
        }
    }
}

/// Builds the acquisition context from settings and the environment.
pub async fn build_context(settings: Settings) -> Result<AcquisitionContext> {
    let ctx = AcquisitionContext::builder()
        .settings(settings)
        .credentials(credentials_from_env())
        .build()
        .await
        .context("failed to open the acquisition stores")?;
    Ok(ctx)
}
