//! Token command - check a bearer token against the analytics endpoint.

use anyhow::{bail, Context, Result};
use clap::Args;
use dashguard_fetch::{AnalyticsClient, RetryPolicy, TokenStatus};
use dashguard_store::Settings;
use tracing::info;

use super::{build_context, load_settings, BEARER_VAR};
use crate::output::{JsonFormatter, TokenOutput};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the token command.
#[derive(Args)]
pub struct TokenArgs {
    /// Token to check (defaults to `DASHGUARD_BEARER`).
    #[arg(long, short, conflicts_with = "from_session")]
    pub token: Option<String>,

    /// Read the token from a logged-in browser session instead.
    #[arg(long)]
    pub from_session: bool,
}

/// Runs the token command.
pub async fn run(args: &TokenArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    let token = resolve_token(args, &settings).await?;

    let client = AnalyticsClient::new(&settings.dashboard.api_url, &settings.dashboard.base_url)
        .context("invalid analytics endpoint")?;
    let status = client
        .validate_token(&token, &settings.request, &RetryPolicy::from_settings(&settings.retry))
        .await
        .context("analytics endpoint unreachable")?;
    info!(valid = status.is_valid(), "Token checked");

    let output = TokenOutput {
        endpoint: client.api_url().to_string(),
        status,
    };
    match cli.format {
        OutputFormat::Text => match &output.status {
            TokenStatus::Valid => println!("✓ Token accepted by {}", output.endpoint),
            TokenStatus::Rejected(code) => {
                println!("✗ Token rejected by {} (HTTP {code})", output.endpoint);
            }
        },
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&output)?),
    }

    Ok(if output.status.is_valid() {
        ExitCode::Success
    } else {
        ExitCode::TokenRejected
    })
}

async fn resolve_token(args: &TokenArgs, settings: &Settings) -> Result<String> {
    if args.from_session {
        let ctx = build_context(settings.clone()).await?;
        if !ctx.session.restore_from_cookies().await.unwrap_or(false) {
            if let Some(credentials) = &ctx.credentials {
                ctx.session.login(credentials).await.context("login failed")?;
            }
        }
        let token = ctx.session.bearer_token().await;
        ctx.session.close().await;
        return token
            .context("could not read the session token")?
            .context("the dashboard session holds no token");
    }

    pick_token(args.token.clone(), std::env::var(BEARER_VAR).ok())
}

fn pick_token(flag: Option<String>, env: Option<String>) -> Result<String> {
    match flag.or(env).map(|t| t.trim().to_string()) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => bail!("no token given; pass --token or set {BEARER_VAR}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_token_prefers_flag() {
        let token = pick_token(Some("flag".into()), Some("env".into())).unwrap();
        assert_eq!(token, "flag");
        assert_eq!(pick_token(None, Some(" env ".into())).unwrap(), "env");
    }

    #[test]
    fn test_pick_token_requires_value() {
        assert!(pick_token(None, None).is_err());
        assert!(pick_token(Some("   ".into()), None).is_err());
    }
}
