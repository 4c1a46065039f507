//! Fetch command - one acquisition, printed.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use dashguard_core::normalize_payload;
use dashguard_fetch::FallbackOrchestrator;
use std::sync::Arc;
use tracing::warn;

use super::{build_context, load_settings};
use crate::output::{JsonFormatter, OutcomeOutput, RecordsOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the fetch command.
#[derive(Args)]
pub struct FetchArgs {
    /// Show which tiers were tried.
    #[arg(long, short)]
    pub report: bool,

    /// Bypass the cache for this acquisition.
    #[arg(long)]
    pub no_cache: bool,
}

/// Runs the fetch command.
pub async fn run(args: &FetchArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    let ctx = build_context(settings).await?;
    if args.no_cache {
        ctx.cache.invalidate(ctx.cache_key()).await;
    }

    let session = Arc::clone(&ctx.session);
    let orchestrator = FallbackOrchestrator::new(ctx);
    let outcome = orchestrator.acquire().await;
    session.close().await;

    let report = OutcomeOutput::from(&outcome);
    let Some(payload) = &outcome.payload else {
        match cli.format {
            OutputFormat::Text => {
                eprintln!("{}", TextFormatter::new(!cli.no_color).format_outcome(&report));
            }
            OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&report)?),
        }
        warn!("No data acquired");
        return Ok(ExitCode::NoData);
    };

    let records = normalize_payload(payload).context("acquired payload could not be normalized")?;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            if args.report {
                println!("{}", formatter.format_outcome(&report));
                println!();
            }
            println!("{}", formatter.format_records(&records));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            let output = RecordsOutput::new(&outcome, records, Utc::now());
            if args.report {
                let combined = serde_json::json!({ "report": report, "result": output });
                println!("{}", formatter.format(&combined)?);
            } else {
                println!("{}", formatter.format(&output)?);
            }
        }
    }

    Ok(ExitCode::Success)
}
