// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `DashGuard` CLI - keeps dashboard analytics flowing despite bot defenses.
//!
//! # Examples
//!
//! ```bash
//! # Scheduler loop (acquisition + keep-alive)
//! dashguard run
//!
//! # One cycle, snapshot written to a file
//! dashguard run --once --output records.json
//!
//! # One acquisition, printed
//! dashguard fetch --format json --pretty
//!
//! # Detection state, cache and cookies
//! dashguard status
//!
//! # Maintenance
//! dashguard cache cleanup
//! dashguard cookies clear
//! dashguard monitor reset
//!
//! # Check a bearer token
//! DASHGUARD_BEARER=... dashguard token
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{config, fetch, maintenance, run, status, token};

// ============================================================================
// CLI Definition
// ============================================================================

/// `DashGuard` CLI - resilient dashboard analytics acquisition.
#[derive(Parser)]
#[command(name = "dashguard")]
#[command(about = "Resilient analytics acquisition from a bot-hostile dashboard")]
#[command(long_about = r"
DashGuard fetches analytics from the dashboard through an ordered fallback:
cache, warm browser session, saved cookies, full login, clean restart.
Repeated failures switch it into a defensive mode that serves the cache.

Credentials are read from the environment:
  DASHGUARD_EMAIL, DASHGUARD_PASSWORD   dashboard login
  DASHGUARD_BEARER                      token for the 'token' command

Examples:
  dashguard run                  # Scheduler loop
  dashguard fetch                # One acquisition
  dashguard status               # Detection, cache and cookie state
  dashguard --format json status # JSON output
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the acquisition scheduler.
    #[command(visible_alias = "r")]
    Run(run::RunArgs),

    /// Acquire once and print the normalized records.
    #[command(visible_alias = "f")]
    Fetch(fetch::FetchArgs),

    /// Show detection, cache and cookie state.
    #[command(visible_alias = "s")]
    Status(status::StatusArgs),

    /// Manage the payload cache.
    Cache(maintenance::CacheArgs),

    /// Manage saved session cookies.
    Cookies(maintenance::CookiesArgs),

    /// Manage the detection monitor.
    Monitor(maintenance::MonitorArgs),

    /// Validate a bearer token against the analytics endpoint.
    Token(token::TokenArgs),

    /// Inspect configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// No payload could be acquired.
    NoData = 2,
    /// Token rejected.
    TokenRejected = 3,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let default = if verbose { "dashguard=debug,info" } else { "dashguard=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Run(args) => run::run(args, &cli).await,
        Commands::Fetch(args) => fetch::run(args, &cli).await,
        Commands::Status(args) => status::run(args, &cli).await,
        Commands::Cache(args) => maintenance::run_cache(args, &cli).await,
        Commands::Cookies(args) => maintenance::run_cookies(args, &cli).await,
        Commands::Monitor(args) => maintenance::run_monitor(args, &cli).await,
        Commands::Token(args) => token::run(args, &cli).await,
        Commands::Config(args) => config::run(args, &cli).await,
    };

    match result {
        Ok(ExitCode::Success) => Ok(()),
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    }
}
