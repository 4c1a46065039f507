//! Run command - the acquisition scheduler.
//!
//! Two timers share one loop: acquisition (with random jitter in front of
//! every cycle) and keep-alive. Ctrl-C or SIGTERM ends the loop; the browser
//! session is closed exactly once on the way out.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use dashguard_core::normalize_payload;
use dashguard_fetch::{DashboardSession, FallbackOrchestrator};
use dashguard_store::save_json;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{build_context, load_settings};
use crate::output::{JsonFormatter, OutcomeOutput, RecordsOutput, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Write the normalized records of every successful cycle to this file.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Acquisition interval in seconds (overrides settings).
    #[arg(long, short)]
    pub interval: Option<u64>,

    /// Skip the random delay before each cycle.
    #[arg(long)]
    pub no_jitter: bool,
}

// ============================================================================
// Cleanup Guard
// ============================================================================

/// Closes the session once, however the loop ends.
pub struct CleanupGuard {
    session: Arc<dyn DashboardSession>,
    closed: AtomicBool,
}

impl CleanupGuard {
    /// Creates a guard for `session`.
    pub fn new(session: Arc<dyn DashboardSession>) -> Self {
        Self {
            session,
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the session; later calls do nothing.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Closing browser session");
        self.session.close().await;
        true
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!("Exiting without closing the browser session");
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Random delay in `0..=max_secs` seconds.
pub fn jitter(max_secs: u64) -> Duration {
    if max_secs == 0 {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=max_secs.saturating_mul(1000));
    Duration::from_millis(millis)
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Runs the run command.
pub async fn run(args: &RunArgs, cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli).await?;
    if args.interval == Some(0) {
        bail!("--interval must be greater than zero");
    }
    let acquisition_every = args
        .interval
        .map_or_else(|| settings.acquisition_interval(), Duration::from_secs);
    let keep_alive_every = settings.keep_alive_interval();
    let jitter_max = if args.no_jitter { 0 } else { settings.jitter_max_secs };

    let ctx = build_context(settings).await?;
    if ctx.credentials.is_none() {
        warn!("No login credentials configured; login tiers will fail");
    }
    let guard = CleanupGuard::new(Arc::clone(&ctx.session));
    let orchestrator = FallbackOrchestrator::new(ctx);

    if args.once {
        let produced = run_cycle(&orchestrator, args.output.as_deref(), cli).await;
        guard.close().await;
        return Ok(if produced { ExitCode::Success } else { ExitCode::NoData });
    }

    info!(
        interval = ?acquisition_every,
        keep_alive = ?keep_alive_every,
        jitter_max_secs = jitter_max,
        "Starting scheduler"
    );

    let mut acquisition = interval(acquisition_every);
    acquisition.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut keep_alive = interval_at(Instant::now() + keep_alive_every, keep_alive_every);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = acquisition.tick() => {
                let delay = jitter(jitter_max);
                debug!(delay = ?delay, "Jitter before cycle");
                tokio::select! {
                    () = &mut shutdown => {
                        info!("Shutdown requested");
                        break;
                    }
                    () = sleep(delay) => {}
                }
                run_cycle(&orchestrator, args.output.as_deref(), cli).await;
            }
            _ = keep_alive.tick() => {
                let alive = orchestrator.context().session.keep_alive().await;
                debug!(alive, "Keep-alive");
            }
        }
    }

    guard.close().await;
    Ok(ExitCode::Success)
}

/// One acquisition; returns whether a payload was produced.
async fn run_cycle(orchestrator: &FallbackOrchestrator, output: Option<&Path>, cli: &Cli) -> bool {
    let outcome = orchestrator.acquire().await;
    let report = OutcomeOutput::from(&outcome);

    match cli.format {
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", TextFormatter::new(!cli.no_color).format_outcome(&report));
            }
        }
        OutputFormat::Json => match JsonFormatter::new(cli.pretty).format(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Failed to format cycle report"),
        },
    }

    let Some(payload) = &outcome.payload else {
        warn!("Cycle produced no data, skipping");
        return false;
    };

    if let Some(path) = output {
        if let Err(e) = write_snapshot(&outcome, payload, path).await {
            warn!(error = %e, path = %path.display(), "Failed to write snapshot");
        }
    }
    true
}

async fn write_snapshot(
    outcome: &dashguard_fetch::AcquisitionOutcome,
    payload: &serde_json::Value,
    path: &Path,
) -> Result<()> {
    let records = normalize_payload(payload).context("payload could not be normalized")?;
    let snapshot = RecordsOutput::new(outcome, records, Utc::now());
    save_json(path, &snapshot)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), count = snapshot.count, "Snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashguard_core::AcquisitionTier;
    use dashguard_fetch::{AcquisitionOutcome, Credentials, FetchError, LaunchProfile, TierAttempt};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingSession {
        closes: AtomicU32,
    }

    #[async_trait]
    impl DashboardSession for CountingSession {
        async fn is_active(&self) -> bool {
            false
        }
        async fn acquire(&self) -> Result<LaunchProfile, FetchError> {
            Ok(LaunchProfile::Plain)
        }
        async fn restore_from_cookies(&self) -> Result<bool, FetchError> {
            Ok(false)
        }
        async fn login(&self, _credentials: &Credentials) -> Result<bool, FetchError> {
            Ok(false)
        }
        async fn fetch_payload(&self) -> Result<Option<Value>, FetchError> {
            Ok(None)
        }
        async fn keep_alive(&self) -> bool {
            false
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        async fn bearer_token(&self) -> Result<Option<String>, FetchError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_cleanup_guard_closes_once() {
        let session = Arc::new(CountingSession::default());
        let guard = CleanupGuard::new(Arc::clone(&session) as Arc<dyn DashboardSession>);

        assert!(guard.close().await);
        assert!(!guard.close().await);
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(0), Duration::ZERO);
        for _ in 0..50 {
            assert!(jitter(2) <= Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn test_write_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("latest.json");
        let payload = json!({"data": [{"source": "A", "revenue": "12.5"}]});
        let outcome = AcquisitionOutcome {
            payload: Some(payload.clone()),
            tier: Some(AcquisitionTier::ActiveSession),
            attempts: vec![TierAttempt::success(AcquisitionTier::ActiveSession, Duration::ZERO)],
            defensive: false,
            duration: Duration::ZERO,
        };

        write_snapshot(&outcome, &payload, &path).await.unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["count"], 1);
        assert_eq!(written["records"][0]["adset_name"], "A");
    }
}
