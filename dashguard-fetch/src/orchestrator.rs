//! Ordered fallback search for the analytics payload.
//!
//! Tiers run cheapest first: cache, warm session, cookie-restored session,
//! full login, clean restart. Every tier error is classified, recorded with
//! the detection monitor and treated as "this tier produced nothing".

use chrono::Utc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use dashguard_core::{AcquisitionTier, FailureKind};
use dashguard_store::CookieStatus;

use crate::context::AcquisitionContext;
use crate::error::FetchError;
use crate::session::Credentials;

// ============================================================================
// Tier Attempt
// ============================================================================

/// Record of one tier within a cycle.
#[derive(Debug, Clone)]
pub struct TierAttempt {
    /// The tier.
    pub tier: AcquisitionTier,
    /// Whether the tier produced the payload.
    pub success: bool,
    /// Failure classification, for errors only.
    pub kind: Option<FailureKind>,
    /// Why the tier produced nothing.
    pub error: Option<String>,
    /// How long the tier took.
    pub duration: Duration,
}

impl TierAttempt {
    /// Creates a successful attempt record.
    pub fn success(tier: AcquisitionTier, duration: Duration) -> Self {
        Self {
            tier,
            success: true,
            kind: None,
            error: None,
            duration,
        }
    }

    /// Creates a record for a tier that failed with an error.
    pub fn failure(tier: AcquisitionTier, err: &FetchError, duration: Duration) -> Self {
        Self {
            tier,
            success: false,
            kind: Some(err.kind()),
            error: Some(err.to_string()),
            duration,
        }
    }

    /// Creates a record for a tier that ran cleanly but yielded nothing.
    pub fn empty(tier: AcquisitionTier, reason: impl Into<String>, duration: Duration) -> Self {
        Self {
            tier,
            success: false,
            kind: None,
            error: Some(reason.into()),
            duration,
        }
    }
}

// ============================================================================
// Acquisition Outcome
// ============================================================================

/// The outcome of one [`FallbackOrchestrator::acquire`] call.
#[derive(Debug)]
pub struct AcquisitionOutcome {
    /// The payload, absent when every tier failed.
    pub payload: Option<Value>,
    /// The tier that produced the payload.
    pub tier: Option<AcquisitionTier>,
    /// Every tier tried, in order.
    pub attempts: Vec<TierAttempt>,
    /// Whether the cycle started in defensive mode.
    pub defensive: bool,
    /// Total duration.
    pub duration: Duration,
}

impl AcquisitionOutcome {
    /// Returns true if a payload was produced.
    pub fn is_success(&self) -> bool {
        self.payload.is_some()
    }

    /// Returns the number of tiers that were tried.
    pub fn attempts_count(&self) -> usize {
        self.attempts.len()
    }

    /// Returns every failure reason.
    pub fn errors(&self) -> Vec<&str> {
        self.attempts.iter().filter_map(|a| a.error.as_deref()).collect()
    }
}

/// Result of one network tier.
type TierResult = Result<Option<Value>, FetchError>;

// ============================================================================
// Fallback Orchestrator
// ============================================================================

/// Runs the tiered search against an [`AcquisitionContext`].
#[derive(Debug)]
pub struct FallbackOrchestrator {
    ctx: AcquisitionContext,
}

impl FallbackOrchestrator {
    /// Creates an orchestrator over a context.
    pub fn new(ctx: AcquisitionContext) -> Self {
        Self { ctx }
    }

    /// Returns the context.
    pub fn context(&self) -> &AcquisitionContext {
        &self.ctx
    }

    /// Returns the payload, or `None` to skip this cycle.
    pub async fn get_data(&self) -> Option<Value> {
        self.acquire().await.payload
    }

    /// Runs the tiered search and reports every tier.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> AcquisitionOutcome {
        let start = Instant::now();
        let mut attempts = Vec::new();
        let ctx = &self.ctx;
        let key = ctx.cache_key();

        let defensive = ctx.monitor.is_defensive().await;
        if defensive {
            if let Some(payload) = ctx.cache.get(key).await {
                info!("Defensive mode, serving cached payload");
                attempts.push(TierAttempt::success(AcquisitionTier::Cache, start.elapsed()));
                return finish(start, attempts, defensive, Some((AcquisitionTier::Cache, payload)));
            }
            let delay = self.defensive_wait().await;
            warn!(delay = ?delay, "Defensive mode without cache, waiting");
            tokio::time::sleep(delay).await;
        }

        // Tier 1: cache
        let tier_start = Instant::now();
        if let Some(payload) = ctx.cache.get(key).await {
            debug!("Cache hit");
            ctx.monitor.record_success(AcquisitionTier::Cache).await;
            attempts.push(TierAttempt::success(AcquisitionTier::Cache, tier_start.elapsed()));
            return finish(start, attempts, defensive, Some((AcquisitionTier::Cache, payload)));
        }
        attempts.push(TierAttempt::empty(AcquisitionTier::Cache, "cache miss", tier_start.elapsed()));

        // Tiers 2-5: network
        for &tier in &AcquisitionTier::all()[1..] {
            if tier == AcquisitionTier::Cookies {
                match ctx.cookies.status_at(&ctx.settings.cookie_id, Utc::now()).await {
                    CookieStatus::Valid => {}
                    CookieStatus::Corrupt => {
                        let e = FetchError::CookieCorrupt(format!("snapshot '{}' is unreadable", ctx.settings.cookie_id));
                        warn!(tier = %tier, error = %e, "Skipping cookie tier");
                        ctx.monitor.record_failure(e.kind(), e.to_string()).await;
                        attempts.push(TierAttempt::failure(tier, &e, Duration::ZERO));
                        continue;
                    }
                    status => {
                        debug!(?status, "No usable cookies, skipping cookie tier");
                        attempts.push(TierAttempt::empty(tier, skip_reason(status), Duration::ZERO));
                        continue;
                    }
                }
            }

            let tier_start = Instant::now();
            debug!(tier = %tier, "Trying tier");

            match self.run_tier(tier).await {
                Ok(Some(payload)) => {
                    ctx.cache.set(key, payload.clone()).await;
                    ctx.monitor.record_success(tier).await;
                    info!(tier = %tier, "Payload acquired");
                    attempts.push(TierAttempt::success(tier, tier_start.elapsed()));
                    return finish(start, attempts, defensive, Some((tier, payload)));
                }
                Ok(None) => {
                    debug!(tier = %tier, "Tier produced nothing");
                    attempts.push(TierAttempt::empty(tier, "no payload", tier_start.elapsed()));
                }
                Err(e) => {
                    warn!(tier = %tier, kind = %e.kind(), error = %e, "Tier failed");
                    ctx.monitor.record_failure(e.kind(), e.to_string()).await;
                    attempts.push(TierAttempt::failure(tier, &e, tier_start.elapsed()));
                }
            }
        }

        error!(attempts = attempts.len(), "All acquisition tiers failed");
        ctx.monitor
            .record_failure(FailureKind::AllLevelsFailed, "every acquisition tier failed")
            .await;
        finish(start, attempts, defensive, None)
    }

    async fn run_tier(&self, tier: AcquisitionTier) -> TierResult {
        let session = &self.ctx.session;
        match tier {
            AcquisitionTier::Cache => Ok(None),
            AcquisitionTier::ActiveSession => {
                if !session.is_active().await {
                    return Ok(None);
                }
                session.fetch_payload().await
            }
            AcquisitionTier::Cookies => {
                session.acquire().await?;
                if !session.restore_from_cookies().await? {
                    return Ok(None);
                }
                session.fetch_payload().await
            }
            AcquisitionTier::FullLogin => self.login_and_fetch().await,
            AcquisitionTier::CleanRestart => {
                // Keep the browser when a login could not follow anyway.
                self.credentials()?;
                session.close().await;
                tokio::time::sleep(self.ctx.restart_pause()).await;
                self.login_and_fetch().await
            }
        }
    }

    /// The effective wait before network tiers in defensive mode.
    pub async fn defensive_wait(&self) -> Duration {
        self.ctx.monitor.defensive_delay().await.min(self.ctx.max_defensive_wait())
    }

    fn credentials(&self) -> Result<&Credentials, FetchError> {
        self.ctx
            .credentials
            .as_ref()
            .ok_or_else(|| FetchError::MissingCredentials("no dashboard credentials configured".to_string()))
    }

    async fn login_and_fetch(&self) -> TierResult {
        let credentials = self.credentials()?;
        let session = &self.ctx.session;
        session.acquire().await?;
        if !session.login(credentials).await? {
            return Ok(None);
        }
        session.fetch_payload().await
    }
}

fn skip_reason(status: CookieStatus) -> &'static str {
    match status {
        CookieStatus::Expired => "cookies expired",
        CookieStatus::Empty => "cookie snapshot empty",
        _ => "no saved cookies",
    }
}

fn finish(
    start: Instant,
    attempts: Vec<TierAttempt>,
    defensive: bool,
    produced: Option<(AcquisitionTier, Value)>,
) -> AcquisitionOutcome {
    let (tier, payload) = match produced {
        Some((tier, payload)) => (Some(tier), Some(payload)),
        None => (None, None),
    };
    AcquisitionOutcome {
        payload,
        tier,
        attempts,
        defensive,
        duration: start.elapsed(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::automation::LaunchProfile;
    use crate::session::{Credentials, DashboardSession};
    use async_trait::async_trait;
    use dashguard_store::{CacheStore, CookieStore, DetectionConfig, DetectionMonitor, Settings, StoredCookie};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Calls {
        is_active: AtomicU32,
        acquire: AtomicU32,
        restore: AtomicU32,
        login: AtomicU32,
        fetch: AtomicU32,
        close: AtomicU32,
    }

    impl Calls {
        fn total(&self) -> u32 {
            [
                &self.is_active,
                &self.acquire,
                &self.restore,
                &self.login,
                &self.fetch,
                &self.close,
            ]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
        }
    }

    /// Scripted session: every knob is fixed up front, every call counted.
    #[derive(Default)]
    struct MockSession {
        calls: Calls,
        active: AtomicBool,
        restore_ok: bool,
        login_ok: bool,
        /// Fetch fails with 403 until this many logins happened.
        logins_before_fetch_works: u32,
        fetch_error: Option<fn() -> FetchError>,
    }

    #[async_trait]
    impl DashboardSession for MockSession {
        async fn is_active(&self) -> bool {
            self.calls.is_active.fetch_add(1, Ordering::SeqCst);
            self.active.load(Ordering::SeqCst)
        }

        async fn acquire(&self) -> Result<LaunchProfile, FetchError> {
            self.calls.acquire.fetch_add(1, Ordering::SeqCst);
            Ok(LaunchProfile::Stealth)
        }

        async fn restore_from_cookies(&self) -> Result<bool, FetchError> {
            self.calls.restore.fetch_add(1, Ordering::SeqCst);
            Ok(self.restore_ok)
        }

        async fn login(&self, _credentials: &Credentials) -> Result<bool, FetchError> {
            self.calls.login.fetch_add(1, Ordering::SeqCst);
            Ok(self.login_ok)
        }

        async fn fetch_payload(&self) -> Result<Option<Value>, FetchError> {
            self.calls.fetch.fetch_add(1, Ordering::SeqCst);
            if let Some(make_error) = self.fetch_error {
                return Err(make_error());
            }
            if self.calls.login.load(Ordering::SeqCst) < self.logins_before_fetch_works {
                return Err(FetchError::Forbidden("blocked".to_string()));
            }
            Ok(Some(json!({"data": [{"source": "fresh", "revenue": 3}]})))
        }

        async fn keep_alive(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.calls.close.fetch_add(1, Ordering::SeqCst);
            self.active.store(false, Ordering::SeqCst);
        }

        async fn bearer_token(&self) -> Result<Option<String>, FetchError> {
            Ok(None)
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            data_dir: Some(dir.path().to_path_buf()),
            restart_pause_secs: 0,
            max_defensive_wait_secs: 0,
            ..Settings::default()
        }
    }

    async fn orchestrator(dir: &TempDir, session: Arc<MockSession>, credentials: bool) -> FallbackOrchestrator {
        let ctx = AcquisitionContext::builder()
            .settings(settings(dir))
            .session(session)
            .credentials(credentials.then(|| Credentials::new("ops@example.com", "pw")))
            .build()
            .await
            .unwrap();
        FallbackOrchestrator::new(ctx)
    }

    #[tokio::test]
    async fn test_cache_hit_never_touches_session() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession::default());
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;
        let cached = json!({"data": [{"source": "cached", "revenue": 1}]});
        orch.context().cache.set("leadpier_sources", cached.clone()).await;

        let outcome = orch.acquire().await;

        assert_eq!(outcome.payload, Some(cached));
        assert_eq!(outcome.tier, Some(AcquisitionTier::Cache));
        assert_eq!(session.calls.total(), 0);
        let state = orch.context().monitor.snapshot().await;
        assert_eq!(state.success_count, 1);
        assert_eq!(state.success_history[0].method, AcquisitionTier::Cache);
    }

    #[tokio::test]
    async fn test_warm_session_writes_through_cache() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            active: AtomicBool::new(true),
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;

        let outcome = orch.acquire().await;

        assert_eq!(outcome.tier, Some(AcquisitionTier::ActiveSession));
        assert_eq!(session.calls.login.load(Ordering::SeqCst), 0);
        assert_eq!(
            orch.context().cache.get("leadpier_sources").await,
            outcome.payload
        );
    }

    #[tokio::test]
    async fn test_cookie_restore_skips_login() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            restore_ok: true,
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;
        orch.context()
            .cookies
            .save("leadpier", &[StoredCookie::new("sid", "abc").with_domain(".leadpier.com")])
            .await
            .unwrap();

        let outcome = orch.acquire().await;

        assert_eq!(outcome.tier, Some(AcquisitionTier::Cookies));
        assert_eq!(session.calls.restore.load(Ordering::SeqCst), 1);
        assert_eq!(session.calls.login.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cookie_tier_skipped_without_valid_cookies() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            restore_ok: true,
            login_ok: true,
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;

        let outcome = orch.acquire().await;

        assert_eq!(outcome.tier, Some(AcquisitionTier::FullLogin));
        assert_eq!(session.calls.restore.load(Ordering::SeqCst), 0);
        assert_eq!(session.calls.login.load(Ordering::SeqCst), 1);
        let skipped = &outcome.attempts[2];
        assert_eq!(skipped.tier, AcquisitionTier::Cookies);
        assert_eq!(skipped.kind, None);
        assert_eq!(skipped.error.as_deref(), Some("no saved cookies"));
    }

    #[tokio::test]
    async fn test_corrupt_cookies_record_failure() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            restore_ok: true,
            login_ok: true,
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;
        let cookie_dir = orch.context().settings.cookie_dir();
        std::fs::create_dir_all(&cookie_dir).unwrap();
        std::fs::write(cookie_dir.join("cookies_leadpier.json"), "{not json").unwrap();

        let outcome = orch.acquire().await;

        assert_eq!(outcome.tier, Some(AcquisitionTier::FullLogin));
        assert_eq!(session.calls.restore.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.attempts[2].kind, Some(FailureKind::CookieCorrupt));
        let state = orch.context().monitor.snapshot().await;
        assert_eq!(state.failure_history.len(), 1);
        assert_eq!(state.failure_history[0].kind, FailureKind::CookieCorrupt);
    }

    #[tokio::test]
    async fn test_unauthenticated_session_records_no_warm_failure() {
        let dir = TempDir::new().unwrap();
        // Would answer 401 if the warm tier fetched through it.
        let session = Arc::new(MockSession {
            fetch_error: Some(|| FetchError::AuthInvalid("401".to_string())),
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;

        assert!(orch.acquire().await.payload.is_none());
        assert!(orch.acquire().await.payload.is_none());

        assert_eq!(session.calls.fetch.load(Ordering::SeqCst), 0);
        let state = orch.context().monitor.snapshot().await;
        let kinds: Vec<_> = state.failure_history.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::AllLevelsFailed, FailureKind::AllLevelsFailed]);
    }

    #[tokio::test]
    async fn test_clean_restart_after_login_tier_fails() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            login_ok: true,
            logins_before_fetch_works: 2,
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), true).await;

        let outcome = orch.acquire().await;

        assert_eq!(outcome.tier, Some(AcquisitionTier::CleanRestart));
        assert_eq!(session.calls.close.load(Ordering::SeqCst), 1);
        let failed: Vec<_> = outcome.attempts.iter().filter(|a| a.kind.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, Some(FailureKind::Forbidden));

        // The success after the failure clears the consecutive count.
        let stats = orch.context().monitor.stats().await;
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_all_tiers_failing_records_failure() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            active: AtomicBool::new(true),
            fetch_error: Some(|| FetchError::AuthInvalid("401".to_string())),
            ..MockSession::default()
        });
        let orch = orchestrator(&dir, Arc::clone(&session), false).await;

        assert!(orch.get_data().await.is_none());

        let state = orch.context().monitor.snapshot().await;
        let kinds: Vec<_> = state.failure_history.iter().map(|f| f.kind).collect();
        // Warm session 401, then both login tiers without credentials.
        assert_eq!(
            kinds,
            vec![
                FailureKind::AuthInvalid,
                FailureKind::LoginFailed,
                FailureKind::LoginFailed,
                FailureKind::AllLevelsFailed,
            ]
        );
        assert!(orch.context().cache.get("leadpier_sources").await.is_none());
        // Without credentials the clean restart leaves the browser alone.
        assert_eq!(session.calls.close.load(Ordering::SeqCst), 0);
        assert_eq!(session.calls.acquire.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_defensive_mode_serves_cache() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession::default());
        let s = settings(&dir);
        let monitor = Arc::new(DetectionMonitor::load(s.detection_state_path(), DetectionConfig::new(1, 30)).await);
        monitor.record_failure(FailureKind::Forbidden, "blocked").await;
        let cache = Arc::new(CacheStore::open(s.cache_dir(), 300).await.unwrap());
        let cached = json!({"data": {"statistics": []}});
        cache.set("leadpier_sources", cached.clone()).await;

        let ctx = AcquisitionContext::builder()
            .settings(s)
            .monitor(Arc::clone(&monitor))
            .cache(cache)
            .session(Arc::clone(&session) as Arc<dyn DashboardSession>)
            .build()
            .await
            .unwrap();
        let outcome = FallbackOrchestrator::new(ctx).acquire().await;

        assert!(outcome.defensive);
        assert_eq!(outcome.payload, Some(cached));
        assert_eq!(session.calls.total(), 0);
        // Serving from cache in defensive mode does not end the cooldown.
        assert!(monitor.is_defensive().await);
    }

    #[tokio::test]
    async fn test_defensive_mode_without_cache_falls_through() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(MockSession {
            active: AtomicBool::new(true),
            ..MockSession::default()
        });
        let s = settings(&dir);
        let monitor = Arc::new(DetectionMonitor::load(s.detection_state_path(), DetectionConfig::new(1, 30)).await);
        monitor.record_failure(FailureKind::RateLimited, "429").await;

        let ctx = AcquisitionContext::builder()
            .settings(s)
            .monitor(Arc::clone(&monitor))
            .session(Arc::clone(&session) as Arc<dyn DashboardSession>)
            .build()
            .await
            .unwrap();
        let outcome = FallbackOrchestrator::new(ctx).acquire().await;

        assert!(outcome.defensive);
        assert_eq!(outcome.tier, Some(AcquisitionTier::ActiveSession));
        assert!(!monitor.is_defensive().await);
    }

    async fn defensive_orchestrator(
        dir: &TempDir,
        failures: u32,
        max_defensive_wait_secs: u64,
    ) -> FallbackOrchestrator {
        let s = Settings {
            data_dir: Some(dir.path().to_path_buf()),
            max_defensive_wait_secs,
            ..Settings::default()
        };
        let monitor = Arc::new(DetectionMonitor::load(s.detection_state_path(), DetectionConfig::new(2, 30)).await);
        for _ in 0..failures {
            monitor.record_failure(FailureKind::Forbidden, "blocked").await;
        }
        let session = Arc::new(MockSession {
            active: AtomicBool::new(true),
            ..MockSession::default()
        });
        let ctx = AcquisitionContext::builder()
            .settings(s)
            .monitor(monitor)
            .session(session as Arc<dyn DashboardSession>)
            .build()
            .await
            .unwrap();
        FallbackOrchestrator::new(ctx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_defensive_wait_without_cache() {
        let default_cap = Settings::default().max_defensive_wait_secs;
        let cases = [(2, default_cap, 120), (10, default_cap, 300), (2, 90, 90)];

        for (failures, cap, expected) in cases {
            let dir = TempDir::new().unwrap();
            let orch = defensive_orchestrator(&dir, failures, cap).await;
            assert_eq!(orch.defensive_wait().await, Duration::from_secs(expected));

            let started = tokio::time::Instant::now();
            let outcome = orch.acquire().await;
            let waited = started.elapsed();

            assert!(outcome.defensive);
            assert_eq!(outcome.tier, Some(AcquisitionTier::ActiveSession));
            assert!(waited >= Duration::from_secs(expected), "{failures} failures waited {waited:?}");
            assert!(waited < Duration::from_secs(expected + 1), "{failures} failures waited {waited:?}");
        }
    }

    #[test]
    fn test_outcome_errors() {
        let outcome = AcquisitionOutcome {
            payload: None,
            tier: None,
            attempts: vec![
                TierAttempt::empty(AcquisitionTier::Cache, "cache miss", Duration::ZERO),
                TierAttempt::failure(
                    AcquisitionTier::ActiveSession,
                    &FetchError::SessionDead("gone".to_string()),
                    Duration::ZERO,
                ),
            ],
            defensive: false,
            duration: Duration::ZERO,
        };

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts_count(), 2);
        assert_eq!(outcome.errors().len(), 2);
        assert_eq!(outcome.attempts[1].kind, Some(FailureKind::SessionDead));
    }

    #[tokio::test]
    async fn test_cookie_store_is_shared_with_context() {
        let dir = TempDir::new().unwrap();
        let s = settings(&dir);
        let cookies = Arc::new(CookieStore::new(s.cookie_dir(), 12));
        let ctx = AcquisitionContext::builder()
            .settings(s)
            .cookies(Arc::clone(&cookies))
            .session(Arc::new(MockSession::default()))
            .build()
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&ctx.cookies, &cookies));
    }
}
