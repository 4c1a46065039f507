//! Detection monitor: success/failure bookkeeping and defensive mode.
//!
//! The monitor switches between NORMAL and DEFENSIVE. Reaching the
//! consecutive-failure threshold arms a cooldown; the cooldown self-expires,
//! and any recorded success ends it immediately. State is persisted after
//! every mutation so it outlives the process.

use chrono::{DateTime, Duration, Utc};
use dashguard_core::{AcquisitionTier, FailureKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::persistence::{load_json_or_default, save_json};

/// Maximum entries kept in each history ring.
pub const HISTORY_LIMIT: usize = 50;

/// Default consecutive failures before entering defensive mode.
pub const DEFAULT_DETECTION_THRESHOLD: u32 = 3;

/// Default defensive cooldown.
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 30;

/// Default window for failure pattern analysis.
pub const DEFAULT_PATTERN_WINDOW_MINUTES: i64 = 60;

const DELAY_STEP_SECS: u64 = 60;
const DELAY_MAX_STEPS: u32 = 5;

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds for the detection monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionConfig {
    /// Consecutive failures that arm defensive mode.
    pub threshold: u32,
    /// Length of the defensive cooldown.
    pub cooldown: Duration,
}

impl DetectionConfig {
    /// Creates a config from a threshold and a cooldown in minutes.
    pub fn new(threshold: u32, cooldown_minutes: u64) -> Self {
        let cooldown = i64::try_from(cooldown_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .unwrap_or(Duration::MAX);
        Self {
            threshold: threshold.max(1),
            cooldown,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DETECTION_THRESHOLD, DEFAULT_COOLDOWN_MINUTES)
    }
}

// ============================================================================
// Persisted State
// ============================================================================

/// A recorded success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Tier that produced the payload.
    pub method: AcquisitionTier,
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Classified kind.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

/// Persisted detection state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionState {
    /// Total recorded successes.
    pub success_count: u64,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Total recorded outcomes.
    pub total_requests: u64,
    /// Last success instant.
    pub last_success: Option<DateTime<Utc>>,
    /// Last failure instant.
    pub last_failure: Option<DateTime<Utc>>,
    /// Defensive mode holds until this instant.
    pub defensive_until: Option<DateTime<Utc>>,
    /// Most recent successes, oldest first.
    pub success_history: VecDeque<SuccessRecord>,
    /// Most recent failures, oldest first.
    pub failure_history: VecDeque<FailureRecord>,
    /// Last time the state was written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl DetectionState {
    fn is_defensive_at(&self, now: DateTime<Utc>) -> bool {
        self.defensive_until.is_some_and(|until| now < until)
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T) {
    ring.push_back(item);
    while ring.len() > HISTORY_LIMIT {
        ring.pop_front();
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Named failure pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// No failures in the window.
    None,
    /// Mostly rejected credentials.
    TokenInvalid,
    /// Mostly 403 responses.
    IpBlocked,
    /// Frequent rate limiting.
    RateLimited,
    /// Mostly timeouts.
    ConnectionIssues,
    /// Many mixed failures.
    MultipleErrors,
    /// Few, unrelated failures.
    Sporadic,
}

impl PatternKind {
    /// Severity attached to this pattern.
    pub fn severity(self) -> Severity {
        match self {
            Self::None | Self::Sporadic => Severity::Low,
            Self::RateLimited | Self::ConnectionIssues => Severity::Medium,
            Self::TokenInvalid | Self::MultipleErrors => Severity::High,
            Self::IpBlocked => Severity::Critical,
        }
    }

    /// Fixed operator recommendation for this pattern.
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::None => "No action needed",
            Self::TokenInvalid => "Renew the access token",
            Self::IpBlocked => "Change IP address or wait",
            Self::RateLimited => "Reduce request frequency",
            Self::ConnectionIssues => "Check network connectivity",
            Self::MultipleErrors => "Stay in defensive mode",
            Self::Sporadic => "Keep monitoring",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::TokenInvalid => "token_invalid",
            Self::IpBlocked => "ip_blocked",
            Self::RateLimited => "rate_limited",
            Self::ConnectionIssues => "connection_issues",
            Self::MultipleErrors => "multiple_errors",
            Self::Sporadic => "sporadic",
        })
    }
}

/// Pattern severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing to do.
    Low,
    /// Worth adjusting.
    Medium,
    /// Needs attention.
    High,
    /// Acquisition is effectively blocked.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// Result of failure pattern analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailurePattern {
    /// Named pattern.
    pub pattern: PatternKind,
    /// Severity of the pattern.
    pub severity: Severity,
    /// What the operator should do.
    pub recommendation: &'static str,
    /// Failures inside the window.
    pub total: usize,
    /// Most frequent kind inside the window.
    pub dominant: Option<FailureKind>,
    /// Share of the dominant kind, 0.0 to 1.0.
    pub dominant_share: f64,
}

/// Monitor statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionStats {
    /// Total recorded outcomes.
    pub total_requests: u64,
    /// Total successes.
    pub success_count: u64,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Success percentage, rounded to two decimals.
    pub success_rate: f64,
    /// Whether defensive mode is active.
    pub defensive: bool,
    /// Defensive mode end, if armed.
    pub defensive_until: Option<DateTime<Utc>>,
    /// Last success instant.
    pub last_success: Option<DateTime<Utc>>,
    /// Last failure instant.
    pub last_failure: Option<DateTime<Utc>>,
}

#[allow(clippy::cast_precision_loss)]
fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Classifies a set of failures. Thresholds are strict.
pub fn classify_failures(failures: &[FailureRecord]) -> FailurePattern {
    let total = failures.len();

    let mut counts: HashMap<FailureKind, usize> = HashMap::new();
    for failure in failures {
        *counts.entry(failure.kind).or_insert(0) += 1;
    }
    let count = |kind: FailureKind| counts.get(&kind).copied().unwrap_or(0);

    let dominant = counts
        .iter()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.tag().cmp(ka.tag())))
        .map(|(kind, _)| *kind);

    let pattern = if total == 0 {
        PatternKind::None
    } else if share(count(FailureKind::AuthInvalid), total) > 0.5 {
        PatternKind::TokenInvalid
    } else if share(count(FailureKind::Forbidden), total) > 0.5 {
        PatternKind::IpBlocked
    } else if share(count(FailureKind::RateLimited), total) > 0.3 {
        PatternKind::RateLimited
    } else if share(count(FailureKind::NetworkTimeout), total) > 0.5 {
        PatternKind::ConnectionIssues
    } else if total >= 5 {
        PatternKind::MultipleErrors
    } else {
        PatternKind::Sporadic
    };

    FailurePattern {
        pattern,
        severity: pattern.severity(),
        recommendation: pattern.recommendation(),
        total,
        dominant,
        dominant_share: dominant.map_or(0.0, |kind| share(count(kind), total)),
    }
}

// ============================================================================
// Detection Monitor
// ============================================================================

/// Tracks acquisition outcomes and computes defensive mode.
#[derive(Debug)]
pub struct DetectionMonitor {
    path: PathBuf,
    config: DetectionConfig,
    state: Mutex<DetectionState>,
}

impl DetectionMonitor {
    /// Loads state from `path`, starting fresh if missing or unreadable.
    pub async fn load(path: impl Into<PathBuf>, config: DetectionConfig) -> Self {
        let path = path.into();
        let state: DetectionState = load_json_or_default(&path).await;
        debug!(
            path = %path.display(),
            consecutive_failures = state.failure_count,
            total = state.total_requests,
            "Loaded detection state"
        );
        Self {
            path,
            config,
            state: Mutex::new(state),
        }
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the active thresholds.
    pub fn config(&self) -> DetectionConfig {
        self.config
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> DetectionState {
        self.state.lock().await.clone()
    }

    async fn persist(&self, state: &mut DetectionState, now: DateTime<Utc>) {
        state.updated_at = Some(now);
        if let Err(e) = save_json(&self.path, state).await {
            warn!(path = %self.path.display(), error = %e, "Failed to save detection state");
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Records a success produced by `method`.
    pub async fn record_success(&self, method: AcquisitionTier) {
        self.record_success_at(method, Utc::now()).await;
    }

    /// Like [`record_success`](Self::record_success), at `now`.
    pub async fn record_success_at(&self, method: AcquisitionTier, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;

        state.success_count += 1;
        state.total_requests += 1;
        state.failure_count = 0;
        state.last_success = Some(now);
        push_bounded(&mut state.success_history, SuccessRecord { timestamp: now, method });

        if state.is_defensive_at(now) {
            info!(method = %method, "Success recorded, leaving defensive mode");
        }
        state.defensive_until = None;

        self.persist(&mut state, now).await;
        debug!(method = %method, "Recorded success");
    }

    /// Records a classified failure.
    pub async fn record_failure(&self, kind: FailureKind, message: impl Into<String>) {
        self.record_failure_at(kind, message, Utc::now()).await;
    }

    /// Like [`record_failure`](Self::record_failure), at `now`.
    pub async fn record_failure_at(
        &self,
        kind: FailureKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        let mut state = self.state.lock().await;

        state.failure_count = state.failure_count.saturating_add(1);
        state.total_requests += 1;
        state.last_failure = Some(now);
        push_bounded(
            &mut state.failure_history,
            FailureRecord {
                timestamp: now,
                kind,
                message: message.clone(),
            },
        );

        if state.failure_count >= self.config.threshold {
            let until = now
                .checked_add_signed(self.config.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.defensive_until = Some(until);
            warn!(
                consecutive_failures = state.failure_count,
                until = %until,
                "Defensive mode armed"
            );
        }

        self.persist(&mut state, now).await;
        debug!(kind = %kind, message = %message, "Recorded failure");
    }

    /// Zeroes counters and leaves defensive mode. History is kept.
    pub async fn reset_stats(&self) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.success_count = 0;
        state.failure_count = 0;
        state.total_requests = 0;
        state.defensive_until = None;
        self.persist(&mut state, now).await;
        info!("Detection stats reset");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// True while the defensive cooldown has not elapsed.
    pub async fn is_defensive(&self) -> bool {
        self.is_defensive_at(Utc::now()).await
    }

    /// Like [`is_defensive`](Self::is_defensive), at `now`.
    pub async fn is_defensive_at(&self, now: DateTime<Utc>) -> bool {
        self.state.lock().await.is_defensive_at(now)
    }

    /// Recommended wait: one minute per consecutive failure, capped at five.
    pub async fn defensive_delay(&self) -> StdDuration {
        let failures = self.state.lock().await.failure_count;
        Self::delay_for_failures(failures)
    }

    /// The delay formula behind [`defensive_delay`](Self::defensive_delay).
    pub fn delay_for_failures(failures: u32) -> StdDuration {
        StdDuration::from_secs(DELAY_STEP_SECS * u64::from(failures.min(DELAY_MAX_STEPS)))
    }

    /// Failures newer than `window_minutes`, newest first.
    pub async fn recent_failures(&self, window_minutes: i64) -> Vec<FailureRecord> {
        self.recent_failures_at(window_minutes, Utc::now()).await
    }

    /// Like [`recent_failures`](Self::recent_failures), at `now`.
    pub async fn recent_failures_at(&self, window_minutes: i64, now: DateTime<Utc>) -> Vec<FailureRecord> {
        let cutoff = Duration::try_minutes(window_minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.state
            .lock()
            .await
            .failure_history
            .iter()
            .rev()
            .filter(|f| f.timestamp > cutoff)
            .cloned()
            .collect()
    }

    /// Classifies the failures inside the window.
    pub async fn classify_failure_pattern(&self, window_minutes: i64) -> FailurePattern {
        self.classify_failure_pattern_at(window_minutes, Utc::now()).await
    }

    /// Like [`classify_failure_pattern`](Self::classify_failure_pattern), at `now`.
    pub async fn classify_failure_pattern_at(&self, window_minutes: i64, now: DateTime<Utc>) -> FailurePattern {
        let recent = self.recent_failures_at(window_minutes, now).await;
        classify_failures(&recent)
    }

    /// Returns monitor statistics.
    pub async fn stats(&self) -> DetectionStats {
        self.stats_at(Utc::now()).await
    }

    /// Like [`stats`](Self::stats), at `now`.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats_at(&self, now: DateTime<Utc>) -> DetectionStats {
        let state = self.state.lock().await;
        let success_rate = if state.total_requests == 0 {
            0.0
        } else {
            let pct = state.success_count as f64 / state.total_requests as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        DetectionStats {
            total_requests: state.total_requests,
            success_count: state.success_count,
            consecutive_failures: state.failure_count,
            success_rate,
            defensive: state.is_defensive_at(now),
            defensive_until: state.defensive_until,
            last_success: state.last_success,
            last_failure: state.last_failure,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
