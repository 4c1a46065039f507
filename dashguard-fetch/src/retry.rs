//! Bounded retry combinator.
//!
//! Every network call in the crate goes through [`attempt`]: each try runs
//! under its own timeout, transient failures sleep for the backoff and try
//! again, anything else returns immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use dashguard_store::RetrySettings;

use crate::error::FetchError;

// ============================================================================
// Schedule
// ============================================================================

/// How a duration evolves across attempts (attempt numbers are zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Same duration for every attempt.
    Fixed(Duration),
    /// `step * (attempt + 1)`.
    Arithmetic(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential {
        /// First duration.
        base: Duration,
        /// Upper bound.
        max: Duration,
    },
}

impl Schedule {
    /// Duration for a zero-based attempt number.
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Arithmetic(step) => step.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential { base, max } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Attempts, per-attempt timeout and backoff for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Schedule,
    /// Sleep after a failed attempt.
    pub backoff: Schedule,
}

impl RetryPolicy {
    /// Creates a policy with growing timeouts (30 s, 60 s, ...) and backoff (5 s, 10 s, ...).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout: Schedule::Arithmetic(Duration::from_secs(30)),
            backoff: Schedule::Arithmetic(Duration::from_secs(5)),
        }
    }

    /// A single attempt with the given timeout.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            timeout: Schedule::Fixed(timeout),
            backoff: Schedule::Fixed(Duration::ZERO),
        }
    }

    /// Builds a policy from persisted settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            timeout: Schedule::Arithmetic(Duration::from_secs(settings.initial_timeout_secs)),
            backoff: Schedule::Arithmetic(Duration::from_secs(settings.backoff_step_secs)),
        }
    }

    /// Sets the timeout schedule.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Schedule) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Schedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Timeout for a zero-based attempt.
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        self.timeout.for_attempt(attempt)
    }

    /// Backoff after a failed zero-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.for_attempt(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

// ============================================================================
// Combinator
// ============================================================================

/// Runs `op` under `policy`.
///
/// `op` receives the zero-based attempt number and that attempt's timeout.
/// A rate-limit error carrying `retry_after` stretches the backoff to at
/// least that long.
///
/// # Errors
///
/// Returns the first non-transient error, or the last error once attempts
/// are exhausted.
pub async fn attempt<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut(u32, Duration) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_no = 0;

    loop {
        let timeout = policy.timeout_for_attempt(attempt_no);

        let error = match tokio::time::timeout(timeout, op(attempt_no, timeout)).await {
            Ok(Ok(value)) => {
                if attempt_no > 0 {
                    debug!(attempt = attempt_no + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => FetchError::Timeout(timeout.as_secs()),
        };

        let last = attempt_no + 1 >= max_attempts;
        if !error.is_transient() || last {
            if last && error.is_transient() {
                warn!(attempts = max_attempts, error = %error, "Retries exhausted");
            }
            return Err(error);
        }

        let mut delay = policy.delay_for_attempt(attempt_no);
        if let FetchError::RateLimited {
            retry_after: Some(secs),
        } = &error
        {
            delay = delay.max(Duration::from_secs(*secs));
        }

        warn!(
            attempt = attempt_no + 1,
            max_attempts,
            delay = ?delay,
            error = %error,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt_no += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_timeout(Schedule::Fixed(Duration::from_millis(200)))
            .with_backoff(Schedule::Fixed(Duration::from_millis(1)))
    }

    #[test]
    fn test_default_schedules() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.timeout_for_attempt(0), Duration::from_secs(30));
        assert_eq!(policy.timeout_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.timeout_for_attempt(2), Duration::from_secs(90));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_cap() {
        let schedule = Schedule::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        };
        assert_eq!(schedule.for_attempt(0), Duration::from_secs(1));
        assert_eq!(schedule.for_attempt(3), Duration::from_secs(8));
        assert_eq!(schedule.for_attempt(10), Duration::from_secs(60));
        assert_eq!(schedule.for_attempt(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);

        let result = attempt(&fast(3), |n, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::ConnectionRefused("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = attempt(&fast(3), |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::AuthInvalid("401".into())) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::AuthInvalid(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2)
            .with_timeout(Schedule::Fixed(Duration::from_millis(10)))
            .with_backoff(Schedule::Fixed(Duration::ZERO));

        let result: Result<(), _> = attempt(&policy, |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempt_receives_growing_timeout() {
        let policy = RetryPolicy::new(3)
            .with_timeout(Schedule::Arithmetic(Duration::from_millis(100)))
            .with_backoff(Schedule::Fixed(Duration::ZERO));
        let seen = std::sync::Mutex::new(Vec::new());

        let _: Result<(), _> = attempt(&policy, |_, timeout| {
            seen.lock().unwrap().push(timeout);
            async { Err(FetchError::Timeout(0)) }
        })
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
    }
}
