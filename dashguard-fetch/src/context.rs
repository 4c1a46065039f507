//! Acquisition context.
//!
//! Bundles the stores and the dashboard session the fallback orchestrator
//! works against. Built once per process and injected; tests swap in their
//! own session and temp-dir stores through the builder.

use std::sync::Arc;
use std::time::Duration;

use dashguard_store::{CacheStore, CookieStore, DetectionMonitor, Settings};

use crate::error::FetchError;
use crate::host::http::AnalyticsClient;
use crate::host::webdriver::WebDriverLauncher;
use crate::retry::{RetryPolicy, Schedule};
use crate::session::{Credentials, DashboardSession, SessionConfig, SessionManager};

// ============================================================================
// Acquisition Context
// ============================================================================

/// Everything one acquisition cycle needs.
pub struct AcquisitionContext {
    /// Effective settings.
    pub settings: Settings,
    /// Payload cache.
    pub cache: Arc<CacheStore>,
    /// Saved session cookies.
    pub cookies: Arc<CookieStore>,
    /// Success/failure tracker.
    pub monitor: Arc<DetectionMonitor>,
    /// Dashboard session.
    pub session: Arc<dyn DashboardSession>,
    /// Login credentials, if configured.
    pub credentials: Option<Credentials>,
}

impl AcquisitionContext {
    /// Creates a builder.
    pub fn builder() -> AcquisitionContextBuilder {
        AcquisitionContextBuilder::new()
    }

    /// Cache key of the analytics payload.
    pub fn cache_key(&self) -> &str {
        &self.settings.cache_key
    }

    /// Longest sleep in defensive mode before trying the network anyway.
    pub fn max_defensive_wait(&self) -> Duration {
        Duration::from_secs(self.settings.max_defensive_wait_secs)
    }

    /// Pause between tearing down the handle and the clean-restart login.
    pub fn restart_pause(&self) -> Duration {
        Duration::from_secs(self.settings.restart_pause_secs)
    }

    /// Direct HTTP client for the analytics endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the configured endpoint URL is invalid.
    pub fn analytics_client(&self) -> Result<AnalyticsClient, FetchError> {
        AnalyticsClient::new(&self.settings.dashboard.api_url, &self.settings.dashboard.base_url)
    }
}

impl std::fmt::Debug for AcquisitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionContext")
            .field("settings", &self.settings)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Acquisition Context Builder
// ============================================================================

/// Builder for constructing an [`AcquisitionContext`].
///
/// Anything not set is created from the settings: stores under the data
/// directory and a WebDriver-backed [`SessionManager`].
#[derive(Default)]
pub struct AcquisitionContextBuilder {
    settings: Settings,
    cache: Option<Arc<CacheStore>>,
    cookies: Option<Arc<CookieStore>>,
    monitor: Option<Arc<DetectionMonitor>>,
    session: Option<Arc<dyn DashboardSession>>,
    credentials: Option<Credentials>,
}

impl AcquisitionContextBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settings.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the payload cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the cookie store.
    #[must_use]
    pub fn cookies(mut self, cookies: Arc<CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Sets the detection monitor.
    #[must_use]
    pub fn monitor(mut self, monitor: Arc<DetectionMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Sets the dashboard session.
    #[must_use]
    pub fn session(mut self, session: Arc<dyn DashboardSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builds the context, opening any store that was not supplied.
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory cannot be created.
    pub async fn build(self) -> Result<AcquisitionContext, FetchError> {
        let settings = self.settings;

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(CacheStore::open(settings.cache_dir(), settings.cache_ttl_secs).await?),
        };
        let cookies = self
            .cookies
            .unwrap_or_else(|| Arc::new(CookieStore::new(settings.cookie_dir(), settings.cookie_max_age_hours)));
        let monitor = match self.monitor {
            Some(monitor) => monitor,
            None => Arc::new(
                DetectionMonitor::load(settings.detection_state_path(), settings.detection_config()).await,
            ),
        };
        let session = self.session.unwrap_or_else(|| {
            let launcher = Arc::new(
                WebDriverLauncher::new(settings.webdriver_url.clone(), settings.headless)
                    .with_connect_policy(connect_policy(&settings)),
            );
            Arc::new(SessionManager::new(
                launcher,
                Arc::clone(&cookies),
                SessionConfig::from_settings(&settings),
            ))
        });

        Ok(AcquisitionContext {
            settings,
            cache,
            cookies,
            monitor,
            session,
            credentials: self.credentials,
        })
    }
}

/// Connection policy for the WebDriver server: the configured attempts and
/// timeouts with a short fixed backoff.
fn connect_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy::from_settings(&settings.retry).with_backoff(Schedule::Fixed(Duration::from_millis(500)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            data_dir: Some(dir.path().to_path_buf()),
            max_defensive_wait_secs: 120,
            restart_pause_secs: 1,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_build_opens_stores_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let ctx = AcquisitionContext::builder()
            .settings(settings_in(&dir))
            .build()
            .await
            .unwrap();

        assert_eq!(ctx.cache.dir(), dir.path().join("cache"));
        assert_eq!(ctx.cookies.dir(), dir.path().join("cookies"));
        assert_eq!(ctx.cache_key(), "leadpier_sources");
        assert_eq!(ctx.max_defensive_wait(), Duration::from_secs(120));
        assert_eq!(ctx.restart_pause(), Duration::from_secs(1));
        assert!(ctx.credentials.is_none());
    }

    #[tokio::test]
    async fn test_debug_hides_password() {
        let dir = TempDir::new().unwrap();
        let ctx = AcquisitionContext::builder()
            .settings(settings_in(&dir))
            .credentials(Some(Credentials::new("ops@example.com", "s3cret")))
            .build()
            .await
            .unwrap();

        let debug = format!("{ctx:?}");
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_analytics_client_uses_configured_endpoint() {
        let dir = TempDir::new().unwrap();
        let ctx = AcquisitionContext::builder()
            .settings(settings_in(&dir))
            .build()
            .await
            .unwrap();

        let client = ctx.analytics_client().unwrap();
        assert_eq!(client.api_url().path(), "/v1/api/stats/user/sources");
    }

    #[test]
    fn test_connect_policy_follows_retry_settings() {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 5;
        settings.retry.initial_timeout_secs = 10;

        let policy = connect_policy(&settings);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.timeout_for_attempt(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }
}
