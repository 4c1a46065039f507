//! Runtime settings with persistence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache_store::DEFAULT_CACHE_TTL_SECS;
use crate::cookie_store::DEFAULT_COOKIE_MAX_AGE_HOURS;
use crate::detection::{DEFAULT_COOLDOWN_MINUTES, DEFAULT_DETECTION_THRESHOLD, DetectionConfig};
use crate::error::StoreError;
use crate::persistence::{default_data_dir, default_settings_path, load_json, save_json};

// ============================================================================
// Settings Types
// ============================================================================

/// All tunables of the acquisition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ========================================================================
    // Storage
    // ========================================================================
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Cache TTL in seconds.
    pub cache_ttl_secs: u64,

    /// Cache key under which payloads are stored.
    pub cache_key: String,

    /// Maximum cookie snapshot age in hours.
    pub cookie_max_age_hours: u64,

    /// Identifier of the cookie snapshot.
    pub cookie_id: String,

    /// Domain filter applied when restoring cookies.
    pub cookie_domain: String,

    // ========================================================================
    // Detection
    // ========================================================================
    /// Consecutive failures before defensive mode.
    pub detection_threshold: u32,

    /// Defensive cooldown in minutes.
    pub cooldown_minutes: u64,

    /// Upper bound on the defensive wait, in seconds.
    pub max_defensive_wait_secs: u64,

    // ========================================================================
    // Upstream
    // ========================================================================
    /// Dashboard endpoints.
    pub dashboard: DashboardSettings,

    /// Analytics request body.
    pub request: RequestBody,

    // ========================================================================
    // Automation
    // ========================================================================
    /// WebDriver server URL.
    pub webdriver_url: String,

    /// Run the browser without a window.
    pub headless: bool,

    /// Login navigation polls.
    pub login_poll_attempts: u32,

    /// Seconds between login polls.
    pub login_poll_interval_secs: u64,

    /// Pause between teardown and relaunch on clean restart, in seconds.
    pub restart_pause_secs: u64,

    // ========================================================================
    // Scheduling
    // ========================================================================
    /// Seconds between acquisition cycles.
    pub acquisition_interval_secs: u64,

    /// Seconds between keep-alive probes.
    pub keep_alive_interval_secs: u64,

    /// Upper bound of the random delay before each cycle, in seconds.
    pub jitter_max_secs: u64,

    /// Retry policy for network calls.
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_key: "leadpier_sources".to_string(),
            cookie_max_age_hours: DEFAULT_COOKIE_MAX_AGE_HOURS,
            cookie_id: "leadpier".to_string(),
            cookie_domain: "leadpier.com".to_string(),

            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            max_defensive_wait_secs: 300,

            dashboard: DashboardSettings::default(),
            request: RequestBody::default(),

            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            login_poll_attempts: 15,
            login_poll_interval_secs: 1,
            restart_pause_secs: 2,

            acquisition_interval_secs: 600,
            keep_alive_interval_secs: 120,
            jitter_max_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Directory holding cache entries.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    /// Directory holding cookie snapshots.
    pub fn cookie_dir(&self) -> PathBuf {
        self.data_dir().join("cookies")
    }

    /// Detection state file.
    pub fn detection_state_path(&self) -> PathBuf {
        self.data_dir().join("detection_state.json")
    }

    /// Detection thresholds.
    pub fn detection_config(&self) -> DetectionConfig {
        DetectionConfig::new(self.detection_threshold, self.cooldown_minutes)
    }

    /// Acquisition interval.
    pub fn acquisition_interval(&self) -> Duration {
        Duration::from_secs(self.acquisition_interval_secs)
    }

    /// Keep-alive interval.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Checks values that would stall or break the engine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.acquisition_interval_secs == 0 {
            return Err(StoreError::Config("acquisition_interval_secs must be > 0".into()));
        }
        if self.keep_alive_interval_secs == 0 {
            return Err(StoreError::Config("keep_alive_interval_secs must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(StoreError::Config("retry.max_attempts must be > 0".into()));
        }
        if self.login_poll_attempts == 0 {
            return Err(StoreError::Config("login_poll_attempts must be > 0".into()));
        }
        for (field, value) in [
            ("dashboard.base_url", &self.dashboard.base_url),
            ("dashboard.api_url", &self.dashboard.api_url),
            ("webdriver_url", &self.webdriver_url),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::Config(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Dashboard endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Dashboard origin.
    pub base_url: String,
    /// Login page path. Landing here means "not authenticated".
    pub login_path: String,
    /// Protected page used to probe authentication.
    pub statistics_path: String,
    /// Analytics endpoint.
    pub api_url: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            base_url: "https://dash.leadpier.com".to_string(),
            login_path: "/login".to_string(),
            statistics_path: "/marketer-statistics/sources".to_string(),
            api_url: "https://webapi.leadpier.com/v1/api/stats/user/sources".to_string(),
        }
    }
}

impl DashboardSettings {
    /// Full login page URL.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }

    /// Full protected page URL.
    pub fn statistics_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.statistics_path)
    }

    /// True if `url` is on the login boundary.
    pub fn is_login_url(&self, url: &str) -> bool {
        url.contains(&self.login_path)
    }
}

/// Analytics request body, serialized exactly as the endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestBody {
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
    /// `ASC` or `DESC`.
    pub order_direction: String,
    /// Time bucket.
    pub group_by: String,
    /// Sort column.
    pub order_by: String,
    /// Period start.
    pub period_from: String,
    /// Period end.
    pub period_to: String,
    /// Traffic source.
    pub source: String,
}

impl Default for RequestBody {
    fn default() -> Self {
        Self {
            limit: 200,
            offset: 0,
            order_direction: "DESC".to_string(),
            group_by: "HOUR".to_string(),
            order_by: "visitors".to_string(),
            period_from: "today".to_string(),
            period_to: "today".to_string(),
            source: "BM5_1".to_string(),
        }
    }
}

/// Retry policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// Timeout of the first attempt; attempt `n` gets `n` times this.
    pub initial_timeout_secs: u64,
    /// Backoff after failed attempt `n` is `n` times this.
    pub backoff_step_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_timeout_secs: 30,
            backoff_step_secs: 5,
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Settings store with persistence.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store with default settings bound to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Settings::default())),
            path,
        }
    }

    /// Loads settings from the default path.
    pub async fn load_default() -> Self {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path, falling back to defaults.
    pub async fn load(path: PathBuf) -> Self {
        let settings = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(path = %path.display(), "Loading settings");
            load_json(&path).await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            })
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };

        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
        }
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings in memory.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().await;
        f(&mut settings);
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await;
        save_json(&self.path, &*settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
