//! Authenticated dashboard session.
//!
//! [`SessionManager`] owns the process's single automation handle. It
//! restores sessions from saved cookies, drives the login form, and runs the
//! analytics request from inside the page so it carries the page's own token
//! and fingerprint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use dashguard_store::{CookieStore, DashboardSettings, RequestBody, Settings};

use crate::error::FetchError;
use crate::host::automation::{AutomationHandle, AutomationLauncher, LaunchProfile, LIVENESS_SCRIPT};
use crate::retry::{attempt, RetryPolicy};

/// Email input on the login form.
pub const EMAIL_SELECTOR: &str = "input[type='email'], input[placeholder*='email' i]";
/// Password input on the login form.
pub const PASSWORD_SELECTOR: &str = "input[type='password']";
/// Submit control on the login form.
pub const SUBMIT_SELECTOR: &str = "button[type='submit']";

/// Upper bound for one liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the client token from local storage.
const TOKEN_SCRIPT: &str = r"
const raw = localStorage.getItem('authentication');
if (!raw) { return null; }
try { return JSON.parse(raw).token || null; } catch (e) { return null; }
";

// ============================================================================
// Credentials
// ============================================================================

/// Dashboard login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Session Config
// ============================================================================

/// Parameters of a [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dashboard endpoints.
    pub dashboard: DashboardSettings,
    /// Analytics request body.
    pub request: RequestBody,
    /// Cookie snapshot identifier.
    pub cookie_id: String,
    /// Domain filter applied when restoring cookies.
    pub cookie_domain: String,
    /// Number of post-submit checks for leaving the login page.
    pub login_poll_attempts: u32,
    /// Pause between post-submit checks.
    pub login_poll_interval: Duration,
    /// How long to wait for a form element to appear.
    pub element_wait: Duration,
    /// Retry policy for the in-page analytics request.
    pub retry: RetryPolicy,
}

impl SessionConfig {
    /// Builds a config from persisted settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dashboard: settings.dashboard.clone(),
            request: settings.request.clone(),
            cookie_id: settings.cookie_id.clone(),
            cookie_domain: settings.cookie_domain.clone(),
            login_poll_attempts: settings.login_poll_attempts,
            login_poll_interval: Duration::from_secs(settings.login_poll_interval_secs),
            element_wait: Duration::from_secs(30),
            retry: RetryPolicy::from_settings(&settings.retry),
        }
    }

    /// Script that POSTs the analytics request from the page context.
    ///
    /// Resolves to `{status, body}`, `{status: 0, error}` when the page holds
    /// no token, or `{status: -1, error}` when the request itself fails.
    pub fn fetch_script(&self) -> Result<String, FetchError> {
        let url = serde_json::to_string(&self.dashboard.api_url)?;
        let body = serde_json::to_string(&self.request)?;

        Ok(format!(
            r"
const raw = localStorage.getItem('authentication');
let token = null;
try {{ token = raw ? JSON.parse(raw).token : null; }} catch (e) {{ token = null; }}
if (!token) {{ return {{ status: 0, error: 'no_token' }}; }}
return fetch({url}, {{
  method: 'POST',
  headers: {{
    'authorization': 'bearer ' + token,
    'content-type': 'application/json',
    'accept': 'application/json'
  }},
  body: JSON.stringify({body})
}})
  .then(r => r.text().then(text => ({{ status: r.status, body: text }})))
  .catch(e => ({{ status: -1, error: String(e) }}));
"
        ))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

// ============================================================================
// Session Trait
// ============================================================================

/// Operations the fallback orchestrator needs from a dashboard session.
#[async_trait]
pub trait DashboardSession: Send + Sync {
    /// True when an authenticated page answers the liveness probe.
    /// Never counted by the detection monitor.
    async fn is_active(&self) -> bool;

    /// Returns a live handle, launching one if needed.
    async fn acquire(&self) -> Result<LaunchProfile, FetchError>;

    /// Applies saved cookies and checks the protected page.
    ///
    /// `Ok(false)` means the cookies did not carry an authenticated session.
    async fn restore_from_cookies(&self) -> Result<bool, FetchError>;

    /// Submits the login form and waits to leave the login page.
    ///
    /// `Ok(false)` means the page never left the login boundary.
    async fn login(&self, credentials: &Credentials) -> Result<bool, FetchError>;

    /// Runs the analytics request in the page; `None` when it returned no data.
    async fn fetch_payload(&self) -> Result<Option<Value>, FetchError>;

    /// Probes the handle and refreshes the activity timestamp.
    async fn keep_alive(&self) -> bool;

    /// Releases the handle. Safe to call repeatedly.
    async fn close(&self);

    /// Reads the client token held by the page.
    async fn bearer_token(&self) -> Result<Option<String>, FetchError>;
}

// ============================================================================
// Session Manager
// ============================================================================

#[derive(Default)]
struct SessionState {
    handle: Option<Box<dyn AutomationHandle>>,
    authenticated: bool,
    last_activity: Option<DateTime<Utc>>,
}

/// Result of the in-page request script.
#[derive(Debug, Deserialize)]
struct ScriptResponse {
    status: i64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Owns the one automation handle of the process.
pub struct SessionManager {
    launcher: Arc<dyn AutomationLauncher>,
    cookies: Arc<CookieStore>,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Creates a manager; no handle is launched until first use.
    pub fn new(launcher: Arc<dyn AutomationLauncher>, cookies: Arc<CookieStore>, config: SessionConfig) -> Self {
        Self {
            launcher,
            cookies,
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True once cookies or a login produced an authenticated page.
    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.authenticated
    }

    /// Time of the last successful interaction.
    pub async fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_activity
    }

    async fn launch(&self) -> Result<Box<dyn AutomationHandle>, FetchError> {
        let mut last_error = None;
        for &profile in LaunchProfile::preference() {
            match self.launcher.launch(profile).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(profile = %profile, error = %e, "Launch failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| FetchError::Launch("no launch profile available".to_string())))
    }

    /// Returns the live handle, replacing a dead one.
    async fn ensure_handle<'a>(&self, state: &'a mut SessionState) -> Result<&'a dyn AutomationHandle, FetchError> {
        let alive = match state.handle.as_deref() {
            Some(handle) => probe(handle).await,
            None => false,
        };

        if !alive {
            if let Some(mut stale) = state.handle.take() {
                debug!("Discarding unresponsive handle");
                if let Err(e) = stale.quit().await {
                    debug!(error = %e, "Stale handle did not quit cleanly");
                }
            }
            state.authenticated = false;
            state.handle = Some(self.launch().await?);
            state.last_activity = Some(Utc::now());
        }

        state
            .handle
            .as_deref()
            .ok_or_else(|| FetchError::SessionDead("no automation handle".to_string()))
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn probe(handle: &dyn AutomationHandle) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, handle.execute(LIVENESS_SCRIPT)).await,
        Ok(Ok(_))
    )
}

/// Interprets the in-page request result.
fn parse_response(raw: Value) -> Result<Option<Value>, FetchError> {
    let response: ScriptResponse = serde_json::from_value(raw)
        .map_err(|e| FetchError::MalformedResponse(format!("unexpected script result: {e}")))?;

    match response.status {
        0 => {
            return Err(FetchError::AuthInvalid(
                response.error.unwrap_or_else(|| "no client token".to_string()),
            ));
        }
        -1 => {
            return Err(FetchError::ConnectionRefused(
                response.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        _ => {}
    }

    let status = u16::try_from(response.status).map_err(|_| FetchError::MalformedResponse(format!(
        "invalid status {}",
        response.status
    )))?;
    if let Some(error) = FetchError::from_status(status, format!("status {status}")) {
        return Err(error);
    }

    let body = response.body.unwrap_or_default();
    let payload: Value = serde_json::from_str(&body)?;
    match payload.get("data") {
        None => Err(FetchError::MalformedResponse("response has no data field".to_string())),
        Some(data) if is_empty(data) => Ok(None),
        Some(_) => Ok(Some(payload)),
    }
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl DashboardSession for SessionManager {
    async fn is_active(&self) -> bool {
        let state = self.state.lock().await;
        if !state.authenticated {
            return false;
        }
        match state.handle.as_deref() {
            Some(handle) => probe(handle).await,
            None => false,
        }
    }

    #[instrument(skip(self))]
    async fn acquire(&self) -> Result<LaunchProfile, FetchError> {
        let mut state = self.state.lock().await;
        let handle = self.ensure_handle(&mut state).await?;
        Ok(handle.profile())
    }

    #[instrument(skip(self), fields(id = %self.config.cookie_id))]
    async fn restore_from_cookies(&self) -> Result<bool, FetchError> {
        let Some(cookies) = self
            .cookies
            .load(&self.config.cookie_id, Some(&self.config.cookie_domain))
            .await
        else {
            debug!("No usable cookies");
            return Ok(false);
        };

        let mut state = self.state.lock().await;
        let handle = self.ensure_handle(&mut state).await?;

        handle.goto(&self.config.dashboard.base_url).await?;
        let mut applied = 0usize;
        for cookie in &cookies {
            match handle.add_cookie(cookie).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(cookie = %cookie.name, error = %e, "Failed to apply cookie"),
            }
        }

        handle.goto(&self.config.dashboard.statistics_url()).await?;
        let url = handle.current_url().await?;
        if self.config.dashboard.is_login_url(&url) {
            info!(applied, "Cookies did not restore the session");
            return Ok(false);
        }

        state.authenticated = true;
        state.last_activity = Some(Utc::now());
        info!(applied, "Session restored from cookies");
        Ok(true)
    }

    #[instrument(skip(self, credentials))]
    async fn login(&self, credentials: &Credentials) -> Result<bool, FetchError> {
        let mut state = self.state.lock().await;
        let handle = self.ensure_handle(&mut state).await?;
        let wait = self.config.element_wait;

        handle.goto(&self.config.dashboard.login_url()).await?;
        handle.fill(EMAIL_SELECTOR, &credentials.email, wait).await?;
        handle.fill(PASSWORD_SELECTOR, &credentials.password, wait).await?;
        handle.click(SUBMIT_SELECTOR, wait).await?;

        let mut left_login = false;
        for check in 0..self.config.login_poll_attempts {
            let url = handle.current_url().await?;
            if !self.config.dashboard.is_login_url(&url) {
                debug!(check, "Left the login page");
                left_login = true;
                break;
            }
            tokio::time::sleep(self.config.login_poll_interval).await;
        }

        if !left_login {
            warn!(attempts = self.config.login_poll_attempts, "Login did not complete");
            state.authenticated = false;
            return Ok(false);
        }

        match handle.cookies().await {
            Ok(cookies) => {
                if let Err(e) = self.cookies.save(&self.config.cookie_id, &cookies).await {
                    warn!(error = %e, "Failed to save cookies");
                }
            }
            Err(e) => warn!(error = %e, "Failed to read cookies"),
        }

        state.authenticated = true;
        state.last_activity = Some(Utc::now());
        info!("Login succeeded");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn fetch_payload(&self) -> Result<Option<Value>, FetchError> {
        let script = self.config.fetch_script()?;
        let mut state = self.state.lock().await;
        let handle = self.ensure_handle(&mut state).await?;

        let url = handle.current_url().await?;
        if !url.contains(&self.config.dashboard.statistics_path) {
            handle.goto(&self.config.dashboard.statistics_url()).await?;
        }

        let script = script.as_str();
        let payload = attempt(&self.config.retry, move |_, _| async move {
            let raw = handle.execute(script).await?;
            parse_response(raw)
        })
        .await?;

        if payload.is_some() {
            state.last_activity = Some(Utc::now());
            debug!("Payload fetched");
        } else {
            debug!("Endpoint returned no data");
        }
        Ok(payload)
    }

    async fn keep_alive(&self) -> bool {
        let mut state = self.state.lock().await;
        let alive = match state.handle.as_deref() {
            Some(handle) => probe(handle).await,
            None => return false,
        };

        if alive {
            state.last_activity = Some(Utc::now());
        } else {
            warn!("Keep-alive probe failed");
        }
        alive
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut handle) = state.handle.take() {
            if let Err(e) = handle.quit().await {
                warn!(error = %e, "Error while closing the browser");
            }
        }
        state.authenticated = false;
    }

    async fn bearer_token(&self) -> Result<Option<String>, FetchError> {
        let state = self.state.lock().await;
        let handle = state
            .handle
            .as_deref()
            .ok_or_else(|| FetchError::SessionDead("no automation handle".to_string()))?;

        match handle.execute(TOKEN_SCRIPT).await? {
            Value::String(token) if !token.is_empty() => Ok(Some(token)),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
