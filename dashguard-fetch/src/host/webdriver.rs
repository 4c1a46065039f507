//! W3C WebDriver implementation of the automation traits.
//!
//! Talks to a running chromedriver (or any W3C endpoint) through
//! `thirtyfour`. The stealth profile adds launch arguments and re-applies a
//! masking script after every navigation.

use async_trait::async_trait;
use dashguard_store::StoredCookie;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thirtyfour::common::capabilities::desiredcapabilities::Capabilities;
use thirtyfour::prelude::*;
use thirtyfour::Cookie;
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;
use crate::host::automation::{AutomationHandle, AutomationLauncher, LaunchProfile};
use crate::retry::{attempt, RetryPolicy, Schedule};

/// Desktop user agent presented by the stealth profile.
const STEALTH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BASE_ARGS: &[&str] = &["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];

const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-extensions",
    "--disable-software-rasterizer",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--window-size=1920,1080",
];

/// Hides the most common automation markers from page scripts.
const MASK_SCRIPT: &str = r"
try { Object.defineProperty(navigator, 'webdriver', { get: () => undefined }); } catch (e) {}
try { Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] }); } catch (e) {}
try { Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] }); } catch (e) {}
window.chrome = window.chrome || { runtime: {} };
for (const key of Object.keys(window)) {
  if (key.startsWith('cdc_') || key.startsWith('$cdc_')) { try { delete window[key]; } catch (e) {} }
}
";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn driver_error(e: WebDriverError) -> FetchError {
    FetchError::Driver(e.to_string())
}

// ============================================================================
// Launcher
// ============================================================================

/// Launches Chrome sessions on a WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    server_url: String,
    headless: bool,
    connect: RetryPolicy,
}

impl WebDriverLauncher {
    /// Creates a launcher for the server at `server_url`.
    pub fn new(server_url: impl Into<String>, headless: bool) -> Self {
        Self {
            server_url: server_url.into(),
            headless,
            connect: RetryPolicy::new(3)
                .with_timeout(Schedule::Arithmetic(Duration::from_secs(30)))
                .with_backoff(Schedule::Fixed(Duration::from_millis(500))),
        }
    }

    /// Sets the retry policy for the initial server connection.
    #[must_use]
    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect = policy;
        self
    }

    /// Retry policy for the initial server connection.
    pub fn connect_policy(&self) -> &RetryPolicy {
        &self.connect
    }

    /// Launch arguments for a profile.
    pub fn args(&self, profile: LaunchProfile) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(ToString::to_string).collect();

        if profile == LaunchProfile::Stealth {
            args.extend(STEALTH_ARGS.iter().map(ToString::to_string));
            args.push(format!("--user-agent={STEALTH_USER_AGENT}"));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args
    }

    fn capabilities(&self, profile: LaunchProfile) -> Result<Capabilities, FetchError> {
        let mut caps = DesiredCapabilities::chrome();
        for arg in self.args(profile) {
            caps.add_arg(&arg)
                .map_err(|e| FetchError::Launch(format!("invalid argument {arg}: {e}")))?;
        }
        Ok(caps.into())
    }
}

#[async_trait]
impl AutomationLauncher for WebDriverLauncher {
    #[instrument(skip(self), fields(server = %self.server_url))]
    async fn launch(&self, profile: LaunchProfile) -> Result<Box<dyn AutomationHandle>, FetchError> {
        let caps = self.capabilities(profile)?;
        let server_url = self.server_url.as_str();

        let driver = attempt(&self.connect, |_, _| {
            let caps = caps.clone();
            async move { WebDriver::new(server_url, caps).await.map_err(driver_error) }
        })
        .await?;

        info!(profile = %profile, "Browser session started");
        Ok(Box::new(WebDriverHandle {
            driver: Some(driver),
            profile,
        }))
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A live WebDriver session.
pub struct WebDriverHandle {
    driver: Option<WebDriver>,
    profile: LaunchProfile,
}

impl WebDriverHandle {
    fn driver(&self) -> Result<&WebDriver, FetchError> {
        self.driver
            .as_ref()
            .ok_or_else(|| FetchError::SessionDead("browser session already closed".to_string()))
    }

    async fn apply_mask(&self, driver: &WebDriver) {
        if let Err(e) = driver.execute(MASK_SCRIPT, vec![]).await {
            warn!(error = %e, "Failed to apply masking script");
        }
    }
}

impl fmt::Debug for WebDriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverHandle")
            .field("profile", &self.profile)
            .field("open", &self.driver.is_some())
            .finish()
    }
}

#[async_trait]
impl AutomationHandle for WebDriverHandle {
    fn profile(&self) -> LaunchProfile {
        self.profile
    }

    #[instrument(skip(self))]
    async fn goto(&self, url: &str) -> Result<(), FetchError> {
        let driver = self.driver()?;
        driver.goto(url).await.map_err(driver_error)?;
        if self.profile == LaunchProfile::Stealth {
            self.apply_mask(driver).await;
        }
        debug!("Navigated");
        Ok(())
    }

    async fn current_url(&self) -> Result<String, FetchError> {
        let url = self.driver()?.current_url().await.map_err(driver_error)?;
        Ok(url.to_string())
    }

    async fn execute(&self, script: &str) -> Result<Value, FetchError> {
        let ret = self
            .driver()?
            .execute(script, vec![])
            .await
            .map_err(driver_error)?;
        Ok(ret.json().clone())
    }

    async fn add_cookie(&self, cookie: &StoredCookie) -> Result<(), FetchError> {
        let cookie: Cookie = serde_json::from_value(serde_json::to_value(cookie)?)?;
        self.driver()?.add_cookie(cookie).await.map_err(driver_error)
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, FetchError> {
        let cookies = self.driver()?.get_all_cookies().await.map_err(driver_error)?;
        let mut stored = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            stored.push(serde_json::from_value(serde_json::to_value(&cookie)?)?);
        }
        Ok(stored)
    }

    #[instrument(skip(self, text))]
    async fn fill(&self, selector: &str, text: &str, wait: Duration) -> Result<(), FetchError> {
        let element = self
            .driver()?
            .query(By::Css(selector))
            .wait(wait, POLL_INTERVAL)
            .first()
            .await
            .map_err(driver_error)?;
        element.clear().await.map_err(driver_error)?;
        element.send_keys(text).await.map_err(driver_error)
    }

    #[instrument(skip(self))]
    async fn click(&self, selector: &str, wait: Duration) -> Result<(), FetchError> {
        let element = self
            .driver()?
            .query(By::Css(selector))
            .wait(wait, POLL_INTERVAL)
            .first()
            .await
            .map_err(driver_error)?;
        element.click().await.map_err(driver_error)
    }

    async fn quit(&mut self) -> Result<(), FetchError> {
        match self.driver.take() {
            Some(driver) => {
                driver.quit().await.map_err(driver_error)?;
                info!(profile = %self.profile, "Browser session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stealth_args() {
        let launcher = WebDriverLauncher::new("http://localhost:9515", true);
        let args = launcher.args(LaunchProfile::Stealth);

        assert!(args.iter().any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=")));
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_connect_policy_override() {
        let launcher = WebDriverLauncher::new("http://localhost:9515", true);
        assert_eq!(launcher.connect_policy().max_attempts, 3);

        let launcher = launcher.with_connect_policy(RetryPolicy::no_retry(Duration::from_secs(5)));
        assert_eq!(launcher.connect_policy().max_attempts, 1);
        assert_eq!(launcher.connect_policy().timeout_for_attempt(0), Duration::from_secs(5));
    }

    #[test]
    fn test_plain_args() {
        let launcher = WebDriverLauncher::new("http://localhost:9515", false);
        let args = launcher.args(LaunchProfile::Plain);

        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(!args.iter().any(|a| a.contains("AutomationControlled")));
        assert!(!args.iter().any(|a| a.contains("headless")));
    }

    #[test]
    fn test_cookie_survives_wire_conversion() {
        let mut stored = StoredCookie::new("sid", "abc").with_domain(".leadpier.com");
        stored.path = Some("/".to_string());

        let wire: Cookie = serde_json::from_value(serde_json::to_value(&stored).unwrap()).unwrap();
        let back: StoredCookie = serde_json::from_value(serde_json::to_value(&wire).unwrap()).unwrap();
        assert_eq!(back, stored);
    }
}
