//! Browser automation abstraction.
//!
//! The session manager drives a real browser through these traits so the
//! request fingerprint matches an interactive user. Tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use dashguard_store::StoredCookie;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::FetchError;

/// Script used as the liveness probe.
pub const LIVENESS_SCRIPT: &str = "return document.readyState";

// ============================================================================
// Launch Profile
// ============================================================================

/// How a new automation handle is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchProfile {
    /// Fingerprint-masked browser.
    Stealth,
    /// Plain browser, used when the stealth launch fails.
    Plain,
}

impl LaunchProfile {
    /// Profiles in launch preference order.
    pub fn preference() -> &'static [LaunchProfile] {
        &[Self::Stealth, Self::Plain]
    }
}

impl fmt::Display for LaunchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stealth => write!(f, "stealth"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// One live browser session.
#[async_trait]
pub trait AutomationHandle: Send + Sync {
    /// Profile this handle was launched with.
    fn profile(&self) -> LaunchProfile;

    /// Navigates to `url` and waits for the page load.
    async fn goto(&self, url: &str) -> Result<(), FetchError>;

    /// Returns the current page URL.
    async fn current_url(&self) -> Result<String, FetchError>;

    /// Runs a script in the page; a returned Promise is awaited.
    async fn execute(&self, script: &str) -> Result<Value, FetchError>;

    /// Adds one cookie to the current domain.
    async fn add_cookie(&self, cookie: &StoredCookie) -> Result<(), FetchError>;

    /// Returns all cookies visible to the current page.
    async fn cookies(&self) -> Result<Vec<StoredCookie>, FetchError>;

    /// Waits for the first element matching `selector`, clears it and types `text`.
    async fn fill(&self, selector: &str, text: &str, wait: Duration) -> Result<(), FetchError>;

    /// Waits for the first element matching `selector` and clicks it.
    async fn click(&self, selector: &str, wait: Duration) -> Result<(), FetchError>;

    /// Ends the browser session. Calling it twice is harmless.
    async fn quit(&mut self) -> Result<(), FetchError>;
}

/// Creates automation handles.
#[async_trait]
pub trait AutomationLauncher: Send + Sync {
    /// Launches a new handle with the given profile.
    async fn launch(&self, profile: LaunchProfile) -> Result<Box<dyn AutomationHandle>, FetchError>;
}
