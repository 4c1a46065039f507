//! Acquisition tiers and the failure taxonomy.
//!
//! - [`AcquisitionTier`] - Which fallback tier produced a payload
//! - [`FailureKind`] - Classified failure recorded by the detection monitor

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Acquisition Tier
// ============================================================================

/// One ordered strategy attempt within the fallback search.
///
/// Ordered from cheapest/least conspicuous to most conspicuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionTier {
    /// Payload served from the on-disk cache.
    Cache,
    /// Fetched through an already-authenticated session.
    ActiveSession,
    /// Fetched after restoring a session from saved cookies.
    Cookies,
    /// Fetched after submitting credentials.
    FullLogin,
    /// Fetched after tearing down the handle and logging in again.
    CleanRestart,
}

impl AcquisitionTier {
    /// Returns the tag recorded in the success history.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::ActiveSession => "active_session",
            Self::Cookies => "cookies",
            Self::FullLogin => "full_login",
            Self::CleanRestart => "clean_restart",
        }
    }

    /// Returns true if this tier touches the network.
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Cache)
    }

    /// All tiers in search order.
    pub fn all() -> &'static [AcquisitionTier] {
        &[
            Self::Cache,
            Self::ActiveSession,
            Self::Cookies,
            Self::FullLogin,
            Self::CleanRestart,
        ]
    }
}

impl fmt::Display for AcquisitionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Failure Kind
// ============================================================================

/// Classified failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request or navigation timed out.
    NetworkTimeout,
    /// Connection refused or reset.
    ConnectionRefused,
    /// Credential rejected (401).
    AuthInvalid,
    /// Access forbidden (403), usually an IP-level block.
    Forbidden,
    /// Rate limited (429).
    RateLimited,
    /// Unexpected response shape or missing field.
    MalformedResponse,
    /// The automation handle stopped responding.
    SessionDead,
    /// Login did not navigate away from the login page.
    LoginFailed,
    /// Saved cookies are too old.
    CookieExpired,
    /// Saved cookies could not be read.
    CookieCorrupt,
    /// Every tier of a cycle produced nothing.
    AllLevelsFailed,
    /// Anything else.
    #[serde(other)]
    Unknown,
}

impl FailureKind {
    /// Returns the snake-case tag used in persisted state.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network_timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::AuthInvalid => "auth_invalid",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::MalformedResponse => "malformed_response",
            Self::SessionDead => "session_dead",
            Self::LoginFailed => "login_failed",
            Self::CookieExpired => "cookie_expired",
            Self::CookieCorrupt => "cookie_corrupt",
            Self::AllLevelsFailed => "all_levels_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Maps an HTTP status code to a failure kind, if it denotes one.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::AuthInvalid),
            403 => Some(Self::Forbidden),
            429 => Some(Self::RateLimited),
            408 | 504 => Some(Self::NetworkTimeout),
            200..=399 => None,
            _ => Some(Self::Unknown),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Tests
// ============================================================================
