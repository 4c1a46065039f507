//! Fetch error types.

use dashguard_core::FailureKind;
use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for acquisition operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Operation timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Connection refused or reset.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Credential rejected (401) or no client token present.
    #[error("Authentication invalid: {0}")]
    AuthInvalid(String),

    /// Access forbidden (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rate limited by the upstream.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after: Option<u64>,
    },

    /// Any other non-success status.
    #[error("Unexpected status {0}")]
    UnexpectedStatus(u16),

    /// Response did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The automation handle is gone or unresponsive.
    #[error("Session dead: {0}")]
    SessionDead(String),

    /// Login did not leave the login page.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// No credentials were configured.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Saved cookies are unreadable.
    #[error("Saved cookies corrupt: {0}")]
    CookieCorrupt(String),

    /// The automation handle could not be launched.
    #[error("Launch failed: {0}")]
    Launch(String),

    /// WebDriver command failed.
    #[error("WebDriver error: {0}")]
    Driver(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] dashguard_core::CoreError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] dashguard_store::StoreError),
}

impl FetchError {
    /// Maps an HTTP status to an error, or `None` for success codes.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Option<Self> {
        let detail = detail.into();
        match FailureKind::from_status(status)? {
            FailureKind::AuthInvalid => Some(Self::AuthInvalid(detail)),
            FailureKind::Forbidden => Some(Self::Forbidden(detail)),
            FailureKind::RateLimited => Some(Self::RateLimited { retry_after: None }),
            FailureKind::NetworkTimeout => Some(Self::Timeout(0)),
            _ => Some(Self::UnexpectedStatus(status)),
        }
    }

    /// Classifies this error for the detection monitor.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Http(e) => {
                if e.is_timeout() {
                    FailureKind::NetworkTimeout
                } else if e.is_connect() {
                    FailureKind::ConnectionRefused
                } else if let Some(status) = e.status() {
                    FailureKind::from_status(status.as_u16()).unwrap_or(FailureKind::Unknown)
                } else if e.is_decode() {
                    FailureKind::MalformedResponse
                } else {
                    FailureKind::Unknown
                }
            }
            Self::Timeout(_) => FailureKind::NetworkTimeout,
            Self::ConnectionRefused(_) => FailureKind::ConnectionRefused,
            Self::AuthInvalid(_) => FailureKind::AuthInvalid,
            Self::Forbidden(_) => FailureKind::Forbidden,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::MalformedResponse(_) | Self::Json(_) | Self::Core(_) => FailureKind::MalformedResponse,
            Self::SessionDead(_) | Self::Launch(_) => FailureKind::SessionDead,
            Self::LoginFailed(_) | Self::MissingCredentials(_) => FailureKind::LoginFailed,
            Self::CookieCorrupt(_) => FailureKind::CookieCorrupt,
            Self::Driver(message) => classify_driver_message(message),
            Self::UnexpectedStatus(_) | Self::Store(_) => FailureKind::Unknown,
        }
    }

    /// Returns true if this error might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) | Self::ConnectionRefused(_) | Self::RateLimited { .. } => true,
            Self::UnexpectedStatus(status) => *status >= 500,
            Self::Driver(message) => matches!(
                classify_driver_message(message),
                FailureKind::NetworkTimeout | FailureKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}

/// Classifies a WebDriver error message.
fn classify_driver_message(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        FailureKind::NetworkTimeout
    } else if lower.contains("connection refused") || lower.contains("error sending request") {
        FailureKind::ConnectionRefused
    } else if lower.contains("invalid session")
        || lower.contains("no such window")
        || lower.contains("session deleted")
        || lower.contains("disconnected")
    {
        FailureKind::SessionDead
    } else {
        FailureKind::Unknown
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(FetchError::from_status(200, "").is_none());
        assert_eq!(
            FetchError::from_status(401, "x").unwrap().kind(),
            FailureKind::AuthInvalid
        );
        assert_eq!(
            FetchError::from_status(403, "x").unwrap().kind(),
            FailureKind::Forbidden
        );
        assert_eq!(
            FetchError::from_status(429, "x").unwrap().kind(),
            FailureKind::RateLimited
        );
        assert!(matches!(
            FetchError::from_status(502, "x"),
            Some(FetchError::UnexpectedStatus(502))
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(FetchError::Timeout(30).is_transient());
        assert!(FetchError::RateLimited { retry_after: None }.is_transient());
        assert!(FetchError::UnexpectedStatus(503).is_transient());
        assert!(!FetchError::UnexpectedStatus(404).is_transient());
        assert!(!FetchError::AuthInvalid("401".into()).is_transient());
        assert!(!FetchError::Forbidden("403".into()).is_transient());
    }

    #[test]
    fn test_driver_message_classification() {
        assert_eq!(
            FetchError::Driver("invalid session id".into()).kind(),
            FailureKind::SessionDead
        );
        assert_eq!(
            FetchError::Driver("script timeout".into()).kind(),
            FailureKind::NetworkTimeout
        );
        assert!(FetchError::Driver("Connection refused (os error 111)".into()).is_transient());
        assert_eq!(
            FetchError::Driver("element not interactable".into()).kind(),
            FailureKind::Unknown
        );
    }
}
