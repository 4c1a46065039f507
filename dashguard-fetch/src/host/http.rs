//! Direct HTTP client for the analytics endpoint.
//!
//! Used outside the browser session: validating a bearer token and fetching
//! with a known token. Requests carry the dashboard's origin and referer so
//! they look like the page's own XHR.

use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use dashguard_store::RequestBody;

use crate::error::FetchError;
use crate::retry::{attempt, RetryPolicy};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Browser-like user agent for direct requests.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ============================================================================
// Token Status
// ============================================================================

/// Outcome of a token check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "code")]
pub enum TokenStatus {
    /// The endpoint accepted the token.
    Valid,
    /// The endpoint rejected the token with this status.
    Rejected(u16),
}

impl TokenStatus {
    /// True for [`TokenStatus::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

// ============================================================================
// Analytics Client
// ============================================================================

/// HTTP client for the analytics endpoint.
#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    inner: Client,
    api_url: Url,
    origin: String,
}

impl AnalyticsClient {
    /// Creates a client for `api_url`, presenting `origin` as the caller.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the TLS backend cannot start.
    pub fn new(api_url: &str, origin: &str) -> Result<Self, FetchError> {
        Self::with_timeout(api_url, origin, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the TLS backend cannot start.
    pub fn with_timeout(api_url: &str, origin: &str, timeout: Duration) -> Result<Self, FetchError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| FetchError::MalformedResponse(format!("invalid API URL {api_url}: {e}")))?;
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            inner,
            api_url,
            origin: origin.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the endpoint URL.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    async fn post(&self, token: &str, body: &RequestBody) -> Result<reqwest::Response, FetchError> {
        let response = self
            .inner
            .post(self.api_url.clone())
            .header(header::AUTHORIZATION, format!("bearer {token}"))
            .header(header::ACCEPT, "application/json")
            .header(header::ORIGIN, &self.origin)
            .header(header::REFERER, format!("{}/", self.origin))
            .json(body)
            .send()
            .await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Fetches statistics with an explicit token, once.
    ///
    /// # Errors
    ///
    /// Returns a classified error for non-success statuses and bodies
    /// without a `data` field.
    #[instrument(skip(self, token, body), fields(url = %self.api_url))]
    pub async fn fetch_statistics(&self, token: &str, body: &RequestBody) -> Result<Value, FetchError> {
        let response = self.post(token, body).await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(FetchError::RateLimited { retry_after });
        }
        if let Some(error) = FetchError::from_status(status.as_u16(), status.to_string()) {
            return Err(error);
        }

        let payload: Value = response.json().await?;
        if payload.get("data").is_none() {
            return Err(FetchError::MalformedResponse("response has no data field".to_string()));
        }
        Ok(payload)
    }

    /// Fetches statistics with bounded retry.
    ///
    /// # Errors
    ///
    /// Returns the last error once the policy gives up.
    pub async fn fetch_statistics_with_retry(
        &self,
        token: &str,
        body: &RequestBody,
        policy: &RetryPolicy,
    ) -> Result<Value, FetchError> {
        attempt(policy, move |_, _| self.fetch_statistics(token, body)).await
    }

    /// Checks whether `token` is accepted, using a one-row request.
    ///
    /// 401 and 403 are verdicts, not errors; transient failures are retried.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint cannot be reached within the policy.
    #[instrument(skip(self, token, body, policy), fields(url = %self.api_url))]
    pub async fn validate_token(
        &self,
        token: &str,
        body: &RequestBody,
        policy: &RetryPolicy,
    ) -> Result<TokenStatus, FetchError> {
        let probe = RequestBody {
            limit: 1,
            ..body.clone()
        };
        let probe = &probe;

        attempt(policy, move |_, _| async move {
            let response = self.post(token, probe).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(TokenStatus::Valid);
            }
            match FetchError::from_status(status.as_u16(), status.to_string()) {
                Some(error) if error.is_transient() => Err(error),
                _ => {
                    warn!(status = status.as_u16(), "Token rejected");
                    Ok(TokenStatus::Rejected(status.as_u16()))
                }
            }
        })
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(AnalyticsClient::new("not a url", "https://dash.leadpier.com").is_err());
    }

    #[test]
    fn test_origin_is_normalized() {
        let client = AnalyticsClient::new(
            "https://webapi.leadpier.com/v1/api/stats/user/sources",
            "https://dash.leadpier.com/",
        )
        .unwrap();
        assert_eq!(client.origin, "https://dash.leadpier.com");
        assert_eq!(client.api_url().host_str(), Some("webapi.leadpier.com"));
    }

    #[test]
    fn test_token_status_serialization() {
        assert_eq!(
            serde_json::to_value(TokenStatus::Valid).unwrap(),
            serde_json::json!({"status": "valid"})
        );
        assert_eq!(
            serde_json::to_value(TokenStatus::Rejected(401)).unwrap(),
            serde_json::json!({"status": "rejected", "code": 401})
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let client = AnalyticsClient::with_timeout(
            "http://127.0.0.1:9/v1/api/stats/user/sources",
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client
            .fetch_statistics("token", &RequestBody::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
