//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashguard_core::SourceRecord;
use dashguard_fetch::{AcquisitionOutcome, TierAttempt, TokenStatus};
use dashguard_store::{CacheStats, CookieInfo, CookieStatus, DetectionStats, FailurePattern};
use serde::{Serialize, Serializer};

// ============================================================================
// Output Types
// ============================================================================

/// Normalized records from one acquisition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsOutput {
    #[serde(serialize_with = "serialize_datetime")]
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    pub defensive: bool,
    pub count: usize,
    pub records: Vec<SourceRecord>,
}

impl RecordsOutput {
    /// Builds the output for a set of records.
    pub fn new(outcome: &AcquisitionOutcome, records: Vec<SourceRecord>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            tier: outcome.tier.map(|t| t.tag().to_string()),
            defensive: outcome.defensive,
            count: records.len(),
            records,
        }
    }
}

/// Per-tier report of one acquisition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    pub defensive: bool,
    pub duration_ms: u128,
    pub attempts: Vec<AttemptOutput>,
}

/// One tier attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutput {
    pub tier: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u128,
}

impl From<&TierAttempt> for AttemptOutput {
    fn from(attempt: &TierAttempt) -> Self {
        Self {
            tier: attempt.tier.tag().to_string(),
            success: attempt.success,
            kind: attempt.kind.map(|k| k.tag().to_string()),
            error: attempt.error.clone(),
            duration_ms: attempt.duration.as_millis(),
        }
    }
}

impl From<&AcquisitionOutcome> for OutcomeOutput {
    fn from(outcome: &AcquisitionOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            tier: outcome.tier.map(|t| t.tag().to_string()),
            defensive: outcome.defensive,
            duration_ms: outcome.duration.as_millis(),
            attempts: outcome.attempts.iter().map(AttemptOutput::from).collect(),
        }
    }
}

/// Combined state report for the status command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub detection: DetectionStats,
    pub pattern: FailurePattern,
    pub cache: CacheStats,
    pub cookies: CookieReport,
}

/// Saved cookie state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieReport {
    pub status: CookieStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<CookieInfo>,
}

/// Token check result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOutput {
    pub endpoint: String,
    #[serde(flatten)]
    pub status: TokenStatus,
}

// ============================================================================
// Serialization helpers
// ============================================================================

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_datetime<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&dt.to_rfc3339())
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
