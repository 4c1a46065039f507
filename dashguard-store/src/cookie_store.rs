//! Age-bounded cookie jar.
//!
//! Session cookies are saved after a successful login and replayed into a
//! fresh automation handle on restoration. Their lifetime is independent of
//! the payload cache TTL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{load_json, remove_file_if_exists, safe_file_stem, save_json};

/// Default maximum snapshot age.
pub const DEFAULT_COOKIE_MAX_AGE_HOURS: u64 = 12;

const FILE_PREFIX: &str = "cookies_";

// ============================================================================
// Cookie Records
// ============================================================================

/// A cookie as reported by the automation handle.
///
/// Field names follow the WebDriver cookie object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path the cookie is valid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether the cookie requires HTTPS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// Whether the cookie is HTTP-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Expiry as Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// `SameSite` policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl StoredCookie {
    /// Creates a cookie with only a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: None,
            http_only: None,
            expiry: None,
            same_site: None,
        }
    }

    /// Sets the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// True if the cookie's domain contains `filter`.
    ///
    /// Cookies without a domain never match.
    pub fn domain_contains(&self, filter: &str) -> bool {
        self.domain.as_deref().is_some_and(|d| d.contains(filter))
    }
}

/// A persisted cookie snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSnapshot {
    /// Cookies in the order the handle reported them.
    pub cookies: Vec<StoredCookie>,
    /// When the snapshot was saved.
    pub timestamp: DateTime<Utc>,
    /// Number of cookies.
    pub count: usize,
}

/// The part of a snapshot needed for validity checks.
#[derive(Debug, Clone, Deserialize)]
struct SnapshotHeader {
    timestamp: DateTime<Utc>,
    count: usize,
}

/// Validity of a stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieStatus {
    /// No snapshot on disk.
    Missing,
    /// Older than the maximum age.
    Expired,
    /// Saved with no cookies.
    Empty,
    /// Unreadable.
    Corrupt,
    /// Usable for restoration.
    Valid,
}

/// Summary of a stored snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CookieInfo {
    /// Number of cookies.
    pub count: usize,
    /// When the snapshot was saved.
    pub saved_at: DateTime<Utc>,
    /// Age in hours.
    pub age_hours: f64,
    /// Whether the snapshot is usable.
    pub is_valid: bool,
    /// Hours until expiry (negative once expired).
    pub expires_in_hours: f64,
}

#[allow(clippy::cast_precision_loss)]
fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}

// ============================================================================
// Cookie Store
// ============================================================================

/// File-backed cookie jar with a maximum snapshot age.
#[derive(Debug, Clone)]
pub struct CookieStore {
    dir: PathBuf,
    max_age: Duration,
}

impl CookieStore {
    /// Creates a cookie store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, max_age_hours: u64) -> Self {
        let max_age = i64::try_from(max_age_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX);
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the maximum snapshot age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn path(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}.json", safe_file_stem(identifier)))
    }

    fn is_fresh(&self, saved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(saved_at) < self.max_age
    }

    // ========================================================================
    // Save / Load
    // ========================================================================

    /// Saves a snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written.
    pub async fn save(&self, identifier: &str, cookies: &[StoredCookie]) -> Result<(), StoreError> {
        self.save_at(identifier, cookies, Utc::now()).await
    }

    /// Saves a snapshot stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be written.
    pub async fn save_at(
        &self,
        identifier: &str,
        cookies: &[StoredCookie],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let snapshot = CookieSnapshot {
            cookies: cookies.to_vec(),
            timestamp: now,
            count: cookies.len(),
        };
        save_json(&self.path(identifier), &snapshot).await?;
        info!(identifier, count = snapshot.count, "Cookies saved");
        Ok(())
    }

    /// Loads cookies if the snapshot is fresh and non-empty.
    ///
    /// With a domain filter, keeps only cookies whose domain contains it;
    /// a filter that leaves nothing yields `None`.
    pub async fn load(&self, identifier: &str, domain_filter: Option<&str>) -> Option<Vec<StoredCookie>> {
        self.load_at(identifier, domain_filter, Utc::now()).await
    }

    /// Like [`load`](Self::load), evaluated at `now`.
    pub async fn load_at(
        &self,
        identifier: &str,
        domain_filter: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Vec<StoredCookie>> {
        let snapshot: CookieSnapshot = match load_json(&self.path(identifier)).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => {
                debug!(identifier, "No saved cookies");
                return None;
            }
            Err(e) => {
                warn!(identifier, error = %e, "Failed to read cookies");
                return None;
            }
        };

        if !self.is_fresh(snapshot.timestamp, now) {
            debug!(identifier, saved_at = %snapshot.timestamp, "Cookies expired");
            return None;
        }

        let cookies: Vec<StoredCookie> = match domain_filter {
            Some(filter) => snapshot
                .cookies
                .into_iter()
                .filter(|c| c.domain_contains(filter))
                .collect(),
            None => snapshot.cookies,
        };

        if cookies.is_empty() {
            debug!(identifier, ?domain_filter, "No cookies to restore");
            return None;
        }

        debug!(identifier, count = cookies.len(), "Loaded cookies");
        Some(cookies)
    }

    // ========================================================================
    // Validity
    // ========================================================================

    /// True if a fresh, non-empty snapshot exists.
    pub async fn is_valid(&self, identifier: &str) -> bool {
        self.status_at(identifier, Utc::now()).await == CookieStatus::Valid
    }

    /// Classifies the stored snapshot at `now`.
    pub async fn status_at(&self, identifier: &str, now: DateTime<Utc>) -> CookieStatus {
        match load_json::<SnapshotHeader>(&self.path(identifier)).await {
            Err(e) if e.is_not_found() => CookieStatus::Missing,
            Err(_) => CookieStatus::Corrupt,
            Ok(header) => self.classify(&header, now),
        }
    }

    fn classify(&self, header: &SnapshotHeader, now: DateTime<Utc>) -> CookieStatus {
        if !self.is_fresh(header.timestamp, now) {
            CookieStatus::Expired
        } else if header.count == 0 {
            CookieStatus::Empty
        } else {
            CookieStatus::Valid
        }
    }

    /// Summarizes the stored snapshot, if readable.
    pub async fn info(&self, identifier: &str) -> Option<CookieInfo> {
        self.info_at(identifier, Utc::now()).await
    }

    /// Like [`info`](Self::info), evaluated at `now`.
    pub async fn info_at(&self, identifier: &str, now: DateTime<Utc>) -> Option<CookieInfo> {
        let header: SnapshotHeader = load_json(&self.path(identifier)).await.ok()?;
        let age = now.signed_duration_since(header.timestamp);

        Some(CookieInfo {
            count: header.count,
            saved_at: header.timestamp,
            age_hours: hours(age),
            is_valid: self.classify(&header, now) == CookieStatus::Valid,
            expires_in_hours: hours(self.max_age - age),
        })
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Deletes a snapshot. Returns true if one existed.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub async fn delete(&self, identifier: &str) -> Result<bool, StoreError> {
        let removed = remove_file_if_exists(&self.path(identifier)).await?;
        if removed {
            info!(identifier, "Cookies deleted");
        }
        Ok(removed)
    }

    /// Deletes every expired or unreadable snapshot. Returns the count.
    pub async fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now()).await
    }

    /// Like [`cleanup_expired`](Self::cleanup_expired), evaluated at `now`.
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "Cannot scan cookie directory");
                }
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(".json") {
                continue;
            }

            let path = entry.path();
            let stale = match load_json::<SnapshotHeader>(&path).await {
                Ok(header) => !self.is_fresh(header.timestamp, now),
                Err(_) => true,
            };
            if !stale {
                continue;
            }

            match remove_file_if_exists(&path).await {
                Ok(true) => {
                    debug!(file = %name, "Removed stale cookie snapshot");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(file = %name, error = %e, "Failed to remove cookie snapshot"),
            }
        }

        if removed > 0 {
            info!(removed, "Expired cookies cleaned up");
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<StoredCookie> {
        vec![
            StoredCookie::new("sid", "abc").with_domain(".leadpier.com"),
            StoredCookie::new("tracker", "x").with_domain("ads.example.net"),
        ]
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), DEFAULT_COOKIE_MAX_AGE_HOURS);

        store.save("leadpier", &sample()).await.unwrap();

        let cookies = store.load("leadpier", None).await.unwrap();
        assert_eq!(cookies, sample());
        assert!(store.is_valid("leadpier").await);
    }

    #[tokio::test]
    async fn test_domain_filter_is_substring() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), 12);
        store.save("leadpier", &sample()).await.unwrap();

        let cookies = store.load("leadpier", Some("leadpier.com")).await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");

        assert!(store.load("leadpier", Some("nowhere.org")).await.is_none());
    }

    #[tokio::test]
    async fn test_age_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), 12);
        let saved = Utc::now();
        store.save_at("id", &sample(), saved).await.unwrap();

        let almost = saved + Duration::hours(12) - Duration::seconds(1);
        assert!(store.load_at("id", None, almost).await.is_some());
        assert_eq!(store.status_at("id", almost).await, CookieStatus::Valid);

        let expired = saved + Duration::hours(12);
        assert!(store.load_at("id", None, expired).await.is_none());
        assert_eq!(store.status_at("id", expired).await, CookieStatus::Expired);
    }

    #[tokio::test]
    async fn test_status_variants() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), 12);

        assert_eq!(store.status_at("none", Utc::now()).await, CookieStatus::Missing);

        store.save("empty", &[]).await.unwrap();
        assert_eq!(store.status_at("empty", Utc::now()).await, CookieStatus::Empty);
        assert!(store.load("empty", None).await.is_none());

        tokio::fs::write(dir.path().join("cookies_bad.json"), "[1,2")
            .await
            .unwrap();
        assert_eq!(store.status_at("bad", Utc::now()).await, CookieStatus::Corrupt);
        assert!(!store.is_valid("bad").await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), 12);
        let now = Utc::now();

        store.save_at("old", &sample(), now - Duration::hours(13)).await.unwrap();
        store.save_at("fresh", &sample(), now).await.unwrap();
        tokio::fs::write(dir.path().join("unrelated.json"), "{}")
            .await
            .unwrap();

        assert_eq!(store.cleanup_expired_at(now).await, 1);
        assert_eq!(store.status_at("old", now).await, CookieStatus::Missing);
        assert!(store.is_valid("fresh").await);
        assert!(dir.path().join("unrelated.json").exists());
    }

    #[tokio::test]
    async fn test_info_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::new(dir.path(), 12);
        let saved = Utc::now();
        store.save_at("id", &sample(), saved).await.unwrap();

        let info = store.info_at("id", saved + Duration::hours(3)).await.unwrap();
        assert_eq!(info.count, 2);
        assert!(info.is_valid);
        assert!((info.age_hours - 3.0).abs() < f64::EPSILON);
        assert!((info.expires_in_hours - 9.0).abs() < f64::EPSILON);

        assert!(store.delete("id").await.unwrap());
        assert!(!store.delete("id").await.unwrap());
        assert!(store.info("id").await.is_none());
    }

    #[test]
    fn test_webdriver_field_names() {
        let json = r#"{"name":"a","value":"b","httpOnly":true,"sameSite":"Lax","expiry":1700000000}"#;
        let cookie: StoredCookie = serde_json::from_str(json).unwrap();
        assert_eq!(cookie.http_only, Some(true));
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
        assert_eq!(cookie.expiry, Some(1_700_000_000));
    }
}
