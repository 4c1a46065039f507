//! File persistence helpers.
//!
//! Every durable record (cache entries, cookie snapshots, detection state,
//! settings) goes through these helpers: atomic JSON writes and owner-only
//! permissions on Unix.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

#[cfg(not(target_os = "macos"))]
const APP_DIR: &str = "dashguard";
#[cfg(target_os = "macos")]
const APP_DIR_MACOS: &str = "DashGuard";

const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

// ============================================================================
// Default Paths
// ============================================================================

#[cfg(target_os = "macos")]
fn app_dir(_platform: Option<PathBuf>, library_subdir: &str) -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from("."),
        |home| home.join("Library").join(library_subdir).join(APP_DIR_MACOS),
    )
}

#[cfg(not(target_os = "macos"))]
fn app_dir(platform: Option<PathBuf>, _library_subdir: &str) -> PathBuf {
    platform.map_or_else(|| PathBuf::from("."), |base| base.join(APP_DIR))
}

/// Configuration directory.
///
/// - macOS: `~/Library/Application Support/DashGuard`
/// - Linux: `~/.config/dashguard`
/// - Windows: `%APPDATA%\dashguard`
pub fn default_config_dir() -> PathBuf {
    app_dir(dirs::config_dir(), "Application Support")
}

/// Data directory for cache, cookies and detection state.
///
/// - macOS: `~/Library/Caches/DashGuard`
/// - Linux: `~/.cache/dashguard`
/// - Windows: `%LOCALAPPDATA%\dashguard`
pub fn default_data_dir() -> PathBuf {
    app_dir(dirs::cache_dir(), "Caches")
}

/// Default settings file.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

/// Replaces every non-alphanumeric character with `_`.
///
/// Used to derive file names from cache keys and cookie identifiers.
pub fn safe_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

// ============================================================================
// Permissions
// ============================================================================

/// Applies `mode` on Unix. Cookie snapshots hold live session credentials.
#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

// ============================================================================
// File Operations
// ============================================================================

/// Writes `data` as pretty JSON.
///
/// Creates the parent directory if needed and replaces the target atomically
/// through a sibling `.tmp` file that is restricted before the rename.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");

    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let json = serde_json::to_vec_pretty(data)?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &json).await?;
    restrict(&temp_path, FILE_MODE).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Reads and deserializes a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like [`load_json`], but falls back to `T::default()`.
///
/// A missing file is silent; any other failure is logged.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    load_json(path).await.unwrap_or_else(|e: StoreError| {
        if !e.is_not_found() {
            warn!(path = %path.display(), error = %e, "Unreadable file, using defaults");
        }
        T::default()
    })
}

/// Removes a file. Returns false if it was already gone.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Creates `path` (owner-only) if it does not exist yet.
pub async fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }
    debug!(path = %path.display(), "Creating directory");
    tokio::fs::create_dir_all(path).await?;
    restrict(path, DIR_MODE).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dirs() {
        assert!(!default_config_dir().as_os_str().is_empty());
        assert!(!default_data_dir().as_os_str().is_empty());
        assert!(default_settings_path().ends_with("settings.json"));
    }

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("sources_today"), "sources_today");
        assert_eq!(safe_file_stem("a/b:c d"), "a_b_c_d");
        assert_eq!(safe_file_stem("../etc"), "___etc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.json");

        save_json(&test_file, &serde_json::json!({"k": 1})).await.unwrap();

        let metadata = tokio::fs::metadata(&test_file).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "File should have 0600 permissions");
    }

    #[tokio::test]
    async fn test_remove_file_if_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("gone.json");

        assert!(!remove_file_if_exists(&path).await.unwrap());
        tokio::fs::write(&path, "{}").await.unwrap();
        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }
}
