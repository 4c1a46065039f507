// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # DashGuard Store
//!
//! Durable state for the DashGuard acquisition engine.
//!
//! This crate provides:
//!
//! - **CacheStore**: TTL-keyed payload cache with a validity index
//! - **CookieStore**: Age-bounded session cookie snapshots
//! - **DetectionMonitor**: Failure bookkeeping and defensive mode
//! - **SettingsStore**: Runtime settings with persistence
//! - **Persistence**: Atomic JSON file helpers
//!
//! ## Usage
//!
//! ```ignore
//! use dashguard_store::{CacheStore, DetectionMonitor, SettingsStore};
//! use dashguard_core::AcquisitionTier;
//!
//! let settings = SettingsStore::load_default().await.get().await;
//! let cache = CacheStore::open(settings.cache_dir(), settings.cache_ttl_secs).await?;
//! let monitor = DetectionMonitor::load(settings.detection_state_path(), settings.detection_config()).await;
//!
//! if let Some(payload) = cache.get(&settings.cache_key).await {
//!     monitor.record_success(AcquisitionTier::Cache).await;
//! }
//! ```

pub mod cache_store;
pub mod cookie_store;
pub mod detection;
pub mod error;
pub mod persistence;
pub mod settings_store;

pub use cache_store::{CacheEntry, CacheStats, CacheStore, DEFAULT_CACHE_TTL_SECS};
pub use cookie_store::{CookieInfo, CookieSnapshot, CookieStatus, CookieStore, StoredCookie};
pub use detection::{
    DetectionConfig, DetectionMonitor, DetectionState, DetectionStats, FailurePattern, FailureRecord,
    PatternKind, Severity, SuccessRecord, DEFAULT_PATTERN_WINDOW_MINUTES,
};
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_data_dir, default_settings_path, load_json, load_json_or_default,
    save_json,
};
pub use settings_store::{DashboardSettings, RequestBody, RetrySettings, Settings, SettingsStore};
