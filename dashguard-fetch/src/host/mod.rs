//! Host APIs for DashGuard acquisition.
//!
//! - [`automation`] - Browser automation abstraction (launcher + handle)
//! - [`webdriver`] - W3C WebDriver implementation of the automation traits
//! - [`http`] - Direct HTTP client for the analytics endpoint

pub mod automation;
pub mod http;
pub mod webdriver;

// Re-export key types
pub use automation::{AutomationHandle, AutomationLauncher, LaunchProfile};
pub use http::{AnalyticsClient, TokenStatus};
pub use webdriver::{WebDriverHandle, WebDriverLauncher};
