// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `DashGuard` Fetch
//!
//! Session management and tiered acquisition of the analytics payload.
//!
//! ## Host APIs
//!
//! The [`host`] module wraps everything that talks to the outside world:
//!
//! - [`host::automation`] - Launcher/handle traits for a real browser
//! - [`host::webdriver`] - `thirtyfour` implementation of those traits
//! - [`host::http`] - Direct client for the analytics endpoint
//!
//! ## Acquisition
//!
//! - [`session::SessionManager`] - The single authenticated browser session
//! - [`orchestrator::FallbackOrchestrator`] - Cache, warm session, cookies,
//!   login and clean restart, in that order
//! - [`context::AcquisitionContext`] - Stores and session injected into the orchestrator
//! - [`retry::attempt`] - Bounded retry with growing timeouts
//!
//! ## Example
//!
//! ```ignore
//! use dashguard_fetch::{AcquisitionContext, Credentials, FallbackOrchestrator};
//!
//! let ctx = AcquisitionContext::builder()
//!     .settings(settings)
//!     .credentials(Some(Credentials::new(email, password)))
//!     .build()
//!     .await?;
//!
//! let orchestrator = FallbackOrchestrator::new(ctx);
//! if let Some(payload) = orchestrator.get_data().await {
//!     let records = dashguard_core::normalize_payload(&payload)?;
//! }
//! ```

pub mod context;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod retry;
pub mod session;

// Errors
pub use error::FetchError;

// Host APIs
pub use host::{
    AnalyticsClient, AutomationHandle, AutomationLauncher, LaunchProfile, TokenStatus, WebDriverHandle,
    WebDriverLauncher,
};

// Acquisition
pub use context::{AcquisitionContext, AcquisitionContextBuilder};
pub use orchestrator::{AcquisitionOutcome, FallbackOrchestrator, TierAttempt};
pub use retry::{attempt, RetryPolicy, Schedule};
pub use session::{Credentials, DashboardSession, SessionConfig, SessionManager};
