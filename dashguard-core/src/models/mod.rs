//! Domain models for `DashGuard`.
//!
//! - [`record`] - Canonical records and response normalization
//! - [`acquisition`] - Failure taxonomy and acquisition tiers

mod acquisition;
mod record;

pub use acquisition::{AcquisitionTier, FailureKind};
pub use record::{normalize_payload, ResponseShape, SourceRecord};
