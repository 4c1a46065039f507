// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `DashGuard` Core
//!
//! Core types shared by every `DashGuard` crate.
//!
//! - Canonical analytics records and the normalization of upstream responses
//! - The failure taxonomy recorded by the detection monitor
//! - Acquisition tier tags
//! - Error types
//!
//! ## Key Types
//!
//! - [`SourceRecord`] - One normalized analytics row
//! - [`ResponseShape`] - The shapes the upstream `data` field can take
//! - [`normalize_payload`] - Folds any response shape into `Vec<SourceRecord>`
//! - [`FailureKind`] - Classified failure recorded after a tier error
//! - [`AcquisitionTier`] - Which fallback tier produced a payload

pub mod error;
pub mod models;

pub use error::CoreError;

pub use models::{
    // Records
    normalize_payload,
    ResponseShape,
    SourceRecord,
    // Acquisition
    AcquisitionTier,
    FailureKind,
};
