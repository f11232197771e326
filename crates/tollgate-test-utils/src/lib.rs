//! Shared test utilities for tollgate.
//!
//! This crate provides:
//! - [`RecordingSecretService`]: in-memory secret store that records every call
//! - Fixture documents for toggle and pipeline tests
//!
//! # Example
//!
//! ```rust,ignore
//! use tollgate_test_utils::{RecordingSecretService, SecretOp, fixtures};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let secrets = RecordingSecretService::with_secret("toggles", fixtures::TOGGLE_DOCUMENT);
//!     // ... run test ...
//!     assert!(matches!(secrets.operations()[0], SecretOp::Get { .. }));
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod secrets;

pub use secrets::*;
