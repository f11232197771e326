//! # tollgate-toggles
//!
//! Runtime feature flags for tollgate, kept in a versioned secret.
//!
//! This crate implements the toggle domain, providing:
//!
//! - **Secret Storage**: The full flag set lives in one JSON secret, or in a
//!   fixed in-process document when no secret is configured
//! - **Read Caching**: A per-process TTL memo, refreshed on demand and primed
//!   by every write
//! - **Audit Trail**: An immutable row for each state transition, written to
//!   an allow-listed table
//! - **Lenient Parsing**: Hand-edited documents load with unknown states and
//!   out-of-range rollouts coerced rather than rejected
//!
//! ## Core Concepts
//!
//! - **Toggle**: A keyed record with a lifecycle state, a rollout fraction
//!   and free-form ownership fields
//! - **Document**: The map of every toggle, always read and written whole
//! - **Patch**: The fields a caller supplied; everything else is carried over
//!   from the stored record
//!
//! ## Guarantees
//!
//! - **Read-your-writes**: An upsert is visible to the same process without
//!   another secret read
//! - **No audit without a write**: Audit rows follow a durable write, never
//!   precede it
//! - **Last writer wins**: Concurrent writers in different processes are not
//!   reconciled
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tollgate_toggles::audit::TracingAuditSink;
//! use tollgate_toggles::config::ToggleStoreConfig;
//! use tollgate_toggles::service::ToggleService;
//!
//! # async fn run() -> tollgate_core::Result<()> {
//! let toggles = ToggleService::from_config(
//!     &ToggleStoreConfig::default(),
//!     None,
//!     Arc::new(TracingAuditSink),
//! )?;
//! toggles
//!     .upsert("new_checkout", &json!({"state": "pilot", "rollout": 0.1}), Some("alice"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod cache;
pub mod config;
pub mod document;
pub mod metrics;
pub mod record;
pub mod service;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{
        AuditFailureMode, AuditTable, MemoryAuditSink, ToggleAuditEntry, ToggleAuditRecorder,
        ToggleAuditSink, TracingAuditSink,
    };
    pub use crate::cache::ToggleCache;
    pub use crate::config::ToggleStoreConfig;
    pub use crate::document::ToggleMap;
    pub use crate::record::{Rollout, ToggleEntry, TogglePatch, ToggleRecord, ToggleState};
    pub use crate::service::ToggleService;
    pub use crate::store::{SecretBackedToggleStore, ToggleSnapshot, VersionToken};
}

pub use tollgate_core::{Error, Result};
