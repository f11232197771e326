//! # tollgate-core
//!
//! Core abstractions shared by every tollgate component.
//!
//! - **Error Types**: Shared error definitions and result types
//! - **Identifiers**: Strongly-typed ULID identifiers for run records and audit entries
//! - **Secret Service**: The versioned secret-store contract the toggle document lives in
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `tollgate-core` carries no toggle or pipeline semantics. Domain crates
//! (`tollgate-toggles`, `tollgate-flow`) build on the contracts defined here.
//!
//! ## Example
//!
//! ```rust
//! use tollgate_core::prelude::*;
//!
//! let run_id = RunId::generate();
//! let secrets = MemorySecretService::new();
//! # let _ = (run_id, secrets);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;
pub mod secret;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{AuditEntryId, RunId};
    pub use crate::secret::{MemorySecretService, SecretService, SecretVersion};
}

pub use error::{Error, Result};
pub use id::{AuditEntryId, RunId};
pub use observability::{LogFormat, init_logging};
pub use secret::{MemorySecretService, SecretService, SecretVersion};
