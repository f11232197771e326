//! # tollgate-api
//!
//! HTTP surface for feature toggles and pipeline control.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | liveness |
//! | GET | `/api/v1/pipeline/status` | status snapshot |
//! | POST | `/api/v1/pipeline/pause` | pause ingestion |
//! | POST | `/api/v1/pipeline/resume` | resume ingestion |
//! | GET | `/api/v1/toggles` | list toggles |
//! | GET | `/api/v1/toggles/:key` | get one toggle |
//! | PUT | `/api/v1/toggles/:key` | create or partially update a toggle |
//!
//! Authentication and permission checks belong to the fronting layer, which
//! forwards the caller identity in the `x-tollgate-actor` header.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
