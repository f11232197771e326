//! # tollgate-flow
//!
//! Operator control and run visibility for the ingestion pipeline.
//!
//! This crate implements the pipeline-control domain, providing:
//!
//! - **Run Gating**: A cached answer to "should this batch run", backed by a
//!   deploy-time kill switch and a control toggle
//! - **Pause / Resume**: Operator actions that flip the control toggle and
//!   log themselves as skipped runs
//! - **Run History**: An append-only ledger of batch outcomes
//! - **Status**: One snapshot joining the gate, the backlog and recent runs
//!
//! ## Core Concepts
//!
//! - **Control State**: Whether ingestion is enabled, where that answer came
//!   from and why
//! - **Run**: One batch outcome with event counts and timing
//! - **Failure Streak**: Consecutive failed runs counted from the newest
//!
//! ## Guarantees
//!
//! - **Kill switch first**: The environment override cannot be masked by a
//!   cached or toggled decision
//! - **Status never fails**: Unreadable backlog or history degrades to
//!   defaults
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tollgate_flow::prelude::*;
//! use tollgate_toggles::service::ToggleService;
//!
//! # async fn run(toggles: Arc<ToggleService>) -> Result<()> {
//! let control = PipelineControl::new(toggles, ControlConfig::default());
//! if control.evaluate(false).await.enabled {
//!     let ledger = PipelineRunLedger::new(Arc::new(MemoryRunStore::new()));
//!     ledger.record(RunInput::new(RunStatus::Success)).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod actions;
pub mod control;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod run;
pub mod status;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::actions::{ControlAction, ControlActionOutcome, ControlRequest, PipelineControlActions};
    pub use crate::control::{
        ControlConfig, ControlSource, FetchFailurePolicy, PipelineControl, PipelineControlState,
    };
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{
        BacklogItem, BacklogStore, MemoryBacklogStore, MemoryRunStore, PipelineRunLedger, RunStore,
    };
    pub use crate::run::{EventCount, PipelineRunRecord, RunInput, RunStatus};
    pub use crate::status::{PipelineStatusReporter, PipelineStatusSnapshot};
}

pub use error::{Error, Result};
