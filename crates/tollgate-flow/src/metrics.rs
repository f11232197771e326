//! Observability metrics for pipeline control.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tollgate_pipeline_control_evaluations_total` | Counter | `source`, `enabled` | Control decisions by resolving layer |
//! | `tollgate_pipeline_control_actions_total` | Counter | `action` | Pause / resume actions |
//! | `tollgate_pipeline_runs_recorded_total` | Counter | `status` | Ledger appends |
//! | `tollgate_pipeline_failure_streak` | Gauge | - | Consecutive most-recent failed runs |
//! | `tollgate_pipeline_backlog_pending` | Gauge | - | Items not yet ingested |
//! | `tollgate_pipeline_status_read_errors_total` | Counter | `read` | Status reads that fell back to defaults |

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Control decisions by source.
    pub const CONTROL_EVALUATIONS_TOTAL: &str = "tollgate_pipeline_control_evaluations_total";
    /// Counter: Control actions by action.
    pub const CONTROL_ACTIONS_TOTAL: &str = "tollgate_pipeline_control_actions_total";
    /// Counter: Run records appended by status.
    pub const RUNS_RECORDED_TOTAL: &str = "tollgate_pipeline_runs_recorded_total";
    /// Gauge: Current failure streak.
    pub const FAILURE_STREAK: &str = "tollgate_pipeline_failure_streak";
    /// Gauge: Pending backlog items.
    pub const BACKLOG_PENDING: &str = "tollgate_pipeline_backlog_pending";
    /// Counter: Status reads that failed and were defaulted.
    pub const STATUS_READ_ERRORS_TOTAL: &str = "tollgate_pipeline_status_read_errors_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Resolving layer (env, `feature_toggle`, default).
    pub const SOURCE: &str = "source";
    /// Whether the pipeline is enabled.
    pub const ENABLED: &str = "enabled";
    /// Control action (pause, resume).
    pub const ACTION: &str = "action";
    /// Run status.
    pub const STATUS: &str = "status";
    /// Which status read failed.
    pub const READ: &str = "read";
}

/// Pipeline control metrics recorder.
#[derive(Debug, Clone, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records one control decision.
    pub fn record_control_evaluation(&self, source: &'static str, enabled: bool) {
        counter!(
            names::CONTROL_EVALUATIONS_TOTAL,
            labels::SOURCE => source,
            labels::ENABLED => if enabled { "true" } else { "false" },
        )
        .increment(1);
    }

    /// Records one pause or resume.
    pub fn record_control_action(&self, action: &'static str) {
        counter!(names::CONTROL_ACTIONS_TOTAL, labels::ACTION => action).increment(1);
    }

    /// Records one ledger append.
    pub fn record_run(&self, status: &'static str) {
        counter!(names::RUNS_RECORDED_TOTAL, labels::STATUS => status).increment(1);
    }

    /// Records a status read that fell back to its default.
    pub fn record_status_read_error(&self, read: &'static str) {
        counter!(names::STATUS_READ_ERRORS_TOTAL, labels::READ => read).increment(1);
    }

    /// Sets the failure-streak gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_failure_streak(&self, streak: usize) {
        gauge!(names::FAILURE_STREAK).set(streak as f64);
    }

    /// Sets the pending-backlog gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_backlog_pending(&self, pending: u64) {
        gauge!(names::BACKLOG_PENDING).set(pending as f64);
    }
}
