//! Pipeline status snapshots.
//!
//! A snapshot is derived on every request and never persisted. Reads that
//! fail are logged, counted, and replaced by empty defaults so that a status
//! query never fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::Result;

use crate::control::{PipelineControl, PipelineControlState};
use crate::ledger::{BacklogStore, PipelineRunLedger};
use crate::metrics::FlowMetrics;
use crate::run::{PipelineRunRecord, RunStatus};

/// Number of recent runs included in a snapshot.
pub const RECENT_RUN_LIMIT: usize = 20;

/// Message reported for a failed run that carries no error text.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Backlog counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogSnapshot {
    /// Items not yet ingested.
    pub pending: u64,
    /// Receive time of the oldest pending item.
    pub oldest_pending_at: Option<DateTime<Utc>>,
    /// Earliest scheduled retry among pending items.
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// The most recent failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    /// Error message.
    pub message: String,
    /// When the failed run finished.
    pub occurred_at: DateTime<Utc>,
}

/// Point-in-time pipeline health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusSnapshot {
    /// Current control decision.
    pub pipeline: PipelineControlState,
    /// Backlog counters.
    pub backlog: BacklogSnapshot,
    /// Most recent runs, newest first.
    pub runs: Vec<PipelineRunRecord>,
    /// Consecutive most-recent failed runs.
    pub failure_streak: usize,
    /// Finish time of the most recent healthy run.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<LastError>,
}

/// Counts consecutive failed runs from the head of `runs` (newest first).
#[must_use]
pub fn failure_streak(runs: &[PipelineRunRecord]) -> usize {
    runs.iter()
        .take_while(|r| r.status == RunStatus::Failed)
        .count()
}

/// Returns the finish time of the newest run that succeeded or was idle.
#[must_use]
pub fn last_success_at(runs: &[PipelineRunRecord]) -> Option<DateTime<Utc>> {
    runs.iter()
        .find(|r| r.status.is_healthy())
        .map(|r| r.finished_at)
}

/// Returns the newest failed run as a [`LastError`].
#[must_use]
pub fn last_error(runs: &[PipelineRunRecord]) -> Option<LastError> {
    runs.iter()
        .find(|r| r.status == RunStatus::Failed)
        .map(|r| LastError {
            message: r
                .last_error
                .clone()
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            occurred_at: r.finished_at,
        })
}

/// Aggregates control, backlog and run history into one snapshot.
pub struct PipelineStatusReporter {
    control: Arc<PipelineControl>,
    ledger: Arc<PipelineRunLedger>,
    backlog: Arc<dyn BacklogStore>,
    metrics: FlowMetrics,
}

impl std::fmt::Debug for PipelineStatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStatusReporter")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl PipelineStatusReporter {
    /// Creates a reporter.
    #[must_use]
    pub fn new(
        control: Arc<PipelineControl>,
        ledger: Arc<PipelineRunLedger>,
        backlog: Arc<dyn BacklogStore>,
    ) -> Self {
        Self {
            control,
            ledger,
            backlog,
            metrics: FlowMetrics::new(),
        }
    }

    /// Builds a fresh snapshot. The five reads run concurrently.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self) -> PipelineStatusSnapshot {
        let (pipeline, pending, oldest, next_retry, runs) = tokio::join!(
            self.control.evaluate(false),
            self.backlog.count_pending(),
            self.backlog.oldest_pending(),
            self.backlog.earliest_next_retry(),
            self.ledger.recent(RECENT_RUN_LIMIT),
        );

        let backlog = BacklogSnapshot {
            pending: self.or_default("pending", pending),
            oldest_pending_at: self.or_default("oldest_pending", oldest),
            next_retry_at: self.or_default("next_retry", next_retry),
        };
        let runs = self.or_default("recent_runs", runs);

        let snapshot = PipelineStatusSnapshot {
            failure_streak: failure_streak(&runs),
            last_success_at: last_success_at(&runs),
            last_error: last_error(&runs),
            pipeline,
            backlog,
            runs,
        };
        self.metrics.set_failure_streak(snapshot.failure_streak);
        self.metrics.set_backlog_pending(snapshot.backlog.pending);
        snapshot
    }

    fn or_default<T: Default>(&self, read: &'static str, result: Result<T>) -> T {
        result.unwrap_or_else(|e| {
            self.metrics.record_status_read_error(read);
            tracing::warn!(read, error = %e, "pipeline status read failed; using default");
            T::default()
        })
    }
}
