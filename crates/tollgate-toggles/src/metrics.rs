//! Metrics for the toggle store.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tollgate_toggle_cache_lookups_total` | Counter | `result` | Cache hits and misses |
//! | `tollgate_toggle_store_reads_total` | Counter | `mode`, `result` | Whole-document reads |
//! | `tollgate_toggle_store_writes_total` | Counter | `mode`, `result` | Whole-document writes |
//! | `tollgate_toggle_audit_failures_total` | Counter | `failure_mode` | Failed audit appends |
//! | `tollgate_toggle_document_size` | Gauge | - | Toggles in the last loaded document |

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: cache lookups by result.
    pub const CACHE_LOOKUPS_TOTAL: &str = "tollgate_toggle_cache_lookups_total";
    /// Counter: store reads by mode and result.
    pub const STORE_READS_TOTAL: &str = "tollgate_toggle_store_reads_total";
    /// Counter: store writes by mode and result.
    pub const STORE_WRITES_TOTAL: &str = "tollgate_toggle_store_writes_total";
    /// Counter: audit append failures by failure mode.
    pub const AUDIT_FAILURES_TOTAL: &str = "tollgate_toggle_audit_failures_total";
    /// Gauge: number of toggles in the last loaded document.
    pub const DOCUMENT_SIZE: &str = "tollgate_toggle_document_size";
}

/// Label keys used across metrics.
pub mod labels {
    /// Lookup or I/O result (hit, miss, success, error).
    pub const RESULT: &str = "result";
    /// Store mode (secret, static).
    pub const MODE: &str = "mode";
    /// Audit failure mode (`must_write`, `best_effort`).
    pub const FAILURE_MODE: &str = "failure_mode";
}

/// Records toggle store metrics. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ToggleMetrics;

impl ToggleMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        counter!(
            names::CACHE_LOOKUPS_TOTAL,
            labels::RESULT => if hit { "hit" } else { "miss" },
        )
        .increment(1);
    }

    /// Records a whole-document read.
    pub fn record_store_read(&self, mode: &'static str, ok: bool) {
        counter!(
            names::STORE_READS_TOTAL,
            labels::MODE => mode,
            labels::RESULT => result_label(ok),
        )
        .increment(1);
    }

    /// Records a whole-document write.
    pub fn record_store_write(&self, mode: &'static str, ok: bool) {
        counter!(
            names::STORE_WRITES_TOTAL,
            labels::MODE => mode,
            labels::RESULT => result_label(ok),
        )
        .increment(1);
    }

    /// Records a failed audit append.
    pub fn record_audit_failure(&self, failure_mode: &'static str) {
        counter!(
            names::AUDIT_FAILURES_TOTAL,
            labels::FAILURE_MODE => failure_mode,
        )
        .increment(1);
    }

    /// Sets the size of the last loaded document.
    #[allow(clippy::cast_precision_loss)] // toggle documents are small
    pub fn set_document_size(&self, toggles: usize) {
        gauge!(names::DOCUMENT_SIZE).set(toggles as f64);
    }
}

const fn result_label(ok: bool) -> &'static str {
    if ok { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        let metrics = ToggleMetrics::new();
        metrics.record_cache_lookup(true);
        metrics.record_store_read("static", true);
        metrics.record_store_write("secret", false);
        metrics.record_audit_failure("best_effort");
        metrics.set_document_size(3);
    }
}
