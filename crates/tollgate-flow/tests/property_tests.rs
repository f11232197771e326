//! Property-based tests for run coercion and health derivation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{Value, json};

use tollgate_flow::run::{EventCount, PipelineRunRecord, RunInput, RunStatus};
use tollgate_flow::status::failure_streak;

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|i| json!(i)),
        any::<f64>().prop_map(|f| json!(f)),
        ".{0,10}".prop_map(Value::String),
        prop::sample::select(vec!["success", "failed", "skipped", "idle", "SKIPPED"])
            .prop_map(|s| Value::String(s.to_string())),
    ]
}

fn arb_status() -> impl Strategy<Value = RunStatus> {
    prop::sample::select(RunStatus::ALL.to_vec())
}

fn record(status: RunStatus) -> PipelineRunRecord {
    PipelineRunRecord::from_input(RunInput::new(status), Utc::now())
}

proptest! {
    #[test]
    fn coercion_never_fails(
        status in arb_value(),
        processed in arb_value(),
        started in arb_value(),
        metadata in arb_value(),
    ) {
        let input = RunInput::normalize(&json!({
            "status": status,
            "eventsProcessed": processed,
            "startedAt": started,
            "metadata": metadata.clone(),
        }));
        let now = Utc::now();
        let record = PipelineRunRecord::from_input(input, now);
        prop_assert!(RunStatus::ALL.contains(&record.status));
        prop_assert_eq!(record.finished_at, record.started_at);
        prop_assert!(record.metadata.is_empty() || metadata.is_object());
    }

    #[test]
    fn negative_counts_are_zero(n in i64::MIN..0) {
        prop_assert_eq!(EventCount::coerce(&json!(n)), EventCount::ZERO);
        prop_assert_eq!(EventCount::coerce(&json!(n.to_string())), EventCount::ZERO);
    }

    #[test]
    fn streak_equals_leading_failures(
        leading in 0usize..10,
        rest in prop::collection::vec(arb_status(), 0..10),
    ) {
        let mut runs: Vec<_> = (0..leading).map(|_| record(RunStatus::Failed)).collect();
        runs.push(record(RunStatus::Success));
        runs.extend(rest.into_iter().map(record));
        prop_assert_eq!(failure_streak(&runs), leading);
    }
}
