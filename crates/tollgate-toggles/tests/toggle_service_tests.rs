//! End-to-end tests for the toggle facade over a recording secret store.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tollgate_core::Error;
use tollgate_test_utils::fixtures::{TOGGLE_SECRET_ID, seeded_secrets, toggle_document};
use tollgate_test_utils::{RecordingSecretService, SecretOp};
use tollgate_toggles::audit::{
    AuditFailureMode, AuditTable, MemoryAuditSink, ToggleAuditRecorder,
};
use tollgate_toggles::cache::ToggleCache;
use tollgate_toggles::document::parse_payload;
use tollgate_toggles::prelude::*;

struct Harness {
    secrets: RecordingSecretService,
    sink: Arc<MemoryAuditSink>,
    service: ToggleService,
}

fn harness_with(secrets: RecordingSecretService, mode: AuditFailureMode) -> Harness {
    let sink = Arc::new(MemoryAuditSink::new());
    let store = SecretBackedToggleStore::secret(Arc::new(secrets.clone()), TOGGLE_SECRET_ID);
    let cache = Arc::new(ToggleCache::new(store, Duration::from_secs(60)));
    let audit = ToggleAuditRecorder::new(sink.clone(), AuditTable::default(), mode);
    Harness {
        secrets,
        sink,
        service: ToggleService::new(cache, audit),
    }
}

fn harness() -> Harness {
    harness_with(
        seeded_secrets(&toggle_document()),
        AuditFailureMode::MustWrite,
    )
}

#[tokio::test]
async fn partial_update_keeps_unspecified_fields() {
    let h = harness();

    let entry = h
        .service
        .upsert("new_checkout", &json!({"rollout": 0.5}), Some("alice"))
        .await
        .unwrap();

    assert_eq!(entry.record.state, ToggleState::Pilot);
    assert_eq!(entry.record.owner.as_deref(), Some("payments"));
    assert_eq!(entry.record.ticket.as_deref(), Some("PAY-1201"));
    assert_eq!(entry.record.rollout, Rollout::new(0.5));
    assert_eq!(entry.record.last_modified_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn upsert_writes_whole_document_and_keeps_other_keys() {
    let h = harness();
    h.service
        .upsert("brand_new", &json!({"state": "staging"}), None)
        .await
        .unwrap();

    let payload = h.secrets.payload(TOGGLE_SECRET_ID).await.unwrap();
    let stored = parse_payload(&payload).unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored["brand_new"].state, ToggleState::Staging);
    assert_eq!(stored["legacy_export"].state, ToggleState::Sunset);
}

#[tokio::test]
async fn read_after_write_needs_no_second_read() {
    let h = harness();
    h.service
        .upsert("new_checkout", &json!({"state": "enabled"}), Some("bob"))
        .await
        .unwrap();
    let fetched = h.service.get("new_checkout").await.unwrap().unwrap();

    assert_eq!(fetched.record.state, ToggleState::Enabled);
    assert_eq!(h.secrets.get_count(), 1);
    assert_eq!(h.secrets.put_count(), 1);
}

#[tokio::test]
async fn empty_key_is_rejected_before_any_io() {
    let h = harness();
    for key in ["", "   "] {
        let err = h
            .service
            .upsert(key, &json!({"state": "enabled"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
    assert!(h.secrets.operations().is_empty());
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn failed_write_is_not_audited() {
    let h = harness();
    h.service.list(false).await.unwrap();
    h.secrets.inject_failure(TOGGLE_SECRET_ID);

    let err = h
        .service
        .upsert("new_checkout", &json!({"state": "enabled"}), Some("carol"))
        .await
        .unwrap_err();

    assert!(err.is_upstream());
    assert!(h.sink.is_empty());
    assert!(
        h.secrets
            .operations()
            .iter()
            .any(|op| matches!(op, SecretOp::Put { .. }))
    );

    h.secrets.clear_failures();
    let unchanged = h.service.get("new_checkout").await.unwrap().unwrap();
    assert_eq!(unchanged.record.state, ToggleState::Pilot);
}

#[tokio::test]
async fn every_write_carries_a_fresh_idempotency_token() {
    let h = harness();
    h.service
        .upsert("new_checkout", &json!({"state": "enabled"}), Some("alice"))
        .await
        .unwrap();
    h.service
        .upsert("new_checkout", &json!({"rollout": 0.25}), Some("alice"))
        .await
        .unwrap();

    let tokens: Vec<String> = h
        .secrets
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            SecretOp::Put {
                idempotency_token, ..
            } => Some(idempotency_token),
            SecretOp::Get { .. } => None,
        })
        .collect();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().all(|token| !token.is_empty()));
    assert_ne!(tokens[0], tokens[1]);

    let stored = h.service.fetch("new_checkout", true).await.unwrap().unwrap();
    assert_eq!(stored.record.state, ToggleState::Enabled);
    assert_eq!(stored.record.rollout, Rollout::new(0.25));
}

#[tokio::test]
async fn audit_failure_fails_the_call_but_the_write_sticks() {
    let h = harness();
    h.sink.inject_failure("audit table locked");

    let err = h
        .service
        .upsert("new_checkout", &json!({"state": "disabled"}), Some("dave"))
        .await
        .unwrap_err();
    assert!(err.is_upstream());

    let payload = h.secrets.payload(TOGGLE_SECRET_ID).await.unwrap();
    let stored = parse_payload(&payload).unwrap();
    assert_eq!(stored["new_checkout"].state, ToggleState::Disabled);
}

#[tokio::test]
async fn best_effort_audit_swallows_sink_failures() {
    let h = harness_with(
        seeded_secrets(&toggle_document()),
        AuditFailureMode::BestEffort,
    );
    h.sink.inject_failure("audit table locked");

    let entry = h
        .service
        .upsert("new_checkout", &json!({"state": "disabled"}), None)
        .await
        .unwrap();
    assert_eq!(entry.record.state, ToggleState::Disabled);
}

#[tokio::test]
async fn audit_records_transition_and_actor() {
    let h = harness();
    h.service
        .upsert("new_checkout", &json!({"state": "enabled", "rollout": 1}), Some("erin"))
        .await
        .unwrap();

    let rows = h.sink.entries_for("new_checkout");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.previous_state, Some(ToggleState::Pilot));
    assert_eq!(row.previous_rollout, Some(Rollout::new(0.25)));
    assert_eq!(row.next_state, ToggleState::Enabled);
    assert_eq!(row.next_rollout, Rollout::FULL);
    assert_eq!(row.actor, "erin");
    assert_eq!(row.ticket.as_deref(), Some("PAY-1201"));
}

#[tokio::test]
async fn missing_secret_reads_as_empty_and_first_write_creates_it() {
    let h = harness_with(RecordingSecretService::new(), AuditFailureMode::MustWrite);
    assert!(h.service.list(false).await.unwrap().is_empty());

    h.service
        .upsert("first", &json!({"state": "enabled"}), None)
        .await
        .unwrap();
    let payload = h.secrets.payload(TOGGLE_SECRET_ID).await.unwrap();
    assert!(parse_payload(&payload).unwrap().contains_key("first"));
}

#[tokio::test]
async fn malformed_document_surfaces_as_error() {
    let secrets = RecordingSecretService::with_secret(TOGGLE_SECRET_ID, "[1, 2");
    let h = harness_with(secrets, AuditFailureMode::MustWrite);
    assert!(h.service.list(false).await.is_err());
}

#[tokio::test]
async fn lenient_values_normalize_on_read() {
    let document = json!({
        "weird": {"state": "  PILOT ", "rollout": "7", "description": "   "},
        "junk": "not an object"
    });
    let h = harness_with(seeded_secrets(&document), AuditFailureMode::MustWrite);

    let weird = h.service.get("weird").await.unwrap().unwrap();
    assert_eq!(weird.record.state, ToggleState::Pilot);
    assert_eq!(weird.record.rollout, Rollout::FULL);
    assert_eq!(weird.record.description, None);

    let junk = h.service.get("junk").await.unwrap().unwrap();
    assert_eq!(junk.record, ToggleRecord::default());
}

#[tokio::test]
async fn static_mode_accepts_writes_without_a_secret_store() {
    let config = ToggleStoreConfig {
        static_document: tollgate_toggles::document::parse_document(&toggle_document()).unwrap(),
        ..ToggleStoreConfig::default()
    };
    let sink = Arc::new(MemoryAuditSink::new());
    let service = ToggleService::from_config(&config, None, sink.clone()).unwrap();

    service
        .upsert("legacy_export", &json!({"state": "enabled"}), Some("ops"))
        .await
        .unwrap();
    let entry = service.get("legacy_export").await.unwrap().unwrap();
    assert_eq!(entry.record.state, ToggleState::Enabled);
    assert!(service.cache().store().is_static());
    assert_eq!(sink.len(), 1);
}
