//! Pre-built fixture documents.

use serde_json::{Value, json};

/// Secret ID used by fixtures.
pub const TOGGLE_SECRET_ID: &str = "tollgate/feature-toggles";

/// Control toggle key used by fixtures.
pub const CONTROL_KEY: &str = "analytics_ingestion";

/// A realistic toggle document as stored in the secret.
pub const TOGGLE_DOCUMENT: &str = r#"{
  "analytics_ingestion": {
    "state": "enabled",
    "rollout": 1,
    "owner": "data-platform",
    "description": "Master switch for the analytics ingestion pipeline"
  },
  "new_checkout": {
    "state": "pilot",
    "rollout": 0.25,
    "owner": "payments",
    "ticket": "PAY-1201"
  },
  "legacy_export": {
    "state": "sunset",
    "rollout": 0
  }
}"#;

/// Returns [`TOGGLE_DOCUMENT`] as a JSON value.
pub fn toggle_document() -> Value {
    serde_json::from_str(TOGGLE_DOCUMENT).expect("fixture is valid JSON")
}

/// Returns a document containing only the control toggle in `state`.
pub fn control_document(state: &str) -> Value {
    json!({ CONTROL_KEY: { "state": state, "rollout": 1, "owner": "data-platform" } })
}

/// Returns a seeded recording secret service holding `document`.
pub fn seeded_secrets(document: &Value) -> crate::RecordingSecretService {
    crate::RecordingSecretService::with_secret(TOGGLE_SECRET_ID, document.to_string())
}
