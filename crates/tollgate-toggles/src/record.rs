//! Toggle records and field-level normalization.
//!
//! Every value that enters the toggle store passes through the lenient
//! deserializers in this module, so a [`ToggleRecord`] can never hold a state
//! outside the closed set or a rollout outside `[0, 1]`:
//!
//! - a malformed `state` becomes [`ToggleState::Disabled`]
//! - a malformed `rollout` becomes `0`, then every rollout is clamped
//!
//! ```rust
//! use serde_json::json;
//! use tollgate_toggles::record::{ToggleRecord, ToggleState};
//!
//! let record = ToggleRecord::normalize(&json!({"state": "LIVE", "rollout": "2"}));
//! assert_eq!(record.state, ToggleState::Disabled);
//! assert!((record.rollout.value() - 1.0).abs() < f64::EPSILON);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use tollgate_core::{Error, Result};

/// Coarse state of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    /// Fully on.
    Enabled,
    /// Fully off. Also the coercion target for malformed input.
    #[default]
    Disabled,
    /// On for a pilot cohort.
    Pilot,
    /// On in staging environments only.
    Staging,
    /// Being retired; treated as off.
    Sunset,
}

impl ToggleState {
    /// All states, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Enabled,
        Self::Disabled,
        Self::Pilot,
        Self::Staging,
        Self::Sunset,
    ];

    /// Returns the wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Pilot => "pilot",
            Self::Staging => "staging",
            Self::Sunset => "sunset",
        }
    }

    /// Returns true unless the state switches the feature off.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Disabled | Self::Sunset)
    }

    /// Coerces an arbitrary JSON value into a state.
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown toggle state '{s}'")))
    }
}

impl<'de> Deserialize<'de> for ToggleState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::coerce(&value))
    }
}

/// Rollout fraction, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Rollout(f64);

impl Rollout {
    /// No rollout.
    pub const NONE: Self = Self(0.0);
    /// Full rollout.
    pub const FULL: Self = Self(1.0);

    /// Creates a rollout, clamping into `[0, 1]`. Non-finite input becomes `0`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self::NONE
        }
    }

    /// Returns the fraction.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Coerces an arbitrary JSON value into a rollout.
    ///
    /// Numbers and numeric strings are clamped; anything else becomes `0`.
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        let raw = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Self::new(raw.unwrap_or(0.0))
    }
}

impl Serialize for Rollout {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Rollout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::coerce(&value))
    }
}

/// A normalized toggle.
///
/// The document stored in the secret service is a map of toggle key to
/// `ToggleRecord`; the key itself is not part of the record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToggleRecord {
    /// Coarse state.
    pub state: ToggleState,
    /// Rollout fraction.
    pub rollout: Rollout,
    /// Human-readable description.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub description: Option<String>,
    /// Owning team or person.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub owner: Option<String>,
    /// Tracking ticket.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub ticket: Option<String>,
    /// When the record was last written.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::timestamp"
    )]
    pub last_modified_at: Option<DateTime<Utc>>,
    /// Who last wrote the record.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::text"
    )]
    pub last_modified_by: Option<String>,
}

impl ToggleRecord {
    /// Normalizes raw toggle fields.
    ///
    /// Non-object input normalizes to the default record.
    #[must_use]
    pub fn normalize(raw: &Value) -> Self {
        if !raw.is_object() {
            return Self::default();
        }
        // Every field deserializer is infallible on JSON input.
        serde_json::from_value(raw.clone()).unwrap_or_default()
    }

    /// Returns true unless the state switches the feature off.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// A partial update to a toggle record.
///
/// Only fields present in the raw payload are set. A present-but-malformed
/// `state` still coerces to `disabled`; a present-but-empty text field clears
/// the stored value.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TogglePatch {
    /// New state, if supplied.
    #[serde(default, deserialize_with = "lenient::present")]
    pub state: Option<ToggleState>,
    /// New rollout, if supplied.
    #[serde(default, deserialize_with = "lenient::present")]
    pub rollout: Option<Rollout>,
    /// New description, if supplied (`Some(None)` clears it).
    #[serde(default, deserialize_with = "lenient::present_text")]
    pub description: Option<Option<String>>,
    /// New owner, if supplied (`Some(None)` clears it).
    #[serde(default, deserialize_with = "lenient::present_text")]
    pub owner: Option<Option<String>>,
    /// New ticket, if supplied (`Some(None)` clears it).
    #[serde(default, deserialize_with = "lenient::present_text")]
    pub ticket: Option<Option<String>>,
}

impl TogglePatch {
    /// Normalizes a raw update payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the payload is not a JSON object.
    pub fn normalize(raw: &Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::InvalidInput(
                "toggle payload must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(raw.clone()).map_err(|e| Error::Serialization {
            message: format!("failed to normalize toggle payload: {e}"),
        })
    }

    /// Sets the state.
    #[must_use]
    pub fn state(mut self, state: ToggleState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the rollout.
    #[must_use]
    pub fn rollout(mut self, rollout: Rollout) -> Self {
        self.rollout = Some(rollout);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(lenient::non_empty(description.into()));
        self
    }

    /// Sets the ticket.
    #[must_use]
    pub fn ticket(mut self, ticket: Option<String>) -> Self {
        self.ticket = Some(ticket.and_then(lenient::non_empty));
        self
    }

    /// Applies the patch on top of `base`. Fields absent from the patch keep
    /// their previous value.
    #[must_use]
    pub fn apply_to(self, base: ToggleRecord) -> ToggleRecord {
        ToggleRecord {
            state: self.state.unwrap_or(base.state),
            rollout: self.rollout.unwrap_or(base.rollout),
            description: self.description.unwrap_or(base.description),
            owner: self.owner.unwrap_or(base.owner),
            ticket: self.ticket.unwrap_or(base.ticket),
            last_modified_at: base.last_modified_at,
            last_modified_by: base.last_modified_by,
        }
    }
}

/// A toggle record together with its key, as returned by the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleEntry {
    /// Toggle key.
    pub key: String,
    /// The record fields.
    #[serde(flatten)]
    pub record: ToggleRecord,
}

mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn non_empty(s: String) -> Option<String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    }

    fn text_from_value(value: Value) -> Option<String> {
        match value {
            Value::String(s) => non_empty(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub(super) fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(text_from_value(Value::deserialize(d)?))
    }

    pub(super) fn present_text<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Ok(Some(text_from_value(Value::deserialize(d)?)))
    }

    pub(super) fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        T::deserialize(d).map(Some)
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_parses_case_insensitively() {
        assert_eq!(" Pilot ".parse::<ToggleState>().unwrap(), ToggleState::Pilot);
        assert!("live".parse::<ToggleState>().is_err());
    }

    #[test]
    fn malformed_state_coerces_to_disabled() {
        assert_eq!(ToggleState::coerce(&json!("bogus")), ToggleState::Disabled);
        assert_eq!(ToggleState::coerce(&json!(42)), ToggleState::Disabled);
        assert_eq!(ToggleState::coerce(&Value::Null), ToggleState::Disabled);
    }

    #[test]
    fn rollout_coercion_examples() {
        assert!((Rollout::coerce(&json!("2")).value() - 1.0).abs() < f64::EPSILON);
        assert!(Rollout::coerce(&json!("abc")).value().abs() < f64::EPSILON);
        assert!(Rollout::coerce(&json!(-0.3)).value().abs() < f64::EPSILON);
        assert!((Rollout::coerce(&json!(" 0.25 ")).value() - 0.25).abs() < f64::EPSILON);
        assert!(Rollout::coerce(&json!(true)).value().abs() < f64::EPSILON);
        assert!(Rollout::new(f64::NAN).value().abs() < f64::EPSILON);
    }

    #[test]
    fn normalize_fills_defaults_and_keeps_text() {
        let record = ToggleRecord::normalize(&json!({
            "rollout": 0.5,
            "description": "  gate ingestion  ",
            "owner": "",
            "ticket": 1234,
            "lastModifiedAt": "not a date",
        }));
        assert_eq!(record.state, ToggleState::Disabled);
        assert!((record.rollout.value() - 0.5).abs() < f64::EPSILON);
        assert_eq!(record.description.as_deref(), Some("gate ingestion"));
        assert_eq!(record.owner, None);
        assert_eq!(record.ticket.as_deref(), Some("1234"));
        assert_eq!(record.last_modified_at, None);
    }

    #[test]
    fn normalize_non_object_is_default() {
        assert_eq!(ToggleRecord::normalize(&json!("enabled")), ToggleRecord::default());
    }

    #[test]
    fn patch_tracks_only_present_fields() {
        let patch = TogglePatch::normalize(&json!({"rollout": 0.5})).unwrap();
        assert_eq!(patch.state, None);
        assert_eq!(patch.rollout, Some(Rollout::new(0.5)));
        assert_eq!(patch.description, None);
    }

    #[test]
    fn patch_with_null_state_coerces_to_disabled() {
        let patch = TogglePatch::normalize(&json!({"state": null})).unwrap();
        assert_eq!(patch.state, Some(ToggleState::Disabled));
    }

    #[test]
    fn patch_rejects_non_object_payload() {
        let err = TogglePatch::normalize(&json!([1, 2])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn patch_preserves_unspecified_fields() {
        let base = ToggleRecord {
            state: ToggleState::Pilot,
            rollout: Rollout::new(0.1),
            description: Some("checkout flow".into()),
            owner: Some("payments".into()),
            ..ToggleRecord::default()
        };
        let next = TogglePatch::normalize(&json!({"rollout": 0.5, "owner": ""}))
            .unwrap()
            .apply_to(base);
        assert_eq!(next.state, ToggleState::Pilot);
        assert_eq!(next.rollout, Rollout::new(0.5));
        assert_eq!(next.description.as_deref(), Some("checkout flow"));
        assert_eq!(next.owner, None);
    }

    #[test]
    fn entry_serializes_flat_camel_case() {
        let entry = ToggleEntry {
            key: "analytics_ingestion".into(),
            record: ToggleRecord {
                state: ToggleState::Enabled,
                rollout: Rollout::FULL,
                last_modified_by: Some("ops".into()),
                ..ToggleRecord::default()
            },
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "key": "analytics_ingestion",
                "state": "enabled",
                "rollout": 1.0,
                "lastModifiedBy": "ops",
            })
        );
    }
}
