//! Pipeline run records.
//!
//! Raw run reports are coerced once, at the boundary, into closed types:
//! [`RunStatus`] for status, [`EventCount`] for counters, and optional
//! timestamps that drop anything that is not RFC 3339. [`RunInput`] is the
//! raw-but-typed report; [`PipelineRunRecord`] is what the ledger stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use tollgate_core::{Error, Result, RunId};

/// Outcome of one pipeline run attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run delivered its batches.
    #[default]
    Success,
    /// The run failed.
    Failed,
    /// The run did not execute, e.g. a control action.
    Skipped,
    /// The run found nothing to do.
    Idle,
}

impl RunStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 4] = [Self::Success, Self::Failed, Self::Skipped, Self::Idle];

    /// Returns the wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Idle => "idle",
        }
    }

    /// Returns true for runs that count as healthy.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Success | Self::Idle)
    }

    /// Coerces an arbitrary JSON value. Unrecognized input becomes `Success`.
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown run status '{s}'")))
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self::coerce(&Value::deserialize(deserializer)?))
    }
}

/// A non-negative event or batch counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EventCount(u64);

impl EventCount {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates a count.
    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the count.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Coerces an arbitrary JSON value. Negative, fractional-invalid and
    /// non-numeric input becomes zero; fractions are truncated.
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        let raw = match value {
            Value::Number(n) => n.as_u64().map(Self).or_else(|| n.as_f64().map(Self::from_f64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Self::from_f64),
            _ => None,
        };
        raw.unwrap_or_default()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(value: f64) -> Self {
        if value.is_finite() && value > 0.0 {
            Self(value.trunc() as u64)
        } else {
            Self::ZERO
        }
    }
}

impl From<u64> for EventCount {
    fn from(count: u64) -> Self {
        Self(count)
    }
}

impl<'de> Deserialize<'de> for EventCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self::coerce(&Value::deserialize(deserializer)?))
    }
}

/// A run report as submitted by the pipeline or a control action.
///
/// Deserialization never fails on field values: every field is coerced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunInput {
    /// Reported status.
    pub status: RunStatus,
    /// Start time; invalid input reads as absent.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    /// Finish time; invalid input reads as absent.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Events ingested.
    pub events_processed: EventCount,
    /// Events rejected.
    pub events_failed: EventCount,
    /// Batches delivered downstream.
    pub batches_delivered: EventCount,
    /// Events purged by retention.
    pub purged_events: EventCount,
    /// Who or what triggered the run.
    #[serde(deserialize_with = "lenient_text")]
    pub triggered_by: Option<String>,
    /// Error message for failed runs.
    #[serde(deserialize_with = "lenient_text")]
    pub last_error: Option<String>,
    /// Free-form metadata. Anything but an object is replaced by `{}`.
    pub metadata: Value,
}

impl RunInput {
    /// Creates a report with the given status and every other field unset.
    #[must_use]
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Coerces a raw JSON report.
    #[must_use]
    pub fn normalize(raw: &Value) -> Self {
        if raw.is_object() {
            serde_json::from_value(raw.clone()).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Sets the trigger.
    #[must_use]
    pub fn triggered_by(mut self, actor: impl Into<String>) -> Self {
        self.triggered_by = Some(actor.into());
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunRecord {
    /// Record identifier.
    pub id: RunId,
    /// Run outcome.
    pub status: RunStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Finish time.
    pub finished_at: DateTime<Utc>,
    /// Events ingested.
    pub events_processed: EventCount,
    /// Events rejected.
    pub events_failed: EventCount,
    /// Batches delivered downstream.
    pub batches_delivered: EventCount,
    /// Events purged by retention.
    pub purged_events: EventCount,
    /// Who or what triggered the run.
    pub triggered_by: Option<String>,
    /// Error message for failed runs.
    pub last_error: Option<String>,
    /// Free-form metadata object.
    pub metadata: Map<String, Value>,
}

impl PipelineRunRecord {
    /// Builds the stored record from a report.
    ///
    /// A missing start time becomes `now`; a missing finish time becomes the
    /// start time.
    #[must_use]
    pub fn from_input(input: RunInput, now: DateTime<Utc>) -> Self {
        let started_at = input.started_at.unwrap_or(now);
        let metadata = match input.metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: RunId::generate(),
            status: input.status,
            started_at,
            finished_at: input.finished_at.unwrap_or(started_at),
            events_processed: input.events_processed,
            events_failed: input.events_failed,
            batches_delivered: input.batches_delivered,
            purged_events: input.purged_events,
            triggered_by: input.triggered_by,
            last_error: input.last_error,
            metadata,
        }
    }
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
