//! Toggle audit trail.
//!
//! Every persisted toggle write appends one immutable [`ToggleAuditEntry`]
//! capturing the state and rollout before and after the write.
//!
//! ## Design Principles
//!
//! 1. **Append-only**: entries are never updated or deleted
//! 2. **Validated destination**: the audit table name is externally configured
//!    and must pass [`AuditTable::parse`] before it reaches any query
//! 3. **Explicit failure mode**: [`AuditFailureMode`] decides whether a failed
//!    append fails the toggle write
//!
//! The toggle write and the audit append span two systems and are not
//! transactional. In [`AuditFailureMode::MustWrite`] a failed append is
//! surfaced to the caller even though the toggle has already changed.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::{AuditEntryId, Error, Result};

use crate::metrics::ToggleMetrics;
use crate::record::{Rollout, ToggleRecord, ToggleState};

/// Default audit table name.
pub const DEFAULT_AUDIT_TABLE: &str = "feature_toggle_audit";

/// Maximum length of one identifier segment.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Audit row columns, in insert order.
pub const AUDIT_COLUMNS: [&str; 9] = [
    "toggle_key",
    "previous_state",
    "previous_rollout",
    "next_state",
    "next_rollout",
    "actor",
    "changed_at",
    "description",
    "ticket",
];

/// A validated audit table name.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*` segments of at most 63 characters,
/// optionally schema-qualified with a single `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuditTable(String);

impl AuditTable {
    /// Validates a table name.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the name fails the allow-list pattern.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let mut segments = name.split('.');
        let valid = match (segments.next(), segments.next(), segments.next()) {
            (Some(table), None, _) => is_identifier(table),
            (Some(schema), Some(table), None) => is_identifier(schema) && is_identifier(table),
            _ => false,
        };
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(Error::InvalidInput(format!(
                "audit table name '{name}' is not a valid identifier"
            )))
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a parameterised insert statement for SQL-backed sinks.
    #[must_use]
    pub fn insert_statement(&self) -> String {
        let placeholders = (1..=AUDIT_COLUMNS.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.0,
            AUDIT_COLUMNS.join(", ")
        )
    }
}

impl Default for AuditTable {
    fn default() -> Self {
        Self(DEFAULT_AUDIT_TABLE.to_string())
    }
}

impl fmt::Display for AuditTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    segment.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One immutable toggle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleAuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Toggle key.
    pub toggle_key: String,
    /// State before the write (`None` when the toggle was created).
    pub previous_state: Option<ToggleState>,
    /// Rollout before the write (`None` when the toggle was created).
    pub previous_rollout: Option<Rollout>,
    /// State after the write.
    pub next_state: ToggleState,
    /// Rollout after the write.
    pub next_rollout: Rollout,
    /// Who made the change.
    pub actor: String,
    /// When the change was made.
    pub changed_at: DateTime<Utc>,
    /// Description after the write.
    pub description: Option<String>,
    /// Ticket after the write.
    pub ticket: Option<String>,
}

impl ToggleAuditEntry {
    /// Builds the entry for a transition from `previous` to `next`.
    #[must_use]
    pub fn transition(
        toggle_key: impl Into<String>,
        previous: Option<&ToggleRecord>,
        next: &ToggleRecord,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEntryId::generate(),
            toggle_key: toggle_key.into(),
            previous_state: previous.map(|p| p.state),
            previous_rollout: previous.map(|p| p.rollout),
            next_state: next.state,
            next_rollout: next.rollout,
            actor: actor.into(),
            changed_at: next.last_modified_at.unwrap_or_else(Utc::now),
            description: next.description.clone(),
            ticket: next.ticket.clone(),
        }
    }
}

/// Destination for audit rows.
#[async_trait]
pub trait ToggleAuditSink: Send + Sync {
    /// Appends one row to `table`.
    async fn append(&self, table: &AuditTable, entry: &ToggleAuditEntry) -> Result<()>;
}

/// Whether a failed audit append fails the toggle write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditFailureMode {
    /// Fail the write. The toggle change has already been persisted.
    #[default]
    MustWrite,
    /// Log and count the failure; the write succeeds.
    BestEffort,
}

impl AuditFailureMode {
    /// Returns the configuration name of this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MustWrite => "must_write",
            Self::BestEffort => "best_effort",
        }
    }
}

impl FromStr for AuditFailureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "must_write" => Ok(Self::MustWrite),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(Error::InvalidInput(format!(
                "unknown audit failure mode '{other}' (expected must_write or best_effort)"
            ))),
        }
    }
}

/// Appends audit entries to a sink under a validated table name.
#[derive(Clone)]
pub struct ToggleAuditRecorder {
    sink: Arc<dyn ToggleAuditSink>,
    table: AuditTable,
    mode: AuditFailureMode,
    metrics: ToggleMetrics,
}

impl fmt::Debug for ToggleAuditRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggleAuditRecorder")
            .field("table", &self.table)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ToggleAuditRecorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new(sink: Arc<dyn ToggleAuditSink>, table: AuditTable, mode: AuditFailureMode) -> Self {
        Self {
            sink,
            table,
            mode,
            metrics: ToggleMetrics::new(),
        }
    }

    /// Returns the destination table.
    #[must_use]
    pub const fn table(&self) -> &AuditTable {
        &self.table
    }

    /// Returns the failure mode.
    #[must_use]
    pub const fn mode(&self) -> AuditFailureMode {
        self.mode
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// In [`AuditFailureMode::MustWrite`], propagates the sink failure.
    #[tracing::instrument(skip(self, entry), fields(table = %self.table, key = %entry.toggle_key))]
    pub async fn record(&self, entry: ToggleAuditEntry) -> Result<()> {
        match self.sink.append(&self.table, &entry).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.metrics.record_audit_failure(self.mode.as_str());
                tracing::error!(
                    error = %e,
                    entry_id = %entry.id,
                    failure_mode = self.mode.as_str(),
                    "toggle audit append failed after the toggle write was persisted"
                );
                match self.mode {
                    AuditFailureMode::MustWrite => Err(e),
                    AuditFailureMode::BestEffort => Ok(()),
                }
            }
        }
    }
}

/// Audit sink that emits rows as structured events on the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl ToggleAuditSink for TracingAuditSink {
    async fn append(&self, table: &AuditTable, entry: &ToggleAuditEntry) -> Result<()> {
        tracing::info!(
            target: "audit",
            table = %table,
            entry_id = %entry.id,
            toggle_key = %entry.toggle_key,
            previous_state = ?entry.previous_state,
            previous_rollout = ?entry.previous_rollout.map(Rollout::value),
            next_state = %entry.next_state,
            next_rollout = entry.next_rollout.value(),
            actor = %entry.actor,
            changed_at = %entry.changed_at,
            ticket = ?entry.ticket,
            "toggle_transition"
        );
        Ok(())
    }
}

/// In-memory audit sink that captures rows for assertions and local mode.
///
/// Supports failure injection so callers can exercise the partial-write path.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    rows: Mutex<Vec<(AuditTable, ToggleAuditEntry)>>,
    failing: Mutex<Option<String>>,
}

impl MemoryAuditSink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail with the given message.
    pub fn inject_failure(&self, message: impl Into<String>) {
        if let Ok(mut guard) = self.failing.lock() {
            *guard = Some(message.into());
        }
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self) {
        if let Ok(mut guard) = self.failing.lock() {
            *guard = None;
        }
    }

    /// Returns a copy of all captured entries.
    #[must_use]
    pub fn entries(&self) -> Vec<ToggleAuditEntry> {
        self.rows
            .lock()
            .map(|guard| guard.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the captured entries for one toggle key.
    #[must_use]
    pub fn entries_for(&self, key: &str) -> Vec<ToggleAuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.toggle_key == key)
            .collect()
    }

    /// Returns the tables rows were written to, in append order.
    #[must_use]
    pub fn tables(&self) -> Vec<AuditTable> {
        self.rows
            .lock()
            .map(|guard| guard.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of captured entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if no entries have been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ToggleAuditSink for MemoryAuditSink {
    async fn append(&self, table: &AuditTable, entry: &ToggleAuditEntry) -> Result<()> {
        let failure = self
            .failing
            .lock()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .clone();
        if let Some(message) = failure {
            return Err(Error::upstream(message));
        }

        self.rows
            .lock()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .push((table.clone(), entry.clone()));
        Ok(())
    }
}
