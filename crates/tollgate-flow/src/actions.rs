//! Pause and resume.
//!
//! Each action, in order:
//!
//! 1. writes the control toggle (`disabled` / `enabled`, rollout 1)
//! 2. primes the control cache with the resulting decision
//! 3. appends a `skipped` run tagged with the action, so the run timeline
//!    shows the change without counting it as an ingestion run
//!
//! Validation happens before any I/O; every later failure is surfaced.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;

use tollgate_core::observability::pipeline_span;
use tollgate_toggles::record::{Rollout, TogglePatch, ToggleState};
use tollgate_toggles::service::ToggleService;

use crate::control::{PipelineControl, PipelineControlState};
use crate::error::{Error, Result};
use crate::ledger::PipelineRunLedger;
use crate::metrics::FlowMetrics;
use crate::run::{RunInput, RunStatus};
use crate::status::{PipelineStatusReporter, PipelineStatusSnapshot};

/// A pipeline control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Disable ingestion.
    Pause,
    /// Re-enable ingestion.
    Resume,
}

impl ControlAction {
    /// Returns the wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }

    const fn target_state(self) -> ToggleState {
        match self {
            Self::Pause => ToggleState::Disabled,
            Self::Resume => ToggleState::Enabled,
        }
    }

    const fn default_reason(self) -> &'static str {
        match self {
            Self::Pause => "Ingestion paused by operator",
            Self::Resume => "Ingestion resumed by operator",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for pause and resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlRequest {
    /// Operator performing the action. Required.
    pub actor: Option<String>,
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Change ticket.
    pub ticket: Option<String>,
}

impl ControlRequest {
    /// A request by `actor` with no reason or ticket.
    #[must_use]
    pub fn by(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            ..Self::default()
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the ticket.
    #[must_use]
    pub fn ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = Some(ticket.into());
        self
    }
}

/// Result of a control action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlActionOutcome {
    /// The decision in force after the action.
    pub control: PipelineControlState,
    /// Refreshed status.
    pub status: PipelineStatusSnapshot,
}

/// Orchestrates pause and resume.
pub struct PipelineControlActions {
    toggles: Arc<ToggleService>,
    control: Arc<PipelineControl>,
    ledger: Arc<PipelineRunLedger>,
    reporter: Arc<PipelineStatusReporter>,
    metrics: FlowMetrics,
}

impl fmt::Debug for PipelineControlActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineControlActions")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl PipelineControlActions {
    /// Creates the action orchestrator.
    #[must_use]
    pub fn new(
        toggles: Arc<ToggleService>,
        control: Arc<PipelineControl>,
        ledger: Arc<PipelineRunLedger>,
        reporter: Arc<PipelineStatusReporter>,
    ) -> Self {
        Self {
            toggles,
            control,
            ledger,
            reporter,
            metrics: FlowMetrics::new(),
        }
    }

    /// Pauses ingestion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActorRequired`] before any I/O if the actor is missing.
    /// Propagates toggle write, audit and ledger failures.
    pub async fn pause(&self, request: ControlRequest) -> Result<ControlActionOutcome> {
        self.apply(ControlAction::Pause, request).await
    }

    /// Resumes ingestion.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineControlActions::pause`].
    pub async fn resume(&self, request: ControlRequest) -> Result<ControlActionOutcome> {
        self.apply(ControlAction::Resume, request).await
    }

    /// Runs `action`.
    ///
    /// # Errors
    ///
    /// Same as [`PipelineControlActions::pause`].
    pub async fn apply(
        &self,
        action: ControlAction,
        request: ControlRequest,
    ) -> Result<ControlActionOutcome> {
        let actor = non_blank(request.actor).ok_or(Error::ActorRequired)?;
        let span = pipeline_span(action.as_str(), &actor);
        self.execute(action, actor, request.reason, request.ticket)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        action: ControlAction,
        actor: String,
        reason: Option<String>,
        ticket: Option<String>,
    ) -> Result<ControlActionOutcome> {
        let reason = non_blank(reason).unwrap_or_else(|| action.default_reason().to_string());
        let ticket = non_blank(ticket);

        let mut patch = TogglePatch::default()
            .state(action.target_state())
            .rollout(Rollout::FULL)
            .description(reason.clone());
        if ticket.is_some() {
            patch = patch.ticket(ticket.clone());
        }
        let entry = self
            .toggles
            .upsert_patch(self.control.control_key(), patch, Some(&actor))
            .await?;

        self.control
            .prime(PipelineControlState::from_toggle(&entry))
            .await;

        self.ledger
            .record(
                RunInput::new(RunStatus::Skipped)
                    .triggered_by(actor.clone())
                    .metadata(json!({
                        "controlAction": action.as_str(),
                        "reason": reason,
                        "ticket": ticket,
                    })),
            )
            .await?;

        self.metrics.record_control_action(action.as_str());
        tracing::info!(%action, %actor, "pipeline control action applied");

        let control = self.control.evaluate(false).await;
        let status = self.reporter.status().await;
        Ok(ControlActionOutcome { control, status })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
