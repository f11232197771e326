//! Pipeline control evaluation.
//!
//! The effective "should ingestion run" decision is resolved from three
//! layers, first match wins:
//!
//! 1. the deploy-time `ingestion_disabled` flag (static for the process)
//! 2. a cached decision younger than the control TTL
//! 3. the control toggle, read through the toggle cache
//!
//! If the toggle read fails the [`FetchFailurePolicy`] decides the outcome.
//! The default fails open so that a control-plane outage never halts
//! ingestion on its own.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use tollgate_core::{Error, Result};
use tollgate_toggles::record::{Rollout, ToggleEntry, ToggleState};
use tollgate_toggles::service::ToggleService;

use crate::metrics::FlowMetrics;

/// Default toggle key gating the ingestion pipeline.
pub const DEFAULT_CONTROL_KEY: &str = "analytics_ingestion";

/// Default lifetime of a cached control decision.
pub const DEFAULT_CONTROL_TTL: Duration = Duration::from_secs(30);

/// Reason reported when the deploy-time flag disables ingestion.
pub const REASON_DISABLED_BY_ENV: &str = "ingestion_disabled_by_environment";
/// Reason reported when the control toggle could not be read.
pub const REASON_FETCH_FAILED: &str = "toggle_fetch_failed";
/// Reason reported when the control toggle does not exist.
pub const REASON_NOT_CONFIGURED: &str = "toggle_not_configured";

/// What the evaluator does when the control toggle cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailurePolicy {
    /// Keep the pipeline running.
    #[default]
    FailOpen,
    /// Stop the pipeline until the toggle can be read again.
    FailClosed,
}

impl FetchFailurePolicy {
    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailOpen => "fail_open",
            Self::FailClosed => "fail_closed",
        }
    }

    const fn enabled(self) -> bool {
        matches!(self, Self::FailOpen)
    }
}

impl FromStr for FetchFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(Error::InvalidInput(format!(
                "unknown fetch failure policy '{other}'"
            ))),
        }
    }
}

/// Pipeline control configuration.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Toggle key consulted for the decision.
    pub control_key: String,
    /// Deploy-time override. When set, ingestion is disabled regardless of the toggle.
    pub ingestion_disabled: bool,
    /// Lifetime of a cached decision.
    pub cache_ttl: Duration,
    /// Outcome when the toggle read fails.
    pub fetch_failure_policy: FetchFailurePolicy,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_key: DEFAULT_CONTROL_KEY.to_string(),
            ingestion_disabled: false,
            cache_ttl: DEFAULT_CONTROL_TTL,
            fetch_failure_policy: FetchFailurePolicy::default(),
        }
    }
}

/// Layer that resolved a control decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSource {
    /// Deploy-time override.
    Env,
    /// The control toggle.
    FeatureToggle,
    /// Fallback when the toggle is missing or unreadable.
    Default,
}

impl ControlSource {
    /// Returns the wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::FeatureToggle => "feature_toggle",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ControlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The effective control decision at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineControlState {
    /// Whether ingestion may run.
    pub enabled: bool,
    /// Layer that produced the decision.
    pub source: ControlSource,
    /// Machine-readable reason.
    pub reason: String,
    /// Control toggle state, when the toggle was consulted.
    pub toggle_state: Option<ToggleState>,
    /// Control toggle rollout, when the toggle was consulted.
    pub rollout: Option<Rollout>,
    /// Control toggle owner.
    pub owner: Option<String>,
    /// When the decision was handed out.
    pub evaluated_at: DateTime<Utc>,
    /// Present when the decision is a fallback for a failed read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl PipelineControlState {
    /// Decision forced by the deploy-time flag.
    #[must_use]
    pub fn disabled_by_env() -> Self {
        Self::fallback(false, ControlSource::Env, REASON_DISABLED_BY_ENV)
    }

    /// Decision derived from the control toggle.
    #[must_use]
    pub fn from_toggle(entry: &ToggleEntry) -> Self {
        let record = &entry.record;
        Self {
            enabled: record.is_active(),
            source: ControlSource::FeatureToggle,
            reason: format!("toggle_{}", record.state),
            toggle_state: Some(record.state),
            rollout: Some(record.rollout),
            owner: record.owner.clone(),
            evaluated_at: Utc::now(),
            warning: None,
        }
    }

    fn fallback(enabled: bool, source: ControlSource, reason: &str) -> Self {
        Self {
            enabled,
            source,
            reason: reason.to_string(),
            toggle_state: None,
            rollout: None,
            owner: None,
            evaluated_at: Utc::now(),
            warning: None,
        }
    }

    fn restamped(&self) -> Self {
        Self {
            evaluated_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[derive(Debug)]
struct CachedDecision {
    state: PipelineControlState,
    expires_at: Option<Instant>,
}

impl CachedDecision {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Resolves the pipeline control decision.
pub struct PipelineControl {
    toggles: Arc<ToggleService>,
    config: ControlConfig,
    cached: RwLock<Option<CachedDecision>>,
    metrics: FlowMetrics,
}

impl fmt::Debug for PipelineControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineControl")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineControl {
    /// Creates an evaluator over the given toggle facade.
    #[must_use]
    pub fn new(toggles: Arc<ToggleService>, config: ControlConfig) -> Self {
        Self {
            toggles,
            config,
            cached: RwLock::new(None),
            metrics: FlowMetrics::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Returns the toggle key gating the pipeline.
    #[must_use]
    pub fn control_key(&self) -> &str {
        &self.config.control_key
    }

    /// Evaluates the current decision.
    ///
    /// Never fails: read errors resolve through the fetch-failure policy.
    /// `force_refresh` skips the cached decision and the toggle cache, but
    /// not the deploy-time flag.
    #[tracing::instrument(skip(self), fields(key = %self.config.control_key))]
    pub async fn evaluate(&self, force_refresh: bool) -> PipelineControlState {
        let state = self.resolve(force_refresh).await;
        self.metrics
            .record_control_evaluation(state.source.as_str(), state.enabled);
        tracing::debug!(
            enabled = state.enabled,
            source = %state.source,
            reason = %state.reason,
            "pipeline control evaluated"
        );
        state
    }

    /// Replaces the cached decision, e.g. after a control action already
    /// knows the outcome.
    pub async fn prime(&self, state: PipelineControlState) {
        self.store(state).await;
    }

    /// Drops the cached decision.
    ///
    /// Intended for test harnesses; production reads rely on the TTL.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn resolve(&self, force_refresh: bool) -> PipelineControlState {
        if self.config.ingestion_disabled {
            let mut cached = self.cached.write().await;
            if let Some(entry) = cached
                .as_ref()
                .filter(|e| e.state.source == ControlSource::Env)
            {
                return entry.state.restamped();
            }
            let state = PipelineControlState::disabled_by_env();
            *cached = Some(CachedDecision {
                state: state.clone(),
                expires_at: None,
            });
            return state;
        }

        if !force_refresh {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(Instant::now())) {
                return entry.state.restamped();
            }
        }

        let state = match self
            .toggles
            .fetch(&self.config.control_key, force_refresh)
            .await
        {
            Ok(Some(entry)) => PipelineControlState::from_toggle(&entry),
            Ok(None) => {
                PipelineControlState::fallback(true, ControlSource::Default, REASON_NOT_CONFIGURED)
            }
            Err(e) => {
                let policy = self.config.fetch_failure_policy;
                tracing::warn!(
                    error = %e,
                    policy = policy.as_str(),
                    "control toggle read failed; using fallback decision"
                );
                PipelineControlState {
                    warning: Some(e.to_string()),
                    ..PipelineControlState::fallback(
                        policy.enabled(),
                        ControlSource::Default,
                        REASON_FETCH_FAILED,
                    )
                }
            }
        };
        self.store(state.clone()).await;
        state
    }

    async fn store(&self, state: PipelineControlState) {
        *self.cached.write().await = Some(CachedDecision {
            state,
            expires_at: Some(Instant::now() + self.config.cache_ttl),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tollgate_test_utils::fixtures::{TOGGLE_SECRET_ID, control_document, seeded_secrets};
    use tollgate_test_utils::RecordingSecretService;
    use tollgate_toggles::audit::{AuditFailureMode, AuditTable, MemoryAuditSink, ToggleAuditRecorder};
    use tollgate_toggles::cache::ToggleCache;
    use tollgate_toggles::store::SecretBackedToggleStore;

    fn toggles_over(secrets: &RecordingSecretService) -> Arc<ToggleService> {
        let store = SecretBackedToggleStore::secret(Arc::new(secrets.clone()), TOGGLE_SECRET_ID);
        let cache = Arc::new(ToggleCache::new(store, Duration::from_secs(60)));
        let audit = ToggleAuditRecorder::new(
            Arc::new(MemoryAuditSink::new()),
            AuditTable::default(),
            AuditFailureMode::MustWrite,
        );
        Arc::new(ToggleService::new(cache, audit))
    }

    fn control(secrets: &RecordingSecretService, config: ControlConfig) -> PipelineControl {
        PipelineControl::new(toggles_over(secrets), config)
    }

    #[tokio::test]
    async fn env_override_wins_over_enabled_toggle() {
        let secrets = seeded_secrets(&control_document("enabled"));
        let control = control(
            &secrets,
            ControlConfig {
                ingestion_disabled: true,
                ..ControlConfig::default()
            },
        );

        for force in [false, true] {
            let state = control.evaluate(force).await;
            assert!(!state.enabled);
            assert_eq!(state.source, ControlSource::Env);
        }
        assert!(secrets.operations().is_empty());
    }

    #[tokio::test]
    async fn toggle_state_drives_decision() {
        for (state, enabled) in [
            ("enabled", true),
            ("pilot", true),
            ("staging", true),
            ("disabled", false),
            ("sunset", false),
        ] {
            let secrets = seeded_secrets(&control_document(state));
            let decision = control(&secrets, ControlConfig::default()).evaluate(false).await;
            assert_eq!(decision.enabled, enabled, "state {state}");
            assert_eq!(decision.source, ControlSource::FeatureToggle);
            assert_eq!(decision.owner.as_deref(), Some("data-platform"));
        }
    }

    #[tokio::test]
    async fn fetch_failure_fails_open_with_warning() {
        let secrets = seeded_secrets(&control_document("disabled"));
        secrets.inject_failure(TOGGLE_SECRET_ID);
        let state = control(&secrets, ControlConfig::default()).evaluate(false).await;

        assert!(state.enabled);
        assert_eq!(state.source, ControlSource::Default);
        assert_eq!(state.reason, REASON_FETCH_FAILED);
        assert!(state.warning.is_some());
    }

    #[tokio::test]
    async fn fail_closed_policy_disables_on_fetch_failure() {
        let secrets = seeded_secrets(&control_document("enabled"));
        secrets.inject_failure(TOGGLE_SECRET_ID);
        let state = control(
            &secrets,
            ControlConfig {
                fetch_failure_policy: FetchFailurePolicy::FailClosed,
                ..ControlConfig::default()
            },
        )
        .evaluate(false)
        .await;

        assert!(!state.enabled);
        assert_eq!(state.reason, REASON_FETCH_FAILED);
    }

    #[tokio::test]
    async fn missing_toggle_defaults_to_enabled() {
        let secrets = seeded_secrets(&json!({"other": {"state": "disabled"}}));
        let state = control(&secrets, ControlConfig::default()).evaluate(false).await;
        assert!(state.enabled);
        assert_eq!(state.source, ControlSource::Default);
        assert_eq!(state.reason, REASON_NOT_CONFIGURED);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_decision_is_restamped_until_ttl() {
        let secrets = seeded_secrets(&control_document("enabled"));
        let control = control(&secrets, ControlConfig::default());

        let first = control.evaluate(false).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = control.evaluate(false).await;
        assert_eq!(second.enabled, first.enabled);
        assert_eq!(secrets.get_count(), 1);

        control.invalidate().await;
        control.evaluate(false).await;
        assert_eq!(secrets.get_count(), 1, "toggle cache still fresh");

        control.evaluate(true).await;
        assert_eq!(secrets.get_count(), 2);
    }

    #[tokio::test]
    async fn prime_short_circuits_the_fetch() {
        let secrets = seeded_secrets(&control_document("enabled"));
        let control = control(&secrets, ControlConfig::default());

        let mut primed = PipelineControlState::fallback(false, ControlSource::FeatureToggle, "toggle_disabled");
        primed.toggle_state = Some(ToggleState::Disabled);
        control.prime(primed).await;

        let state = control.evaluate(false).await;
        assert!(!state.enabled);
        assert!(secrets.operations().is_empty());
    }

    #[test]
    fn policy_parses_config_spellings() {
        assert_eq!("fail_open".parse::<FetchFailurePolicy>().unwrap(), FetchFailurePolicy::FailOpen);
        assert_eq!("Fail-Closed".parse::<FetchFailurePolicy>().unwrap(), FetchFailurePolicy::FailClosed);
        assert!("maybe".parse::<FetchFailurePolicy>().is_err());
    }

    #[test]
    fn state_serializes_camel_case() {
        let value = serde_json::to_value(PipelineControlState::disabled_by_env()).unwrap();
        assert_eq!(value["source"], "env");
        assert!(value.get("evaluatedAt").is_some());
        assert!(value.get("toggleState").is_some());
        assert!(value.get("warning").is_none());
    }
}
