//! HTTP server: shared state, router and listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use tollgate_core::{Error, Result, SecretService};
use tollgate_flow::actions::PipelineControlActions;
use tollgate_flow::control::PipelineControl;
use tollgate_flow::ledger::{BacklogStore, PipelineRunLedger, RunStore};
use tollgate_flow::status::PipelineStatusReporter;
use tollgate_toggles::audit::ToggleAuditSink;
use tollgate_toggles::service::ToggleService;

use crate::config::Config;

/// Collaborators the server wires together.
pub struct Backends {
    /// Secret service holding the toggle document. `None` in static mode.
    pub secrets: Option<Arc<dyn SecretService>>,
    /// Destination for toggle audit rows.
    pub audit: Arc<dyn ToggleAuditSink>,
    /// Run ledger storage.
    pub runs: Arc<dyn RunStore>,
    /// Ingestion backlog.
    pub backlog: Arc<dyn BacklogStore>,
}

/// Shared application state.
pub struct AppState {
    /// Toggle facade.
    pub toggles: Arc<ToggleService>,
    /// Control evaluator.
    pub control: Arc<PipelineControl>,
    /// Run ledger.
    pub ledger: Arc<PipelineRunLedger>,
    /// Status reporter.
    pub reporter: Arc<PipelineStatusReporter>,
    /// Pause / resume.
    pub actions: PipelineControlActions,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the toggle and pipeline components from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the toggle configuration is invalid.
    pub fn new(config: &Config, backends: Backends) -> Result<Self> {
        let toggles = Arc::new(ToggleService::from_config(
            &config.toggles,
            backends.secrets,
            backends.audit,
        )?);
        let control = Arc::new(PipelineControl::new(
            Arc::clone(&toggles),
            config.control.clone(),
        ));
        let ledger = Arc::new(PipelineRunLedger::new(backends.runs));
        let reporter = Arc::new(PipelineStatusReporter::new(
            Arc::clone(&control),
            Arc::clone(&ledger),
            backends.backlog,
        ));
        let actions = PipelineControlActions::new(
            Arc::clone(&toggles),
            Arc::clone(&control),
            Arc::clone(&ledger),
            Arc::clone(&reporter),
        );
        Ok(Self {
            toggles,
            control,
            ledger,
            reporter,
            actions,
        })
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Health check endpoint handler.
///
/// Shallow: does not touch the secret service or stores.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", crate::routes::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the HTTP port and serves until the process exits.
///
/// # Errors
///
/// Returns `Error::Internal` if the port cannot be bound or the server fails.
pub async fn serve(config: &Config, state: Arc<AppState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal {
            message: format!("failed to bind to {addr}: {e}"),
        })?;

    tracing::info!(
        http_port = config.http_port,
        control_key = %config.control.control_key,
        static_toggles = config.toggles.secret_id.is_none(),
        "Starting tollgate API server"
    );

    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Internal {
            message: format!("server error: {e}"),
        })
}
