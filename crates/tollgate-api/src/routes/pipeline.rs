//! Pipeline status and control routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use tollgate_flow::actions::{ControlActionOutcome, ControlRequest};
use tollgate_flow::status::PipelineStatusSnapshot;

use crate::error::ApiResult;
use crate::server::AppState;

/// Pipeline routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pipeline/status", get(status))
        .route("/pipeline/pause", post(pause))
        .route("/pipeline/resume", post(resume))
}

/// Current pipeline status.
///
/// GET /api/v1/pipeline/status
pub(crate) async fn status(State(state): State<Arc<AppState>>) -> Json<PipelineStatusSnapshot> {
    Json(state.reporter.status().await)
}

/// Pause ingestion.
///
/// POST /api/v1/pipeline/pause
pub(crate) async fn pause(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> ApiResult<Json<ControlActionOutcome>> {
    tracing::info!(actor = ?request.actor, "Pausing pipeline");
    Ok(Json(state.actions.pause(request).await?))
}

/// Resume ingestion.
///
/// POST /api/v1/pipeline/resume
pub(crate) async fn resume(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ControlRequest>,
) -> ApiResult<Json<ControlActionOutcome>> {
    tracing::info!(actor = ?request.actor, "Resuming pipeline");
    Ok(Json(state.actions.resume(request).await?))
}
