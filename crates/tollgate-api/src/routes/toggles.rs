//! Toggle CRUD routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tollgate_toggles::record::ToggleEntry;

use super::ACTOR_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Toggle routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/toggles", get(list_toggles))
        .route("/toggles/:key", get(get_toggle).put(upsert_toggle))
}

/// Query parameters for listing toggles.
#[derive(Debug, Default, Deserialize)]
pub struct ListTogglesQuery {
    /// Bypass the toggle cache.
    #[serde(default)]
    pub refresh: bool,
}

/// Response for listing toggles.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListTogglesResponse {
    /// Every toggle.
    pub toggles: Vec<ToggleEntry>,
}

/// List toggles.
///
/// GET /api/v1/toggles
pub(crate) async fn list_toggles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTogglesQuery>,
) -> ApiResult<Json<ListTogglesResponse>> {
    let toggles = state.toggles.list(query.refresh).await?;
    tracing::debug!(count = toggles.len(), refresh = query.refresh, "Listing toggles");
    Ok(Json(ListTogglesResponse { toggles }))
}

/// Get one toggle.
///
/// GET /api/v1/toggles/:key
pub(crate) async fn get_toggle(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<ToggleEntry>> {
    state
        .toggles
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("toggle not found: {key}")))
}

/// Create or partially update one toggle.
///
/// PUT /api/v1/toggles/:key
pub(crate) async fn upsert_toggle(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> ApiResult<Json<ToggleEntry>> {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    tracing::info!(key = %key, actor = ?actor, "Upserting toggle");
    Ok(Json(
        state.toggles.upsert(&key, &payload, actor.as_deref()).await?,
    ))
}
