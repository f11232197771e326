//! HTTP route handlers.

pub mod pipeline;
pub mod toggles;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// Header carrying the authenticated actor, set by the fronting auth layer.
pub const ACTOR_HEADER: &str = "x-tollgate-actor";

/// `/api/v1` routes.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(pipeline::routes())
        .merge(toggles::routes())
}
