//! `tollgate-api` binary entrypoint (local mode).
//!
//! Loads configuration from environment variables and starts the HTTP
//! server with in-memory run and backlog stores.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Result;

use tollgate_api::config::Config;
use tollgate_api::server::{AppState, Backends, serve};
use tollgate_core::init_logging;
use tollgate_core::secret::{MemorySecretService, SecretService};
use tollgate_flow::ledger::{MemoryBacklogStore, MemoryRunStore};
use tollgate_toggles::audit::TracingAuditSink;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(config.log_format);

    let secrets: Option<Arc<dyn SecretService>> = if config.toggles.secret_id.is_some() {
        tracing::warn!("no secret service backend is linked; using an in-memory secret store");
        Some(Arc::new(MemorySecretService::new()))
    } else {
        tracing::info!("TOLLGATE_TOGGLE_SECRET_ID not set; serving the static toggle document");
        None
    };

    let state = AppState::new(
        &config,
        Backends {
            secrets,
            audit: Arc::new(TracingAuditSink),
            runs: Arc::new(MemoryRunStore::new()),
            backlog: Arc::new(MemoryBacklogStore::new()),
        },
    )?;

    serve(&config, Arc::new(state)).await?;
    Ok(())
}
