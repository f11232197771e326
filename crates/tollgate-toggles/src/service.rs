//! Toggle facade: list, get and upsert over the cached, audited store.
//!
//! `upsert` is a read-merge-write of the whole document:
//!
//! 1. the key is validated before any I/O
//! 2. the current document is read through the cache
//! 3. the normalized payload is merged over the normalized existing record
//! 4. the whole document is written and the cache primed with it
//! 5. an audit entry is appended
//!
//! If step 4 fails nothing is persisted and nothing is audited. If step 5
//! fails the toggle has already changed durably; whether the caller sees the
//! failure is decided by the recorder's [`AuditFailureMode`].
//!
//! Concurrent upserts are not serialized here. Callers that need strict
//! cross-key consistency must funnel writes through a single writer.
//!
//! [`AuditFailureMode`]: crate::audit::AuditFailureMode

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;

use tollgate_core::observability::toggle_span;
use tollgate_core::{Error, Result, SecretService};

use crate::audit::{ToggleAuditEntry, ToggleAuditRecorder, ToggleAuditSink};
use crate::cache::ToggleCache;
use crate::config::ToggleStoreConfig;
use crate::record::{ToggleEntry, TogglePatch};
use crate::store::SecretBackedToggleStore;

/// Actor recorded when the caller supplies none.
pub const SYSTEM_ACTOR: &str = "system";

/// CRUD surface for individual toggles.
#[derive(Debug)]
pub struct ToggleService {
    cache: Arc<ToggleCache>,
    audit: ToggleAuditRecorder,
}

impl ToggleService {
    /// Creates a facade over an existing cache and recorder.
    #[must_use]
    pub const fn new(cache: Arc<ToggleCache>, audit: ToggleAuditRecorder) -> Self {
        Self { cache, audit }
    }

    /// Wires a facade from configuration.
    ///
    /// `secrets` is only consulted when the configuration names a secret.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the configuration is invalid or names a
    /// secret while no secret service is supplied.
    pub fn from_config(
        config: &ToggleStoreConfig,
        secrets: Option<Arc<dyn SecretService>>,
        sink: Arc<dyn ToggleAuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        let store = match (&config.secret_id, secrets) {
            (Some(secret_id), Some(service)) => {
                SecretBackedToggleStore::secret(service, secret_id.trim())
            }
            (Some(secret_id), None) => {
                return Err(Error::InvalidInput(format!(
                    "toggle secret '{secret_id}' is configured but no secret service was provided"
                )));
            }
            (None, _) => SecretBackedToggleStore::fixed(config.static_document.clone()),
        };
        let cache = Arc::new(ToggleCache::new(store, config.cache_ttl));
        let audit = ToggleAuditRecorder::new(
            sink,
            config.audit_table.clone(),
            config.audit_failure_mode,
        );
        Ok(Self::new(cache, audit))
    }

    /// Returns the cache backing this facade.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ToggleCache> {
        &self.cache
    }

    /// Lists every toggle in document order.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn list(&self, force_refresh: bool) -> Result<Vec<ToggleEntry>> {
        let snapshot = self.cache.get(force_refresh).await?;
        Ok(snapshot
            .data
            .iter()
            .map(|(key, record)| ToggleEntry {
                key: key.clone(),
                record: record.clone(),
            })
            .collect())
    }

    /// Returns one toggle, or `None` if the key is not present.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn get(&self, key: &str) -> Result<Option<ToggleEntry>> {
        self.fetch(key, false).await
    }

    /// Returns one toggle, optionally bypassing the cache.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn fetch(&self, key: &str, force_refresh: bool) -> Result<Option<ToggleEntry>> {
        let key = key.trim();
        let snapshot = self.cache.get(force_refresh).await?;
        Ok(snapshot.data.get(key).map(|record| ToggleEntry {
            key: key.to_string(),
            record: record.clone(),
        }))
    }

    /// Creates or partially updates one toggle from a raw payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` before any I/O if the key is empty or the
    /// payload is not an object. Propagates store write failures, and audit
    /// failures in must-write mode.
    pub async fn upsert(
        &self,
        key: &str,
        payload: &Value,
        actor: Option<&str>,
    ) -> Result<ToggleEntry> {
        let key = validate_key(key)?;
        let patch = TogglePatch::normalize(payload)?;
        self.apply(key, patch, actor)
            .instrument(toggle_span("upsert", key))
            .await
    }

    /// Creates or partially updates one toggle from a typed patch.
    ///
    /// # Errors
    ///
    /// Same as [`ToggleService::upsert`].
    pub async fn upsert_patch(
        &self,
        key: &str,
        patch: TogglePatch,
        actor: Option<&str>,
    ) -> Result<ToggleEntry> {
        let key = validate_key(key)?;
        self.apply(key, patch, actor)
            .instrument(toggle_span("upsert", key))
            .await
    }

    async fn apply(&self, key: &str, patch: TogglePatch, actor: Option<&str>) -> Result<ToggleEntry> {
        let actor = actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(SYSTEM_ACTOR);

        let snapshot = self.cache.get(false).await?;
        let previous = snapshot.data.get(key).cloned();

        let mut next = patch.apply_to(previous.clone().unwrap_or_default());
        next.last_modified_at = Some(Utc::now());
        next.last_modified_by = Some(actor.to_string());

        let mut document = snapshot.data.clone();
        document.insert(key.to_string(), next.clone());
        drop(snapshot);
        self.cache.write(document).await?;

        tracing::info!(
            %actor,
            state = %next.state,
            rollout = next.rollout.value(),
            created = previous.is_none(),
            "toggle updated"
        );

        self.audit
            .record(ToggleAuditEntry::transition(
                key,
                previous.as_ref(),
                &next,
                actor,
            ))
            .await?;

        Ok(ToggleEntry {
            key: key.to_string(),
            record: next,
        })
    }
}

fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidInput("toggle key is required".to_string()));
    }
    Ok(key)
}
