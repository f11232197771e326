//! Secret service contract for versioned configuration documents.
//!
//! The toggle document lives in an external secret store that versions every
//! write. The contract is deliberately narrow:
//! - `get_current_version` returns the latest payload and its version token
//! - `put_new_version` writes a whole new payload, tagged with an idempotency token
//!
//! The version token is an opaque `String`; backends interpret it according
//! to their own semantics (numeric version, version UUID, `ETag`).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// The current version of a secret.
#[derive(Debug, Clone)]
pub struct SecretVersion {
    /// Raw secret payload.
    pub payload: Bytes,
    /// Opaque version token assigned by the store.
    pub version: String,
}

/// Versioned secret store.
///
/// Implementations must treat every `put_new_version` as a whole-payload
/// replacement. There is no conditional-write primitive in this contract.
#[async_trait]
pub trait SecretService: Send + Sync + 'static {
    /// Reads the current version of a secret.
    ///
    /// Returns `Error::NotFound` if the secret has never been written.
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion>;

    /// Writes a new version of a secret, returning its version token.
    ///
    /// A repeated call with the same `idempotency_token` must not create a
    /// second version.
    async fn put_new_version(
        &self,
        secret_id: &str,
        payload: Bytes,
        idempotency_token: &str,
    ) -> Result<String>;
}

/// In-memory secret service for local mode and testing.
///
/// Thread-safe via `RwLock`. Uses numeric versions (exposed as strings).
#[derive(Debug, Default, Clone)]
pub struct MemorySecretService {
    secrets: Arc<RwLock<HashMap<String, StoredSecret>>>,
}

#[derive(Debug, Clone)]
struct StoredSecret {
    payload: Bytes,
    version: i64,
    idempotency: HashMap<String, i64>,
}

impl MemorySecretService {
    /// Creates a new empty secret service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a secret service seeded with one secret at version 1.
    #[must_use]
    pub fn with_secret(secret_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let service = Self::new();
        if let Ok(mut secrets) = service.secrets.write() {
            secrets.insert(
                secret_id.into(),
                StoredSecret {
                    payload: payload.into(),
                    version: 1,
                    idempotency: HashMap::new(),
                },
            );
        }
        service
    }
}

#[async_trait]
impl SecretService for MemorySecretService {
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
        let secrets = self.secrets.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        secrets
            .get(secret_id)
            .map(|s| SecretVersion {
                payload: s.payload.clone(),
                version: s.version.to_string(),
            })
            .ok_or_else(|| Error::NotFound(format!("secret not found: {secret_id}")))
    }

    async fn put_new_version(
        &self,
        secret_id: &str,
        payload: Bytes,
        idempotency_token: &str,
    ) -> Result<String> {
        let mut secrets = self.secrets.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        if let Some(existing) = secrets
            .get(secret_id)
            .and_then(|s| s.idempotency.get(idempotency_token))
        {
            return Ok(existing.to_string());
        }

        let entry = secrets
            .entry(secret_id.to_string())
            .or_insert_with(|| StoredSecret {
                payload: Bytes::new(),
                version: 0,
                idempotency: HashMap::new(),
            });
        entry.version += 1;
        entry.payload = payload;
        entry
            .idempotency
            .insert(idempotency_token.to_string(), entry.version);
        let version = entry.version;
        drop(secrets);

        Ok(version.to_string())
    }
}
