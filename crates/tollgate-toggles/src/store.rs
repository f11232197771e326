//! Whole-document toggle storage.
//!
//! [`SecretBackedToggleStore`] reads and writes the entire toggle document in
//! one call. It runs in one of two modes:
//!
//! - **Secret**: the document lives in a [`SecretService`] under a configured
//!   secret ID. Every write creates a new secret version, tagged with a fresh
//!   idempotency token.
//! - **Static**: no secret is configured. Reads return a fixed document
//!   provided at startup and writes touch nothing outside the process. Used for
//!   local and offline modes.
//!
//! There is no conditional write: two writers whose reads interleave will
//! resolve last-writer-wins at the document level.

use std::fmt;
use std::sync::Arc;

use tollgate_core::{Error, Result, SecretService};

use crate::document::{ToggleMap, encode_payload, parse_payload};
use crate::metrics::ToggleMetrics;

/// Version token carried by a loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionToken {
    /// The static document. Never expires.
    Static,
    /// A version assigned by the secret service.
    Secret(String),
}

impl VersionToken {
    /// Returns true for the never-expiring static token.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self, Self::Static)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Secret(version) => f.write_str(version),
        }
    }
}

/// A loaded toggle document and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleSnapshot {
    /// The toggle collection.
    pub data: ToggleMap,
    /// Version token of the collection as a whole.
    pub version: VersionToken,
}

enum ToggleSource {
    Secret {
        service: Arc<dyn SecretService>,
        secret_id: String,
    },
    Static {
        document: ToggleMap,
    },
}

/// Reads and writes the whole toggle document.
pub struct SecretBackedToggleStore {
    source: ToggleSource,
    metrics: ToggleMetrics,
}

impl fmt::Debug for SecretBackedToggleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SecretBackedToggleStore");
        match &self.source {
            ToggleSource::Secret { secret_id, .. } => {
                debug.field("mode", &"secret").field("secret_id", secret_id);
            }
            ToggleSource::Static { document } => {
                debug.field("mode", &"static").field("toggles", &document.len());
            }
        }
        debug.finish_non_exhaustive()
    }
}

impl SecretBackedToggleStore {
    /// Creates a store backed by a secret in the given service.
    #[must_use]
    pub fn secret(service: Arc<dyn SecretService>, secret_id: impl Into<String>) -> Self {
        Self {
            source: ToggleSource::Secret {
                service,
                secret_id: secret_id.into(),
            },
            metrics: ToggleMetrics::new(),
        }
    }

    /// Creates a store that serves a fixed document.
    #[must_use]
    pub fn fixed(document: ToggleMap) -> Self {
        Self {
            source: ToggleSource::Static { document },
            metrics: ToggleMetrics::new(),
        }
    }

    /// Returns true when no external secret is configured.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self.source, ToggleSource::Static { .. })
    }

    const fn mode(&self) -> &'static str {
        match self.source {
            ToggleSource::Secret { .. } => "secret",
            ToggleSource::Static { .. } => "static",
        }
    }

    /// Reads the whole toggle document.
    ///
    /// A secret that has never been written reads as an empty document.
    ///
    /// # Errors
    ///
    /// Propagates secret-service failures unchanged and returns
    /// `Error::InvalidInput` if the stored payload is malformed.
    #[tracing::instrument(skip(self), fields(mode = self.mode(), version = tracing::field::Empty))]
    pub async fn read_all(&self) -> Result<ToggleSnapshot> {
        let result = match &self.source {
            ToggleSource::Static { document } => Ok(ToggleSnapshot {
                data: document.clone(),
                version: VersionToken::Static,
            }),
            ToggleSource::Secret { service, secret_id } => {
                match service.get_current_version(secret_id).await {
                    Ok(current) => parse_payload(&current.payload).map(|data| ToggleSnapshot {
                        data,
                        version: VersionToken::Secret(current.version),
                    }),
                    Err(Error::NotFound(_)) => {
                        tracing::warn!(%secret_id, "toggle secret has no versions; using an empty document");
                        Ok(ToggleSnapshot {
                            data: ToggleMap::new(),
                            version: VersionToken::Secret(String::new()),
                        })
                    }
                    Err(e) => Err(e),
                }
            }
        };

        self.metrics.record_store_read(self.mode(), result.is_ok());
        if let Ok(snapshot) = &result {
            tracing::Span::current().record("version", tracing::field::display(&snapshot.version));
            self.metrics.set_document_size(snapshot.data.len());
        }
        result
    }

    /// Replaces the whole toggle document.
    ///
    /// In static mode nothing outside the process is written and the static
    /// token is returned; the caller's cache carries the new document.
    ///
    /// # Errors
    ///
    /// Propagates secret-service failures unchanged. A failed write is never
    /// suppressed.
    #[tracing::instrument(skip(self, next), fields(mode = self.mode(), toggles = next.len()))]
    pub async fn write_all(&self, next: &ToggleMap) -> Result<VersionToken> {
        let result = match &self.source {
            ToggleSource::Static { .. } => {
                tracing::debug!("static toggle document; write kept in process");
                Ok(VersionToken::Static)
            }
            ToggleSource::Secret { service, secret_id } => {
                let payload = encode_payload(next)?;
                let idempotency_token = uuid::Uuid::new_v4().to_string();
                service
                    .put_new_version(secret_id, payload, &idempotency_token)
                    .await
                    .map(VersionToken::Secret)
            }
        };

        self.metrics.record_store_write(self.mode(), result.is_ok());
        match &result {
            Ok(version) => tracing::info!(%version, "toggle document written"),
            Err(e) => tracing::error!(error = %e, "toggle document write failed"),
        }
        result
    }
}
