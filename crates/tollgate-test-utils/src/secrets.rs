//! Secret service with operation tracing.
//!
//! Wraps [`MemorySecretService`] and records every call for test assertions.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tollgate_core::error::{Error, Result};
use tollgate_core::secret::{MemorySecretService, SecretService, SecretVersion};

/// Record of a secret-service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOp {
    /// `get_current_version` call.
    Get {
        /// Secret that was read.
        secret_id: String,
    },
    /// `put_new_version` call.
    Put {
        /// Secret that was written.
        secret_id: String,
        /// Size of the payload written.
        size: usize,
        /// Idempotency token supplied by the caller.
        idempotency_token: String,
    },
}

impl SecretOp {
    /// Returns true for read operations.
    pub const fn is_get(&self) -> bool {
        matches!(self, Self::Get { .. })
    }

    /// Returns true for write operations.
    pub const fn is_put(&self) -> bool {
        matches!(self, Self::Put { .. })
    }
}

/// In-memory secret service with operation tracing and failure injection.
#[derive(Debug, Clone, Default)]
pub struct RecordingSecretService {
    inner: MemorySecretService,
    operations: Arc<Mutex<Vec<SecretOp>>>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
}

impl RecordingSecretService {
    /// Creates an empty recording service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service seeded with one secret.
    #[must_use]
    pub fn with_secret(secret_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            inner: MemorySecretService::with_secret(secret_id, payload),
            ..Self::default()
        }
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<SecretOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns the number of recorded reads.
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.operations().iter().filter(|op| op.is_get()).count()
    }

    /// Returns the number of recorded writes.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.operations().iter().filter(|op| op.is_put()).count()
    }

    /// Injects a failure for every secret ID starting with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.fail_prefixes.lock().expect("lock").push(prefix.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_prefixes.lock().expect("lock").clear();
    }

    /// Reads the current payload directly, without recording an operation.
    pub async fn payload(&self, secret_id: &str) -> Option<Bytes> {
        self.inner
            .get_current_version(secret_id)
            .await
            .ok()
            .map(|v| v.payload)
    }

    fn record(&self, op: SecretOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, secret_id: &str) -> Result<()> {
        let prefixes = self.fail_prefixes.lock().expect("lock");
        if prefixes.iter().any(|p| secret_id.starts_with(p)) {
            return Err(Error::upstream(format!(
                "injected failure for secret: {secret_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SecretService for RecordingSecretService {
    async fn get_current_version(&self, secret_id: &str) -> Result<SecretVersion> {
        self.record(SecretOp::Get {
            secret_id: secret_id.to_string(),
        });
        self.check_failure(secret_id)?;
        self.inner.get_current_version(secret_id).await
    }

    async fn put_new_version(
        &self,
        secret_id: &str,
        payload: Bytes,
        idempotency_token: &str,
    ) -> Result<String> {
        self.record(SecretOp::Put {
            secret_id: secret_id.to_string(),
            size: payload.len(),
            idempotency_token: idempotency_token.to_string(),
        });
        self.check_failure(secret_id)?;
        self.inner
            .put_new_version(secret_id, payload, idempotency_token)
            .await
    }
}
