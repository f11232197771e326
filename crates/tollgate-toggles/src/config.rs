//! Toggle store configuration.

use std::time::Duration;

use tollgate_core::{Error, Result};

use crate::audit::{AuditFailureMode, AuditTable};
use crate::document::ToggleMap;

/// Default toggle cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Configuration for the toggle store, cache and audit recorder.
#[derive(Debug, Clone)]
pub struct ToggleStoreConfig {
    /// Secret holding the toggle document. `None` selects static mode.
    pub secret_id: Option<String>,
    /// Document served in static mode.
    pub static_document: ToggleMap,
    /// Cache TTL. Values below [`crate::cache::MIN_CACHE_TTL`] are raised to it.
    pub cache_ttl: Duration,
    /// Destination table for audit rows.
    pub audit_table: AuditTable,
    /// Whether a failed audit append fails the write.
    pub audit_failure_mode: AuditFailureMode,
}

impl Default for ToggleStoreConfig {
    fn default() -> Self {
        Self {
            secret_id: None,
            static_document: ToggleMap::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            audit_table: AuditTable::default(),
            audit_failure_mode: AuditFailureMode::default(),
        }
    }
}

impl ToggleStoreConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if a secret ID is configured but blank.
    pub fn validate(&self) -> Result<()> {
        if self
            .secret_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(Error::InvalidInput(
                "toggle secret ID cannot be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_static_and_valid() {
        let config = ToggleStoreConfig::default();
        assert!(config.secret_id.is_none());
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.audit_failure_mode, AuditFailureMode::MustWrite);
        config.validate().unwrap();
    }

    #[test]
    fn blank_secret_id_is_rejected() {
        let config = ToggleStoreConfig {
            secret_id: Some("  ".into()),
            ..ToggleStoreConfig::default()
        };
        assert!(config.validate().unwrap_err().is_validation());
    }
}
