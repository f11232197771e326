//! Server configuration.
//!
//! Every setting comes from a `TOLLGATE_*` environment variable. Values are
//! trimmed and empty values count as unset. Malformed values are rejected
//! with an error naming the variable.

use std::time::Duration;

use tollgate_core::{Error, LogFormat, Result};
use tollgate_flow::control::{ControlConfig, FetchFailurePolicy};
use tollgate_toggles::audit::{AuditFailureMode, AuditTable};
use tollgate_toggles::config::ToggleStoreConfig;
use tollgate_toggles::document::parse_document;

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub http_port: u16,
    /// Log output format.
    pub log_format: LogFormat,
    /// Toggle store, cache and audit settings.
    pub toggles: ToggleStoreConfig,
    /// Pipeline control settings.
    pub control: ControlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            log_format: LogFormat::default(),
            toggles: ToggleStoreConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` naming the first malformed variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` naming the first malformed variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(port) = env.u16("TOLLGATE_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(format) = env.string("TOLLGATE_LOG_FORMAT") {
            config.log_format = format.parse::<LogFormat>().map_err(|_| {
                Error::InvalidInput(format!(
                    "TOLLGATE_LOG_FORMAT must be one of: pretty, json (got {format})"
                ))
            })?;
        }

        config.toggles.secret_id = env.string("TOLLGATE_TOGGLE_SECRET_ID");
        if let Some(raw) = env.string("TOLLGATE_TOGGLES_JSON") {
            let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                Error::InvalidInput(format!("TOLLGATE_TOGGLES_JSON must be valid JSON: {e}"))
            })?;
            config.toggles.static_document = parse_document(&value).map_err(|e| {
                Error::InvalidInput(format!("TOLLGATE_TOGGLES_JSON is not a toggle document: {e}"))
            })?;
        }
        if let Some(secs) = env.u64("TOLLGATE_TOGGLE_CACHE_TTL_SECS")? {
            config.toggles.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(table) = env.string("TOLLGATE_TOGGLE_AUDIT_TABLE") {
            config.toggles.audit_table = AuditTable::parse(&table).map_err(|e| {
                Error::InvalidInput(format!("TOLLGATE_TOGGLE_AUDIT_TABLE is invalid: {e}"))
            })?;
        }
        if let Some(mode) = env.string("TOLLGATE_TOGGLE_AUDIT_MODE") {
            config.toggles.audit_failure_mode = mode.parse::<AuditFailureMode>().map_err(|_| {
                Error::InvalidInput(format!(
                    "TOLLGATE_TOGGLE_AUDIT_MODE must be one of: must_write, best_effort (got {mode})"
                ))
            })?;
        }

        if let Some(key) = env.string("TOLLGATE_PIPELINE_CONTROL_KEY") {
            config.control.control_key = key;
        }
        if let Some(disabled) = env.bool("TOLLGATE_INGESTION_DISABLED")? {
            config.control.ingestion_disabled = disabled;
        }
        if let Some(secs) = env.u64("TOLLGATE_PIPELINE_CONTROL_TTL_SECS")? {
            config.control.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(policy) = env.string("TOLLGATE_PIPELINE_FETCH_FAILURE") {
            config.control.fetch_failure_policy =
                policy.parse::<FetchFailurePolicy>().map_err(|_| {
                    Error::InvalidInput(format!(
                        "TOLLGATE_PIPELINE_FETCH_FAILURE must be one of: fail_open, fail_closed (got {policy})"
                    ))
                })?;
        }

        config.toggles.validate()?;
        Ok(config)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u16(&self, name: &str) -> Result<Option<u16>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u16>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        parse_bool(name, &v).map(Some)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tollgate_toggles::record::ToggleState;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() -> Result<()> {
        let config = load(&[])?;
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert!(config.toggles.secret_id.is_none());
        assert_eq!(config.toggles.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.toggles.audit_table.as_str(), "feature_toggle_audit");
        assert_eq!(config.toggles.audit_failure_mode, AuditFailureMode::MustWrite);
        assert_eq!(config.control.control_key, "analytics_ingestion");
        assert!(!config.control.ingestion_disabled);
        assert_eq!(config.control.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.control.fetch_failure_policy, FetchFailurePolicy::FailOpen);
        Ok(())
    }

    #[test]
    fn reads_every_variable() -> Result<()> {
        let config = load(&[
            ("TOLLGATE_HTTP_PORT", "9000"),
            ("TOLLGATE_LOG_FORMAT", "json"),
            ("TOLLGATE_TOGGLE_SECRET_ID", " tollgate/toggles "),
            ("TOLLGATE_TOGGLE_CACHE_TTL_SECS", "120"),
            ("TOLLGATE_TOGGLE_AUDIT_TABLE", "audit.toggle_changes"),
            ("TOLLGATE_TOGGLE_AUDIT_MODE", "best_effort"),
            ("TOLLGATE_PIPELINE_CONTROL_KEY", "ingest_v2"),
            ("TOLLGATE_INGESTION_DISABLED", "yes"),
            ("TOLLGATE_PIPELINE_CONTROL_TTL_SECS", "5"),
            ("TOLLGATE_PIPELINE_FETCH_FAILURE", "fail_closed"),
        ])?;
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.toggles.secret_id.as_deref(), Some("tollgate/toggles"));
        assert_eq!(config.toggles.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.toggles.audit_table.as_str(), "audit.toggle_changes");
        assert_eq!(config.toggles.audit_failure_mode, AuditFailureMode::BestEffort);
        assert_eq!(config.control.control_key, "ingest_v2");
        assert!(config.control.ingestion_disabled);
        assert_eq!(config.control.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.control.fetch_failure_policy, FetchFailurePolicy::FailClosed);
        Ok(())
    }

    #[test]
    fn static_document_accepts_list_shape() -> Result<()> {
        let config = load(&[(
            "TOLLGATE_TOGGLES_JSON",
            r#"[{"key": "analytics_ingestion", "state": "disabled"}]"#,
        )])?;
        assert_eq!(
            config.toggles.static_document["analytics_ingestion"].state,
            ToggleState::Disabled
        );
        Ok(())
    }

    #[test]
    fn empty_values_count_as_unset() -> Result<()> {
        let config = load(&[("TOLLGATE_HTTP_PORT", "  "), ("TOLLGATE_TOGGLE_SECRET_ID", "")])?;
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert!(config.toggles.secret_id.is_none());
        Ok(())
    }

    #[test]
    fn malformed_values_name_the_variable() {
        for (name, value) in [
            ("TOLLGATE_HTTP_PORT", "eighty"),
            ("TOLLGATE_INGESTION_DISABLED", "maybe"),
            ("TOLLGATE_TOGGLE_AUDIT_TABLE", "audit; DROP TABLE x"),
            ("TOLLGATE_TOGGLE_AUDIT_MODE", "sometimes"),
            ("TOLLGATE_PIPELINE_FETCH_FAILURE", "fail_sideways"),
            ("TOLLGATE_TOGGLES_JSON", "{not json"),
            ("TOLLGATE_TOGGLES_JSON", "42"),
            ("TOLLGATE_LOG_FORMAT", "xml"),
        ] {
            let err = load(&[(name, value)]).unwrap_err();
            assert!(err.to_string().contains(name), "{name}: {err}");
        }
    }

    #[test]
    fn parse_bool_accepts_both_spellings() {
        assert!(parse_bool("TEST", "TRUE").unwrap());
        assert!(!parse_bool("TEST", "n").unwrap());
        assert!(parse_bool("TEST", "").is_err());
    }
}
