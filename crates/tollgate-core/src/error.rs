//! Error types and result aliases for tollgate.
//!
//! The variants follow the failure taxonomy every component shares:
//! validation failures are rejected before any I/O, upstream failures carry
//! the transport error that caused them.

/// The result type used throughout tollgate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tollgate operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided. Raised before any I/O is attempted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An upstream system (secret service, audit sink, ledger store) failed.
    #[error("upstream unavailable: {message}")]
    Upstream {
        /// Description of the upstream failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new upstream error with the given message.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new upstream error with a source cause.
    #[must_use]
    pub fn upstream_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error was raised before any I/O took place.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidId { .. })
    }

    /// Returns true if this error came from an upstream system.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn upstream_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline exceeded");
        let err = Error::upstream_with_source("secret fetch failed", source);
        assert!(err.to_string().contains("upstream unavailable"));
        assert!(StdError::source(&err).is_some());
        assert!(err.is_upstream());
        assert!(!err.is_validation());
    }

    #[test]
    fn invalid_input_is_validation() {
        let err = Error::InvalidInput("toggle key is required".into());
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "invalid input: toggle key is required");
    }
}
