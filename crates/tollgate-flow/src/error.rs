//! Error types for the pipeline control domain.

/// The result type used throughout tollgate-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipeline control operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A control action was requested without an actor.
    #[error("actor is required for pipeline control actions")]
    ActorRequired,

    /// An error from a toggle or store operation.
    #[error(transparent)]
    Core(#[from] tollgate_core::Error),
}

impl Error {
    /// Returns true if the error was raised before any I/O because the input
    /// was invalid.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        match self {
            Self::ActorRequired => true,
            Self::Core(inner) => inner.is_validation(),
        }
    }

    /// Returns true if an upstream dependency failed.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        match self {
            Self::ActorRequired => false,
            Self::Core(inner) => inner.is_upstream(),
        }
    }
}
