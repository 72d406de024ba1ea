//! Error types for the instance registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Heartbeat parameters failed validation; the message is shown to the sender.
    #[error("{0}")]
    Invalid(String),
}

impl RegistryError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
