//! Error types for rule repositories.

use thiserror::Error;

pub type RuleResult<T> = Result<T, RuleError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("appName cannot be empty")]
    EmptyApp,

    #[error("{0}")]
    Invalid(String),
}
