//! Error types for metric queries.

use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Rejected before touching the store.
    #[error("{0}")]
    Invalid(String),

    /// The metrics store failed; carries the underlying cause.
    #[error("metrics store error: {0}")]
    Store(String),
}
