//! Errors raised by relational store backends.

use thiserror::Error;

use safelens_core::SafelensError;

/// Failure to execute a query against the relational store.
///
/// The payload is the raw driver message. It is recorded on the workflow
/// state for the clarification agent and never shown to users verbatim.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("executor task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// The underlying driver message without the variant prefix.
    pub fn driver_message(&self) -> &str {
        match self {
            StoreError::Connect(msg) | StoreError::Query(msg) | StoreError::Join(msg) => msg,
        }
    }
}

impl From<StoreError> for SafelensError {
    fn from(err: StoreError) -> Self {
        SafelensError::Storage(err.to_string())
    }
}
