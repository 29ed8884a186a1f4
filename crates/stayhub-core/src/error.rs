//! Core domain errors.

use thiserror::Error;

/// Errors raised while evaluating a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Task type not handled by the receiving unit.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// A filter bound or parameter could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The unit replied with a different output than the caller asked for.
    #[error("Unexpected task output: expected {expected}, got {found}")]
    UnexpectedOutput {
        expected: &'static str,
        found: &'static str,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
