//! Pool errors.

use stayhub_core::CoreError;
use thiserror::Error;

/// Errors surfaced to callers of a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The task's computation failed inside its unit.
    #[error("{0}")]
    Task(String),

    /// The unit running the task faulted and was replaced.
    #[error("{0}")]
    Fault(String),

    /// The pool was terminated before the task completed.
    #[error("Worker pool terminated")]
    Terminated,

    /// A unit thread could not be started.
    #[error("Failed to spawn worker unit: {0}")]
    Spawn(String),

    /// Invalid offloading configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] CoreError),
}
