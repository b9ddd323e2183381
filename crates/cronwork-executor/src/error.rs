//! Error types for the cronwork-executor crate.

use cronwork_scheduler::ExecutionError;
use thiserror::Error;

/// Failures of the lock service itself, as opposed to losing the race.
#[derive(Debug, Error)]
pub enum LockError {
    /// The backing service could not be reached or refused the request.
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),

    /// The lock name is not usable by the backend.
    #[error("invalid lock name: {0}")]
    InvalidName(String),
}

impl From<LockError> for ExecutionError {
    fn from(e: LockError) -> Self {
        ExecutionError::Lock(e.to_string())
    }
}

/// Convenience alias used by lock service implementations.
pub type LockResult<T> = std::result::Result<T, LockError>;
