use cronwork_core::CronworkError;
use thiserror::Error;

/// Errors returned by [`TaskStore`](crate::TaskStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The task failed validation and was not stored.
    #[error("invalid task {name:?}: {reason}")]
    InvalidTask { name: String, reason: &'static str },

    /// No task with this name exists.
    #[error("task not found: {name}")]
    NotFound { name: String },
}

impl From<StoreError> for CronworkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidTask { .. } => CronworkError::InvalidTask(e.to_string()),
            StoreError::NotFound { name } => CronworkError::TaskNotFound { name },
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
