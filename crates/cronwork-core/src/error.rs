use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronworkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task not found: {name}")]
    TaskNotFound { name: String },
}

impl CronworkError {
    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            CronworkError::Config(_) => "CONFIG_ERROR",
            CronworkError::InvalidTask(_) => "INVALID_TASK",
            CronworkError::TaskNotFound { .. } => "TASK_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, CronworkError>;
