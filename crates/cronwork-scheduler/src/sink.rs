use cronwork_core::TaskLogRecord;
use thiserror::Error;

/// Why a log record could not be accepted. Never escalated by the scheduler.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("log queue is full")]
    QueueFull,

    #[error("log sink is closed")]
    Closed,

    #[error("log store error: {0}")]
    Store(String),
}

/// Durable destination for execution history.
///
/// `append` is called from the scheduling loop and must not block it.
pub trait LogSink: Send + Sync {
    fn append(&self, record: TaskLogRecord) -> Result<(), AppendError>;
}
