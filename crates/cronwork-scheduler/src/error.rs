use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The trigger expression could not be compiled, or never fires.
    #[error("Invalid trigger '{expression}': {reason}")]
    InvalidTrigger { expression: String, reason: String },

    /// A bounded channel into the scheduling loop is full.
    #[error("Scheduler {channel} channel is full")]
    ChannelFull { channel: &'static str },

    /// The scheduling loop has stopped and no longer accepts input.
    #[error("Scheduler {channel} channel is closed")]
    ChannelClosed { channel: &'static str },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why an execution did not succeed. Carried inside a result, never raised.
///
/// [`ExecutionError::LockOccupied`] is the lock-contention sentinel: another
/// worker won the race for this due instant, so nothing ran here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("lock already occupied")]
    LockOccupied,

    #[error("lock service error: {0}")]
    Lock(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    /// The command ran and exited non-zero (or was terminated by a signal, -1).
    #[error("exit code {code}")]
    Exit { code: i32 },

    /// Terminated by a kill request.
    #[error("killed")]
    Cancelled,

    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("I/O error: {0}")]
    Io(String),
}

impl ExecutionError {
    pub fn is_lock_occupied(&self) -> bool {
        matches!(self, ExecutionError::LockOccupied)
    }
}
