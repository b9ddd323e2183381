use tokio::sync::mpsc;

use crate::error::{Result, SchedulerError};
use crate::types::{TaskExecutionInfo, TaskExecutionResult};

/// Runs dispatched executions on behalf of the scheduling loop.
///
/// `submit` must return immediately; the work happens elsewhere and exactly
/// one [`TaskExecutionResult`] per submission is sent back through `feed`.
/// Losing the lock race is reported with
/// [`ExecutionError::LockOccupied`](crate::ExecutionError::LockOccupied).
pub trait Executor: Send + Sync {
    fn submit(&self, info: TaskExecutionInfo, feed: ResultFeed);
}

/// Sending half of the result channel into the scheduling loop.
#[derive(Debug, Clone)]
pub struct ResultFeed {
    tx: mpsc::Sender<TaskExecutionResult>,
}

impl ResultFeed {
    /// Create a bounded result channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TaskExecutionResult>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a result, waiting while the channel is full.
    pub async fn push_result(&self, result: TaskExecutionResult) -> Result<()> {
        self.tx
            .send(result)
            .await
            .map_err(|_| SchedulerError::ChannelClosed { channel: "result" })
    }

    /// Enqueue a result without waiting.
    pub fn try_push_result(&self, result: TaskExecutionResult) -> Result<()> {
        self.tx.try_send(result).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::ChannelFull { channel: "result" },
            mpsc::error::TrySendError::Closed(_) => {
                SchedulerError::ChannelClosed { channel: "result" }
            }
        })
    }
}
