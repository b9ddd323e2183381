use std::sync::Arc;
use std::time::Duration;

use cronwork_core::config::SinkConfig;
use cronwork_core::TaskLogRecord;
use cronwork_scheduler::{AppendError, LogSink};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::store::LogStore;

/// Log sink that queues records and writes them to a [`LogStore`] in batches.
///
/// `append` never waits: a full queue drops the record and reports
/// [`AppendError::QueueFull`]. The paired [`LogWriter`] commits a batch when
/// it reaches `batch_size` records or `commit_timeout` after its first record,
/// whichever comes first.
#[derive(Debug, Clone)]
pub struct BatchingLogSink {
    tx: mpsc::Sender<TaskLogRecord>,
}

impl BatchingLogSink {
    pub fn new(store: Arc<LogStore>, config: &SinkConfig) -> (Self, LogWriter) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let writer = LogWriter {
            store,
            rx,
            batch_size: config.batch_size.max(1),
            commit_timeout: Duration::from_millis(config.commit_timeout_ms),
        };
        (Self { tx }, writer)
    }
}

impl LogSink for BatchingLogSink {
    fn append(&self, record: TaskLogRecord) -> Result<(), AppendError> {
        self.tx.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AppendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AppendError::Closed,
        })
    }
}

/// Background half of [`BatchingLogSink`]. Run it on its own task.
pub struct LogWriter {
    store: Arc<LogStore>,
    rx: mpsc::Receiver<TaskLogRecord>,
    batch_size: usize,
    commit_timeout: Duration,
}

impl LogWriter {
    /// Drain the queue until every sink clone is dropped, then flush what is
    /// left and return.
    pub async fn run(mut self) {
        debug!(batch_size = self.batch_size, "log writer started");
        let mut batch: Vec<TaskLogRecord> = Vec::with_capacity(self.batch_size);
        let mut deadline: Option<Instant> = None;

        loop {
            let flush_due = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(record) => {
                        if batch.is_empty() {
                            deadline = Some(Instant::now() + self.commit_timeout);
                        }
                        batch.push(record);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch);
                            deadline = None;
                        }
                    }
                    None => break,
                },
                _ = flush_due => {
                    self.flush(&mut batch);
                    deadline = None;
                }
            }
        }

        self.flush(&mut batch);
        info!("log writer stopped");
    }

    /// Commit `batch` and clear it. A failed commit loses the batch.
    fn flush(&self, batch: &mut Vec<TaskLogRecord>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.store.insert_batch(batch) {
            error!(count = batch.len(), error = %e, "failed to commit task logs");
        }
        batch.clear();
    }
}
