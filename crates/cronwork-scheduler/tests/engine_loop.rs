// Drive the real event loop end to end with in-process executor and sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use cronwork_core::config::WorkerConfig;
use cronwork_core::{Task, TaskEvent, TaskLogRecord};
use cronwork_scheduler::{
    AppendError, ExecutionError, Executor, LogSink, ResultFeed, SchedulerEngine,
    TaskExecutionInfo, TaskExecutionResult,
};
use tokio::sync::{mpsc, watch};

/// Succeeds immediately, or waits for cancellation when the command is "block".
struct InstantExecutor;

impl Executor for InstantExecutor {
    fn submit(&self, info: TaskExecutionInfo, feed: ResultFeed) {
        tokio::spawn(async move {
            let start = Utc::now();
            let error = if info.task.command == "block" {
                info.cancel.cancelled().await;
                Some(ExecutionError::Cancelled)
            } else {
                None
            };
            let result = TaskExecutionResult {
                execution_info: info,
                output: b"ok".to_vec(),
                error,
                start_time: start,
                end_time: Utc::now(),
            };
            let _ = feed.push_result(result).await;
        });
    }
}

struct ChannelSink(mpsc::UnboundedSender<TaskLogRecord>);

impl LogSink for ChannelSink {
    fn append(&self, record: TaskLogRecord) -> Result<(), AppendError> {
        self.0.send(record).map_err(|_| AppendError::Closed)
    }
}

/// Fails every submission with the lock-contention sentinel.
struct LosingExecutor(Arc<Mutex<usize>>);

impl Executor for LosingExecutor {
    fn submit(&self, info: TaskExecutionInfo, feed: ResultFeed) {
        *self.0.lock().unwrap() += 1;
        let result = TaskExecutionResult::lock_occupied(info, Utc::now());
        feed.try_push_result(result).unwrap();
    }
}

fn config() -> WorkerConfig {
    WorkerConfig {
        event_capacity: 16,
        result_capacity: 16,
        idle_interval_ms: 50,
    }
}

#[tokio::test]
async fn every_second_task_is_logged() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = SchedulerEngine::new(&config(), Arc::new(InstantExecutor), Arc::new(ChannelSink(tx)));
    let handle = engine.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(engine.run(shutdown_rx));

    handle
        .push_event(TaskEvent::save(Task::new("tick", "echo", "* * * * * *")))
        .await
        .unwrap();

    let record = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no log record within 3s")
        .unwrap();
    assert_eq!(record.task_name, "tick");
    assert!(record.is_success());
    assert!(record.plan_time_ms <= record.dispatch_time_ms);

    shutdown_tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn kill_reaches_running_execution() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = SchedulerEngine::new(&config(), Arc::new(InstantExecutor), Arc::new(ChannelSink(tx)));
    let handle = engine.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(engine.run(shutdown_rx));

    handle
        .push_event(TaskEvent::save(Task::new("stuck", "block", "* * * * * *")))
        .await
        .unwrap();
    // Wait past the first fire time so the execution is in flight.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    handle.push_event(TaskEvent::kill("stuck")).await.unwrap();

    let record = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("killed execution was never logged")
        .unwrap();
    assert_eq!(record.error, "killed");

    shutdown_tx.send(true).unwrap();
    join.await.unwrap();
}

#[tokio::test]
async fn shutdown_kills_and_logs_in_flight_execution() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = SchedulerEngine::new(&config(), Arc::new(InstantExecutor), Arc::new(ChannelSink(tx)));
    let handle = engine.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(engine.run(shutdown_rx));

    handle
        .push_event(TaskEvent::save(Task::new("stuck", "block", "* * * * * *")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), join)
        .await
        .expect("engine did not stop")
        .unwrap();

    let record = rx.try_recv().expect("cancelled run was not logged");
    assert_eq!(record.task_name, "stuck");
    assert_eq!(record.error, "killed");
}

#[tokio::test]
async fn lost_lock_races_are_not_logged() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let attempts = Arc::new(Mutex::new(0));
    let engine = SchedulerEngine::new(
        &config(),
        Arc::new(LosingExecutor(attempts.clone())),
        Arc::new(ChannelSink(tx)),
    );
    let handle = engine.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(engine.run(shutdown_rx));

    handle
        .push_event(TaskEvent::save(Task::new("contended", "echo", "* * * * * *")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2_300)).await;

    shutdown_tx.send(true).unwrap();
    join.await.unwrap();

    // Tracker entries were released, so every second got a fresh attempt.
    assert!(*attempts.lock().unwrap() >= 2);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn try_push_event_reports_closed_engine() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let engine = SchedulerEngine::new(&config(), Arc::new(InstantExecutor), Arc::new(ChannelSink(tx)));
    let handle = engine.handle();
    drop(engine);

    let err = handle.try_push_event(TaskEvent::delete("x")).unwrap_err();
    assert!(err.to_string().contains("closed"));
}
