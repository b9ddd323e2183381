#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use cronwork_core::Task;
use cronwork_executor::{execute, ExecOptions, LockService, MemoryLockService, ShellExecutor};
use cronwork_scheduler::{
    CronCompiler, ExecutionError, Executor, ResultFeed, TaskExecutionInfo, TaskSchedulePlan,
};

fn info(name: &str, command: &str) -> TaskExecutionInfo {
    let plan = TaskSchedulePlan::build(
        Task::new(name, command, "* * * * * *"),
        &CronCompiler,
        Utc::now(),
    )
    .unwrap();
    TaskExecutionInfo::from_plan(&plan, Utc::now())
}

fn options() -> ExecOptions {
    ExecOptions {
        lock_jitter: Duration::ZERO,
        ..ExecOptions::default()
    }
}

#[tokio::test]
async fn successful_command_captures_stdout_then_stderr() {
    let locks = MemoryLockService::new();
    let result = execute(&locks, &options(), info("t", "echo out; echo err >&2")).await;

    assert!(result.error.is_none());
    assert_eq!(String::from_utf8_lossy(&result.output), "out\nerr\n");
    assert!(result.start_time <= result.end_time);
    assert!(!locks.is_held("t"), "lease must be released after the run");
}

#[tokio::test]
async fn non_zero_exit_is_reported() {
    let locks = MemoryLockService::new();
    let result = execute(&locks, &options(), info("t", "echo nope; exit 3")).await;

    assert_eq!(result.error, Some(ExecutionError::Exit { code: 3 }));
    assert_eq!(String::from_utf8_lossy(&result.output), "nope\n");
    assert_eq!(result.to_log_record().unwrap().error, "exit code 3");
}

#[tokio::test]
async fn held_lock_yields_sentinel_without_running() {
    let locks = MemoryLockService::new();
    let _other_worker = locks.try_acquire("t").await.unwrap().unwrap();

    let result = execute(&locks, &options(), info("t", "echo ran")).await;
    assert!(result.is_lock_occupied());
    assert!(result.output.is_empty());
    assert_eq!(result.start_time, result.end_time);
}

#[tokio::test]
async fn cancellation_kills_running_command() {
    let locks = MemoryLockService::new();
    let info = info("slow", "sleep 30");
    let cancel = info.cancel.clone();

    let started = Instant::now();
    let run = tokio::spawn({
        let locks = locks.clone();
        async move { execute(&locks, &options(), info).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let result = run.await.unwrap();
    assert_eq!(result.error, Some(ExecutionError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!locks.is_held("slow"));
}

#[tokio::test]
async fn timeout_kills_command() {
    let locks = MemoryLockService::new();
    let opts = ExecOptions {
        timeout: Some(Duration::from_millis(200)),
        ..options()
    };
    let result = execute(&locks, &opts, info("slow", "sleep 30")).await;
    assert_eq!(result.error, Some(ExecutionError::Timeout { ms: 200 }));
}

#[tokio::test]
async fn killed_command_keeps_output_written_before_kill() {
    let locks = MemoryLockService::new();
    let info = info("slow", "echo started; echo warming >&2; sleep 30");
    let cancel = info.cancel.clone();

    let run = tokio::spawn({
        let locks = locks.clone();
        async move { execute(&locks, &options(), info).await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.error, Some(ExecutionError::Cancelled));
    assert_eq!(String::from_utf8_lossy(&result.output), "started\nwarming\n");
}

#[tokio::test]
async fn timed_out_command_keeps_partial_output() {
    let locks = MemoryLockService::new();
    let opts = ExecOptions {
        timeout: Some(Duration::from_millis(300)),
        ..options()
    };
    let result = execute(&locks, &opts, info("slow", "echo before-hang; sleep 30")).await;

    assert_eq!(result.error, Some(ExecutionError::Timeout { ms: 300 }));
    assert_eq!(String::from_utf8_lossy(&result.output), "before-hang\n");
    let record = result.to_log_record().unwrap();
    assert_eq!(record.output, "before-hang\n");
}

#[tokio::test]
async fn missing_shell_is_spawn_error() {
    let locks = MemoryLockService::new();
    let opts = ExecOptions {
        shell: "/definitely/not/a/shell".into(),
        ..options()
    };
    let result = execute(&locks, &opts, info("t", "true")).await;
    assert!(matches!(result.error, Some(ExecutionError::Spawn(_))));
}

#[tokio::test]
async fn large_output_is_truncated() {
    let locks = MemoryLockService::new();
    let opts = ExecOptions {
        max_output_bytes: 64,
        ..options()
    };
    let result = execute(&locks, &opts, info("t", "head -c 10000 /dev/zero | tr '\\0' x")).await;
    let text = String::from_utf8_lossy(&result.output);
    assert!(text.contains("OUTPUT TRUNCATED"));
    assert!(result.output.len() < 200);
}

#[tokio::test]
async fn submit_reports_through_result_feed() {
    let executor = ShellExecutor::new(Arc::new(MemoryLockService::new()), options());
    let (feed, mut rx) = ResultFeed::channel(4);

    executor.submit(info("t", "echo hi"), feed);
    let result = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.execution_info.task.name, "t");
    assert_eq!(String::from_utf8_lossy(&result.output), "hi\n");
}

#[tokio::test]
async fn two_workers_racing_run_only_once() {
    let locks = MemoryLockService::new();
    let a = tokio::spawn({
        let locks = locks.clone();
        async move { execute(&locks, &options(), info("race", "sleep 0.3")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let b = execute(&locks, &options(), info("race", "sleep 0.3")).await;

    assert!(b.is_lock_occupied());
    assert!(a.await.unwrap().error.is_none());
}
