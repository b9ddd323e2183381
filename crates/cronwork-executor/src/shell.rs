//! `ShellExecutor` runs dispatched tasks as `<shell> -c <command>` under
//! the task lock.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cronwork_core::config::ExecutorConfig;
use cronwork_scheduler::{
    ExecutionError, Executor, ResultFeed, TaskExecutionInfo, TaskExecutionResult,
};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::lock::LockService;
use crate::truncate;

/// Knobs for a single execution.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub shell: String,
    /// `None` lets the command run as long as it likes.
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
    /// Upper bound of the random pause before taking the lock.
    pub lock_jitter: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for ExecOptions {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            shell: cfg.shell.clone(),
            timeout: (cfg.timeout_secs > 0).then(|| Duration::from_secs(cfg.timeout_secs)),
            max_output_bytes: cfg.max_output_bytes,
            lock_jitter: Duration::from_millis(cfg.lock_jitter_ms),
        }
    }
}

/// Executes tasks on the Tokio runtime, one spawned task per submission.
pub struct ShellExecutor {
    lock: Arc<dyn LockService>,
    options: ExecOptions,
}

impl ShellExecutor {
    pub fn new(lock: Arc<dyn LockService>, options: ExecOptions) -> Self {
        Self { lock, options }
    }
}

impl Executor for ShellExecutor {
    fn submit(&self, info: TaskExecutionInfo, feed: ResultFeed) {
        let lock = Arc::clone(&self.lock);
        let options = self.options.clone();

        tokio::spawn(async move {
            let name = info.task.name.clone();
            let result = execute(lock.as_ref(), &options, info).await;
            if let Err(e) = feed.push_result(result).await {
                error!(task = %name, error = %e, "execution result dropped");
            }
        });
    }
}

/// Run one execution to completion and build its result.
///
/// Never fails: every problem ends up in `TaskExecutionResult::error`.
pub async fn execute(
    lock: &dyn LockService,
    options: &ExecOptions,
    info: TaskExecutionInfo,
) -> TaskExecutionResult {
    let jitter_ms = options.lock_jitter.as_millis() as u64;
    if jitter_ms > 0 {
        let pause = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = info.cancel.cancelled() => {
                return TaskExecutionResult::failed(info, ExecutionError::Cancelled, Utc::now());
            }
        }
    }

    let lease = match lock.try_acquire(&info.task.name).await {
        Ok(Some(lease)) => lease,
        Ok(None) => {
            debug!(task = %info.task.name, "lock held elsewhere, skipping run");
            return TaskExecutionResult::lock_occupied(info, Utc::now());
        }
        Err(e) => {
            warn!(task = %info.task.name, error = %e, "lock acquisition failed");
            return TaskExecutionResult::failed(info, e.into(), Utc::now());
        }
    };

    let start_time = Utc::now();
    info!(task = %info.task.name, execution_id = %info.execution_id, "task started");
    let (output, error) = run_command(options, &info).await;
    let end_time = Utc::now();
    drop(lease);

    TaskExecutionResult {
        execution_info: info,
        output: truncate::truncate_output(output, options.max_output_bytes),
        error,
        start_time,
        end_time,
    }
}

/// Spawn the command and wait for exit, cancellation, or timeout.
///
/// Returns stdout followed by stderr. A killed or timed-out command keeps
/// whatever it had written before the kill.
async fn run_command(
    options: &ExecOptions,
    info: &TaskExecutionInfo,
) -> (Vec<u8>, Option<ExecutionError>) {
    let mut command = Command::new(&options.shell);
    command
        .arg("-c")
        .arg(&info.task.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so a kill reaches everything the shell started.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return (Vec::new(), Some(ExecutionError::Spawn(e.to_string()))),
    };
    let pid = child.id();
    let stdout = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr = tokio::spawn(read_pipe(child.stderr.take()));

    let deadline = async {
        match options.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let error = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(ExecutionError::Exit {
                code: status.code().unwrap_or(-1),
            }),
            Err(e) => Some(ExecutionError::Io(e.to_string())),
        },
        _ = info.cancel.cancelled() => {
            kill_group(pid);
            info!(task = %info.task.name, "task killed");
            Some(ExecutionError::Cancelled)
        }
        _ = deadline => {
            kill_group(pid);
            let ms = options.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
            warn!(task = %info.task.name, timeout_ms = ms, "task timed out");
            Some(ExecutionError::Timeout { ms })
        }
    };

    let killed = matches!(
        error,
        Some(ExecutionError::Cancelled | ExecutionError::Timeout { .. })
    );
    if killed {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    let mut output = collect_pipe(stdout, killed).await;
    output.extend(collect_pipe(stderr, killed).await);
    (output, error)
}

/// How long to wait for pipe readers after a kill. A descendant that left
/// the process group can hold the pipe open indefinitely.
const KILLED_PIPE_DRAIN: Duration = Duration::from_millis(500);

/// Read a child pipe to EOF. Bytes read before an I/O error are kept.
async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "child pipe read failed");
        }
    }
    buf
}

async fn collect_pipe(mut reader: JoinHandle<Vec<u8>>, killed: bool) -> Vec<u8> {
    let joined = if killed {
        match tokio::time::timeout(KILLED_PIPE_DRAIN, &mut reader).await {
            Ok(joined) => joined,
            Err(_) => {
                reader.abort();
                return Vec::new();
            }
        }
    } else {
        reader.await
    };
    joined.unwrap_or_default()
}

/// SIGKILL the whole process group led by `pid`.
///
/// Reaches the shell and every command it spawned. The caller still reaps
/// the shell.
fn kill_group(pid: Option<u32>) {
    let Some(raw_pid) = pid else { return };
    #[cfg(unix)]
    // Safety: raw_pid leads the process group we created at spawn time.
    unsafe {
        libc::kill(-(raw_pid as libc::pid_t), libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &raw_pid.to_string()])
            .output();
    }
}
