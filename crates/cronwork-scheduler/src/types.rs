use chrono::{DateTime, Utc};
use cronwork_core::{Task, TaskLogRecord};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ExecutionError, Result};
use crate::schedule::{Trigger, TriggerCompiler};

/// Capability to stop one in-flight execution.
///
/// The scheduler only ever calls [`cancel`](Self::cancel); executors wait on
/// [`cancelled`](Self::cancelled) and tear down whatever they started.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent, never blocks.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// A task bound to its compiled trigger and next fire time.
#[derive(Debug)]
pub struct TaskSchedulePlan {
    pub task: Task,
    pub trigger: Box<dyn Trigger>,
    pub next_fire_time: DateTime<Utc>,
}

impl TaskSchedulePlan {
    /// Compile `task.trigger` and compute the first fire time after `now`.
    pub fn build(task: Task, compiler: &dyn TriggerCompiler, now: DateTime<Utc>) -> Result<Self> {
        let trigger = compiler.compile(&task.trigger)?;
        let next_fire_time =
            trigger
                .next_after(now)
                .ok_or_else(|| crate::error::SchedulerError::InvalidTrigger {
                    expression: task.trigger.clone(),
                    reason: "expression never fires".to_string(),
                })?;
        Ok(Self {
            task,
            trigger,
            next_fire_time,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_time <= now
    }

    /// Move `next_fire_time` to the first instant strictly after `now`.
    ///
    /// Returns `false` when the trigger has no future instants; the plan is
    /// left unchanged and should be dropped by the caller.
    pub fn advance(&mut self, now: DateTime<Utc>) -> bool {
        match self.trigger.next_after(now) {
            Some(next) => {
                self.next_fire_time = next;
                true
            }
            None => false,
        }
    }
}

/// An execution that has been dispatched and whose result has not arrived.
#[derive(Debug, Clone)]
pub struct TaskExecutionInfo {
    /// UUIDv7, time-sortable, used to correlate log lines of one run.
    pub execution_id: Uuid,
    pub task: Task,
    /// The fire time the plan said the task was due at.
    pub plan_time: DateTime<Utc>,
    /// When the scheduler handed the execution to the executor.
    pub dispatch_time: DateTime<Utc>,
    pub cancel: CancelHandle,
}

impl TaskExecutionInfo {
    pub fn from_plan(plan: &TaskSchedulePlan, now: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            task: plan.task.clone(),
            plan_time: plan.next_fire_time,
            dispatch_time: now,
            cancel: CancelHandle::new(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task.name
    }
}

/// Outcome of exactly one dispatched execution.
#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub execution_info: TaskExecutionInfo,
    pub output: Vec<u8>,
    pub error: Option<ExecutionError>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TaskExecutionResult {
    /// The lock was held elsewhere; nothing ran.
    pub fn lock_occupied(execution_info: TaskExecutionInfo, now: DateTime<Utc>) -> Self {
        Self::failed(execution_info, ExecutionError::LockOccupied, now)
    }

    /// Failed before any output was produced (lock service down, spawn error).
    pub fn failed(
        execution_info: TaskExecutionInfo,
        error: ExecutionError,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_info,
            output: Vec::new(),
            error: Some(error),
            start_time: now,
            end_time: now,
        }
    }

    pub fn is_lock_occupied(&self) -> bool {
        self.error.as_ref().is_some_and(ExecutionError::is_lock_occupied)
    }

    /// Durable form of this result; `None` for the lock-contention sentinel,
    /// which only the worker that won the lock records.
    pub fn to_log_record(&self) -> Option<TaskLogRecord> {
        if self.is_lock_occupied() {
            return None;
        }
        let info = &self.execution_info;
        Some(TaskLogRecord {
            task_name: info.task.name.clone(),
            command: info.task.command.clone(),
            output: String::from_utf8_lossy(&self.output).into_owned(),
            plan_time_ms: info.plan_time.timestamp_millis(),
            dispatch_time_ms: info.dispatch_time.timestamp_millis(),
            start_time_ms: self.start_time.timestamp_millis(),
            end_time_ms: self.end_time.timestamp_millis(),
            error: self
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
    }
}
