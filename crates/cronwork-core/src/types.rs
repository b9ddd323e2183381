use serde::{Deserialize, Serialize};
use std::fmt;

/// A named unit of work: a shell command plus the cron expression that
/// decides when it runs.
///
/// The name is the unique key everywhere: in the store, in the schedule
/// table and in the execution tracker. Updates replace the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub command: String,
    /// Cron-like trigger, e.g. `"*/5 * * * * *"` or `"0 3 * * *"`.
    #[serde(alias = "cron_expr")]
    pub trigger: String,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            trigger: trigger.into(),
        }
    }

    /// A task carrying only a name, enough for DELETE and KILL events.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: String::new(),
            trigger: String::new(),
        }
    }
}

/// What happened to a task in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    /// Created or replaced.
    Save,
    /// Removed; the task must stop being scheduled.
    Delete,
    /// Terminate the in-flight execution, if any. Scheduling is unaffected.
    Kill,
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskEventKind::Save => "save",
            TaskEventKind::Delete => "delete",
            TaskEventKind::Kill => "kill",
        };
        write!(f, "{s}")
    }
}

/// One change notification from the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task: Task,
}

impl TaskEvent {
    pub fn save(task: Task) -> Self {
        Self { kind: TaskEventKind::Save, task }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            kind: TaskEventKind::Delete,
            task: Task::named(name),
        }
    }

    pub fn kill(name: impl Into<String>) -> Self {
        Self {
            kind: TaskEventKind::Kill,
            task: Task::named(name),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task.name
    }
}

/// Durable record of one finished execution, as written to the log sink.
///
/// All timestamps are Unix epoch milliseconds. `error` is empty on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogRecord {
    pub task_name: String,
    pub command: String,
    pub output: String,
    /// When the schedule said the task was due.
    pub plan_time_ms: i64,
    /// When the scheduler actually handed it to the executor.
    pub dispatch_time_ms: i64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub error: String,
}

impl TaskLogRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Wall-clock run time in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_time_ms - self.start_time_ms
    }
}
