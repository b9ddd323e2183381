use std::collections::BTreeMap;
use std::sync::Mutex;

use cronwork_core::{Task, TaskEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};

/// Buffered events per subscriber before it starts lagging.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// In-process task catalogue with change notifications.
///
/// Every mutation publishes a [`TaskEvent`] while the catalogue lock is held,
/// so a subscriber obtained through [`watch`](Self::watch) sees exactly the
/// changes made after its snapshot.
pub struct TaskStore {
    tasks: Mutex<BTreeMap<String, Task>>,
    events: broadcast::Sender<TaskEvent>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer.max(1));
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Create or replace a task. Returns the value it replaced.
    #[instrument(skip(self, task), fields(task = %task.name))]
    pub fn save(&self, task: Task) -> Result<Option<Task>> {
        validate(&task)?;
        let mut tasks = self.tasks.lock().unwrap();
        let previous = tasks.insert(task.name.clone(), task.clone());
        self.publish(TaskEvent::save(task));
        debug!(replaced = previous.is_some(), "task saved");
        Ok(previous)
    }

    /// Remove a task. Returns the removed value, `None` if it did not exist.
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Option<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let removed = tasks.remove(name);
        if removed.is_some() {
            self.publish(TaskEvent::delete(name));
            debug!("task deleted");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(name).cloned()
    }

    /// All tasks, ordered by name.
    pub fn list(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask workers to terminate the current execution of `name`.
    ///
    /// The task itself stays scheduled.
    #[instrument(skip(self))]
    pub fn kill(&self, name: &str) -> Result<()> {
        let tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(name) {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        self.publish(TaskEvent::kill(name));
        info!("kill requested");
        Ok(())
    }

    /// Current tasks plus a receiver for every change made after them.
    pub fn watch(&self) -> (Vec<Task>, broadcast::Receiver<TaskEvent>) {
        let tasks = self.tasks.lock().unwrap();
        let rx = self.events.subscribe();
        (tasks.values().cloned().collect(), rx)
    }

    /// Make the catalogue match `desired`.
    ///
    /// New and changed tasks are saved, tasks missing from `desired` are
    /// deleted, identical ones are left alone and publish nothing. Invalid
    /// tasks abort the sync before anything changes.
    pub fn sync(&self, desired: Vec<Task>) -> Result<SyncReport> {
        for task in &desired {
            validate(task)?;
        }

        let mut wanted: BTreeMap<String, Task> = BTreeMap::new();
        for task in desired {
            wanted.insert(task.name.clone(), task);
        }

        let mut tasks = self.tasks.lock().unwrap();
        let mut report = SyncReport::default();

        let stale: Vec<String> = tasks
            .keys()
            .filter(|name| !wanted.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            tasks.remove(&name);
            self.publish(TaskEvent::delete(name));
            report.deleted += 1;
        }

        for (name, task) in wanted {
            if tasks.get(&name) == Some(&task) {
                report.unchanged += 1;
                continue;
            }
            tasks.insert(name, task.clone());
            self.publish(TaskEvent::save(task));
            report.saved += 1;
        }

        info!(
            saved = report.saved,
            deleted = report.deleted,
            unchanged = report.unchanged,
            "task store synced"
        );
        Ok(report)
    }

    fn publish(&self, event: TaskEvent) {
        // No subscribers is fine; the catalogue is still updated.
        let _ = self.events.send(event);
    }
}

/// Counts of what a [`TaskStore::sync`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub saved: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

fn validate(task: &Task) -> Result<()> {
    let reason = if task.name.trim().is_empty() {
        "name is empty"
    } else if task.command.trim().is_empty() {
        "command is empty"
    } else if task.trigger.trim().is_empty() {
        "trigger is empty"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidTask {
        name: task.name.clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronwork_core::TaskEventKind;
    use tokio::sync::broadcast::error::TryRecvError;

    fn task(name: &str, trigger: &str) -> Task {
        Task::new(name, format!("echo {name}"), trigger)
    }

    #[test]
    fn save_returns_previous_value() {
        let store = TaskStore::new();
        assert!(store.save(task("a", "* * * * *")).unwrap().is_none());

        let previous = store.save(task("a", "0 * * * *")).unwrap();
        assert_eq!(previous.unwrap().trigger, "* * * * *");
        assert_eq!(store.get("a").unwrap().trigger, "0 * * * *");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalid_tasks_are_rejected() {
        let store = TaskStore::new();
        for bad in [
            Task::new("", "true", "* * * * *"),
            Task::new("a", " ", "* * * * *"),
            Task::new("a", "true", ""),
        ] {
            assert!(matches!(store.save(bad), Err(StoreError::InvalidTask { .. })));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn delete_returns_removed_value() {
        let store = TaskStore::new();
        store.save(task("a", "* * * * *")).unwrap();
        assert_eq!(store.delete("a").unwrap().name, "a");
        assert!(store.delete("a").is_none());
        assert!(store.get("a").is_none());
    }

    #[test]
    fn watch_sees_changes_after_snapshot() {
        let store = TaskStore::new();
        store.save(task("a", "* * * * *")).unwrap();

        let (snapshot, mut rx) = store.watch();
        assert_eq!(snapshot, vec![task("a", "* * * * *")]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        store.save(task("b", "* * * * *")).unwrap();
        store.kill("a").unwrap();
        store.delete("b");

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| (e.kind, e.task.name))
            .collect();
        assert_eq!(
            kinds,
            [
                (TaskEventKind::Save, "b".to_string()),
                (TaskEventKind::Kill, "a".to_string()),
                (TaskEventKind::Delete, "b".to_string()),
            ]
        );
    }

    #[test]
    fn kill_unknown_task_is_not_found() {
        let store = TaskStore::new();
        assert!(matches!(store.kill("ghost"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn kill_keeps_task() {
        let store = TaskStore::new();
        store.save(task("a", "* * * * *")).unwrap();
        store.kill("a").unwrap();
        assert!(store.get("a").is_some());
    }

    #[test]
    fn sync_saves_changed_and_deletes_missing() {
        let store = TaskStore::new();
        store.save(task("keep", "* * * * *")).unwrap();
        store.save(task("change", "* * * * *")).unwrap();
        store.save(task("drop", "* * * * *")).unwrap();
        let (_, mut rx) = store.watch();

        let report = store
            .sync(vec![
                task("keep", "* * * * *"),
                task("change", "0 * * * *"),
                task("new", "* * * * *"),
            ])
            .unwrap();
        assert_eq!(
            report,
            SyncReport {
                saved: 2,
                deleted: 1,
                unchanged: 1
            }
        );

        let names: Vec<_> = store.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["change", "keep", "new"]);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], TaskEvent::delete("drop"));
        assert!(events.iter().all(|e| e.task.name != "keep"));
    }

    #[test]
    fn sync_with_invalid_task_changes_nothing() {
        let store = TaskStore::new();
        store.save(task("a", "* * * * *")).unwrap();

        let err = store.sync(vec![Task::new("b", "", "* * * * *")]);
        assert!(err.is_err());
        assert_eq!(store.list(), vec![task("a", "* * * * *")]);
    }

    #[test]
    fn store_error_converts_to_core_error() {
        let err: cronwork_core::CronworkError = StoreError::NotFound {
            name: "a".into(),
        }
        .into();
        assert_eq!(err.code(), "TASK_NOT_FOUND");
    }
}
