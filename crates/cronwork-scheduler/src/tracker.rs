use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{TaskExecutionInfo, TaskSchedulePlan};

/// In-flight executions keyed by task name.
///
/// Membership means "dispatched, result not yet received". A name can only
/// be present once, which is what keeps a slow task from being started again
/// on every tick while its previous run is still going.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    executing: HashMap<String, TaskExecutionInfo>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new execution for `plan` unless one is already in flight.
    ///
    /// Returns the info to hand to the executor, or `None` when suppressed.
    pub fn try_dispatch(
        &mut self,
        plan: &TaskSchedulePlan,
        now: DateTime<Utc>,
    ) -> Option<TaskExecutionInfo> {
        if self.executing.contains_key(&plan.task.name) {
            debug!(task = %plan.task.name, "still executing, dispatch suppressed");
            return None;
        }
        let info = TaskExecutionInfo::from_plan(plan, now);
        self.executing
            .insert(plan.task.name.clone(), info.clone());
        Some(info)
    }

    /// Ask the in-flight execution of `name` to stop.
    ///
    /// The entry stays until its result arrives. Returns `false` when nothing
    /// is in flight under that name.
    pub fn request_cancel(&self, name: &str) -> bool {
        match self.executing.get(name) {
            Some(info) => {
                info.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the entry belonging to a finished execution.
    ///
    /// Only removes when the execution ids match, so a result that does not
    /// belong to the current entry cannot clear it.
    pub fn complete(&mut self, finished: &TaskExecutionInfo) -> Option<TaskExecutionInfo> {
        let current = self.executing.get(finished.task_name())?;
        if current.execution_id != finished.execution_id {
            return None;
        }
        self.executing.remove(finished.task_name())
    }

    /// Request cancellation of everything in flight (shutdown path).
    pub fn cancel_all(&self) -> usize {
        for info in self.executing.values() {
            info.cancel.cancel();
        }
        self.executing.len()
    }

    pub fn is_executing(&self, name: &str) -> bool {
        self.executing.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.executing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CronCompiler;
    use chrono::TimeZone;
    use cronwork_core::Task;

    fn plan(name: &str) -> TaskSchedulePlan {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        TaskSchedulePlan::build(Task::new(name, "sleep 60", "* * * * * *"), &CronCompiler, t0)
            .unwrap()
    }

    #[test]
    fn second_dispatch_is_suppressed() {
        let mut tracker = ExecutionTracker::new();
        let p = plan("slow");
        assert!(tracker.try_dispatch(&p, Utc::now()).is_some());
        assert!(tracker.try_dispatch(&p, Utc::now()).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn cancel_keeps_entry_until_completion() {
        let mut tracker = ExecutionTracker::new();
        let info = tracker.try_dispatch(&plan("slow"), Utc::now()).unwrap();

        assert!(tracker.request_cancel("slow"));
        assert!(info.cancel.is_cancelled());
        assert!(tracker.is_executing("slow"));

        assert!(tracker.complete(&info).is_some());
        assert!(!tracker.is_executing("slow"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn cancel_unknown_is_noop() {
        let tracker = ExecutionTracker::new();
        assert!(!tracker.request_cancel("ghost"));
    }

    #[test]
    fn stale_result_does_not_clear_entry() {
        let mut tracker = ExecutionTracker::new();
        let p = plan("a");
        let first = tracker.try_dispatch(&p, Utc::now()).unwrap();
        tracker.complete(&first);
        let second = tracker.try_dispatch(&p, Utc::now()).unwrap();

        assert!(tracker.complete(&first).is_none());
        assert!(tracker.is_executing("a"));
        assert!(tracker.complete(&second).is_some());
    }
}
