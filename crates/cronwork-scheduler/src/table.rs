use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cronwork_core::Task;

use crate::error::Result;
use crate::schedule::TriggerCompiler;
use crate::types::TaskSchedulePlan;

/// What tasks exist and when each is next due. One plan per task name.
///
/// Owned by the scheduling loop; never shared, never locked.
#[derive(Debug, Default)]
pub struct ScheduleTable {
    plans: HashMap<String, TaskSchedulePlan>,
}

impl ScheduleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the plan for `task.name`.
    ///
    /// On compile failure the table is left untouched: a new task stays
    /// absent, an existing one keeps its previous plan.
    pub fn save(
        &mut self,
        task: Task,
        compiler: &dyn TriggerCompiler,
        now: DateTime<Utc>,
    ) -> Result<&TaskSchedulePlan> {
        let plan = TaskSchedulePlan::build(task, compiler, now)?;
        let name = plan.task.name.clone();
        self.plans.insert(name.clone(), plan);
        Ok(&self.plans[&name])
    }

    /// Remove the plan for `name`. No-op when absent.
    pub fn remove(&mut self, name: &str) -> Option<TaskSchedulePlan> {
        self.plans.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TaskSchedulePlan> {
        self.plans.get(name)
    }

    pub fn plans_mut(&mut self) -> impl Iterator<Item = &mut TaskSchedulePlan> {
        self.plans.values_mut()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
