//! Cross-worker mutual exclusion for task executions.
//!
//! Only the worker holding a task's lock runs it; the others report
//! [`ExecutionError::LockOccupied`](cronwork_scheduler::ExecutionError::LockOccupied).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use tracing::debug;

use crate::error::{LockError, LockResult};

/// A lock backend keyed by task name.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try once to take the lock for `task_name`.
    ///
    /// `Ok(None)` means someone else holds it. The returned lease releases
    /// the lock when dropped.
    async fn try_acquire(&self, task_name: &str) -> LockResult<Option<LockLease>>;
}

/// Proof of holding a task lock. Released on drop.
pub struct LockLease {
    task_name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockLease {
    pub fn new(task_name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task_name: task_name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }
}

impl fmt::Debug for LockLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockLease")
            .field("task_name", &self.task_name)
            .finish()
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Lock service shared by every worker inside one process.
///
/// Clones share the same lock set, so several executors built from clones
/// of one service contend exactly like separate workers would.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockService {
    held: Arc<DashSet<String>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, task_name: &str) -> bool {
        self.held.contains(task_name)
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn try_acquire(&self, task_name: &str) -> LockResult<Option<LockLease>> {
        if task_name.is_empty() {
            return Err(LockError::InvalidName("empty task name".to_string()));
        }
        if !self.held.insert(task_name.to_string()) {
            debug!(task = %task_name, "lock busy");
            return Ok(None);
        }

        let held = Arc::clone(&self.held);
        let key = task_name.to_string();
        Ok(Some(LockLease::new(task_name, move || {
            held.remove(&key);
        })))
    }
}
