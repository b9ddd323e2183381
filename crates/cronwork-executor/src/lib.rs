//! cronwork-executor: runs dispatched tasks as shell commands.
//!
//! Each submission goes through the same steps:
//! - a short random pause, so workers with skewed clocks compete fairly;
//! - a [`lock::LockService`] attempt; losing reports the lock-contention
//!   sentinel and nothing runs;
//! - `<shell> -c <command>` with stdout and stderr captured, killed on
//!   cancellation or timeout;
//! - exactly one result sent back through the scheduler's result feed.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cronwork_executor::{ExecOptions, MemoryLockService, ShellExecutor};
//!
//! let locks = Arc::new(MemoryLockService::new());
//! let executor = ShellExecutor::new(locks, ExecOptions::default());
//! // hand `Arc::new(executor)` to `SchedulerEngine::new`
//! ```

pub mod error;
pub mod lock;
pub mod shell;
pub mod truncate;

pub use error::{LockError, LockResult};
pub use lock::{LockLease, LockService, MemoryLockService};
pub use shell::{execute, ExecOptions, ShellExecutor};
