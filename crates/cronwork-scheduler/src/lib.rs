//! `cronwork-scheduler`: the worker-side scheduling engine.
//!
//! # Overview
//!
//! A single Tokio task, [`engine::SchedulerEngine`], owns two tables:
//!
//! - the [`table::ScheduleTable`]: every known task and its next fire time;
//! - the [`tracker::ExecutionTracker`]: tasks dispatched on this worker whose
//!   result has not come back yet.
//!
//! It wakes on task events, execution results, or its countdown timer, and
//! after each wake-up dispatches whatever is due. Nothing else touches the
//! tables, so they need no locks.
//!
//! # Task states
//!
//! | State        | Meaning                                             |
//! |--------------|-----------------------------------------------------|
//! | unscheduled  | no plan                                             |
//! | scheduled    | plan present, not executing                         |
//! | dispatched   | tracked as executing; back to scheduled on result   |
//!
//! Executions are handed to an [`executor::Executor`], which reports back
//! through a [`executor::ResultFeed`]. Finished runs become
//! [`cronwork_core::TaskLogRecord`]s for the [`sink::LogSink`], except when
//! another worker held the task lock.

pub mod engine;
pub mod error;
pub mod executor;
pub mod schedule;
pub mod sink;
pub mod table;
pub mod tracker;
pub mod types;

pub use engine::{Scheduler, SchedulerEngine, SchedulerHandle};
pub use error::{ExecutionError, Result, SchedulerError};
pub use executor::{Executor, ResultFeed};
pub use schedule::{CronCompiler, CronTrigger, Trigger, TriggerCompiler};
pub use sink::{AppendError, LogSink};
pub use types::{CancelHandle, TaskExecutionInfo, TaskExecutionResult, TaskSchedulePlan};
