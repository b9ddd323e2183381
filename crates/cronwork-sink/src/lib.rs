//! `cronwork-sink`: durable execution history.
//!
//! [`LogStore`] keeps one SQLite row per finished execution.
//! [`BatchingLogSink`] is the scheduler-facing [`cronwork_scheduler::LogSink`]:
//! it queues records without blocking the scheduling loop and its
//! [`LogWriter`] commits them in batches.

pub mod batch;
pub mod db;
pub mod error;
pub mod store;

pub use batch::{BatchingLogSink, LogWriter};
pub use error::{Result, SinkError};
pub use store::LogStore;
