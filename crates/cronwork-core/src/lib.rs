//! `cronwork-core`: domain types, errors and configuration shared by every
//! cronwork crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::CronworkConfig;
pub use error::{CronworkError, Result};
pub use types::{Task, TaskEvent, TaskEventKind, TaskLogRecord};
