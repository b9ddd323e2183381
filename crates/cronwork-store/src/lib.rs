//! `cronwork-store`: the watchable task catalogue a worker schedules from.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{SyncReport, TaskStore};
