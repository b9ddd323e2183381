use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::Task;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1000; // empty table: re-check once a second
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1 MB per execution
pub const DEFAULT_LOCK_JITTER_MS: u64 = 1000;
pub const DEFAULT_LOG_BATCH_SIZE: usize = 100;
pub const DEFAULT_LOG_COMMIT_TIMEOUT_MS: u64 = 1000;

/// Top-level config (cronwork.toml + CRONWORK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronworkConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    /// Tasks seeded into the task store at startup and on reload.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Scheduling loop sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Bound of the task-event channel feeding the scheduling loop.
    #[serde(default = "default_capacity")]
    pub event_capacity: usize,
    /// Bound of the execution-result channel.
    #[serde(default = "default_capacity")]
    pub result_capacity: usize,
    /// Wake-up interval while no task is scheduled.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
            result_capacity: DEFAULT_CHANNEL_CAPACITY,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Hard limit on a single run. 0 disables the limit.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Upper bound of the random delay before competing for the task lock.
    /// Spreads lock attempts so a worker with a fast clock does not always win.
    #[serde(default = "default_lock_jitter_ms")]
    pub lock_jitter_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_secs: 0,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            lock_jitter_ms: DEFAULT_LOCK_JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// SQLite file holding the execution history.
    #[serde(default = "default_log_db_path")]
    pub path: String,
    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_log_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// Bound of the append queue in front of the batch writer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_log_db_path(),
            batch_size: DEFAULT_LOG_BATCH_SIZE,
            commit_timeout_ms: DEFAULT_LOG_COMMIT_TIMEOUT_MS,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_idle_interval_ms() -> u64 {
    DEFAULT_IDLE_INTERVAL_MS
}
fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}
fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}
fn default_lock_jitter_ms() -> u64 {
    DEFAULT_LOCK_JITTER_MS
}
fn default_log_batch_size() -> usize {
    DEFAULT_LOG_BATCH_SIZE
}
fn default_log_commit_timeout_ms() -> u64 {
    DEFAULT_LOG_COMMIT_TIMEOUT_MS
}
fn default_log_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cronwork/logs.db", home)
}

impl CronworkConfig {
    /// Load config from a TOML file with CRONWORK_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CRONWORK_EXECUTOR__TIMEOUT_SECS=30`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.cronwork/cronwork.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CRONWORK_").split("__"))
            .extract()
            .map_err(|e| crate::error::CronworkError::Config(e.to_string()))
    }

    /// Parse config from an in-memory TOML document (no env overrides).
    pub fn from_toml(toml: &str) -> crate::error::Result<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| crate::error::CronworkError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cronwork/cronwork.toml", home)
}
