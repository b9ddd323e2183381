use std::path::Path;
use std::sync::Mutex;

use cronwork_core::TaskLogRecord;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;

/// SQLite-backed execution history.
///
/// Thread-safe: the connection sits behind a Mutex so the batch writer and
/// history queries can share one store.
pub struct LogStore {
    db: Mutex<Connection>,
}

impl LogStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`, creating parent dirs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Insert all records in one transaction. Returns the number written.
    pub fn insert_batch(&self, records: &[TaskLogRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO task_logs
                 (task_name, command, output, plan_time_ms, dispatch_time_ms,
                  start_time_ms, end_time_ms, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.task_name,
                    r.command,
                    r.output,
                    r.plan_time_ms,
                    r.dispatch_time_ms,
                    r.start_time_ms,
                    r.end_time_ms,
                    r.error,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = records.len(), "task logs committed");
        Ok(records.len())
    }

    /// History of one task, most recent run first.
    pub fn list_logs(&self, task_name: &str, skip: usize, limit: usize) -> Result<Vec<TaskLogRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT task_name, command, output, plan_time_ms, dispatch_time_ms,
                    start_time_ms, end_time_ms, error
             FROM task_logs
             WHERE task_name = ?1
             ORDER BY start_time_ms DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![task_name, limit as i64, skip as i64], |row| {
            Ok(TaskLogRecord {
                task_name: row.get(0)?,
                command: row.get(1)?,
                output: row.get(2)?,
                plan_time_ms: row.get(3)?,
                dispatch_time_ms: row.get(4)?,
                start_time_ms: row.get(5)?,
                end_time_ms: row.get(6)?,
                error: row.get(7)?,
            })
        })?;

        let mut logs = Vec::new();
        for r in rows {
            logs.push(r?);
        }
        Ok(logs)
    }

    pub fn count_logs(&self, task_name: &str) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM task_logs WHERE task_name = ?1",
            [task_name],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
