use rusqlite::{Connection, Result};

/// Initialise the execution log schema. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_task_logs_table(conn)
}

/// One row per finished execution. Times are Unix epoch milliseconds.
fn create_task_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS task_logs (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name         TEXT    NOT NULL,
            command           TEXT    NOT NULL,
            output            TEXT    NOT NULL,
            plan_time_ms      INTEGER NOT NULL,
            dispatch_time_ms  INTEGER NOT NULL,
            start_time_ms     INTEGER NOT NULL,
            end_time_ms       INTEGER NOT NULL,
            error             TEXT    NOT NULL DEFAULT ''
        );
        -- History queries: WHERE task_name = ? ORDER BY start_time_ms DESC
        CREATE INDEX IF NOT EXISTS idx_task_logs_name_start
            ON task_logs(task_name, start_time_ms DESC);",
    )
}
