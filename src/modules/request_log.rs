// Append-only request log backed by SQLite.
// One row per dispatched request (success or failure); translation failures
// never reach this table.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// One telemetry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: i64,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub model: String,
    pub mapped_model: Option<String>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

pub struct RequestLog {
    conn: Mutex<Connection>,
}

impl RequestLog {
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create log directory: {e}"))?;
        }
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        Self::from_connection(conn)
    }

    /// In-memory log for tests.
    pub fn in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| e.to_string())?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, String> {
        // WAL keeps inserts from stalling concurrent dispatches
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| e.to_string())?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| e.to_string())?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| e.to_string())?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS request_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                account_id TEXT,
                account_name TEXT,
                model TEXT NOT NULL,
                mapped_model TEXT,
                success INTEGER NOT NULL,
                status_code INTEGER,
                error TEXT,
                duration_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_request_logs_timestamp ON request_logs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_request_logs_account ON request_logs(account_id);
            CREATE INDEX IF NOT EXISTS idx_request_logs_model ON request_logs(model);
            CREATE INDEX IF NOT EXISTS idx_request_logs_success ON request_logs(success);",
        )
        .map_err(|e| e.to_string())?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, row: &LogRow) -> Result<(), String> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO request_logs
                (timestamp, account_id, account_name, model, mapped_model,
                 success, status_code, error, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.timestamp,
                row.account_id,
                row.account_name,
                row.model,
                row.mapped_model,
                row.success as i64,
                row.status_code.map(|s| s as i64),
                row.error,
                row.duration_ms,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Latest rows, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<LogRow>, String> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, account_id, account_name, model, mapped_model,
                        success, status_code, error, duration_ms
                 FROM request_logs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LogRow {
                    timestamp: row.get(0)?,
                    account_id: row.get(1)?,
                    account_name: row.get(2)?,
                    model: row.get(3)?,
                    mapped_model: row.get(4)?,
                    success: row.get::<_, i64>(5)? != 0,
                    status_code: row.get::<_, Option<i64>>(6)?.map(|s| s as u16),
                    error: row.get(7)?,
                    duration_ms: row.get(8)?,
                })
            })
            .map_err(|e| e.to_string())?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| e.to_string())?);
        }
        Ok(out)
    }
}
