//! `SQLite`-backed conversation log.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE exchanges (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     role TEXT NOT NULL,
//!     text TEXT NOT NULL,
//!     metadata TEXT NOT NULL,       -- JSON object
//!     created_at INTEGER NOT NULL,  -- Unix microseconds
//!     captured INTEGER NOT NULL DEFAULT 0,
//!     capture_location TEXT
//! )
//! ```
//!
//! # Concurrency Model
//!
//! A single `Mutex<Connection>` serializes access; WAL mode and the busy
//! timeout keep other processes from failing immediately on contention.

mod connection;

pub use connection::{acquire_lock, configure_connection};

use crate::models::{ExchangeId, Role, Utterance};
use crate::storage::traits::{ConversationLog, Document};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// Conversation log stored in a `SQLite` database.
pub struct SqliteConversationLog {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

fn sqlite_error(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => "sqlite",
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

impl SqliteConversationLog {
    /// Opens (or creates) a log at `db_path`.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_data_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let conn = Connection::open(&db_path).map_err(sqlite_error("open_sqlite"))?;
        let log = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        log.initialize()?;
        Ok(log)
    }

    /// Creates an in-memory log.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_error("open_sqlite_in_memory"))?;
        let log = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        log.initialize()?;
        Ok(log)
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exchanges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                captured INTEGER NOT NULL DEFAULT 0,
                capture_location TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_exchanges_created_at ON exchanges(created_at DESC);",
        )
        .map_err(sqlite_error("create_exchanges_table"))
    }

    fn parse_row_id(id: &ExchangeId) -> Result<i64> {
        id.as_str()
            .parse()
            .map_err(|_| Error::NotFound(format!("exchange '{id}'")))
    }
}

impl ConversationLog for SqliteConversationLog {
    #[instrument(skip(self, text, metadata), fields(role = %role))]
    fn append(&self, role: Role, text: &str, metadata: &Document) -> Result<ExchangeId> {
        let start = Instant::now();
        let metadata = serde_json::to_string(metadata).map_err(|e| Error::OperationFailed {
            operation: "serialize_exchange_metadata".to_string(),
            cause: e.to_string(),
        })?;
        let conn = acquire_lock(&self.conn);
        let result = conn
            .execute(
                "INSERT INTO exchanges (role, text, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![role.as_str(), text, metadata, Utc::now().timestamp_micros()],
            )
            .map(|_| ExchangeId::new(conn.last_insert_rowid().to_string()))
            .map_err(sqlite_error("append_exchange"));
        record_operation_metrics(
            "append",
            start,
            if result.is_ok() { "success" } else { "error" },
        );
        result
    }

    fn recent(&self, limit: usize) -> Result<Vec<Utterance>> {
        let start = Instant::now();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT role, text, created_at FROM exchanges ORDER BY id DESC LIMIT ?1")
            .map_err(sqlite_error("prepare_recent_exchanges"))?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let role: String = row.get(0)?;
                let text: String = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                Ok((role, text, created_at))
            })
            .map_err(sqlite_error("query_recent_exchanges"))?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, text, created_at) = row.map_err(sqlite_error("read_exchange_row"))?;
            let Some(role) = Role::parse(&role) else {
                tracing::warn!(role = %role, "Skipping exchange with unknown role");
                continue;
            };
            let timestamp = DateTime::<Utc>::from_timestamp_micros(created_at).unwrap_or_default();
            turns.push(Utterance::at(role, text, timestamp));
        }
        turns.reverse();
        record_operation_metrics("recent", start, "success");
        Ok(turns)
    }

    fn mark_captured(&self, id: &ExchangeId, location: &str) -> Result<()> {
        let row_id = Self::parse_row_id(id)?;
        let conn = acquire_lock(&self.conn);
        let changed = conn
            .execute(
                "UPDATE exchanges SET captured = 1, capture_location = ?2 WHERE id = ?1",
                params![row_id, location],
            )
            .map_err(sqlite_error("mark_exchange_captured"))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("exchange '{id}'")));
        }
        Ok(())
    }

    fn is_captured(&self, id: &ExchangeId) -> Result<bool> {
        let row_id = Self::parse_row_id(id)?;
        let conn = acquire_lock(&self.conn);
        let captured: Option<bool> = conn
            .query_row(
                "SELECT captured FROM exchanges WHERE id = ?1",
                params![row_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite_error("read_exchange_captured"))?;
        captured.ok_or_else(|| Error::NotFound(format!("exchange '{id}'")))
    }
}
