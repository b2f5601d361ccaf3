//! SQLite database layer for docflow.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::DocflowError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, DocflowError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| DocflowError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| DocflowError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DocflowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DocflowError::Database(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DocflowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DocflowError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| DocflowError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, DocflowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| DocflowError::Database(format!("Task join error: {}", e)))?
    }

    fn initialize_tables(&self) -> Result<(), DocflowError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS capabilities (
                    name            TEXT PRIMARY KEY,
                    endpoint_uri    TEXT NOT NULL,
                    description     TEXT NOT NULL DEFAULT '',
                    input_patterns  TEXT NOT NULL DEFAULT '[]',
                    payload_mapping TEXT NOT NULL DEFAULT '{}',
                    parameters      TEXT NOT NULL DEFAULT '[]',
                    generators      TEXT NOT NULL DEFAULT '[]',
                    timeout_secs    INTEGER,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id              TEXT PRIMARY KEY,
                    capability_name TEXT NOT NULL,
                    endpoint_uri    TEXT NOT NULL,
                    timeout_secs    INTEGER,
                    session_id      TEXT,
                    parameters      TEXT NOT NULL DEFAULT '{}',
                    resolved_files  TEXT NOT NULL DEFAULT '{}',
                    payload         TEXT NOT NULL DEFAULT '{}',
                    status          TEXT NOT NULL DEFAULT 'PENDING',
                    failure_reason  TEXT,
                    subtasks        TEXT NOT NULL DEFAULT '[]',
                    attempt_count   INTEGER NOT NULL DEFAULT 0,
                    errors          TEXT NOT NULL DEFAULT '[]',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL,
                    completed_at    INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                CREATE INDEX IF NOT EXISTS idx_tasks_capability ON tasks(capability_name);
                CREATE INDEX IF NOT EXISTS idx_tasks_session ON tasks(session_id);
                ",
            )
        })
    }
}
