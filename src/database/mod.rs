// Database layer for workshop-scribe
// SQLite connection management plus repositories for all pipeline state

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

pub mod migrations;
pub mod models;

mod artifacts_repo;
mod chunks_repo;
mod recordings_repo;
mod runs_repo;
mod search;
mod semaphore_repo;
mod uploads_repo;

pub use search::SearchHit;

/// A row lookup that came back empty. Fatal for the requesting step and
/// never retried.
#[derive(Debug, Clone)]
pub struct NotFound {
    pub entity: &'static str,
    pub id: String,
}

impl NotFound {
    pub fn new(entity: &'static str, id: impl Into<String>) -> Self {
        Self {
            entity,
            id: id.into(),
        }
    }
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} not found", self.entity, self.id)
    }
}

impl std::error::Error for NotFound {}

/// Database manager that owns the SQLite connection
pub struct DatabaseManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DatabaseManager {
    /// Create a new DatabaseManager with the database at the specified path
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open database")?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        migrations::run_migrations(&conn).context("Failed to run database migrations")?;

        log::info!("Database initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// In-memory database, used by tests and throwaway tooling
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        migrations::run_migrations(&conn).context("Failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Execute a function with access to the database connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock database connection: {}", e))?;
        f(&conn)
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}
