//! Shared database connection.
//!
//! The connection is opened lazily on first use and cached. Callers that
//! arrive while the first connect is in flight wait on that same attempt.
//! A failed attempt leaves the cache empty, so the next caller retries.

use crate::error::{ForecastError, Result};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info};

/// Handle shared by every user of the database.
pub type SharedConnection = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    last_login TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Lazily connected database.
pub struct Database {
    path: String,
    connection: OnceCell<SharedConnection>,
}

impl Database {
    /// Record the database location without connecting.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            connection: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Return the shared connection, connecting on first use.
    pub async fn connect(&self) -> Result<SharedConnection> {
        if self.path.trim().is_empty() {
            return Err(ForecastError::Config {
                message: "Missing database path. Set database.path in smarttech.toml or the \
                          SMARTTECH_DATABASE_PATH environment variable. \
                          Example: SMARTTECH_DATABASE_PATH=./smarttech.db"
                    .to_string(),
            });
        }

        if let Some(conn) = self.connection.get() {
            debug!("Database already connected");
            return Ok(conn.clone());
        }

        let conn = self
            .connection
            .get_or_try_init(|| open(self.path.clone()))
            .await
            .map_err(|e| {
                error!("Database connection error: {}", e);
                e
            })?;

        Ok(conn.clone())
    }
}

async fn open(path: String) -> Result<SharedConnection> {
    let opened = tokio::task::spawn_blocking(move || -> Result<Connection> {
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        info!("Database connected: {}", path);
        Ok(conn)
    })
    .await
    .map_err(|e| ForecastError::Internal {
        message: format!("Database open task failed: {}", e),
    })??;

    Ok(Arc::new(Mutex::new(opened)))
}
