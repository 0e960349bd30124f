//! Connection configuration and lazy establishment.
//!
//! Provides [`Database`], the single shared connection every other component
//! operates through. The connection is established on first use and retried
//! a fixed number of times with a fixed delay; no pooling and no internal
//! locking. `Database` is deliberately not `Sync` — concurrent callers must
//! serialize externally.

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{OrmError, Result};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

/// Connection settings for a [`Database`].
///
/// Deserializable so deployments can keep settings in a JSON file and load
/// them with [`DatabaseConfig::from_path`].
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the database file. `None` opens an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Number of establishment attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between establishment attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl DatabaseConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Configuration`] if the file cannot be read or
    /// does not parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            OrmError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            OrmError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }
}

/// The shared connectivity resource.
///
/// Owns at most one [`rusqlite::Connection`], created lazily on the first
/// operation that needs it. Every mapper, query, migration, and schema
/// operation runs sequentially against this connection.
///
/// # Examples
///
/// ```no_run
/// use rowmap::Database;
///
/// let db = Database::open("app.db");
/// // No connection exists yet; the first operation establishes it.
/// let conn = db.connection().unwrap();
/// ```
pub struct Database {
    config: DatabaseConfig,
    conn: OnceCell<Connection>,
}

impl Database {
    /// Creates a database handle from an explicit configuration.
    ///
    /// No connection is made until the first call to
    /// [`connection`](Self::connection).
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            conn: OnceCell::new(),
        }
    }

    /// Creates a handle backed by a database file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(DatabaseConfig {
            path: Some(path.into()),
            ..DatabaseConfig::default()
        })
    }

    /// Creates a handle backed by an in-memory database.
    pub fn in_memory() -> Self {
        Self::new(DatabaseConfig::default())
    }

    /// Returns the shared connection, establishing it on first use.
    ///
    /// Establishment is attempted up to `max_retries` times with
    /// `retry_delay_ms` between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Connection`] once the retry budget is exhausted.
    pub fn connection(&self) -> Result<&Connection> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn);
        }
        let conn = self.establish()?;
        Ok(self.conn.get_or_init(move || conn))
    }

    fn establish(&self) -> Result<Connection> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_open() {
                Ok(conn) => {
                    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                    debug!(attempt, "database connection established");
                    return Ok(conn);
                }
                Err(e) if attempt < self.config.max_retries => {
                    warn!(attempt, error = %e, "connection attempt failed, retrying");
                    thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
                }
                Err(e) => {
                    return Err(OrmError::Connection {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    fn try_open(&self) -> rusqlite::Result<Connection> {
        match &self.config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("connected", &self.conn.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DatabaseConfig::default();
        assert!(config.path.is_none());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 3000);
    }

    #[test]
    fn test_config_from_json_applies_defaults() {
        let config: DatabaseConfig = serde_json::from_str(r#"{"path": "app.db"}"#).unwrap();
        assert_eq!(config.path.as_deref(), Some(std::path::Path::new("app.db")));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 3000);
    }

    #[test]
    fn test_in_memory_connects() {
        let db = Database::in_memory();
        let conn = db.connection().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_connection_is_shared() {
        let db = Database::in_memory();
        db.connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        // A second call must hand back the same connection, not a fresh
        // in-memory database.
        let count: i64 = db
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_retry_exhaustion_reports_attempts() {
        let db = Database::new(DatabaseConfig {
            path: Some("/nonexistent/dir/never.db".into()),
            max_retries: 2,
            retry_delay_ms: 0,
        });
        match db.connection() {
            Err(OrmError::Connection { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"max_retries": 1, "retry_delay_ms": 10}"#).unwrap();
        let config = DatabaseConfig::from_path(&path).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_delay_ms, 10);
        assert!(config.path.is_none());
    }

    #[test]
    fn test_config_file_missing() {
        let err = DatabaseConfig::from_path("/nonexistent/db.json").unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }
}
