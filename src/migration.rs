//! Idempotent application of named migrations against a durable ledger.
//!
//! [`MigrationManager`] records each applied migration in a `migrations`
//! table. A name present in the ledger means the migration has run at least
//! once; applying it again is a no-op. Rollback mirrors apply: the down
//! action runs, then the ledger row is deleted.
//!
//! The action and its ledger write are not one atomic unit — a crash between
//! a successful up action and the ledger insert leaves the ledger behind
//! reality, and retrying re-runs the action. Migrations should therefore be
//! written to tolerate at-least-once execution. No dependency graph exists
//! between migrations; call order is the caller's responsibility.
//!
//! # Example
//!
//! ```no_run
//! use rowmap::{Database, MigrationManager, Schema, TableDef};
//!
//! let db = Database::open("app.db");
//! let manager = MigrationManager::new(&db);
//! manager.initialize().unwrap();
//!
//! manager
//!     .apply_migration("CreatePersonsTable", |db| {
//!         let mut def = TableDef::new();
//!         def.integer_primary_key("id").text("first_name").integer("age");
//!         Schema::new(db).create("persons", &def)
//!     })
//!     .unwrap();
//! ```

use rusqlite::params;
use tracing::{debug, info};

use crate::connection::Database;
use crate::error::{OrmError, Result};

const LEDGER_TABLE: &str = "migrations";

/// Applies and rolls back named migrations, tracking them in the ledger.
pub struct MigrationManager<'db> {
    db: &'db Database,
}

impl<'db> MigrationManager<'db> {
    /// Creates a manager bound to the shared database handle.
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Ensures the ledger table exists. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migration_name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )"
        );
        self.db.connection()?.execute_batch(&sql)?;
        Ok(())
    }

    /// Runs `up` and records the migration, unless the ledger already holds
    /// a row for `name`.
    ///
    /// On failure the ledger is left exactly as it was, so a retry re-runs
    /// `up`; the action's own side effects are never rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Migration`] wrapping the cause when `up` or the
    /// ledger insert fails.
    pub fn apply_migration(
        &self,
        name: &str,
        up: impl FnOnce(&Database) -> Result<()>,
    ) -> Result<()> {
        if self.is_executed(name)? {
            debug!(migration = name, "already applied, skipping");
            return Ok(());
        }

        up(self.db).map_err(|e| wrap(name, e))?;

        let sql = format!("INSERT INTO {LEDGER_TABLE} (migration_name) VALUES (?1)");
        self.db
            .connection()?
            .execute(&sql, params![name])
            .map_err(|e| wrap(name, e.into()))?;
        info!(migration = name, "applied");
        Ok(())
    }

    /// Runs `down` and deletes the ledger row, unless `name` was never
    /// applied — in which case `down` is not invoked.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Migration`] wrapping the cause when `down` or the
    /// ledger delete fails.
    pub fn rollback_migration(
        &self,
        name: &str,
        down: impl FnOnce(&Database) -> Result<()>,
    ) -> Result<()> {
        if !self.is_executed(name)? {
            debug!(migration = name, "not applied, skipping rollback");
            return Ok(());
        }

        down(self.db).map_err(|e| wrap(name, e))?;

        let sql = format!("DELETE FROM {LEDGER_TABLE} WHERE migration_name = ?1");
        self.db
            .connection()?
            .execute(&sql, params![name])
            .map_err(|e| wrap(name, e.into()))?;
        info!(migration = name, "rolled back");
        Ok(())
    }

    /// Names recorded in the ledger, in the store's natural row order.
    pub fn executed_migrations(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT migration_name FROM {LEDGER_TABLE}");
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn is_executed(&self, name: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {LEDGER_TABLE} WHERE migration_name = ?1");
        let conn = self.db.connection()?;
        let count: i64 = conn.query_row(&sql, params![name], |row| row.get(0))?;
        Ok(count > 0)
    }
}

fn wrap(name: &str, source: OrmError) -> OrmError {
    OrmError::Migration {
        name: name.to_string(),
        source: Box::new(source),
    }
}
