//! Declarative table creation and alteration.
//!
//! [`TableDef`] accumulates column definitions as plain strings over SQLite
//! column types; [`Schema`] concatenates them into CREATE/ALTER/DROP
//! statements and runs them. No validation happens beyond an identifier
//! check on table names — this layer is string assembly, nothing more.
//!
//! # Example
//!
//! ```no_run
//! use rowmap::{Database, Schema, TableDef};
//!
//! let db = Database::open("app.db");
//! let schema = Schema::new(&db);
//!
//! let mut persons = TableDef::new();
//! persons
//!     .integer_primary_key("id")
//!     .text("first_name")
//!     .text("last_name")
//!     .integer("age");
//! schema.create("persons", &persons).unwrap();
//!
//! schema.add_column("persons", "email", "TEXT").unwrap();
//! schema.drop("persons").unwrap();
//! ```

use crate::connection::Database;
use crate::error::{OrmError, Result};

/// Fluent accumulator of column and foreign-key definitions.
#[derive(Debug, Default)]
pub struct TableDef {
    columns: Vec<String>,
    foreign_keys: Vec<String>,
}

impl TableDef {
    /// Creates an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an `INTEGER PRIMARY KEY AUTOINCREMENT` column — SQLite's
    /// generated-identity form.
    pub fn integer_primary_key(&mut self, name: &str) -> &mut Self {
        self.columns
            .push(format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"));
        self
    }

    /// Adds an `INTEGER` column.
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} INTEGER"));
        self
    }

    /// Adds a `REAL` column.
    pub fn real(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} REAL"));
        self
    }

    /// Adds a `TEXT` column.
    pub fn text(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} TEXT"));
        self
    }

    /// Adds a `BOOLEAN` column (stored as an integer by SQLite).
    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} BOOLEAN"));
        self
    }

    /// Adds a `BLOB` column.
    pub fn blob(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} BLOB"));
        self
    }

    /// Adds a `TEXT` column intended for ISO-8601 date-time strings.
    pub fn date_time(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{name} TEXT"));
        self
    }

    /// Adds a column with an explicit type string.
    pub fn column(&mut self, name: &str, ty: &str) -> &mut Self {
        self.columns.push(format!("{name} {ty}"));
        self
    }

    /// Declares a foreign key from `column` to `referenced_table(referenced_column)`.
    pub fn foreign_key(
        &mut self,
        column: &str,
        referenced_table: &str,
        referenced_column: &str,
    ) -> &mut Self {
        self.foreign_keys.push(format!(
            "FOREIGN KEY ({column}) REFERENCES {referenced_table}({referenced_column})"
        ));
        self
    }

    /// Joins all definitions into the body of a CREATE TABLE statement.
    pub fn build(&self) -> String {
        let mut parts = self.columns.join(", ");
        if !self.foreign_keys.is_empty() {
            parts.push_str(", ");
            parts.push_str(&self.foreign_keys.join(", "));
        }
        parts
    }
}

/// Executes table-definition statements against the shared connection.
pub struct Schema<'db> {
    db: &'db Database,
}

impl<'db> Schema<'db> {
    /// Creates a schema helper bound to the database handle.
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Creates a table from the accumulated definition.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Configuration`] for a malformed table name, or
    /// [`OrmError::Database`] if the store rejects the statement.
    pub fn create(&self, table: &str, def: &TableDef) -> Result<()> {
        validate_table_name(table)?;
        let sql = format!("CREATE TABLE {table} ({})", def.build());
        self.db.connection()?.execute_batch(&sql)?;
        Ok(())
    }

    /// Drops a table if it exists.
    pub fn drop(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;
        let sql = format!("DROP TABLE IF EXISTS {table}");
        self.db.connection()?.execute_batch(&sql)?;
        Ok(())
    }

    /// Adds a column to an existing table.
    pub fn add_column(&self, table: &str, column: &str, ty: &str) -> Result<()> {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {ty}");
        self.db.connection()?.execute_batch(&sql)?;
        Ok(())
    }

    /// Removes a column from an existing table.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        let sql = format!("ALTER TABLE {table} DROP COLUMN {column}");
        self.db.connection()?.execute_batch(&sql)?;
        Ok(())
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty() && table.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return Err(OrmError::Configuration(format!(
            "table name '{table}' must be a non-empty identifier"
        )));
    }
    Ok(())
}
