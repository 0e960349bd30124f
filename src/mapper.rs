//! Single-row CRUD engine driven by entity metadata.
//!
//! Statements are assembled from the resolved field-to-column mapping:
//! declaration order fixes the INSERT column list and every positional
//! bind. All operations run against the [`Database`]'s shared connection.
//!
//! # Example
//!
//! ```no_run
//! use rowmap::Database;
//! # use rowmap::{column_value, Entity, EntityDescriptor};
//! # use rusqlite::{types::Value, Row};
//! # #[derive(Debug, Default)]
//! # struct Person { id: Option<i64>, age: i64 }
//! # impl Entity for Person {
//! #     fn descriptor() -> EntityDescriptor {
//! #         EntityDescriptor::new("persons", &[("id", "id"), ("age", "age")])
//! #     }
//! #     fn id(&self) -> Option<i64> { self.id }
//! #     fn set_id(&mut self, id: i64) { self.id = Some(id); }
//! #     fn values(&self) -> Vec<Value> { vec![self.id.into(), self.age.into()] }
//! #     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
//! #         Ok(Self { id: column_value(row, "id")?, age: column_value(row, "age")? })
//! #     }
//! # }
//!
//! let db = Database::open("app.db");
//! let mut person = Person::default();
//! person.age = 30;
//! db.save(&mut person).unwrap();
//! assert!(person.id.is_some());
//!
//! let found: Option<Person> = db.find_by_id(person.id.unwrap()).unwrap();
//! ```

use rusqlite::{OptionalExtension, params, params_from_iter};
use rusqlite::types::Value;
use tracing::debug;

use crate::connection::Database;
use crate::error::{OrmError, Result};
use crate::metadata::{Entity, EntityMetadata, resolve};
use crate::query::QueryBuilder;

/// Column holding the store-generated identity.
pub(crate) const ID_COLUMN: &str = "id";

impl Database {
    /// Inserts a new row for the instance and writes the generated identity
    /// back into it.
    ///
    /// Columns and values are bound in declaration order; an unset identity
    /// field binds NULL, letting the store generate one.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Database`] if the store rejects the insert, or
    /// [`OrmError::Configuration`] if the instance marshals a different
    /// number of values than its declaration maps.
    pub fn save<T: Entity + 'static>(&self, instance: &mut T) -> Result<()> {
        let meta = resolve::<T>()?;
        let values = marshal(&meta, instance)?;

        let columns: Vec<&str> = meta.columns().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            meta.table,
            columns.join(", "),
            placeholders
        );
        debug!(sql = %sql, "save");

        let conn = self.connection()?;
        conn.execute(&sql, params_from_iter(values))?;
        instance.set_id(conn.last_insert_rowid());
        Ok(())
    }

    /// Updates the row the instance's identity addresses, overwriting every
    /// persistent column.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::State`] if the identity field is unset — the
    /// identity is read before any value is bound.
    pub fn update<T: Entity + 'static>(&self, instance: &T) -> Result<()> {
        let meta = resolve::<T>()?;
        let id = instance.id().ok_or_else(|| {
            OrmError::State(format!(
                "cannot update a {} row without an identity value",
                meta.table
            ))
        })?;
        let values = marshal(&meta, instance)?;

        let assignments: Vec<String> = meta.columns().map(|c| format!("{c} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {ID_COLUMN} = ?",
            meta.table,
            assignments.join(", ")
        );
        debug!(sql = %sql, "update");

        let params = values.into_iter().chain(std::iter::once(Value::from(id)));
        self.connection()?.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    /// Deletes the row the instance's identity addresses.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Persistence`] if the identity field is unset.
    pub fn delete<T: Entity + 'static>(&self, instance: &T) -> Result<()> {
        let meta = resolve::<T>()?;
        let id = instance.id().ok_or_else(|| {
            OrmError::Persistence(format!(
                "cannot delete a {} row without an identity value",
                meta.table
            ))
        })?;

        let sql = format!("DELETE FROM {} WHERE {ID_COLUMN} = ?", meta.table);
        debug!(sql = %sql, id, "delete");
        self.connection()?.execute(&sql, params![id])?;
        Ok(())
    }

    /// Loads one instance by identity.
    ///
    /// Returns `Ok(None)` when no row matches — absence is a value here,
    /// never an error.
    pub fn find_by_id<T: Entity + 'static>(&self, id: i64) -> Result<Option<T>> {
        let meta = resolve::<T>()?;
        let sql = format!("SELECT * FROM {} WHERE {ID_COLUMN} = ?", meta.table);
        debug!(sql = %sql, id, "find_by_id");

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let instance = stmt
            .query_row(params![id], |row| T::from_row(row))
            .optional()?;
        Ok(instance)
    }

    /// Returns a fresh query builder bound to the entity type.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Configuration`] if the type's mapping does not
    /// resolve.
    pub fn query<T: Entity + 'static>(&self) -> Result<QueryBuilder<'_, T>> {
        let meta = resolve::<T>()?;
        Ok(QueryBuilder::new(self, meta))
    }
}

/// Marshals an instance, enforcing the one-value-per-field invariant.
fn marshal<T: Entity>(meta: &EntityMetadata, instance: &T) -> Result<Vec<Value>> {
    let values = instance.values();
    if values.len() != meta.fields.len() {
        return Err(OrmError::Configuration(format!(
            "{}: marshaled {} values for {} declared fields",
            meta.table,
            values.len(),
            meta.fields.len()
        )));
    }
    Ok(values)
}
