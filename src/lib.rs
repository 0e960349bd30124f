//! Lightweight persistence layer mapping entity records onto SQLite rows.
//!
//! `rowmap` provides three capabilities over one shared
//! [`rusqlite`] connection:
//!
//! - a single-row CRUD engine driven by declarative field-to-column
//!   metadata ([`Entity`] + the mapper methods on [`Database`]),
//! - a fluent [`QueryBuilder`] assembling one parameterized SELECT
//!   statement, and
//! - a [`MigrationManager`] guaranteeing each named schema change is applied
//!   at most once, with durable history in a ledger table.
//!
//! # Architecture
//!
//! - **`connection`** — [`Database`]: lazy shared connection with
//!   fixed-backoff retry, plus [`DatabaseConfig`]
//! - **`metadata`** — the [`Entity`] trait, descriptor validation, and the
//!   process-wide resolution cache
//! - **`mapper`** — `save` / `update` / `delete` / `find_by_id` / `query`
//! - **`query`** — clause accumulation and statement emission
//! - **`migration`** — the ledger and apply/rollback lifecycle
//! - **`schema`** — [`TableDef`] / [`Schema`] declarative DDL helpers
//!
//! # Quick start
//!
//! ```no_run
//! use rowmap::{column_value, Database, Entity, EntityDescriptor, MigrationManager, Op,
//!     Schema, TableDef};
//! use rusqlite::types::Value;
//! use rusqlite::Row;
//!
//! #[derive(Debug, Default, Clone)]
//! struct Person {
//!     id: Option<i64>,
//!     first_name: String,
//!     age: i64,
//! }
//!
//! impl Entity for Person {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::new(
//!             "persons",
//!             &[("id", "id"), ("first_name", "first_name"), ("age", "age")],
//!         )
//!     }
//!     fn id(&self) -> Option<i64> { self.id }
//!     fn set_id(&mut self, id: i64) { self.id = Some(id); }
//!     fn values(&self) -> Vec<Value> {
//!         vec![self.id.into(), self.first_name.clone().into(), self.age.into()]
//!     }
//!     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
//!         Ok(Self {
//!             id: column_value(row, "id")?,
//!             first_name: column_value(row, "first_name")?,
//!             age: column_value(row, "age")?,
//!         })
//!     }
//! }
//!
//! let db = Database::open("app.db");
//!
//! let manager = MigrationManager::new(&db);
//! manager.initialize().unwrap();
//! manager
//!     .apply_migration("CreatePersonsTable", |db| {
//!         let mut def = TableDef::new();
//!         def.integer_primary_key("id").text("first_name").integer("age");
//!         Schema::new(db).create("persons", &def)
//!     })
//!     .unwrap();
//!
//! let mut john = Person { first_name: "John".into(), age: 30, ..Person::default() };
//! db.save(&mut john).unwrap();
//!
//! let oldest = db
//!     .query::<Person>()
//!     .unwrap()
//!     .where_("age", Op::Gt, 18)
//!     .order_by_desc("age")
//!     .first()
//!     .unwrap();
//! ```
//!
//! # Concurrency
//!
//! Everything runs synchronously against one connection. [`Database`] is not
//! `Sync`; concurrent callers must serialize externally.

mod connection;
mod error;
mod mapper;
mod metadata;
mod migration;
mod query;
mod schema;

pub use connection::{Database, DatabaseConfig};
pub use error::{OrmError, Result};
pub use metadata::{Entity, EntityDescriptor, EntityMetadata, column_value, resolve};
pub use migration::MigrationManager;
pub use query::{Op, QueryBuilder};
pub use schema::{Schema, TableDef};
