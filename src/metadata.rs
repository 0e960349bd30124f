//! Declarative entity-to-table mapping and its process-wide registry.
//!
//! An entity type declares its mapping once through [`Entity::descriptor`]:
//! a table name plus an ordered list of `(field, column)` pairs. The
//! [`resolve`] function validates the declaration and caches the result per
//! type for the lifetime of the process. Declaration order is load-bearing —
//! it fixes both the INSERT column list and positional parameter binding.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use rusqlite::Row;
use rusqlite::types::{FromSql, Value};

use crate::error::{OrmError, Result};

/// Static mapping declaration supplied by an entity type.
///
/// `fields` pairs each persistent field name with its column name, in
/// declaration order.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Name of the backing table.
    pub table: &'static str,
    /// `(field, column)` pairs in declaration order.
    pub fields: &'static [(&'static str, &'static str)],
}

impl EntityDescriptor {
    /// Creates a descriptor from a table name and ordered field mapping.
    pub const fn new(
        table: &'static str,
        fields: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { table, fields }
    }
}

/// A validated [`EntityDescriptor`], resolved once per type.
///
/// Immutable after first resolution; lives in a process-wide registry.
#[derive(Debug, Clone, Copy)]
pub struct EntityMetadata {
    /// Name of the backing table.
    pub table: &'static str,
    /// `(field, column)` pairs in declaration order.
    pub fields: &'static [(&'static str, &'static str)],
}

impl EntityMetadata {
    /// Column names in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(_, column)| *column)
    }
}

/// A record type mapped onto one table row.
///
/// Implementations provide the static mapping declaration plus explicit
/// marshaling in both directions; no runtime field introspection happens
/// anywhere in the crate. `values` must produce exactly one value per
/// declared field, in declaration order.
///
/// # Examples
///
/// ```
/// use rowmap::{column_value, Entity, EntityDescriptor};
/// use rusqlite::types::Value;
/// use rusqlite::Row;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Person {
///     id: Option<i64>,
///     name: String,
///     age: i64,
/// }
///
/// impl Entity for Person {
///     fn descriptor() -> EntityDescriptor {
///         EntityDescriptor::new(
///             "persons",
///             &[("id", "id"), ("name", "name"), ("age", "age")],
///         )
///     }
///
///     fn id(&self) -> Option<i64> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = Some(id);
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.into(), self.name.clone().into(), self.age.into()]
///     }
///
///     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self {
///             id: column_value(row, "id")?,
///             name: column_value(row, "name")?,
///             age: column_value(row, "age")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Default {
    /// The static table/column declaration for this type.
    fn descriptor() -> EntityDescriptor;

    /// Current identity value, if the instance has been persisted.
    fn id(&self) -> Option<i64>;

    /// Writes a store-generated identity back into the instance.
    fn set_id(&mut self, id: i64);

    /// Field values in declaration order, one per mapped field.
    fn values(&self) -> Vec<Value>;

    /// Hydrates an instance from a result row.
    ///
    /// Mapped columns absent from the row leave the field at its default;
    /// columns the mapping does not know are ignored.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Reads one column from a result row, tolerating its absence.
///
/// Returns the field's `Default` when the row has no column of that name;
/// any other failure (for example a type the field cannot hold) propagates.
pub fn column_value<T: FromSql + Default>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
    match row.get(column) {
        Err(rusqlite::Error::InvalidColumnName(_)) => Ok(T::default()),
        other => other,
    }
}

fn registry() -> &'static Mutex<HashMap<TypeId, EntityMetadata>> {
    static REGISTRY: OnceLock<Mutex<HashMap<TypeId, EntityMetadata>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolves and validates the metadata for an entity type.
///
/// The first successful resolution is cached for the process lifetime;
/// later calls return the cached value. Declaration order is preserved.
///
/// # Errors
///
/// Returns [`OrmError::Configuration`] when the declaration is invalid:
/// empty or malformed table name, no fields, malformed field or column
/// identifiers, or a field/column declared twice.
pub fn resolve<T: Entity + 'static>() -> Result<EntityMetadata> {
    let key = TypeId::of::<T>();
    if let Some(meta) = registry().lock().expect("metadata registry poisoned").get(&key) {
        return Ok(*meta);
    }

    let meta = validate::<T>()?;
    let mut map = registry().lock().expect("metadata registry poisoned");
    Ok(*map.entry(key).or_insert(meta))
}

fn validate<T: Entity + 'static>() -> Result<EntityMetadata> {
    let descriptor = T::descriptor();
    let type_name = std::any::type_name::<T>();

    if !is_identifier(descriptor.table) {
        return Err(OrmError::Configuration(format!(
            "{type_name}: table name '{}' must be a non-empty identifier",
            descriptor.table
        )));
    }
    if descriptor.fields.is_empty() {
        return Err(OrmError::Configuration(format!(
            "{type_name}: no persistent fields declared"
        )));
    }

    let mut seen_fields = HashSet::new();
    let mut seen_columns = HashSet::new();
    for (field, column) in descriptor.fields {
        if !is_identifier(column) {
            return Err(OrmError::Configuration(format!(
                "{type_name}: column name '{column}' must be a non-empty identifier"
            )));
        }
        if !seen_fields.insert(field) {
            return Err(OrmError::Configuration(format!(
                "{type_name}: field '{field}' declared twice"
            )));
        }
        if !seen_columns.insert(column) {
            return Err(OrmError::Configuration(format!(
                "{type_name}: column '{column}' mapped twice"
            )));
        }
    }

    Ok(EntityMetadata {
        table: descriptor.table,
        fields: descriptor.fields,
    })
}

/// Checks that a name contains only alphanumeric characters and underscores.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Widget {
        id: Option<i64>,
        label: String,
    }

    impl Entity for Widget {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("widgets", &[("id", "id"), ("label", "label")])
        }

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn values(&self) -> Vec<Value> {
            vec![self.id.into(), self.label.clone().into()]
        }

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: column_value(row, "id")?,
                label: column_value(row, "label")?,
            })
        }
    }

    #[derive(Debug, Default)]
    struct NoTable;

    impl Entity for NoTable {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("", &[("id", "id")])
        }

        fn id(&self) -> Option<i64> {
            None
        }

        fn set_id(&mut self, _id: i64) {}

        fn values(&self) -> Vec<Value> {
            vec![Value::Null]
        }

        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self)
        }
    }

    #[derive(Debug, Default)]
    struct DoubledColumn;

    impl Entity for DoubledColumn {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("doubled", &[("a", "x"), ("b", "x")])
        }

        fn id(&self) -> Option<i64> {
            None
        }

        fn set_id(&mut self, _id: i64) {}

        fn values(&self) -> Vec<Value> {
            vec![Value::Null, Value::Null]
        }

        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn test_resolve_valid_entity() {
        let meta = resolve::<Widget>().unwrap();
        assert_eq!(meta.table, "widgets");
        assert_eq!(meta.fields.len(), 2);
        assert_eq!(meta.columns().collect::<Vec<_>>(), vec!["id", "label"]);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve::<Widget>().unwrap();
        let b = resolve::<Widget>().unwrap();
        assert_eq!(a.table, b.table);
        assert_eq!(a.fields, b.fields);
    }

    #[test]
    fn test_resolve_rejects_missing_table() {
        let err = resolve::<NoTable>().unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_duplicate_column() {
        let err = resolve::<DoubledColumn>().unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("persons"));
        assert!(is_identifier("first_name"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("drop;--"));
        assert!(!is_identifier("first name"));
    }

    #[test]
    fn test_column_value_absent_column_defaults() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
        let (a, missing): (i64, i64) = conn
            .query_row("SELECT a FROM t", [], |row| {
                Ok((column_value(row, "a")?, column_value(row, "b")?))
            })
            .unwrap();
        assert_eq!(a, 7);
        assert_eq!(missing, 0);
    }
}
