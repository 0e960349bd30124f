//! Fluent construction of one parameterized SELECT statement.
//!
//! [`QueryBuilder`] accumulates structured clause state — predicates, joins,
//! grouping, ordering, pagination — and emits the statement text only when a
//! terminal operation runs. Bound values live inside the clause that owns
//! them and are flattened in emitted-clause order, so the parameter list
//! always lines up with the placeholders left to right.
//!
//! The builder never interprets or validates the emitted SQL. Join
//! conditions in particular are concatenated as raw text and must not carry
//! untrusted input.
//!
//! # Example
//!
//! ```no_run
//! use rowmap::{Database, Op};
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
//! let adults: Vec<Person> = db
//!     .query::<Person>()
//!     .unwrap()
//!     .where_("age", Op::Ge, 18)
//!     .order_by_desc("age")
//!     .limit(10)
//!     .execute()
//!     .unwrap();
//! ```

use std::marker::PhantomData;

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::debug;

use crate::connection::Database;
use crate::error::Result;
use crate::metadata::{Entity, EntityMetadata};

/// Comparison operator for predicates and join conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
        }
    }
}

/// How a predicate attaches to the one before it.
#[derive(Debug, Clone, Copy)]
enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn as_sql(self) -> &'static str {
        match self {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        }
    }
}

/// One WHERE predicate together with the values it binds.
#[derive(Debug)]
struct Predicate {
    combinator: Combinator,
    column: String,
    test: Test,
    params: Vec<Value>,
}

#[derive(Debug)]
enum Test {
    Compare(Op),
    Between,
    In(usize),
}

impl Predicate {
    fn render(&self, out: &mut String) {
        out.push_str(&self.column);
        match &self.test {
            Test::Compare(op) => {
                out.push(' ');
                out.push_str(op.as_sql());
                out.push_str(" ?");
            }
            Test::Between => out.push_str(" BETWEEN ? AND ?"),
            Test::In(count) => {
                let placeholders = vec!["?"; *count].join(", ");
                out.push_str(" IN (");
                out.push_str(&placeholders);
                out.push(')');
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => " JOIN ",
            JoinKind::Left => " LEFT JOIN ",
            JoinKind::Right => " RIGHT JOIN ",
        }
    }
}

/// One join clause; the ON condition is raw text, never parameterized.
#[derive(Debug)]
struct Join {
    kind: JoinKind,
    table: String,
    left: String,
    op: Op,
    right: String,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Asc,
    Desc,
}

/// Mutable builder assembling one SELECT statement for entity type `T`.
///
/// Every modifier mutates the builder and returns it for chaining. The
/// builder is single-use in intent but not enforced:
/// [`execute`](Self::execute) may be re-invoked and re-runs the accumulated
/// statement, and modifiers applied afterwards affect subsequent runs.
pub struct QueryBuilder<'db, T> {
    db: &'db Database,
    meta: EntityMetadata,
    predicates: Vec<Predicate>,
    joins: Vec<Join>,
    group_by: Option<String>,
    having: Option<Predicate>,
    order_by: Option<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    _entity: PhantomData<T>,
}

impl<'db, T: Entity + 'static> QueryBuilder<'db, T> {
    pub(crate) fn new(db: &'db Database, meta: EntityMetadata) -> Self {
        Self {
            db,
            meta,
            predicates: Vec::new(),
            joins: Vec::new(),
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
            offset: None,
            _entity: PhantomData,
        }
    }

    /// Adds a predicate joined to the previous one with AND.
    ///
    /// The first predicate carries no combinator prefix.
    pub fn where_(&mut self, column: &str, op: Op, value: impl Into<Value>) -> &mut Self {
        self.predicates.push(Predicate {
            combinator: Combinator::And,
            column: column.to_string(),
            test: Test::Compare(op),
            params: vec![value.into()],
        });
        self
    }

    /// Adds a predicate joined to the previous one with OR.
    ///
    /// OR is emitted unconditionally once another predicate precedes this
    /// one; as the leading predicate it carries no prefix. Mixing with
    /// [`where_`](Self::where_) changes operator precedence — no grouping
    /// parentheses are emitted.
    pub fn or_where(&mut self, column: &str, op: Op, value: impl Into<Value>) -> &mut Self {
        self.predicates.push(Predicate {
            combinator: Combinator::Or,
            column: column.to_string(),
            test: Test::Compare(op),
            params: vec![value.into()],
        });
        self
    }

    /// Adds a `BETWEEN` predicate binding two values.
    pub fn where_between(
        &mut self,
        column: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> &mut Self {
        self.predicates.push(Predicate {
            combinator: Combinator::And,
            column: column.to_string(),
            test: Test::Between,
            params: vec![min.into(), max.into()],
        });
        self
    }

    /// Adds an `IN` predicate with exactly one placeholder per value, in
    /// caller-supplied order.
    pub fn where_in(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> &mut Self {
        let params: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.predicates.push(Predicate {
            combinator: Combinator::And,
            column: column.to_string(),
            test: Test::In(params.len()),
            params,
        });
        self
    }

    /// Appends an inner join. `left` and `right` are concatenated as raw
    /// column expressions.
    pub fn join(&mut self, table: &str, left: &str, op: Op, right: &str) -> &mut Self {
        self.push_join(JoinKind::Inner, table, left, op, right)
    }

    /// Appends a left outer join.
    pub fn left_join(&mut self, table: &str, left: &str, op: Op, right: &str) -> &mut Self {
        self.push_join(JoinKind::Left, table, left, op, right)
    }

    /// Appends a right outer join.
    pub fn right_join(&mut self, table: &str, left: &str, op: Op, right: &str) -> &mut Self {
        self.push_join(JoinKind::Right, table, left, op, right)
    }

    fn push_join(
        &mut self,
        kind: JoinKind,
        table: &str,
        left: &str,
        op: Op,
        right: &str,
    ) -> &mut Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            left: left.to_string(),
            op,
            right: right.to_string(),
        });
        self
    }

    /// Sets the grouping column.
    pub fn group_by(&mut self, column: &str) -> &mut Self {
        self.group_by = Some(column.to_string());
        self
    }

    /// Sets the HAVING predicate, binding one value.
    pub fn having(&mut self, column: &str, op: Op, value: impl Into<Value>) -> &mut Self {
        self.having = Some(Predicate {
            combinator: Combinator::And,
            column: column.to_string(),
            test: Test::Compare(op),
            params: vec![value.into()],
        });
        self
    }

    /// Sets the sort key, ascending. The last ordering call wins.
    pub fn order_by(&mut self, column: &str) -> &mut Self {
        self.order_by = Some((column.to_string(), Direction::Asc));
        self
    }

    /// Sets the sort key, descending. The last ordering call wins.
    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.order_by = Some((column.to_string(), Direction::Desc));
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Emits the accumulated statement text.
    ///
    /// Clauses render in fixed slots regardless of the order modifiers were
    /// called: joins, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT, OFFSET.
    pub fn sql(&self) -> String {
        let mut out = format!("SELECT * FROM {}", self.meta.table);

        for join in &self.joins {
            out.push_str(join.kind.as_sql());
            out.push_str(&join.table);
            out.push_str(" ON ");
            out.push_str(&join.left);
            out.push(' ');
            out.push_str(join.op.as_sql());
            out.push(' ');
            out.push_str(&join.right);
        }

        for (i, predicate) in self.predicates.iter().enumerate() {
            out.push_str(if i == 0 {
                " WHERE "
            } else {
                predicate.combinator.as_sql()
            });
            predicate.render(&mut out);
        }

        if let Some(column) = &self.group_by {
            out.push_str(" GROUP BY ");
            out.push_str(column);
        }

        if let Some(having) = &self.having {
            out.push_str(" HAVING ");
            having.render(&mut out);
        }

        if let Some((column, direction)) = &self.order_by {
            out.push_str(" ORDER BY ");
            out.push_str(column);
            if matches!(direction, Direction::Desc) {
                out.push_str(" DESC");
            }
        }

        if let Some(limit) = self.limit {
            out.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            out.push_str(&format!(" OFFSET {offset}"));
        }

        out
    }

    /// Bound values in emitted-placeholder order.
    fn params(&self) -> impl Iterator<Item = &Value> {
        self.predicates
            .iter()
            .flat_map(|p| p.params.iter())
            .chain(self.having.iter().flat_map(|p| p.params.iter()))
    }

    /// Runs the accumulated statement and hydrates every matching row,
    /// preserving result-set order.
    ///
    /// Re-invoking re-runs the same statement; the builder state is left
    /// untouched.
    pub fn execute(&self) -> Result<Vec<T>> {
        let sql = self.sql();
        debug!(sql = %sql, "execute");

        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.params()), |row| T::from_row(row))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Imposes `LIMIT 1`, executes, and returns the first hydrated instance
    /// or `None`.
    pub fn first(&mut self) -> Result<Option<T>> {
        self.limit(1);
        Ok(self.execute()?.into_iter().next())
    }

    #[cfg(test)]
    fn param_count(&self) -> usize {
        self.params().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EntityDescriptor, column_value};
    use rusqlite::Row;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        id: Option<i64>,
        name: String,
        price: i64,
    }

    impl Entity for Item {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new("items", &[("id", "id"), ("name", "name"), ("price", "price")])
        }

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn values(&self) -> Vec<Value> {
            vec![self.id.into(), self.name.clone().into(), self.price.into()]
        }

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: column_value(row, "id")?,
                name: column_value(row, "name")?,
                price: column_value(row, "price")?,
            })
        }
    }

    fn items_db() -> Database {
        let db = Database::in_memory();
        db.connection()
            .unwrap()
            .execute_batch(
                "CREATE TABLE items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    price INTEGER NOT NULL
                );
                INSERT INTO items (name, price) VALUES
                    ('apple', 3), ('banana', 1), ('cherry', 9), ('durian', 12);",
            )
            .unwrap();
        db
    }

    fn placeholder_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_bare_query_selects_all() {
        let db = items_db();
        let builder = db.query::<Item>().unwrap();
        assert_eq!(builder.sql(), "SELECT * FROM items");
        let all = builder.execute().unwrap();
        assert_eq!(all.len(), 4);
        // Result-set order is preserved.
        assert_eq!(all[0].name, "apple");
        assert_eq!(all[3].name, "durian");
    }

    #[test]
    fn test_first_where_has_no_combinator() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_("price", Op::Gt, 2);
        assert_eq!(builder.sql(), "SELECT * FROM items WHERE price > ?");
    }

    #[test]
    fn test_chained_where_uses_and() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder
            .where_("price", Op::Gt, 2)
            .where_("price", Op::Lt, 10);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items WHERE price > ? AND price < ?"
        );
        assert_eq!(builder.param_count(), 2);
    }

    #[test]
    fn test_or_where_always_emits_or() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder
            .where_("price", Op::Lt, 2)
            .or_where("price", Op::Gt, 10);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items WHERE price < ? OR price > ?"
        );
        let rows = builder.execute().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_leading_or_where_carries_no_prefix() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.or_where("price", Op::Gt, 10);
        assert_eq!(builder.sql(), "SELECT * FROM items WHERE price > ?");
    }

    #[test]
    fn test_where_between_binds_two_params() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_between("price", 2, 10);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items WHERE price BETWEEN ? AND ?"
        );
        assert_eq!(builder.param_count(), 2);
        let rows = builder.execute().unwrap();
        assert_eq!(rows.len(), 2); // apple (3), cherry (9)
    }

    #[test]
    fn test_where_in_emits_one_placeholder_per_value() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_in("price", [1i64, 9, 12]);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items WHERE price IN (?, ?, ?)"
        );
        assert_eq!(builder.param_count(), 3);
        let rows = builder.execute().unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_params_match_placeholders_in_clause_order() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder
            .where_("price", Op::Gt, 0)
            .where_in("name", ["apple".to_string(), "cherry".to_string()])
            .where_between("price", 1, 20)
            .or_where("price", Op::Eq, 3)
            .group_by("name")
            .having("price", Op::Lt, 100);
        let sql = builder.sql();
        assert_eq!(placeholder_count(&sql), builder.param_count());
        // HAVING binds after every WHERE value, matching emission order.
        assert!(sql.find(" WHERE ").unwrap() < sql.find(" HAVING ").unwrap());
    }

    #[test]
    fn test_having_renders_after_group_by() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.group_by("name").having("price", Op::Gt, 1);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items GROUP BY name HAVING price > ?"
        );
    }

    #[test]
    fn test_join_concatenates_raw_text() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.join("orders", "items.id", Op::Eq, "orders.item_id");
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items JOIN orders ON items.id = orders.item_id"
        );
        assert_eq!(builder.param_count(), 0);
    }

    #[test]
    fn test_left_and_right_join_keywords() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder
            .left_join("a", "items.id", Op::Eq, "a.item_id")
            .right_join("b", "items.id", Op::Eq, "b.item_id");
        let sql = builder.sql();
        assert!(sql.contains(" LEFT JOIN a ON "));
        assert!(sql.contains(" RIGHT JOIN b ON "));
    }

    #[test]
    fn test_order_limit_offset() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.order_by_desc("price").limit(2).offset(1);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items ORDER BY price DESC LIMIT 2 OFFSET 1"
        );
        let rows = builder.execute().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "cherry");
        assert_eq!(rows[1].name, "apple");
    }

    #[test]
    fn test_last_ordering_call_wins() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.order_by("name").order_by_desc("price");
        assert_eq!(builder.sql(), "SELECT * FROM items ORDER BY price DESC");
    }

    #[test]
    fn test_clauses_render_in_fixed_slots() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        // Modifiers called out of clause order still emit canonically.
        builder
            .limit(5)
            .where_("price", Op::Gt, 1)
            .order_by("price");
        assert_eq!(
            builder.sql(),
            "SELECT * FROM items WHERE price > ? ORDER BY price LIMIT 5"
        );
    }

    #[test]
    fn test_first_imposes_limit_one() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.order_by_desc("price");
        let first = builder.first().unwrap().unwrap();
        assert_eq!(first.name, "durian");
        assert!(builder.sql().ends_with(" LIMIT 1"));
    }

    #[test]
    fn test_first_on_empty_result_is_none() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_("price", Op::Gt, 1000);
        assert!(builder.first().unwrap().is_none());
    }

    #[test]
    fn test_execute_is_reinvocable_and_modifiable_after_run() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_("price", Op::Gt, 2);
        assert_eq!(builder.execute().unwrap().len(), 3);
        assert_eq!(builder.execute().unwrap().len(), 3);

        builder.where_("price", Op::Lt, 10);
        assert_eq!(builder.execute().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_where_in_emits_empty_list() {
        let db = items_db();
        let mut builder = db.query::<Item>().unwrap();
        builder.where_in("price", Vec::<i64>::new());
        assert_eq!(builder.sql(), "SELECT * FROM items WHERE price IN ()");
        assert_eq!(builder.param_count(), 0);
    }
}
