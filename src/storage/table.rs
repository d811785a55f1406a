//! Table storage for PebbleSQL
//!
//! This module combines a schema with its rows and enforces the table's
//! constraints. Rows are shared copy-on-write: a reader holding a snapshot
//! keeps seeing the rows as they were when it took it.

use std::cmp::Ordering;
use std::sync::Arc;

use super::tuple::{Tuple, Value};
use crate::catalog::Schema;
use crate::error::{Error, Result};
use crate::functions::{Collation, FunctionRegistry};

/// A table combining schema and row storage
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name as declared
    name: String,
    /// Column definitions
    schema: Arc<Schema>,
    /// Row storage
    rows: Arc<Vec<Tuple>>,
    /// Rowid handed to the most recently inserted row
    last_rowid: i64,
}

impl Table {
    /// Create a new, empty table
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            rows: Arc::new(Vec::new()),
            last_rowid: 0,
        }
    }

    /// Rebuild a table from stored rows
    pub fn from_rows(name: impl Into<String>, schema: Schema, rows: Vec<Tuple>) -> Self {
        let last_rowid = rows.len() as i64;
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            rows: Arc::new(rows),
            last_rowid,
        }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get table schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Snapshot of the current rows
    pub fn rows(&self) -> Arc<Vec<Tuple>> {
        Arc::clone(&self.rows)
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rowid of the most recent insert
    pub fn last_rowid(&self) -> i64 {
        self.last_rowid
    }

    /// Insert rows atomically: either every row is stored or none is.
    ///
    /// Rows must already be aligned with the schema. Returns the rowid of the
    /// last inserted row.
    pub fn insert(&mut self, rows: Vec<Tuple>, functions: &FunctionRegistry) -> Result<i64> {
        let mut rows = rows;
        self.check_arity(&rows)?;
        let mut last_rowid = self.last_rowid;

        if let Some(pk) = self.schema.primary_key_index() {
            if self.schema.columns()[pk].is_integer_key() {
                let mut next_key = self.max_integer(pk).map_or(1, |max| max.saturating_add(1));
                for row in rows.iter_mut() {
                    match row.get(pk) {
                        Some(Value::Null) => {
                            row.set(pk, Value::Integer(next_key));
                            next_key = next_key.saturating_add(1);
                        }
                        Some(Value::Integer(key)) => next_key = next_key.max(key.saturating_add(1)),
                        _ => {}
                    }
                }
            }
        }

        self.check_not_null(&rows)?;
        for (idx, column) in self.schema.columns().iter().enumerate() {
            if column.primary_key || column.unique {
                let collation = self.column_collation(idx, functions)?;
                check_unique_insert(&self.rows, &rows, idx, collation.as_ref(), &self.describe(idx))?;
            }
        }

        let integer_key = self
            .schema
            .primary_key_index()
            .filter(|&pk| self.schema.columns()[pk].is_integer_key());
        for row in &rows {
            last_rowid = match integer_key.and_then(|pk| row.get(pk)) {
                Some(Value::Integer(key)) => *key,
                _ => last_rowid + 1,
            };
        }

        Arc::make_mut(&mut self.rows).extend(rows);
        self.last_rowid = last_rowid;
        Ok(last_rowid)
    }

    /// Replace the whole row set after validating every constraint.
    ///
    /// Used by UPDATE and DELETE; on error the table is left untouched.
    pub fn replace_rows(&mut self, rows: Vec<Tuple>, functions: &FunctionRegistry) -> Result<()> {
        self.check_arity(&rows)?;
        self.check_not_null(&rows)?;
        for (idx, column) in self.schema.columns().iter().enumerate() {
            if column.primary_key || column.unique {
                let collation = self.column_collation(idx, functions)?;
                check_unique_all(&rows, idx, collation.as_ref(), &self.describe(idx))?;
            }
        }
        self.rows = Arc::new(rows);
        Ok(())
    }

    /// Resolve the declared collation of a column
    pub fn column_collation(
        &self,
        column: usize,
        functions: &FunctionRegistry,
    ) -> Result<Option<Collation>> {
        match &self.schema.columns()[column].collation {
            Some(name) => functions.collation(name).map(Some),
            None => Ok(None),
        }
    }

    fn describe(&self, column: usize) -> String {
        format!("{}.{}", self.name, self.schema.columns()[column].name)
    }

    fn check_arity(&self, rows: &[Tuple]) -> Result<()> {
        let expected = self.schema.column_count();
        match rows.iter().find(|row| row.len() != expected) {
            Some(row) => Err(Error::Misuse(format!(
                "table {} has {} columns but {} values were supplied",
                self.name,
                expected,
                row.len()
            ))),
            None => Ok(()),
        }
    }

    fn check_not_null(&self, rows: &[Tuple]) -> Result<()> {
        for (idx, column) in self.schema.columns().iter().enumerate() {
            if column.nullable {
                continue;
            }
            if rows.iter().any(|row| row.get(idx).map_or(true, Value::is_null)) {
                return Err(Error::Integrity(format!(
                    "NOT NULL constraint failed: {}",
                    self.describe(idx)
                )));
            }
        }
        Ok(())
    }

    fn max_integer(&self, column: usize) -> Option<i64> {
        self.rows
            .iter()
            .filter_map(|row| match row.get(column) {
                Some(Value::Integer(i)) => Some(*i),
                _ => None,
            })
            .max()
    }
}

fn unique_violation(what: &str) -> Error {
    Error::Integrity(format!("UNIQUE constraint failed: {}", what))
}

/// New rows must not collide with existing rows or with each other.
/// NULLs never collide.
fn check_unique_insert(
    existing: &[Tuple],
    new_rows: &[Tuple],
    column: usize,
    collation: Option<&Collation>,
    what: &str,
) -> Result<()> {
    let mut keys: Vec<&Value> = new_rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .collect();
    keys.sort_by(|a, b| a.compare_with(b, collation));
    if keys
        .windows(2)
        .any(|pair| pair[0].compare_with(pair[1], collation) == Ordering::Equal)
    {
        return Err(unique_violation(what));
    }

    for row in existing {
        let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
            continue;
        };
        let hit = keys
            .binary_search_by(|existing| existing.compare_with(value, collation))
            .is_ok();
        if hit {
            return Err(unique_violation(what));
        }
    }
    Ok(())
}

fn check_unique_all(
    rows: &[Tuple],
    column: usize,
    collation: Option<&Collation>,
    what: &str,
) -> Result<()> {
    check_unique_insert(&[], rows, column, collation, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;

    fn people() -> Table {
        let schema = Schema::from_columns(vec![
            Column::new("id", Some("integer".into()), 0).primary_key(true),
            Column::new("first_name", Some("varchar".into()), 1).unique(true),
        ])
        .unwrap();
        Table::new("person", schema)
    }

    fn row(values: Vec<Value>) -> Tuple {
        Tuple::new(values)
    }

    #[test]
    fn test_integer_key_assigned() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut table = people();

        let rowid = table
            .insert(vec![row(vec![Value::Null, "Joe".into()])], &functions)
            .unwrap();
        assert_eq!(rowid, 1);
        let rowid = table
            .insert(vec![row(vec![Value::Null, "Ann".into()])], &functions)
            .unwrap();
        assert_eq!(rowid, 2);
        assert_eq!(table.rows()[1].get(0), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_integer_keys_within_one_insert() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut table = people();
        table
            .insert(vec![row(vec![Value::Integer(5), "Joe".into()])], &functions)
            .unwrap();

        let rowid = table
            .insert(
                vec![
                    row(vec![Value::Null, "Ann".into()]),
                    row(vec![Value::Integer(9), "Bob".into()]),
                    row(vec![Value::Null, "Cat".into()]),
                ],
                &functions,
            )
            .unwrap();
        let keys: Vec<_> = table.rows().iter().map(|r| r.get(0).cloned()).collect();
        assert_eq!(
            keys,
            [5, 6, 9, 10].map(|k| Some(Value::Integer(k))).to_vec()
        );
        assert_eq!(rowid, 10);
    }

    #[test]
    fn test_unique_violation_leaves_table_unchanged() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut table = people();
        table
            .insert(vec![row(vec![Value::Null, "Joe".into()])], &functions)
            .unwrap();

        let result = table.insert(
            vec![
                row(vec![Value::Null, "Zed".into()]),
                row(vec![Value::Null, "Joe".into()]),
            ],
            &functions,
        );
        assert!(matches!(result, Err(Error::Integrity(_))));
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_nulls_never_collide() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut table = people();
        table
            .insert(
                vec![row(vec![Value::Null, Value::Null]), row(vec![Value::Null, Value::Null])],
                &functions,
            )
            .unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_snapshot_isolated_from_writes() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut table = people();
        table
            .insert(vec![row(vec![Value::Null, "Joe".into()])], &functions)
            .unwrap();

        let snapshot = table.rows();
        table.replace_rows(Vec::new(), &functions).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_collated_uniqueness() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let schema = Schema::from_columns(vec![
            Column::new("tag", Some("text".into()), 0).primary_key(true).collation("nocase"),
        ])
        .unwrap();
        let mut table = Table::new("tags", schema);
        table.insert(vec![row(vec!["Rust".into()])], &functions).unwrap();
        let result = table.insert(vec![row(vec!["RUST".into()])], &functions);
        assert!(matches!(result, Err(Error::Integrity(_))));
    }
}
