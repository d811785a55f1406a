//! Schema definitions for PebbleSQL
//!
//! This module defines table schemas and column metadata.

use super::types::Affinity;
use crate::error::{Error, Result};
use crate::sql::quote_identifier;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type, verbatim (advisory)
    pub declared_type: Option<String>,
    /// Affinity derived from the declared type
    pub affinity: Affinity,
    /// Column position (0-indexed)
    pub position: usize,
    /// Is this column nullable?
    pub nullable: bool,
    /// Default value
    pub default: Option<Value>,
    /// Is this the primary key?
    pub primary_key: bool,
    /// Is this column unique?
    pub unique: bool,
    /// Default collation for comparisons on this column
    pub collation: Option<String>,
}

impl Column {
    /// Create a new column with minimal required fields
    pub fn new(name: impl Into<String>, declared_type: Option<String>, position: usize) -> Self {
        let affinity = Affinity::from_declared(declared_type.as_deref());
        Self {
            name: name.into(),
            declared_type,
            affinity,
            position,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            collation: None,
        }
    }

    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set default value
    pub fn default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set primary key flag
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        self
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set the column's collation
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Whether this column is an auto-assigned integer key
    pub fn is_integer_key(&self) -> bool {
        self.primary_key
            && self
                .declared_type
                .as_deref()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("integer"))
    }

    /// Render the column definition as SQL
    pub fn to_sql(&self) -> String {
        let mut sql = quote_identifier(&self.name);
        if let Some(declared) = &self.declared_type {
            sql.push(' ');
            sql.push_str(declared);
        }
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql_literal());
        }
        if let Some(collation) = &self.collation {
            sql.push_str(" COLLATE ");
            sql.push_str(collation);
        }
        sql
    }
}

/// Table schema - defines the structure of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,
    /// Lowercased column name to index mapping
    name_to_index: HashMap<String, usize>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            name_to_index: HashMap::new(),
        }
    }

    /// Create a schema from a list of columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut schema = Self::new();
        for col in columns {
            schema.add_column(col)?;
        }
        Ok(schema)
    }

    /// Add a column to the schema
    pub fn add_column(&mut self, mut column: Column) -> Result<()> {
        let key = column.name.to_lowercase();
        if self.name_to_index.contains_key(&key) {
            return Err(Error::DuplicateColumn(column.name));
        }
        if column.primary_key && self.primary_key_index().is_some() {
            return Err(Error::Misuse(
                "a table may have only one primary key column".to_string(),
            ));
        }
        column.position = self.columns.len();
        self.name_to_index.insert(key, column.position);
        self.columns.push(column);
        Ok(())
    }

    /// Get column by name (case-insensitive)
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.get_column_index(name).map(|idx| &self.columns[idx])
    }

    /// Get column index by name (case-insensitive)
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(&name.to_lowercase()).copied()
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Position of the primary key column, if any
    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.primary_key)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Render a CREATE TABLE statement reproducing this schema
    pub fn to_create_sql(&self, table_name: &str) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::to_sql).collect();
        format!(
            "CREATE TABLE {} ({});",
            quote_identifier(table_name),
            columns.join(", ")
        )
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let mut schema = Schema::new();
        schema
            .add_column(Column::new("id", Some("INTEGER".into()), 0).primary_key(true))
            .unwrap();
        schema
            .add_column(Column::new("Name", Some("varchar(100)".into()), 1).nullable(false))
            .unwrap();
        schema.add_column(Column::new("email", None, 2)).unwrap();

        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.get_column_index("NAME"), Some(1));
        assert!(schema.get_column("unknown").is_none());
        assert_eq!(schema.primary_key_index(), Some(0));
        assert!(schema.columns()[0].is_integer_key());
        assert_eq!(schema.columns()[1].affinity, Affinity::Text);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut schema = Schema::new();
        schema.add_column(Column::new("a", None, 0)).unwrap();
        let result = schema.add_column(Column::new("A", None, 1));
        assert!(matches!(result, Err(Error::DuplicateColumn(_))));
    }

    #[test]
    fn test_create_sql_rendering() {
        let schema = Schema::from_columns(vec![
            Column::new("id", Some("integer".into()), 0).primary_key(true),
            Column::new("name", Some("text".into()), 1)
                .unique(true)
                .default(Value::Text("x".into()))
                .collation("nocase"),
            Column::new("data", None, 2),
        ])
        .unwrap();

        assert_eq!(
            schema.to_create_sql("people"),
            "CREATE TABLE \"people\" (\"id\" integer PRIMARY KEY, \
             \"name\" text UNIQUE DEFAULT 'x' COLLATE nocase, \"data\");"
        );
    }
}
