//! System Catalog for PebbleSQL
//!
//! This module maps table names to tables. Names are case-insensitive and
//! iteration follows creation order.

use indexmap::IndexMap;

use super::schema::Schema;
use crate::error::{Error, Result};
use crate::storage::Table;

/// System Catalog - owns every table of a connection.
///
/// Cloning is cheap: tables share their rows copy-on-write, so a clone
/// serves as a savepoint.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Tables keyed by lowercased name
    tables: IndexMap<String, Table>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new table
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<&mut Table> {
        let key = name.to_lowercase();
        if self.tables.contains_key(&key) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }

        let entry = self.tables.entry(key).or_insert(Table::new(name, schema));
        Ok(entry)
    }

    /// Insert a fully built table, replacing any table of the same name
    pub fn put_table(&mut self, table: Table) {
        self.tables.insert(table.name().to_lowercase(), table);
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Get a table by name for modification
    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// Drop a table
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        // shift_remove keeps the remaining tables in creation order
        match self.tables.shift_remove(&name.to_lowercase()) {
            Some(_) => Ok(()),
            None => Err(Error::TableNotFound(name.to_string())),
        }
    }

    /// List all table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name().to_string()).collect()
    }

    /// Iterate over tables in creation order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the catalog has no tables
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::functions::FunctionRegistry;
    use crate::storage::{Tuple, Value};

    fn users_schema() -> Schema {
        Schema::from_columns(vec![
            Column::new("id", Some("INTEGER".into()), 0).primary_key(true),
            Column::new("name", Some("TEXT".into()), 1),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_and_get_table() {
        let mut catalog = Catalog::new();
        catalog.create_table("Users", users_schema()).unwrap();

        let table = catalog.get_table("users").unwrap();
        assert_eq!(table.name(), "Users");
        assert_eq!(table.schema().column_count(), 2);
        assert!(catalog.table_exists("USERS"));
    }

    #[test]
    fn test_duplicate_table() {
        let mut catalog = Catalog::new();
        catalog.create_table("users", users_schema()).unwrap();
        let result = catalog.create_table("USERS", users_schema());
        assert!(matches!(result, Err(Error::TableAlreadyExists(_))));
    }

    #[test]
    fn test_drop_table_keeps_order() {
        let mut catalog = Catalog::new();
        for name in ["a", "b", "c"] {
            catalog.create_table(name, users_schema()).unwrap();
        }
        catalog.drop_table("b").unwrap();
        assert_eq!(catalog.list_tables(), vec!["a", "c"]);
        assert!(matches!(
            catalog.drop_table("b"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_clone_is_savepoint() {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut catalog = Catalog::new();
        catalog.create_table("users", users_schema()).unwrap();

        let savepoint = catalog.clone();
        catalog
            .get_table_mut("users")
            .unwrap()
            .insert(
                vec![Tuple::new(vec![Value::Null, "Ann".into()])],
                &functions,
            )
            .unwrap();
        catalog.create_table("extra", users_schema()).unwrap();

        assert_eq!(catalog.get_table("users").unwrap().row_count(), 1);
        assert_eq!(savepoint.get_table("users").unwrap().row_count(), 0);
        assert!(!savepoint.table_exists("extra"));
    }
}
