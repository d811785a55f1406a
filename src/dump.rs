//! SQL text dumps
//!
//! A dump is a list of statements that recreate a catalog:
//! `BEGIN TRANSACTION;`, the `CREATE TABLE` of every table in creation
//! order, one `INSERT` per row and a closing `COMMIT;`.

use tracing::info;

use crate::adapter::Params;
use crate::catalog::Catalog;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::sql::{parse_script, quote_identifier, Statement};

/// Render a catalog as SQL statements
pub fn dump_catalog(catalog: &Catalog) -> Vec<String> {
    let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
    for table in catalog.tables() {
        statements.push(table.schema().to_create_sql(table.name()));
        let name = quote_identifier(table.name());
        for row in table.rows().iter() {
            let values: Vec<String> = row.values().iter().map(|v| v.to_sql_literal()).collect();
            statements.push(format!("INSERT INTO {} VALUES({});", name, values.join(",")));
        }
    }
    statements.push("COMMIT;".to_string());
    statements
}

impl Connection {
    /// Dump the database as SQL statements
    pub fn dump(&self) -> Vec<String> {
        dump_catalog(self.catalog())
    }

    /// Execute dumped statements inside one transaction scope
    ///
    /// The dump's own `BEGIN`/`COMMIT` lines are skipped; if any statement
    /// fails, nothing is loaded.
    pub fn load<I, S>(&mut self, statements: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_idle("load")?;
        let mut parsed = Vec::new();
        for sql in statements {
            parsed.extend(parse_script(sql.as_ref())?);
        }

        let count = parsed.len();
        self.with_transaction(|conn| {
            for statement in &parsed {
                if matches!(
                    statement.statement,
                    Statement::BeginTransaction | Statement::Commit
                ) {
                    continue;
                }
                conn.run_statement(statement, &Params::None)?;
            }
            Ok::<(), Error>(())
        })?;
        info!(statements = count, "dump loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_format() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.executescript(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB);
             INSERT INTO t VALUES (1, 'it''s', X'00FF'), (2, NULL, NULL);",
        )
        .unwrap();

        assert_eq!(
            conn.dump(),
            vec![
                "BEGIN TRANSACTION;",
                "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT, \"data\" BLOB);",
                "INSERT INTO \"t\" VALUES(1,'it''s',X'00FF');",
                "INSERT INTO \"t\" VALUES(2,NULL,NULL);",
                "COMMIT;",
            ]
        );
    }

    #[test]
    fn test_failed_load_changes_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = conn.load([
            "CREATE TABLE t (id INTEGER PRIMARY KEY);",
            "INSERT INTO t VALUES(1);",
            "INSERT INTO t VALUES(1);",
        ]);
        assert!(err.is_err());
        assert!(conn.table_names().is_empty());
        assert!(!conn.in_transaction());
    }
}
