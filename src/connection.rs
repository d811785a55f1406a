//! Connections
//!
//! A [`Connection`] owns a catalog and the registries its statements see. It
//! runs statements one at a time, keeps the change counters and provides the
//! single-level transaction scope.

use std::any::Any;
use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{self, AtomicUsize};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistry, Params};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{BoxError, Error, Result};
use crate::executor::{
    bind_parameters, ExecutionEngine, LogicalPlan, Planner, ResultSet, TextFactory,
};
use crate::functions::{Aggregate, FunctionRegistry};
use crate::sql::{parse_script, ParsedStatement};
use crate::storage::{file, Value};

/// A connection to a database
pub struct Connection {
    config: Config,
    catalog: Catalog,
    functions: Arc<FunctionRegistry>,
    adapters: Arc<AdapterRegistry>,
    text_factory: Option<TextFactory>,
    /// Catalog as it was when the active transaction scope began
    savepoint: Option<Catalog>,
    /// Result sets that still have rows pending
    active_results: Arc<AtomicUsize>,
    changes: usize,
    total_changes: usize,
    last_insert_rowid: i64,
    closed: bool,
}

impl Connection {
    /// Open the database at `path`; `:memory:` opens an empty in-memory database
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open_with_config(Config::new().path(path))
    }

    /// Open an empty in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_config(Config::new())
    }

    /// Open a database with explicit configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let catalog = if config.is_memory() {
            Catalog::new()
        } else {
            file::read_snapshot(&config.path)?.unwrap_or_default()
        };
        info!(path = %config.path.display(), tables = catalog.len(), "database opened");

        Ok(Self {
            config,
            catalog,
            functions: Arc::new(FunctionRegistry::with_builtins()?),
            adapters: Arc::new(AdapterRegistry::new()),
            text_factory: None,
            savepoint: None,
            active_results: Arc::new(AtomicUsize::new(0)),
            changes: 0,
            total_changes: 0,
            last_insert_rowid: 0,
            closed: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Misuse(
                "cannot operate on a closed database".to_string(),
            ));
        }
        Ok(())
    }

    fn check_no_active_results(&self, operation: &str) -> Result<()> {
        let active = self.active_results.load(atomic::Ordering::SeqCst);
        if active > 0 {
            return Err(Error::ResultSetBusy(format!(
                "unable to {} with {} unfinished result set(s)",
                operation, active
            )));
        }
        Ok(())
    }

    // ========== Statements ==========

    /// Execute a single statement
    ///
    /// Empty SQL (only whitespace or comments) yields an empty result set.
    /// More than one statement is a misuse; see [`Connection::executescript`].
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<ResultSet> {
        self.check_open()?;
        let mut statements = parse_script(sql)?;
        match statements.len() {
            0 => Ok(ResultSet::empty()),
            1 => {
                let statement = statements.remove(0);
                self.run_statement(&statement, &params.into())
            }
            _ => Err(Error::Misuse(
                "you can only execute one statement at a time".to_string(),
            )),
        }
    }

    /// Execute a statement already parsed by [`parse_script`]
    pub fn execute_parsed(
        &mut self,
        statement: &ParsedStatement,
        params: impl Into<Params>,
    ) -> Result<ResultSet> {
        self.check_open()?;
        self.run_statement(statement, &params.into())
    }

    /// Execute a DML statement once per parameter set; returns the total
    /// number of rows affected
    ///
    /// The statement is parsed once. Execution stops at the first failing
    /// parameter set and the earlier ones stay applied.
    pub fn executemany<I, P>(&mut self, sql: &str, param_sets: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.check_open()?;
        let mut statements = parse_script(sql)?;
        if statements.len() != 1 {
            return Err(Error::Misuse(
                "executemany() takes exactly one statement".to_string(),
            ));
        }
        let statement = statements.remove(0);
        if !statement.statement.is_dml() {
            return Err(Error::Misuse(
                "executemany() can only execute DML statements".to_string(),
            ));
        }

        let mut total = 0;
        for params in param_sets {
            total += self
                .run_statement(&statement, &params.into())?
                .rows_affected();
        }
        self.changes = total;
        Ok(total)
    }

    /// Execute every statement of a script
    ///
    /// The whole script is parsed before anything runs, so a syntax error
    /// executes nothing. A failing statement stops the script; statements
    /// before it are not rolled back.
    pub fn executescript(&mut self, script: &str) -> Result<()> {
        self.check_open()?;
        let statements = parse_script(script)?;
        debug!(statements = statements.len(), "executing script");
        for statement in &statements {
            self.run_statement(statement, &Params::None)?;
        }
        Ok(())
    }

    pub(crate) fn run_statement(
        &mut self,
        parsed: &ParsedStatement,
        params: &Params,
    ) -> Result<ResultSet> {
        debug!(statement = parsed.statement.kind(), params = params.len(), "executing");
        let values = bind_parameters(&parsed.parameters, params, &self.adapters)?;
        let plan = Planner::new(&self.catalog, &self.functions).plan(&parsed.statement)?;

        match plan {
            LogicalPlan::BeginTransaction => {
                self.begin_scope()?;
                Ok(ResultSet::empty())
            }
            LogicalPlan::Commit => {
                self.end_scope(true, "commit")?;
                Ok(ResultSet::empty())
            }
            LogicalPlan::Rollback => {
                self.end_scope(false, "rollback")?;
                Ok(ResultSet::empty())
            }
            plan => {
                let result = ExecutionEngine::new(&mut self.catalog, &self.functions)
                    .execute(plan, Arc::from(values))?;
                if parsed.statement.is_dml() {
                    self.changes = result.affected_rows;
                    self.total_changes += result.affected_rows;
                    if let Some(rowid) = result.last_insert_rowid {
                        self.last_insert_rowid = rowid;
                    }
                }
                Ok(ResultSet::new(
                    result,
                    Arc::clone(&self.adapters),
                    self.text_factory.clone(),
                    &self.active_results,
                ))
            }
        }
    }

    // ========== Transactions ==========

    fn begin_scope(&mut self) -> Result<()> {
        self.check_open()?;
        if self.savepoint.is_some() {
            return Err(Error::Transaction(
                "cannot start a transaction within a transaction".to_string(),
            ));
        }
        self.savepoint = Some(self.catalog.clone());
        info!("transaction started");
        Ok(())
    }

    fn end_scope(&mut self, commit: bool, operation: &str) -> Result<()> {
        if !self.finish_scope(commit) {
            return Err(Error::Transaction(format!(
                "cannot {} - no transaction is active",
                operation
            )));
        }
        Ok(())
    }

    /// End the active scope, if any; returns whether one was active
    fn finish_scope(&mut self, commit: bool) -> bool {
        let Some(savepoint) = self.savepoint.take() else {
            return false;
        };
        if commit {
            info!("transaction committed");
        } else {
            self.catalog = savepoint;
            info!("transaction rolled back");
        }
        true
    }

    /// Begin a transaction scope
    ///
    /// The returned guard derefs to the connection. Call
    /// [`Transaction::commit`] to keep its changes; dropping the guard
    /// otherwise (early return, `?`, panic) rolls them back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.begin_scope()?;
        Ok(Transaction {
            conn: self,
            finished: false,
        })
    }

    /// Run `f` inside a transaction scope: `Ok` commits, `Err` rolls back and
    /// returns the error unchanged
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.begin_scope()?;
        match f(self) {
            Ok(value) => {
                self.finish_scope(true);
                Ok(value)
            }
            Err(e) => {
                self.finish_scope(false);
                Err(e)
            }
        }
    }

    /// Whether a transaction scope is active
    pub fn in_transaction(&self) -> bool {
        self.savepoint.is_some()
    }

    // ========== Extensions ==========

    /// Register (or replace) a scalar function; an arity of -1 accepts any
    /// number of arguments
    pub fn create_function<F>(&mut self, name: &str, arity: i32, func: F) -> Result<()>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.functions).register_scalar(name, arity, func)
    }

    /// Remove a scalar function; returns whether it existed
    pub fn remove_function(&mut self, name: &str, arity: i32) -> bool {
        Arc::make_mut(&mut self.functions).remove_scalar(name, arity)
    }

    /// Register (or replace) an aggregate; `factory` creates the state of one group
    pub fn create_aggregate<F>(&mut self, name: &str, arity: i32, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Aggregate> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.functions).register_aggregate(name, arity, factory)
    }

    /// Remove an aggregate; returns whether it existed
    pub fn remove_aggregate(&mut self, name: &str, arity: i32) -> bool {
        Arc::make_mut(&mut self.functions).remove_aggregate(name, arity)
    }

    /// Register (or replace) a collation
    pub fn create_collation<F>(&mut self, name: &str, compare: F)
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.functions).register_collation(name, compare);
    }

    /// Remove a collation; later statements naming it fail
    pub fn remove_collation(&mut self, name: &str) -> bool {
        Arc::make_mut(&mut self.functions).remove_collation(name)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Register (or replace) the adapter used for parameters of type `T`
    pub fn register_adapter<T, F>(&mut self, adapter: F)
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.adapters).register_adapter(adapter);
    }

    pub fn remove_adapter<T: Any>(&mut self) -> bool {
        Arc::make_mut(&mut self.adapters).remove_adapter::<T>()
    }

    /// Register (or replace) the converter for columns of a declared type
    pub fn register_converter<T, F>(&mut self, declared_type: &str, converter: F)
    where
        T: Any,
        F: Fn(&Value) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.adapters).register_converter(declared_type, converter);
    }

    pub fn remove_converter(&mut self, declared_type: &str) -> bool {
        Arc::make_mut(&mut self.adapters).remove_converter(declared_type)
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Transform every TEXT value of later result rows
    pub fn set_text_factory<F>(&mut self, factory: F)
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.text_factory = Some(Arc::new(factory));
    }

    /// Return TEXT values unchanged again
    pub fn clear_text_factory(&mut self) {
        self.text_factory = None;
    }

    // ========== State ==========

    /// Rows affected by the most recent INSERT, UPDATE or DELETE
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Rows affected by every INSERT, UPDATE or DELETE since the connection opened
    pub fn total_changes(&self) -> usize {
        self.total_changes
    }

    /// Rowid of the most recently inserted row; 0 before any insert
    pub fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid
    }

    /// Names of all tables, in creation order
    pub fn table_names(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Replace the whole catalog
    pub(crate) fn replace_catalog(&mut self, catalog: Catalog) -> Result<()> {
        self.check_open()?;
        if self.in_transaction() {
            return Err(Error::Transaction(
                "cannot replace the database while a transaction is active".to_string(),
            ));
        }
        self.catalog = catalog;
        Ok(())
    }

    pub(crate) fn ensure_idle(&self, operation: &str) -> Result<()> {
        self.check_open()?;
        self.check_no_active_results(operation)
    }

    // ========== Persistence ==========

    /// Write the committed state to the database file
    pub fn flush(&self) -> Result<()> {
        self.check_open()?;
        if self.config.is_memory() {
            return Ok(());
        }
        let committed = self.savepoint.as_ref().unwrap_or(&self.catalog);
        file::write_snapshot(&self.config.path, committed)
    }

    /// Close the connection
    ///
    /// Fails with [`Error::ResultSetBusy`] while result sets have rows
    /// pending; the connection stays open in that case. An active
    /// transaction scope is rolled back.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.check_no_active_results("close")?;
        if self.finish_scope(false) {
            warn!("connection closed with an active transaction; rolled back");
        }
        if self.config.flush_on_close {
            self.flush()?;
        }
        self.closed = true;
        info!(path = %self.config.path.display(), "database closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.config.path)
            .field("tables", &self.catalog.len())
            .field("in_transaction", &self.in_transaction())
            .field("closed", &self.closed)
            .finish()
    }
}

/// An active transaction scope
///
/// Rolls back when dropped without [`Transaction::commit`].
pub struct Transaction<'c> {
    conn: &'c mut Connection,
    finished: bool,
}

impl Transaction<'_> {
    /// Make the scope's changes final
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.finish_scope(true);
        Ok(())
    }

    /// Discard the scope's changes
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.finish_scope(false);
        Ok(())
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &*self.conn
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut *self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.conn.finish_scope(false) {
            warn!("transaction dropped without commit; rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.executescript("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        conn
    }

    fn count(conn: &mut Connection) -> i64 {
        conn.execute("SELECT count(*) FROM t", ())
            .unwrap()
            .fetch_one()
            .unwrap()
            .unwrap()
            .get_as(0)
            .unwrap()
    }

    #[test]
    fn test_execute_counts_changes() {
        let mut conn = conn();
        let rs = conn
            .execute("INSERT INTO t (v) VALUES (?), (?)", params!["a", "b"])
            .unwrap();
        assert_eq!(rs.rows_affected(), 2);
        assert_eq!(conn.changes(), 2);
        assert_eq!(conn.last_insert_rowid(), 2);

        conn.execute("DELETE FROM t WHERE id = 1", ()).unwrap();
        assert_eq!(conn.changes(), 1);
        assert_eq!(conn.total_changes(), 3);
    }

    #[test]
    fn test_execute_rejects_multiple_statements() {
        let mut conn = conn();
        let err = conn.execute("SELECT 1; SELECT 2", ()).unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
        assert!(conn.execute("  -- nothing\n", ()).unwrap().columns().is_empty());
    }

    #[test]
    fn test_guard_rolls_back_on_drop() {
        let mut conn = conn();
        {
            let mut tx = conn.transaction().unwrap();
            tx.execute("INSERT INTO t (v) VALUES ('x')", ()).unwrap();
            assert!(tx.in_transaction());
        }
        assert!(!conn.in_transaction());
        assert_eq!(count(&mut conn), 0);

        let mut tx = conn.transaction().unwrap();
        tx.execute("INSERT INTO t (v) VALUES ('x')", ()).unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&mut conn), 1);
    }

    #[test]
    fn test_nested_scope_fails() {
        let mut conn = conn();
        conn.execute("BEGIN", ()).unwrap();
        assert!(matches!(conn.transaction(), Err(Error::Transaction(_))));
        conn.execute("ROLLBACK", ()).unwrap();
        assert!(matches!(
            conn.execute("COMMIT", ()),
            Err(Error::Transaction(_))
        ));
    }

    #[test]
    fn test_close_waits_for_result_sets() {
        let mut conn = conn();
        conn.execute("INSERT INTO t (v) VALUES ('a'), ('b')", ()).unwrap();

        let mut rows = conn.execute("SELECT v FROM t", ()).unwrap();
        assert!(rows.fetch_one().unwrap().is_some());
        assert!(matches!(conn.close(), Err(Error::ResultSetBusy(_))));

        // Exhausting the result set releases it
        while rows.fetch_one().unwrap().is_some() {}
        conn.close().unwrap();
        assert!(matches!(conn.execute("SELECT 1", ()), Err(Error::Misuse(_))));
    }
}
