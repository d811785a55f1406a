//! Result sets and rows
//!
//! A [`ResultSet`] is a single-pass iterator over the rows of one statement.
//! It owns a snapshot of everything it reads, so the connection stays usable
//! while rows are pending.

use std::any::Any;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::executor::{QueryResult, QueryRows};
use crate::adapter::{AdapterRegistry, FromValue};
use crate::error::{Error, Result};
use crate::storage::Value;

/// Transforms TEXT values as rows are read
pub type TextFactory = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Column metadata shared by every row of a result set
#[derive(Debug)]
pub struct RowHeader {
    columns: Vec<String>,
    declared_types: Vec<Option<String>>,
    /// Converters as registered when the statement ran
    adapters: Arc<AdapterRegistry>,
}

impl RowHeader {
    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }
}

/// Counts a result set as outstanding until it is exhausted or dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Rows produced by one statement
pub struct ResultSet {
    header: Arc<RowHeader>,
    rows: QueryRows,
    rows_affected: usize,
    last_insert_rowid: Option<i64>,
    text_factory: Option<TextFactory>,
    active: Option<ActiveGuard>,
}

impl ResultSet {
    pub(crate) fn new(
        result: QueryResult,
        adapters: Arc<AdapterRegistry>,
        text_factory: Option<TextFactory>,
        active: &Arc<AtomicUsize>,
    ) -> Self {
        let (columns, declared_types) = result
            .columns
            .into_iter()
            .map(|c| (c.name, c.declared_type))
            .unzip::<_, _, Vec<_>, Vec<_>>();
        let active = (!columns.is_empty()).then(|| ActiveGuard::new(active));

        Self {
            header: Arc::new(RowHeader {
                columns,
                declared_types,
                adapters,
            }),
            rows: result.rows,
            rows_affected: result.affected_rows,
            last_insert_rowid: result.last_insert_rowid,
            text_factory,
            active,
        }
    }

    /// A result set without columns or rows
    pub(crate) fn empty() -> Self {
        Self {
            header: Arc::new(RowHeader {
                columns: Vec::new(),
                declared_types: Vec::new(),
                adapters: Arc::new(AdapterRegistry::new()),
            }),
            rows: QueryResult::empty().rows,
            rows_affected: 0,
            last_insert_rowid: None,
            text_factory: None,
            active: None,
        }
    }

    /// Output column names
    pub fn columns(&self) -> &[String] {
        &self.header.columns
    }

    /// Declared types of the output columns; `None` for computed columns
    pub fn declared_types(&self) -> &[Option<String>] {
        &self.header.declared_types
    }

    /// Rows inserted, updated or deleted by the statement
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    /// Rowid of the last row the statement inserted
    pub fn last_insert_rowid(&self) -> Option<i64> {
        self.last_insert_rowid
    }

    /// Fetch the next row, if any
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.next().transpose()
    }

    /// Fetch every remaining row
    pub fn fetch_all(self) -> Result<Vec<Row>> {
        self.collect()
    }

    fn finish(&mut self) {
        self.active = None;
        self.rows = QueryResult::empty().rows;
    }
}

impl Iterator for ResultSet {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next_row() {
            None => {
                self.finish();
                None
            }
            Some(Err(e)) => {
                self.finish();
                Some(Err(e))
            }
            Some(Ok(mut values)) => {
                if let Some(factory) = &self.text_factory {
                    for value in values.iter_mut() {
                        if let Value::Text(text) = value {
                            *value = factory(text);
                        }
                    }
                }
                Some(Ok(Row {
                    values,
                    header: Arc::clone(&self.header),
                }))
            }
        }
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.header.columns)
            .field("rows_affected", &self.rows_affected)
            .field("active", &self.active.is_some())
            .finish()
    }
}

/// Ways to address a column of a row
pub trait RowIndex {
    fn position(&self, header: &RowHeader) -> Result<usize>;
}

impl RowIndex for usize {
    fn position(&self, header: &RowHeader) -> Result<usize> {
        if *self < header.columns.len() {
            Ok(*self)
        } else {
            Err(Error::Misuse(format!(
                "column index {} out of range for {} columns",
                self,
                header.columns.len()
            )))
        }
    }
}

impl RowIndex for i32 {
    fn position(&self, header: &RowHeader) -> Result<usize> {
        match usize::try_from(*self) {
            Ok(index) => index.position(header),
            Err(_) => Err(Error::Misuse(format!("negative column index {}", self))),
        }
    }
}

impl RowIndex for &str {
    fn position(&self, header: &RowHeader) -> Result<usize> {
        header
            .column_index(self)
            .ok_or_else(|| Error::ColumnNotFound(self.to_string(), "result row".to_string()))
    }
}

/// One result row
#[derive(Clone)]
pub struct Row {
    values: Vec<Value>,
    header: Arc<RowHeader>,
}

impl Row {
    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names, in order
    pub fn keys(&self) -> &[String] {
        &self.header.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of a column by position or case-insensitive name
    pub fn get<I: RowIndex>(&self, index: I) -> Option<&Value> {
        let position = index.position(&self.header).ok()?;
        self.values.get(position)
    }

    /// Value of a column read as a Rust type
    pub fn get_as<T: FromValue, I: RowIndex>(&self, index: I) -> Result<T> {
        T::from_value(&self.values[index.position(&self.header)?])
    }

    /// Value of a column passed through the converter registered for the
    /// column's declared type
    pub fn convert<T: Any, I: RowIndex>(&self, index: I) -> Result<T> {
        let position = index.position(&self.header)?;
        self.header.adapters.convert(
            self.header.declared_types[position].as_deref(),
            &self.values[position],
        )
    }

    /// Column name / value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.header
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// The row as an ordered name → value map
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl Index<&str> for Row {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.header.column_index(name) {
            Some(position) => &self.values[position],
            None => panic!("no column named {:?}", name),
        }
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.header.columns == other.header.columns
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
