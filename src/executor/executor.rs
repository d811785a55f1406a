//! Query Executor for PebbleSQL
//!
//! This module executes logical plans against the catalog and returns results.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use super::eval::{compare_values, is_true, AggregateCall, PhysicalExpr, ResolvedCollation};
use super::planner::{GroupKey, LogicalPlan, OutputColumn, SortKey};
use crate::catalog::{Catalog, Schema};
use crate::error::{Error, Result};
use crate::functions::{Aggregate, FunctionRegistry};
use crate::sql::ast::JoinType;
use crate::storage::{Tuple, Value};

/// Query result
#[derive(Debug)]
pub struct QueryResult {
    /// Result columns (empty for statements without rows)
    pub columns: Vec<OutputColumn>,
    /// Result rows, produced on demand
    pub rows: QueryRows,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub affected_rows: usize,
    /// Rowid of the last row inserted by this statement
    pub last_insert_rowid: Option<i64>,
}

impl QueryResult {
    /// Create a new empty result
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: QueryRows::Buffered(Vec::new().into_iter()),
            affected_rows: 0,
            last_insert_rowid: None,
        }
    }

    /// Create a result with affected rows count
    pub fn with_affected_rows(count: usize, last_insert_rowid: Option<i64>) -> Self {
        Self {
            affected_rows: count,
            last_insert_rowid,
            ..Self::empty()
        }
    }
}

/// Rows of a query
#[derive(Debug)]
pub enum QueryRows {
    /// Fully computed rows
    Buffered(std::vec::IntoIter<Vec<Value>>),
    /// Filter and projection run as rows are pulled
    Streaming(StreamingScan),
}

impl QueryRows {
    /// Pull the next row
    pub fn next_row(&mut self) -> Option<Result<Vec<Value>>> {
        match self {
            QueryRows::Buffered(rows) => rows.next().map(Ok),
            QueryRows::Streaming(scan) => scan.next_row(),
        }
    }
}

/// Rows a streaming scan reads from
#[derive(Debug)]
enum SourceRows {
    /// A table's row snapshot
    Table(Arc<Vec<Tuple>>),
    /// Joined or constant rows
    Rows(Vec<Vec<Value>>),
}

impl SourceRows {
    fn get(&self, index: usize) -> Option<&[Value]> {
        match self {
            SourceRows::Table(rows) => rows.get(index).map(Tuple::values),
            SourceRows::Rows(rows) => rows.get(index).map(Vec::as_slice),
        }
    }
}

/// A lazily evaluated `SELECT ... FROM ... WHERE ... LIMIT ...`
#[derive(Debug)]
pub struct StreamingScan {
    source: SourceRows,
    position: usize,
    predicate: Option<PhysicalExpr>,
    expressions: Vec<PhysicalExpr>,
    params: Arc<[Value]>,
    skip: usize,
    remaining: Option<usize>,
}

impl StreamingScan {
    fn next_row(&mut self) -> Option<Result<Vec<Value>>> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            let row = self.source.get(self.position)?;
            self.position += 1;

            if let Some(predicate) = &self.predicate {
                match predicate.evaluate(row, &self.params) {
                    Ok(value) if is_true(&value) => {}
                    Ok(_) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }

            return Some(
                self.expressions
                    .iter()
                    .map(|expr| expr.evaluate(row, &self.params))
                    .collect(),
            );
        }
    }
}

/// Execution Engine
pub struct ExecutionEngine<'a> {
    /// System catalog
    catalog: &'a mut Catalog,
    /// Functions and collations available to expressions
    functions: &'a FunctionRegistry,
}

impl<'a> ExecutionEngine<'a> {
    /// Create a new execution engine
    pub fn new(catalog: &'a mut Catalog, functions: &'a FunctionRegistry) -> Self {
        Self { catalog, functions }
    }

    /// Execute a logical plan with the bound parameter values
    pub fn execute(&mut self, plan: LogicalPlan, params: Arc<[Value]>) -> Result<QueryResult> {
        match plan {
            LogicalPlan::CreateTable {
                table_name,
                schema,
                if_not_exists,
            } => self.execute_create_table(&table_name, schema, if_not_exists),
            LogicalPlan::DropTable {
                table_name,
                if_exists,
            } => self.execute_drop_table(&table_name, if_exists),
            LogicalPlan::Insert {
                table_name,
                targets,
                input,
            } => self.execute_insert(&table_name, &targets, &input, &params),
            LogicalPlan::Update {
                table_name,
                assignments,
                predicate,
            } => self.execute_update(&table_name, &assignments, predicate.as_ref(), &params),
            LogicalPlan::Delete {
                table_name,
                predicate,
            } => self.execute_delete(&table_name, predicate.as_ref(), &params),
            LogicalPlan::Query { input, columns } => self.execute_select(*input, columns, params),
            LogicalPlan::BeginTransaction | LogicalPlan::Commit | LogicalPlan::Rollback => {
                Err(Error::Transaction(
                    "transaction statements are handled by the connection".to_string(),
                ))
            }
            other => Err(Error::Misuse(format!(
                "plan node cannot be executed on its own: {:?}",
                other
            ))),
        }
    }

    fn execute_create_table(
        &mut self,
        table_name: &str,
        schema: Schema,
        if_not_exists: bool,
    ) -> Result<QueryResult> {
        if self.catalog.table_exists(table_name) {
            if if_not_exists {
                return Ok(QueryResult::empty());
            }
            return Err(Error::TableAlreadyExists(table_name.to_string()));
        }
        self.catalog.create_table(table_name, schema)?;
        debug!(table = table_name, "table created");
        Ok(QueryResult::empty())
    }

    fn execute_drop_table(&mut self, table_name: &str, if_exists: bool) -> Result<QueryResult> {
        if if_exists && !self.catalog.table_exists(table_name) {
            return Ok(QueryResult::empty());
        }
        self.catalog.drop_table(table_name)?;
        debug!(table = table_name, "table dropped");
        Ok(QueryResult::empty())
    }

    fn execute_insert(
        &mut self,
        table_name: &str,
        targets: &[usize],
        input: &LogicalPlan,
        params: &[Value],
    ) -> Result<QueryResult> {
        // The source is read in full before the table changes
        let rows = self.execute_plan(input, params)?;
        let schema = Arc::clone(self.catalog.get_table(table_name)?.schema());

        let tuples: Vec<Tuple> = rows
            .into_iter()
            .map(|values| {
                let mut row: Vec<Value> = schema
                    .columns()
                    .iter()
                    .map(|c| c.default.clone().unwrap_or(Value::Null))
                    .collect();
                for (&target, value) in targets.iter().zip(values) {
                    row[target] = value;
                }
                Tuple::new(row)
            })
            .collect();

        let count = tuples.len();
        if count == 0 {
            return Ok(QueryResult::with_affected_rows(0, None));
        }
        let rowid = self
            .catalog
            .get_table_mut(table_name)?
            .insert(tuples, self.functions)?;
        Ok(QueryResult::with_affected_rows(count, Some(rowid)))
    }

    fn execute_update(
        &mut self,
        table_name: &str,
        assignments: &[(usize, PhysicalExpr)],
        predicate: Option<&PhysicalExpr>,
        params: &[Value],
    ) -> Result<QueryResult> {
        let snapshot = self.catalog.get_table(table_name)?.rows();
        let mut updated = 0;
        let mut rows = Vec::with_capacity(snapshot.len());

        for tuple in snapshot.iter() {
            let old = tuple.values();
            if !matches(predicate, old, params)? {
                rows.push(tuple.clone());
                continue;
            }
            // Every assignment reads the row as it was before the update
            let mut new = old.to_vec();
            for (column, expr) in assignments {
                new[*column] = expr.evaluate(old, params)?;
            }
            rows.push(Tuple::new(new));
            updated += 1;
        }

        if updated > 0 {
            self.catalog
                .get_table_mut(table_name)?
                .replace_rows(rows, self.functions)?;
        }
        Ok(QueryResult::with_affected_rows(updated, None))
    }

    fn execute_delete(
        &mut self,
        table_name: &str,
        predicate: Option<&PhysicalExpr>,
        params: &[Value],
    ) -> Result<QueryResult> {
        let snapshot = self.catalog.get_table(table_name)?.rows();
        let mut kept = Vec::with_capacity(snapshot.len());
        for tuple in snapshot.iter() {
            if !matches(predicate, tuple.values(), params)? {
                kept.push(tuple.clone());
            }
        }

        let deleted = snapshot.len() - kept.len();
        if deleted > 0 {
            self.catalog
                .get_table_mut(table_name)?
                .replace_rows(kept, self.functions)?;
        }
        Ok(QueryResult::with_affected_rows(deleted, None))
    }

    fn execute_select(
        &self,
        plan: LogicalPlan,
        columns: Vec<OutputColumn>,
        params: Arc<[Value]>,
    ) -> Result<QueryResult> {
        let width = columns.len();
        let (inner, limit, offset) = match plan {
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => (*input, limit, offset),
            other => (other, None, None),
        };

        let rows = match inner {
            LogicalPlan::Project {
                input,
                expressions,
                hidden,
            } if hidden.is_empty() && is_streamable(&input) => {
                let (source, predicate) = match *input {
                    LogicalPlan::Filter { input, predicate } => (*input, Some(predicate)),
                    other => (other, None),
                };
                let source = match source {
                    LogicalPlan::Scan { table_name } => {
                        SourceRows::Table(self.catalog.get_table(&table_name)?.rows())
                    }
                    other => SourceRows::Rows(self.execute_plan(&other, &params)?),
                };
                let (skip, remaining) = evaluate_limits(limit.as_ref(), offset.as_ref(), &params)?;
                QueryRows::Streaming(StreamingScan {
                    source,
                    position: 0,
                    predicate,
                    expressions,
                    params,
                    skip,
                    remaining,
                })
            }
            inner => {
                let plan = if limit.is_some() || offset.is_some() {
                    LogicalPlan::Limit {
                        input: Box::new(inner),
                        limit,
                        offset,
                    }
                } else {
                    inner
                };
                let mut rows = self.execute_plan(&plan, &params)?;
                for row in rows.iter_mut() {
                    row.truncate(width);
                }
                QueryRows::Buffered(rows.into_iter())
            }
        };

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: 0,
            last_insert_rowid: None,
        })
    }

    /// Run a row-producing plan node to completion
    fn execute_plan(&self, plan: &LogicalPlan, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        match plan {
            LogicalPlan::Empty => Ok(vec![Vec::new()]),
            LogicalPlan::Scan { table_name } => Ok(self
                .catalog
                .get_table(table_name)?
                .rows()
                .iter()
                .map(|tuple| tuple.values().to_vec())
                .collect()),
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
                right_width,
            } => self.execute_join(left, right, *join_type, condition.as_ref(), *right_width, params),
            LogicalPlan::Filter { input, predicate } => {
                let mut rows = Vec::new();
                for row in self.execute_plan(input, params)? {
                    if is_true(&predicate.evaluate(&row, params)?) {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                input_width,
            } => {
                let rows = self.execute_plan(input, params)?;
                execute_aggregate(rows, group_by, aggregates, *input_width, params)
            }
            LogicalPlan::Project {
                input,
                expressions,
                hidden,
            } => self
                .execute_plan(input, params)?
                .iter()
                .map(|row| {
                    expressions
                        .iter()
                        .chain(hidden)
                        .map(|expr| expr.evaluate(row, params))
                        .collect::<Result<Vec<_>>>()
                })
                .collect(),
            LogicalPlan::Distinct {
                input,
                width,
                collations,
            } => Ok(distinct_rows(self.execute_plan(input, params)?, *width, collations)),
            LogicalPlan::Sort { input, keys } => {
                let mut rows = self.execute_plan(input, params)?;
                rows.sort_by(|a, b| compare_sort_keys(a, b, keys));
                Ok(rows)
            }
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => {
                let (skip, remaining) = evaluate_limits(limit.as_ref(), offset.as_ref(), params)?;
                let rows = self.execute_plan(input, params)?.into_iter().skip(skip);
                Ok(match remaining {
                    Some(n) => rows.take(n).collect(),
                    None => rows.collect(),
                })
            }
            LogicalPlan::Values { rows } => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|expr| expr.evaluate(&[], params))
                        .collect::<Result<Vec<_>>>()
                })
                .collect(),
            LogicalPlan::Query { input, columns } => {
                let mut rows = self.execute_plan(input, params)?;
                for row in rows.iter_mut() {
                    row.truncate(columns.len());
                }
                Ok(rows)
            }
            other => Err(Error::Misuse(format!("plan node produces no rows: {:?}", other))),
        }
    }

    fn execute_join(
        &self,
        left: &LogicalPlan,
        right: &LogicalPlan,
        join_type: JoinType,
        condition: Option<&PhysicalExpr>,
        right_width: usize,
        params: &[Value],
    ) -> Result<Vec<Vec<Value>>> {
        let left_rows = self.execute_plan(left, params)?;
        let right_rows = self.execute_plan(right, params)?;
        let mut result = Vec::new();

        for left_row in &left_rows {
            let mut matched = false;
            for right_row in &right_rows {
                let mut combined = Vec::with_capacity(left_row.len() + right_width);
                combined.extend_from_slice(left_row);
                combined.extend_from_slice(right_row);
                if matches(condition, &combined, params)? {
                    matched = true;
                    result.push(combined);
                }
            }
            if !matched && join_type == JoinType::Left {
                let mut padded = left_row.clone();
                padded.resize(left_row.len() + right_width, Value::Null);
                result.push(padded);
            }
        }

        Ok(result)
    }
}

/// Plans whose rows can be produced one at a time
fn is_streamable(plan: &LogicalPlan) -> bool {
    match plan {
        LogicalPlan::Filter { input, .. } => matches!(
            **input,
            LogicalPlan::Scan { .. } | LogicalPlan::Join { .. } | LogicalPlan::Empty
        ),
        LogicalPlan::Scan { .. } | LogicalPlan::Join { .. } | LogicalPlan::Empty => true,
        _ => false,
    }
}

/// Whether a row passes an optional predicate
fn matches(predicate: Option<&PhysicalExpr>, row: &[Value], params: &[Value]) -> Result<bool> {
    match predicate {
        Some(predicate) => Ok(is_true(&predicate.evaluate(row, params)?)),
        None => Ok(true),
    }
}

/// Evaluate LIMIT and OFFSET; a negative limit means no limit
fn evaluate_limits(
    limit: Option<&PhysicalExpr>,
    offset: Option<&PhysicalExpr>,
    params: &[Value],
) -> Result<(usize, Option<usize>)> {
    let as_integer = |expr: &PhysicalExpr| -> Result<i64> {
        match expr.evaluate(&[], params)?.to_numeric() {
            Value::Integer(i) => Ok(i),
            Value::Real(f) if f.fract() == 0.0 => Ok(f as i64),
            _ => Err(Error::Misuse("datatype mismatch in LIMIT or OFFSET".to_string())),
        }
    };

    let remaining = match limit {
        Some(expr) => usize::try_from(as_integer(expr)?).ok(),
        None => None,
    };
    let skip = match offset {
        Some(expr) => usize::try_from(as_integer(expr)?).unwrap_or(0),
        None => 0,
    };
    Ok((skip, remaining))
}

fn aggregate_error(call: &AggregateCall, phase: &str, err: crate::error::BoxError) -> Error {
    Error::evaluation(format!(
        "user-defined aggregate's '{}' method raised an error in {}: {}",
        phase, call.key, err
    ))
}

/// Partition rows into groups (first-seen order) and run the aggregates of
/// each group
fn execute_aggregate(
    rows: Vec<Vec<Value>>,
    group_by: &[GroupKey],
    aggregates: &[AggregateCall],
    input_width: usize,
    params: &[Value],
) -> Result<Vec<Vec<Value>>> {
    let groups: Vec<Vec<usize>> = if group_by.is_empty() {
        // Without GROUP BY the whole input is one group, even when empty
        vec![(0..rows.len()).collect()]
    } else {
        let keys = rows
            .iter()
            .map(|row| {
                group_by
                    .iter()
                    .map(|key| key.expr.evaluate(row, params))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let compare = |a: usize, b: usize| {
            for (i, key) in group_by.iter().enumerate() {
                let ordering = compare_values(&keys[a][i], &keys[b][i], key.collation.as_ref());
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        };

        // Stable sort keeps each group's rows in input order
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| compare(a, b));
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for index in order {
            match groups.last_mut() {
                Some(group) if compare(group[0], index) == Ordering::Equal => group.push(index),
                _ => groups.push(vec![index]),
            }
        }
        groups.sort_by_key(|group| group[0]);
        groups
    };

    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let mut states: Vec<Box<dyn Aggregate>> =
            aggregates.iter().map(|call| (call.factory)()).collect();
        let mut seen: Vec<Vec<Value>> = vec![Vec::new(); aggregates.len()];

        for &index in &group {
            let row = &rows[index];
            for (slot, call) in aggregates.iter().enumerate() {
                let args = call
                    .args
                    .iter()
                    .map(|arg| arg.evaluate(row, params))
                    .collect::<Result<Vec<_>>>()?;
                if call.distinct {
                    let distinct = &mut seen[slot];
                    let collation = call.collation.as_ref();
                    match distinct.binary_search_by(|v| compare_values(v, &args[0], collation)) {
                        Ok(_) => continue,
                        Err(position) => distinct.insert(position, args[0].clone()),
                    }
                }
                states[slot]
                    .step(&args)
                    .map_err(|e| aggregate_error(call, "step", e))?;
            }
        }

        let mut output = match group.last() {
            Some(&index) => rows[index].clone(),
            None => vec![Value::Null; input_width],
        };
        for (state, call) in states.iter_mut().zip(aggregates) {
            output.push(state.finalize().map_err(|e| aggregate_error(call, "finalize", e))?);
        }
        result.push(output);
    }

    Ok(result)
}

fn compare_prefix(
    a: &[Value],
    b: &[Value],
    width: usize,
    collations: &[Option<ResolvedCollation>],
) -> Ordering {
    for column in 0..width {
        let collation = collations.get(column).and_then(Option::as_ref);
        let ordering = compare_values(&a[column], &b[column], collation);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Keep the first of every run of duplicate rows
fn distinct_rows(
    rows: Vec<Vec<Value>>,
    width: usize,
    collations: &[Option<ResolvedCollation>],
) -> Vec<Vec<Value>> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| compare_prefix(&rows[a], &rows[b], width, collations));

    let mut keep = vec![false; rows.len()];
    let mut previous: Option<usize> = None;
    for index in order {
        let duplicate = previous.is_some_and(|p| {
            compare_prefix(&rows[p], &rows[index], width, collations) == Ordering::Equal
        });
        if !duplicate {
            keep[index] = true;
            previous = Some(index);
        }
    }

    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect()
}

fn compare_sort_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = compare_values(&a[key.column], &b[key.column], key.collation.as_ref());
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::planner::Planner;
    use crate::sql::parse_script;

    fn run(catalog: &mut Catalog, functions: &FunctionRegistry, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut last = Vec::new();
        for stmt in parse_script(sql)? {
            let plan = Planner::new(catalog, functions).plan(&stmt.statement)?;
            let mut result = ExecutionEngine::new(catalog, functions).execute(plan, Arc::from(Vec::new()))?;
            last.clear();
            while let Some(row) = result.rows.next_row() {
                last.push(row?);
            }
        }
        Ok(last)
    }

    fn setup() -> (Catalog, FunctionRegistry) {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut catalog = Catalog::new();
        run(
            &mut catalog,
            &functions,
            "CREATE TABLE emp (id INTEGER PRIMARY KEY, name TEXT, dept TEXT COLLATE nocase, pay INTEGER);
             INSERT INTO emp (name, dept, pay) VALUES
                ('ann', 'eng', 10), ('bob', 'ENG', 20), ('cid', 'ops', 5), ('dee', NULL, 7);
             CREATE TABLE dept (code TEXT, title TEXT);
             INSERT INTO dept VALUES ('eng', 'Engineering'), ('ops', 'Operations');",
        )
        .unwrap();
        (catalog, functions)
    }

    fn ints(rows: &[Vec<Value>], column: usize) -> Vec<Value> {
        rows.iter().map(|r| r[column].clone()).collect()
    }

    #[test]
    fn test_insert_and_select() {
        let (mut catalog, functions) = setup();
        let rows = run(&mut catalog, &functions, "SELECT id, name FROM emp WHERE pay > 6").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(ints(&rows, 0), vec![Value::Integer(1), Value::Integer(2), Value::Integer(4)]);
    }

    #[test]
    fn test_group_by_uses_column_collation() {
        let (mut catalog, functions) = setup();
        let rows = run(
            &mut catalog,
            &functions,
            "SELECT dept, count(*), sum(pay) FROM emp GROUP BY dept",
        )
        .unwrap();
        // Groups appear in first-seen order; 'eng' and 'ENG' are one group
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], Value::Integer(2));
        assert_eq!(rows[0][2], Value::Integer(30));
        assert_eq!(rows[1][0], Value::Text("ops".into()));
        assert_eq!(rows[2][0], Value::Null);
    }

    #[test]
    fn test_aggregate_over_empty_input() {
        let (mut catalog, functions) = setup();
        let rows = run(
            &mut catalog,
            &functions,
            "SELECT count(*), sum(pay), total(pay) FROM emp WHERE pay > 100",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![vec![Value::Integer(0), Value::Null, Value::Real(0.0)]]
        );

        let rows = run(
            &mut catalog,
            &functions,
            "SELECT dept, count(*) FROM emp WHERE pay > 100 GROUP BY dept",
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_left_join_and_order() {
        let (mut catalog, functions) = setup();
        let rows = run(
            &mut catalog,
            &functions,
            "SELECT e.name, d.title FROM emp e LEFT JOIN dept d ON e.dept = d.code ORDER BY e.name DESC",
        )
        .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec![Value::Text("dee".into()), Value::Null]);
        // e.dept is declared NOCASE, so 'ENG' joins 'eng'
        assert_eq!(rows[2][1], Value::Text("Engineering".into()));
    }

    #[test]
    fn test_distinct_order_limit() {
        let (mut catalog, functions) = setup();
        let rows = run(
            &mut catalog,
            &functions,
            "SELECT DISTINCT dept FROM emp WHERE dept IS NOT NULL ORDER BY 1 LIMIT 5",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = run(
            &mut catalog,
            &functions,
            "SELECT name FROM emp ORDER BY pay LIMIT 2 OFFSET 1",
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![vec![Value::Text("dee".into())], vec![Value::Text("ann".into())]]
        );
    }

    #[test]
    fn test_update_delete_counts() {
        let (mut catalog, functions) = setup();
        let plan = Planner::new(&catalog, &functions)
            .plan(&parse_script("UPDATE emp SET pay = pay * 2 WHERE dept = 'eng'").unwrap()[0].statement)
            .unwrap();
        let result = ExecutionEngine::new(&mut catalog, &functions)
            .execute(plan, Arc::from(Vec::new()))
            .unwrap();
        assert_eq!(result.affected_rows, 2);

        let rows = run(&mut catalog, &functions, "DELETE FROM emp WHERE pay > 15; SELECT name FROM emp").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_integrity_failure_is_atomic() {
        let (mut catalog, functions) = setup();
        let err = run(&mut catalog, &functions, "UPDATE emp SET id = 1").unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        let rows = run(&mut catalog, &functions, "SELECT id FROM emp").unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_insert_from_select() {
        let (mut catalog, functions) = setup();
        let rows = run(
            &mut catalog,
            &functions,
            "INSERT INTO emp (name, pay) SELECT name || '2', pay + 1 FROM emp;
             SELECT count(*), max(id) FROM emp",
        )
        .unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(8), Value::Integer(8)]]);
    }
}
