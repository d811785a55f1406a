//! Query Planner for PebbleSQL
//!
//! This module converts parsed SQL AST into executable plans. Every name in
//! the statement (tables, columns, functions, collations) is resolved here,
//! so a plan that was built successfully only fails on data-dependent errors.

use crate::catalog::{Catalog, Column, Schema};
use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::sql::ast::*;

use super::eval::{
    contains_aggregate, evaluate_constant, AggregateCall, ExprCompiler, PhysicalExpr,
    ResolvedCollation, Scope,
};

/// Name and declared type of one result column
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub declared_type: Option<String>,
}

/// Grouping key of an aggregate
#[derive(Debug, Clone)]
pub struct GroupKey {
    pub expr: PhysicalExpr,
    pub collation: Option<ResolvedCollation>,
}

/// Sort key over a column of the projected row
#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: usize,
    pub ascending: bool,
    pub collation: Option<ResolvedCollation>,
}

/// Logical plan node
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// A single row without columns, the source of a FROM-less SELECT
    Empty,
    /// Scan a table
    Scan { table_name: String },
    /// Join two inputs (Nested Loop)
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        condition: Option<PhysicalExpr>,
        right_width: usize,
    },
    /// Filter rows
    Filter {
        input: Box<LogicalPlan>,
        predicate: PhysicalExpr,
    },
    /// Group rows and run aggregates; each output row is the group's last
    /// input row followed by one column per aggregate call
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<GroupKey>,
        aggregates: Vec<AggregateCall>,
        input_width: usize,
    },
    /// Project columns; `hidden` expressions are appended after the visible
    /// ones for sorting and cut off once the rows leave the query
    Project {
        input: Box<LogicalPlan>,
        expressions: Vec<PhysicalExpr>,
        hidden: Vec<PhysicalExpr>,
    },
    /// Drop rows whose first `width` columns repeat an earlier row
    Distinct {
        input: Box<LogicalPlan>,
        width: usize,
        collations: Vec<Option<ResolvedCollation>>,
    },
    /// Sort rows (stable)
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<SortKey>,
    },
    /// Limit rows
    Limit {
        input: Box<LogicalPlan>,
        limit: Option<PhysicalExpr>,
        offset: Option<PhysicalExpr>,
    },
    /// Constant rows, the source of INSERT ... VALUES
    Values { rows: Vec<Vec<PhysicalExpr>> },
    /// Root of a SELECT
    Query {
        input: Box<LogicalPlan>,
        columns: Vec<OutputColumn>,
    },
    /// Insert into table; `targets` maps input columns to table columns
    Insert {
        table_name: String,
        targets: Vec<usize>,
        input: Box<LogicalPlan>,
    },
    /// Update table
    Update {
        table_name: String,
        assignments: Vec<(usize, PhysicalExpr)>,
        predicate: Option<PhysicalExpr>,
    },
    /// Delete from table
    Delete {
        table_name: String,
        predicate: Option<PhysicalExpr>,
    },
    /// Create table
    CreateTable {
        table_name: String,
        schema: Schema,
        if_not_exists: bool,
    },
    /// Drop table
    DropTable { table_name: String, if_exists: bool },
    /// Begin transaction
    BeginTransaction,
    /// Commit transaction
    Commit,
    /// Rollback transaction
    Rollback,
}

impl LogicalPlan {
    /// Result columns of a query plan; empty for every other statement
    pub fn output_columns(&self) -> &[OutputColumn] {
        match self {
            LogicalPlan::Query { columns, .. } => columns,
            _ => &[],
        }
    }
}

/// Query planner
pub struct Planner<'a> {
    catalog: &'a Catalog,
    functions: &'a FunctionRegistry,
}

impl<'a> Planner<'a> {
    /// Create a new planner
    pub fn new(catalog: &'a Catalog, functions: &'a FunctionRegistry) -> Self {
        Self { catalog, functions }
    }

    /// Create a logical plan from a statement
    pub fn plan(&self, stmt: &Statement) -> Result<LogicalPlan> {
        match stmt {
            Statement::Select(select) => self.plan_select(select),
            Statement::Insert(insert) => self.plan_insert(insert),
            Statement::Update(update) => self.plan_update(update),
            Statement::Delete(delete) => self.plan_delete(delete),
            Statement::CreateTable(create) => self.plan_create_table(create),
            Statement::DropTable(drop) => Ok(LogicalPlan::DropTable {
                table_name: drop.table_name.clone(),
                if_exists: drop.if_exists,
            }),
            Statement::BeginTransaction => Ok(LogicalPlan::BeginTransaction),
            Statement::Commit => Ok(LogicalPlan::Commit),
            Statement::Rollback => Ok(LogicalPlan::Rollback),
        }
    }

    fn compiler<'s>(&'s self, scope: &'s Scope) -> ExprCompiler<'s> {
        ExprCompiler::new(scope, self.functions)
    }

    fn plan_select(&self, select: &SelectStatement) -> Result<LogicalPlan> {
        // 1. FROM
        let (mut plan, scope) = self.plan_from(select.from.as_ref())?;

        // 2. WHERE
        if let Some(predicate) = &select.where_clause {
            let predicate = ExprCompiler::new(&scope, self.functions).compile(predicate)?;
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        // 3. GROUP BY / aggregates
        let grouped = !select.group_by.is_empty()
            || select.having.is_some()
            || select.columns.iter().any(|item| match item {
                SelectItem::Expr { expr, .. } => contains_aggregate(expr, self.functions),
                _ => false,
            })
            || select
                .order_by
                .iter()
                .any(|item| contains_aggregate(&item.expr, self.functions));

        let mut group_by = Vec::new();
        for term in &select.group_by {
            let term = resolve_output_reference(term, select, &scope, "GROUP BY")?;
            let mut compiler = ExprCompiler::new(&scope, self.functions);
            let collation = compiler.collation_of(term)?;
            group_by.push(GroupKey {
                expr: compiler.compile(term)?,
                collation,
            });
        }
        let mut aggregates = grouped.then(Vec::new);

        // 4. Projection
        let mut expressions = Vec::new();
        let mut columns = Vec::new();
        let mut collations = Vec::new();
        for item in &select.columns {
            match item {
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                    let qualifier = match item {
                        SelectItem::QualifiedWildcard(table) => {
                            if !scope.has_table(table) {
                                return Err(Error::TableNotFound(table.clone()));
                            }
                            Some(table)
                        }
                        _ => None,
                    };
                    if scope.is_empty() {
                        return Err(Error::Misuse("no tables specified".to_string()));
                    }
                    for (index, column) in scope.columns().iter().enumerate() {
                        if qualifier.is_some_and(|t| !column.table.eq_ignore_ascii_case(t)) {
                            continue;
                        }
                        expressions.push(PhysicalExpr::Column(index));
                        columns.push(OutputColumn {
                            name: column.name.clone(),
                            declared_type: column.declared_type.clone(),
                        });
                        collations.push(match &column.collation {
                            Some(name) => Some(ResolvedCollation {
                                name: name.clone(),
                                compare: self.functions.collation(name)?,
                            }),
                            None => None,
                        });
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let (name, declared_type) = match (alias, expr) {
                        (Some(alias), Expr::Column(column)) => {
                            (alias.clone(), self.declared_type(&scope, column))
                        }
                        (Some(alias), _) => (alias.clone(), None),
                        (None, Expr::Column(column)) => {
                            (column.column.clone(), self.declared_type(&scope, column))
                        }
                        (None, _) => (expr.to_string(), None),
                    };
                    collations.push(self.compiler(&scope).collation_of(expr)?);
                    expressions.push(compile_in(&scope, self.functions, aggregates.as_mut(), expr)?);
                    columns.push(OutputColumn {
                        name,
                        declared_type,
                    });
                }
            }
        }
        let width = expressions.len();

        // 5. ORDER BY keys; terms that are not output columns are computed as
        // hidden columns of the projection
        let mut keys = Vec::new();
        let mut hidden = Vec::new();
        for item in &select.order_by {
            let (base, explicit) = match &item.expr {
                Expr::Collate { expr, collation } => (expr.as_ref(), Some(collation)),
                expr => (expr, None),
            };
            let output = match base {
                Expr::Literal(Literal::Integer(position)) => {
                    if *position < 1 || *position as usize > width {
                        return Err(Error::Misuse(format!(
                            "ORDER BY term out of range - should be between 1 and {}",
                            width
                        )));
                    }
                    Some(*position as usize - 1)
                }
                Expr::Column(ColumnRef {
                    table: None,
                    column,
                }) => select.columns.iter().position(|item| {
                    matches!(item, SelectItem::Expr { alias: Some(alias), .. }
                        if alias.eq_ignore_ascii_case(column))
                }),
                _ => None,
            };

            let (column, collation) = match output {
                Some(index) => {
                    let collation = match explicit {
                        Some(name) => Some(ResolvedCollation {
                            name: name.clone(),
                            compare: self.functions.collation(name)?,
                        }),
                        None => collations[index].clone(),
                    };
                    (index, collation)
                }
                None => {
                    let collation = self.compiler(&scope).collation_of(&item.expr)?;
                    hidden.push(compile_in(
                        &scope,
                        self.functions,
                        aggregates.as_mut(),
                        &item.expr,
                    )?);
                    (width + hidden.len() - 1, collation)
                }
            };
            keys.push(SortKey {
                column,
                ascending: item.ascending,
                collation,
            });
        }

        // HAVING is compiled last so that every aggregate it adds is known
        let having = match &select.having {
            Some(having) => Some(compile_in(&scope, self.functions, aggregates.as_mut(), having)?),
            None => None,
        };

        if let Some(aggregates) = aggregates {
            plan = LogicalPlan::Aggregate {
                input: Box::new(plan),
                group_by,
                aggregates,
                input_width: scope.len(),
            };
            if let Some(predicate) = having {
                plan = LogicalPlan::Filter {
                    input: Box::new(plan),
                    predicate,
                };
            }
        }

        plan = LogicalPlan::Project {
            input: Box::new(plan),
            expressions,
            hidden,
        };

        if select.distinct {
            plan = LogicalPlan::Distinct {
                input: Box::new(plan),
                width,
                collations,
            };
        }

        if !keys.is_empty() {
            plan = LogicalPlan::Sort {
                input: Box::new(plan),
                keys,
            };
        }

        if select.limit.is_some() || select.offset.is_some() {
            let constants = Scope::new();
            let limit = match &select.limit {
                Some(expr) => Some(self.compiler(&constants).compile(expr)?),
                None => None,
            };
            let offset = match &select.offset {
                Some(expr) => Some(self.compiler(&constants).compile(expr)?),
                None => None,
            };
            plan = LogicalPlan::Limit {
                input: Box::new(plan),
                limit,
                offset,
            };
        }

        Ok(LogicalPlan::Query {
            input: Box::new(plan),
            columns,
        })
    }

    fn plan_from(&self, from: Option<&FromClause>) -> Result<(LogicalPlan, Scope)> {
        let mut scope = Scope::new();
        let Some(from) = from else {
            return Ok((LogicalPlan::Empty, scope));
        };

        let table = self.catalog.get_table(&from.table.name)?;
        scope.add_table(from.table.reference_name(), table.schema());
        let mut plan = LogicalPlan::Scan {
            table_name: from.table.name.clone(),
        };

        for join in &from.joins {
            let right = self.catalog.get_table(&join.table.name)?;
            scope.add_table(join.table.reference_name(), right.schema());
            // ON sees the tables joined so far, which share the row layout
            let condition = match &join.condition {
                Some(condition) => Some(ExprCompiler::new(&scope, self.functions).compile(condition)?),
                None => None,
            };
            plan = LogicalPlan::Join {
                left: Box::new(plan),
                right: Box::new(LogicalPlan::Scan {
                    table_name: join.table.name.clone(),
                }),
                join_type: join.join_type,
                condition,
                right_width: right.schema().column_count(),
            };
        }

        Ok((plan, scope))
    }

    fn declared_type(&self, scope: &Scope, column: &ColumnRef) -> Option<String> {
        let index = scope.resolve(column).ok()?;
        scope.columns()[index].declared_type.clone()
    }

    fn plan_insert(&self, insert: &InsertStatement) -> Result<LogicalPlan> {
        let table = self.catalog.get_table(&insert.table_name)?;
        let schema = table.schema();

        let targets = match &insert.columns {
            Some(names) => {
                let mut targets = Vec::with_capacity(names.len());
                for name in names {
                    let index = schema.get_column_index(name).ok_or_else(|| {
                        Error::ColumnNotFound(name.clone(), format!("table '{}'", insert.table_name))
                    })?;
                    if targets.contains(&index) {
                        return Err(Error::DuplicateColumn(name.clone()));
                    }
                    targets.push(index);
                }
                targets
            }
            None => (0..schema.column_count()).collect(),
        };

        let input = match &insert.source {
            InsertSource::Values(rows) => {
                let constants = Scope::new();
                let mut compiled = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != targets.len() {
                        return Err(value_count_mismatch(&insert.table_name, targets.len(), row.len()));
                    }
                    compiled.push(
                        row.iter()
                            .map(|expr| self.compiler(&constants).compile(expr))
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                LogicalPlan::Values { rows: compiled }
            }
            InsertSource::Select(select) => {
                let query = self.plan_select(select)?;
                let supplied = query.output_columns().len();
                if supplied != targets.len() {
                    return Err(value_count_mismatch(&insert.table_name, targets.len(), supplied));
                }
                query
            }
        };

        Ok(LogicalPlan::Insert {
            table_name: insert.table_name.clone(),
            targets,
            input: Box::new(input),
        })
    }

    fn table_scope(&self, table_name: &str) -> Result<Scope> {
        let table = self.catalog.get_table(table_name)?;
        let mut scope = Scope::new();
        scope.add_table(table_name, table.schema());
        Ok(scope)
    }

    fn plan_update(&self, update: &UpdateStatement) -> Result<LogicalPlan> {
        let scope = self.table_scope(&update.table_name)?;
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for assignment in &update.assignments {
            let column = scope.resolve(&ColumnRef {
                table: None,
                column: assignment.column.clone(),
            })?;
            let value = ExprCompiler::new(&scope, self.functions).compile(&assignment.value)?;
            assignments.push((column, value));
        }
        let predicate = match &update.where_clause {
            Some(predicate) => Some(ExprCompiler::new(&scope, self.functions).compile(predicate)?),
            None => None,
        };

        Ok(LogicalPlan::Update {
            table_name: update.table_name.clone(),
            assignments,
            predicate,
        })
    }

    fn plan_delete(&self, delete: &DeleteStatement) -> Result<LogicalPlan> {
        let scope = self.table_scope(&delete.table_name)?;
        let predicate = match &delete.where_clause {
            Some(predicate) => Some(ExprCompiler::new(&scope, self.functions).compile(predicate)?),
            None => None,
        };

        Ok(LogicalPlan::Delete {
            table_name: delete.table_name.clone(),
            predicate,
        })
    }

    fn plan_create_table(&self, create: &CreateTableStatement) -> Result<LogicalPlan> {
        let mut columns = Vec::with_capacity(create.columns.len());
        for (position, def) in create.columns.iter().enumerate() {
            let mut column = Column::new(&def.name, def.data_type.clone(), position)
                .nullable(!def.not_null)
                .primary_key(def.primary_key)
                .unique(def.unique);
            if let Some(default) = &def.default {
                column = column.default(evaluate_constant(default, self.functions, &[])?);
            }
            if let Some(collation) = &def.collation {
                self.functions.collation(collation)?;
                column = column.collation(collation);
            }
            columns.push(column);
        }

        for constraint in &create.constraints {
            let (name, primary_key) = match constraint {
                TableConstraint::PrimaryKey(name) => (name, true),
                TableConstraint::Unique(name) => (name, false),
            };
            let column = columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    Error::ColumnNotFound(name.clone(), format!("table '{}'", create.table_name))
                })?;
            if primary_key {
                column.primary_key = true;
            } else {
                column.unique = true;
            }
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::Misuse(format!(
                "table \"{}\" has more than one primary key",
                create.table_name
            )));
        }

        Ok(LogicalPlan::CreateTable {
            table_name: create.table_name.clone(),
            schema: Schema::from_columns(columns)?,
            if_not_exists: create.if_not_exists,
        })
    }
}

/// Compile with aggregate calls collected when the query is grouped
fn compile_in(
    scope: &Scope,
    functions: &FunctionRegistry,
    aggregates: Option<&mut Vec<AggregateCall>>,
    expr: &Expr,
) -> Result<PhysicalExpr> {
    match aggregates {
        Some(aggregates) => ExprCompiler::grouped(scope, functions, aggregates).compile(expr),
        None => ExprCompiler::new(scope, functions).compile(expr),
    }
}

/// Resolve a GROUP BY term naming an output alias or a 1-based position
fn resolve_output_reference<'s>(
    term: &'s Expr,
    select: &'s SelectStatement,
    scope: &Scope,
    clause: &str,
) -> Result<&'s Expr> {
    match term {
        Expr::Literal(Literal::Integer(position)) => {
            let item = usize::try_from(*position)
                .ok()
                .and_then(|p| p.checked_sub(1))
                .and_then(|p| select.columns.get(p));
            match item {
                Some(SelectItem::Expr { expr, .. }) => Ok(expr),
                _ => Err(Error::Misuse(format!(
                    "{} term out of range - should be between 1 and {}",
                    clause,
                    select.columns.len()
                ))),
            }
        }
        Expr::Column(column) if column.table.is_none() && scope.resolve(column).is_err() => {
            let aliased = select.columns.iter().find_map(|item| match item {
                SelectItem::Expr {
                    expr,
                    alias: Some(alias),
                } if alias.eq_ignore_ascii_case(&column.column) => Some(expr),
                _ => None,
            });
            Ok(aliased.unwrap_or(term))
        }
        _ => Ok(term),
    }
}

fn value_count_mismatch(table: &str, expected: usize, supplied: usize) -> Error {
    Error::Misuse(format!(
        "table {} has {} columns but {} values were supplied",
        table, expected, supplied
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Parser;

    fn setup() -> (Catalog, FunctionRegistry) {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let mut catalog = Catalog::new();
        let schema = Schema::from_columns(vec![
            Column::new("id", Some("INTEGER".into()), 0).primary_key(true),
            Column::new("name", Some("TEXT".into()), 1).collation("nocase"),
        ])
        .unwrap();
        catalog.create_table("users", schema).unwrap();
        (catalog, functions)
    }

    fn plan(sql: &str) -> Result<LogicalPlan> {
        let (catalog, functions) = setup();
        let stmt = Parser::new(sql)?.parse()?;
        Planner::new(&catalog, &functions).plan(&stmt.statement)
    }

    #[test]
    fn test_output_column_names() {
        let plan = plan("SELECT id, name AS who, upper(name), count(*) FROM users").unwrap();
        let names: Vec<_> = plan.output_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "who", "upper(name)", "count(*)"]);
        assert_eq!(plan.output_columns()[0].declared_type.as_deref(), Some("INTEGER"));
        assert_eq!(plan.output_columns()[2].declared_type, None);
    }

    #[test]
    fn test_select_pipeline_shape() {
        let plan = plan("SELECT name FROM users WHERE id > 1 ORDER BY name LIMIT 2").unwrap();
        let LogicalPlan::Query { input, .. } = plan else {
            panic!("expected a query");
        };
        let LogicalPlan::Limit { input, .. } = *input else {
            panic!("expected limit");
        };
        let LogicalPlan::Sort { input, keys } = *input else {
            panic!("expected sort");
        };
        assert_eq!(keys[0].column, 0);
        assert_eq!(keys[0].collation.as_ref().map(|c| c.name.as_str()), Some("nocase"));
        assert!(matches!(*input, LogicalPlan::Project { .. }));
    }

    #[test]
    fn test_resolution_errors() {
        assert!(matches!(plan("SELECT * FROM missing"), Err(Error::TableNotFound(_))));
        assert!(matches!(plan("SELECT nope FROM users"), Err(Error::ColumnNotFound(..))));
        assert!(matches!(
            plan("SELECT id FROM users ORDER BY 3"),
            Err(Error::Misuse(_))
        ));
        assert!(matches!(
            plan("SELECT id FROM users ORDER BY name COLLATE nope"),
            Err(Error::UnknownCollation(_))
        ));
        assert!(matches!(
            plan("INSERT INTO users VALUES (1)"),
            Err(Error::Misuse(_))
        ));
        assert!(matches!(
            plan("SELECT * FROM users u JOIN users v ON id = id"),
            Err(Error::AmbiguousColumn(_))
        ));
    }

    #[test]
    fn test_create_table_plan() {
        let plan = plan(
            "CREATE TABLE t (a INTEGER, b TEXT DEFAULT 'x' COLLATE nocase, PRIMARY KEY (a))",
        )
        .unwrap();
        let LogicalPlan::CreateTable { schema, .. } = plan else {
            panic!("expected create table");
        };
        assert_eq!(schema.primary_key_index(), Some(0));
        assert_eq!(schema.columns()[1].default, Some("x".into()));
    }
}
