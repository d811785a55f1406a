//! Expression compilation and evaluation
//!
//! AST expressions are compiled against a [`Scope`] before any row is read:
//! column references become row offsets, function names become registry
//! handles and collation names become comparators. Unknown names therefore
//! fail when a statement starts, not halfway through its rows.

use std::cmp::Ordering;
use std::fmt;

use crate::catalog::{Affinity, Schema};
use crate::error::{Error, Result};
use crate::functions::{AggregateFactory, Collation, FunctionRegistry, ScalarFunction};
use crate::sql::ast::{BinaryOperator, ColumnRef, Expr, UnaryOperator};
use crate::storage::Value;

// ========== Scope ==========

/// A column visible to expressions of one query
#[derive(Debug, Clone)]
pub struct ScopeColumn {
    /// Name (or alias) of the table the column comes from
    pub table: String,
    pub name: String,
    pub declared_type: Option<String>,
    pub collation: Option<String>,
}

/// The columns of every FROM source, in row layout order
#[derive(Debug, Clone, Default)]
pub struct Scope {
    columns: Vec<ScopeColumn>,
}

impl Scope {
    /// An empty scope, for constant expressions
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the columns of a table referenced as `reference`
    pub fn add_table(&mut self, reference: &str, schema: &Schema) {
        for column in schema.columns() {
            self.columns.push(ScopeColumn {
                table: reference.to_string(),
                name: column.name.clone(),
                declared_type: column.declared_type.clone(),
                collation: column.collation.clone(),
            });
        }
    }

    pub fn columns(&self) -> &[ScopeColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether a table of that reference name contributes columns
    pub fn has_table(&self, reference: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.table.eq_ignore_ascii_case(reference))
    }

    /// Resolve a column reference to its offset in the row
    pub fn resolve(&self, column: &ColumnRef) -> Result<usize> {
        let mut found = None;
        for (index, candidate) in self.columns.iter().enumerate() {
            let table_matches = column
                .table
                .as_deref()
                .map_or(true, |t| candidate.table.eq_ignore_ascii_case(t));
            if table_matches && candidate.name.eq_ignore_ascii_case(&column.column) {
                if found.is_some() {
                    return Err(Error::AmbiguousColumn(column.to_string()));
                }
                found = Some(index);
            }
        }

        found.ok_or_else(|| {
            let context = match &column.table {
                Some(table) => format!("table '{}'", table),
                None => "any table of the query".to_string(),
            };
            Error::ColumnNotFound(column.column.clone(), context)
        })
    }
}

// ========== Compiled expressions ==========

/// A collation resolved from the function registry
#[derive(Clone)]
pub struct ResolvedCollation {
    pub name: String,
    pub compare: Collation,
}

impl ResolvedCollation {
    pub fn compare(&self, left: &Value, right: &Value) -> Ordering {
        left.compare_with(right, Some(&self.compare))
    }
}

impl fmt::Debug for ResolvedCollation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COLLATE {}", self.name)
    }
}

/// Compare two values under an optional collation
pub fn compare_values(left: &Value, right: &Value, collation: Option<&ResolvedCollation>) -> Ordering {
    match collation {
        Some(collation) => collation.compare(left, right),
        None => left.compare(right),
    }
}

/// A scalar function resolved from the function registry
#[derive(Clone)]
pub struct ResolvedFunction {
    pub name: String,
    pub func: ScalarFunction,
}

impl fmt::Debug for ResolvedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.name)
    }
}

/// One aggregate call of a grouped query
#[derive(Clone)]
pub struct AggregateCall {
    /// SQL text of the call, used to share one slot between repeated calls
    pub key: String,
    pub factory: AggregateFactory,
    pub args: Vec<PhysicalExpr>,
    pub distinct: bool,
    /// Collation that decides which DISTINCT arguments are duplicates
    pub collation: Option<ResolvedCollation>,
}

impl fmt::Debug for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCall")
            .field("key", &self.key)
            .field("args", &self.args)
            .field("distinct", &self.distinct)
            .field("collation", &self.collation)
            .finish()
    }
}

/// An expression with every name resolved
#[derive(Debug, Clone)]
pub enum PhysicalExpr {
    Column(usize),
    Literal(Value),
    Parameter(usize),
    Binary {
        left: Box<PhysicalExpr>,
        op: BinaryOperator,
        right: Box<PhysicalExpr>,
        collation: Option<ResolvedCollation>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<PhysicalExpr>,
    },
    Scalar {
        function: ResolvedFunction,
        args: Vec<PhysicalExpr>,
    },
    IsNull {
        expr: Box<PhysicalExpr>,
        negated: bool,
    },
    Between {
        expr: Box<PhysicalExpr>,
        low: Box<PhysicalExpr>,
        high: Box<PhysicalExpr>,
        negated: bool,
        collation: Option<ResolvedCollation>,
    },
    InList {
        expr: Box<PhysicalExpr>,
        list: Vec<PhysicalExpr>,
        negated: bool,
        collation: Option<ResolvedCollation>,
    },
    Like {
        expr: Box<PhysicalExpr>,
        pattern: Box<PhysicalExpr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<PhysicalExpr>>,
        when_clauses: Vec<(PhysicalExpr, PhysicalExpr)>,
        else_clause: Option<Box<PhysicalExpr>>,
        collation: Option<ResolvedCollation>,
    },
    Cast {
        expr: Box<PhysicalExpr>,
        affinity: Affinity,
    },
}

// ========== Compilation ==========

/// Compiles AST expressions against a scope
pub struct ExprCompiler<'a> {
    scope: &'a Scope,
    functions: &'a FunctionRegistry,
    /// Present when aggregate calls are allowed; they are collected here and
    /// read back from the columns following the scope's own.
    aggregates: Option<&'a mut Vec<AggregateCall>>,
}

impl<'a> ExprCompiler<'a> {
    /// A compiler that rejects aggregate calls
    pub fn new(scope: &'a Scope, functions: &'a FunctionRegistry) -> Self {
        Self {
            scope,
            functions,
            aggregates: None,
        }
    }

    /// A compiler for grouped queries, collecting aggregate calls
    pub fn grouped(
        scope: &'a Scope,
        functions: &'a FunctionRegistry,
        aggregates: &'a mut Vec<AggregateCall>,
    ) -> Self {
        Self {
            scope,
            functions,
            aggregates: Some(aggregates),
        }
    }

    pub fn compile(&mut self, expr: &Expr) -> Result<PhysicalExpr> {
        Ok(match expr {
            Expr::Column(column) => PhysicalExpr::Column(self.scope.resolve(column)?),
            Expr::Literal(literal) => PhysicalExpr::Literal(literal.to_value()),
            Expr::Parameter(placeholder) => PhysicalExpr::Parameter(placeholder.slot),
            Expr::Nested(inner) => self.compile(inner)?,
            Expr::BinaryOp { left, op, right } => {
                let collation = if op.is_comparison() {
                    self.comparison_collation(left, right)?
                } else {
                    None
                };
                PhysicalExpr::Binary {
                    left: Box::new(self.compile(left)?),
                    op: *op,
                    right: Box::new(self.compile(right)?),
                    collation,
                }
            }
            Expr::UnaryOp { op, expr } => PhysicalExpr::Unary {
                op: *op,
                expr: Box::new(self.compile(expr)?),
            },
            Expr::Function {
                name,
                args,
                distinct,
                ..
            } => self.compile_function(expr, name, args, *distinct)?,
            Expr::IsNull(inner) => PhysicalExpr::IsNull {
                expr: Box::new(self.compile(inner)?),
                negated: false,
            },
            Expr::IsNotNull(inner) => PhysicalExpr::IsNull {
                expr: Box::new(self.compile(inner)?),
                negated: true,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => PhysicalExpr::Between {
                collation: self.comparison_collation(expr, low)?,
                expr: Box::new(self.compile(expr)?),
                low: Box::new(self.compile(low)?),
                high: Box::new(self.compile(high)?),
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => PhysicalExpr::InList {
                collation: self.collation_of(expr)?,
                expr: Box::new(self.compile(expr)?),
                list: list
                    .iter()
                    .map(|item| self.compile(item))
                    .collect::<Result<_>>()?,
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => PhysicalExpr::Like {
                expr: Box::new(self.compile(expr)?),
                pattern: Box::new(self.compile(pattern)?),
                negated: *negated,
            },
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let collation = match operand {
                    Some(operand) => self.collation_of(operand)?,
                    None => None,
                };
                let operand = match operand {
                    Some(operand) => Some(Box::new(self.compile(operand)?)),
                    None => None,
                };
                let mut clauses = Vec::with_capacity(when_clauses.len());
                for (condition, result) in when_clauses {
                    clauses.push((self.compile(condition)?, self.compile(result)?));
                }
                let else_clause = match else_clause {
                    Some(expr) => Some(Box::new(self.compile(expr)?)),
                    None => None,
                };
                PhysicalExpr::Case {
                    operand,
                    when_clauses: clauses,
                    else_clause,
                    collation,
                }
            }
            Expr::Cast { expr, type_name } => PhysicalExpr::Cast {
                expr: Box::new(self.compile(expr)?),
                affinity: Affinity::from_declared(Some(type_name)),
            },
            Expr::Collate { expr, collation } => {
                // The collation only affects comparisons; check it exists
                self.functions.collation(collation)?;
                self.compile(expr)?
            }
        })
    }

    fn compile_function(
        &mut self,
        call: &Expr,
        name: &str,
        args: &[Expr],
        distinct: bool,
    ) -> Result<PhysicalExpr> {
        if let Some(factory) = self.functions.aggregate(name, args.len()) {
            if distinct && args.len() != 1 {
                return Err(Error::Misuse(
                    "DISTINCT aggregates must have exactly one argument".to_string(),
                ));
            }
            // Aggregate arguments may not contain aggregates themselves
            let mut inner = ExprCompiler::new(self.scope, self.functions);
            let compiled_args = args
                .iter()
                .map(|arg| inner.compile(arg))
                .collect::<Result<Vec<_>>>()?;

            let collation = match (distinct, args.first()) {
                (true, Some(arg)) => self.collation_of(arg)?,
                _ => None,
            };

            let width = self.scope.len();
            let Some(aggregates) = self.aggregates.as_deref_mut() else {
                return Err(Error::Misuse(format!(
                    "misuse of aggregate function {}()",
                    name
                )));
            };
            let key = call.to_string();
            let slot = match aggregates.iter().position(|a| a.key == key) {
                Some(slot) => slot,
                None => {
                    aggregates.push(AggregateCall {
                        key,
                        factory: factory.clone(),
                        args: compiled_args,
                        distinct,
                        collation,
                    });
                    aggregates.len() - 1
                }
            };
            return Ok(PhysicalExpr::Column(width + slot));
        }

        let func = self
            .functions
            .scalar(name, args.len())
            .cloned()
            .ok_or_else(|| Error::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            })?;
        if distinct {
            return Err(Error::Misuse(format!(
                "DISTINCT is not allowed on scalar function {}()",
                name
            )));
        }
        let args = args
            .iter()
            .map(|arg| self.compile(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok(PhysicalExpr::Scalar {
            function: ResolvedFunction {
                name: name.to_string(),
                func,
            },
            args,
        })
    }

    /// Collation applying to a comparison of two operands: an explicit
    /// COLLATE on either side wins over a column's declared collation
    pub fn comparison_collation(
        &self,
        left: &Expr,
        right: &Expr,
    ) -> Result<Option<ResolvedCollation>> {
        let name = explicit_collation(left)
            .or_else(|| explicit_collation(right))
            .map(str::to_string)
            .or_else(|| self.column_collation(left))
            .or_else(|| self.column_collation(right));
        self.resolve_collation(name)
    }

    /// Collation of a single expression, for sorting and grouping
    pub fn collation_of(&self, expr: &Expr) -> Result<Option<ResolvedCollation>> {
        let name = explicit_collation(expr)
            .map(str::to_string)
            .or_else(|| self.column_collation(expr));
        self.resolve_collation(name)
    }

    fn resolve_collation(&self, name: Option<String>) -> Result<Option<ResolvedCollation>> {
        match name {
            Some(name) => {
                let compare = self.functions.collation(&name)?;
                Ok(Some(ResolvedCollation { name, compare }))
            }
            None => Ok(None),
        }
    }

    fn column_collation(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Column(column) => {
                let index = self.scope.resolve(column).ok()?;
                self.scope.columns()[index].collation.clone()
            }
            Expr::Nested(inner) => self.column_collation(inner),
            _ => None,
        }
    }
}

fn explicit_collation(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Collate { collation, .. } => Some(collation),
        Expr::Nested(inner) => explicit_collation(inner),
        _ => None,
    }
}

/// Whether an AST expression calls an aggregate anywhere
pub fn contains_aggregate(expr: &Expr, functions: &FunctionRegistry) -> bool {
    let mut found = false;
    expr.walk(&mut |e| {
        if let Expr::Function { name, args, .. } = e {
            if functions.is_aggregate(name, args.len()) {
                found = true;
            }
        }
    });
    found
}

/// Evaluate an expression that may not reference columns
pub fn evaluate_constant(expr: &Expr, functions: &FunctionRegistry, params: &[Value]) -> Result<Value> {
    let scope = Scope::new();
    ExprCompiler::new(&scope, functions)
        .compile(expr)?
        .evaluate(&[], params)
}

// ========== Evaluation ==========

fn bool_value(b: bool) -> Value {
    Value::Integer(i64::from(b))
}

/// WHERE, HAVING and ON treat NULL as false
pub fn is_true(value: &Value) -> bool {
    value.as_bool() == Some(true)
}

impl PhysicalExpr {
    /// Evaluate against one row and the bound parameters
    pub fn evaluate(&self, row: &[Value], params: &[Value]) -> Result<Value> {
        match self {
            PhysicalExpr::Column(index) => Ok(row.get(*index).cloned().unwrap_or(Value::Null)),
            PhysicalExpr::Literal(value) => Ok(value.clone()),
            PhysicalExpr::Parameter(slot) => Ok(params.get(*slot).cloned().unwrap_or(Value::Null)),
            PhysicalExpr::Binary {
                left,
                op,
                right,
                collation,
            } => evaluate_binary_op(left, *op, right, collation.as_ref(), row, params),
            PhysicalExpr::Unary { op, expr } => {
                let value = expr.evaluate(row, params)?;
                Ok(match op {
                    UnaryOperator::Not => match value.as_bool() {
                        Some(b) => bool_value(!b),
                        None => Value::Null,
                    },
                    UnaryOperator::Minus => value.negate(),
                    UnaryOperator::Plus => value,
                })
            }
            PhysicalExpr::Scalar { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(row, params))
                    .collect::<Result<Vec<_>>>()?;
                evaluate_function(function, &args)
            }
            PhysicalExpr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(row, params)?.is_null();
                Ok(bool_value(is_null != *negated))
            }
            PhysicalExpr::Between {
                expr,
                low,
                high,
                negated,
                collation,
            } => {
                let value = expr.evaluate(row, params)?;
                let low = low.evaluate(row, params)?;
                let high = high.evaluate(row, params)?;
                let above = compare_op(&value, &low, collation.as_ref(), |o| o != Ordering::Less);
                let below = compare_op(&value, &high, collation.as_ref(), |o| o != Ordering::Greater);
                let inside = and3(above.as_bool(), below.as_bool());
                Ok(negate_if(inside, *negated))
            }
            PhysicalExpr::InList {
                expr,
                list,
                negated,
                collation,
            } => {
                let value = expr.evaluate(row, params)?;
                if list.is_empty() {
                    return Ok(bool_value(*negated));
                }
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let item = item.evaluate(row, params)?;
                    if item.is_null() {
                        saw_null = true;
                    } else if compare_values(&value, &item, collation.as_ref()) == Ordering::Equal {
                        return Ok(bool_value(!*negated));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(bool_value(*negated))
                }
            }
            PhysicalExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = expr.evaluate(row, params)?;
                let pattern = pattern.evaluate(row, params)?;
                match (value.to_text(), pattern.to_text()) {
                    (Some(value), Some(pattern)) => {
                        Ok(bool_value(like_matches(&value, &pattern) != *negated))
                    }
                    _ => Ok(Value::Null),
                }
            }
            PhysicalExpr::Case {
                operand,
                when_clauses,
                else_clause,
                collation,
            } => {
                let operand = match operand {
                    Some(operand) => Some(operand.evaluate(row, params)?),
                    None => None,
                };
                for (condition, result) in when_clauses {
                    let condition = condition.evaluate(row, params)?;
                    let matched = match &operand {
                        Some(operand) => {
                            !operand.is_null()
                                && !condition.is_null()
                                && compare_values(operand, &condition, collation.as_ref())
                                    == Ordering::Equal
                        }
                        None => is_true(&condition),
                    };
                    if matched {
                        return result.evaluate(row, params);
                    }
                }
                match else_clause {
                    Some(expr) => expr.evaluate(row, params),
                    None => Ok(Value::Null),
                }
            }
            PhysicalExpr::Cast { expr, affinity } => Ok(cast(expr.evaluate(row, params)?, *affinity)),
        }
    }
}

fn evaluate_binary_op(
    left: &PhysicalExpr,
    op: BinaryOperator,
    right: &PhysicalExpr,
    collation: Option<&ResolvedCollation>,
    row: &[Value],
    params: &[Value],
) -> Result<Value> {
    let l = left.evaluate(row, params)?;

    // Short-circuit boolean operators
    match op {
        BinaryOperator::And if l.as_bool() == Some(false) => return Ok(bool_value(false)),
        BinaryOperator::Or if l.as_bool() == Some(true) => return Ok(bool_value(true)),
        _ => {}
    }

    let r = right.evaluate(row, params)?;
    Ok(match op {
        BinaryOperator::And => and3(l.as_bool(), r.as_bool()),
        BinaryOperator::Or => match (l.as_bool(), r.as_bool()) {
            (Some(true), _) | (_, Some(true)) => bool_value(true),
            (Some(false), Some(false)) => bool_value(false),
            _ => Value::Null,
        },
        BinaryOperator::Eq => compare_op(&l, &r, collation, |o| o == Ordering::Equal),
        BinaryOperator::Neq => compare_op(&l, &r, collation, |o| o != Ordering::Equal),
        BinaryOperator::Lt => compare_op(&l, &r, collation, |o| o == Ordering::Less),
        BinaryOperator::Lte => compare_op(&l, &r, collation, |o| o != Ordering::Greater),
        BinaryOperator::Gt => compare_op(&l, &r, collation, |o| o == Ordering::Greater),
        BinaryOperator::Gte => compare_op(&l, &r, collation, |o| o != Ordering::Less),
        BinaryOperator::Add => l.add(&r),
        BinaryOperator::Sub => l.sub(&r),
        BinaryOperator::Mul => l.mul(&r),
        BinaryOperator::Div => l.div(&r),
        BinaryOperator::Mod => l.rem(&r),
        BinaryOperator::Concat => match (l.to_text(), r.to_text()) {
            (Some(a), Some(b)) => Value::Text(a + &b),
            _ => Value::Null,
        },
    })
}

/// Three-valued comparison: NULL on either side yields NULL
fn compare_op(
    left: &Value,
    right: &Value,
    collation: Option<&ResolvedCollation>,
    accept: impl Fn(Ordering) -> bool,
) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    bool_value(accept(compare_values(left, right, collation)))
}

fn and3(left: Option<bool>, right: Option<bool>) -> Value {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => bool_value(false),
        (Some(true), Some(true)) => bool_value(true),
        _ => Value::Null,
    }
}

fn negate_if(value: Value, negated: bool) -> Value {
    match (value.as_bool(), negated) {
        (Some(b), true) => bool_value(!b),
        _ => value,
    }
}

fn evaluate_function(function: &ResolvedFunction, args: &[Value]) -> Result<Value> {
    let value = (function.func)(args).map_err(|e| {
        Error::evaluation(format!(
            "user-defined function {}() raised an error: {}",
            function.name, e
        ))
    })?;
    match value {
        Value::Real(f) if f.is_nan() => Err(Error::evaluation(format!(
            "function {}() returned NaN",
            function.name
        ))),
        value => Ok(value),
    }
}

/// Convert a value as CAST(value AS type) does
pub fn cast(value: Value, affinity: Affinity) -> Value {
    if value.is_null() {
        return value;
    }
    match affinity {
        Affinity::Integer => match value.to_numeric() {
            Value::Integer(i) => Value::Integer(i),
            Value::Real(f) => Value::Integer(f as i64),
            _ => Value::Integer(0),
        },
        Affinity::Real => Value::Real(value.to_numeric().as_f64().unwrap_or(0.0)),
        Affinity::Text => value.to_text().map_or(Value::Null, Value::Text),
        Affinity::Blob => match value {
            Value::Blob(b) => Value::Blob(b),
            other => other
                .to_text()
                .map_or(Value::Null, |s| Value::Blob(s.into_bytes())),
        },
        Affinity::Numeric => match value.to_numeric() {
            Value::Real(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => Value::Integer(f as i64),
            Value::Null => Value::Integer(0),
            other => other,
        },
    }
}

/// LIKE matching: `%` matches any run, `_` one character, ASCII letters
/// compare case-insensitively
pub fn like_matches(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut v, mut p) = (0, 0);
    // Position of the last `%` and the value offset it is currently matched up to
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, v));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p].eq_ignore_ascii_case(&value[v])) {
            p += 1;
            v += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            v = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::sql::Parser;

    fn scope() -> Scope {
        let schema = Schema::from_columns(vec![
            Column::new("id", Some("integer".into()), 0),
            Column::new("name", Some("text".into()), 1).collation("nocase"),
        ])
        .unwrap();
        let mut scope = Scope::new();
        scope.add_table("t", &schema);
        scope
    }

    fn eval(sql: &str, row: &[Value]) -> Result<Value> {
        let functions = FunctionRegistry::with_builtins().unwrap();
        let expr = Parser::new(sql)?.parse_expr()?;
        let scope = scope();
        ExprCompiler::new(&scope, &functions)
            .compile(&expr)?
            .evaluate(row, &[])
    }

    #[test]
    fn test_three_valued_logic() {
        let row = [Value::Null, Value::Text("x".into())];
        assert_eq!(eval("id = 1", &row).unwrap(), Value::Null);
        assert_eq!(eval("id = 1 AND 0", &row).unwrap(), Value::Integer(0));
        assert_eq!(eval("id = 1 OR 1", &row).unwrap(), Value::Integer(1));
        assert_eq!(eval("NOT (id = 1)", &row).unwrap(), Value::Null);
        assert_eq!(eval("id IS NULL", &row).unwrap(), Value::Integer(1));
        assert_eq!(eval("2 IN (1, NULL)", &row).unwrap(), Value::Null);
        assert_eq!(eval("1 IN (1, NULL)", &row).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_column_collation_applies() {
        let row = [Value::Integer(1), Value::Text("ANN".into())];
        assert_eq!(eval("name = 'ann'", &row).unwrap(), Value::Integer(1));
        assert_eq!(eval("name = 'ann' COLLATE binary", &row).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_name_resolution_errors() {
        let row = [Value::Null, Value::Null];
        assert!(matches!(eval("missing", &row), Err(Error::ColumnNotFound(..))));
        assert!(matches!(eval("md5(id)", &row), Err(Error::UnknownFunction { .. })));
        assert!(matches!(eval("name COLLATE nope", &row), Err(Error::UnknownCollation(_))));
        assert!(matches!(eval("count(id)", &row), Err(Error::Misuse(_))));
    }

    #[test]
    fn test_like() {
        assert!(like_matches("Hello", "h%o"));
        assert!(like_matches("Hello", "_ELLO"));
        assert!(like_matches("abcabc", "%bc"));
        assert!(!like_matches("Hello", "h_o"));
        assert!(like_matches("", "%"));
        assert!(!like_matches("", "_"));
    }

    #[test]
    fn test_cast_and_case() {
        let row = [Value::Integer(2), Value::Null];
        assert_eq!(eval("CAST('3.7' AS INTEGER)", &row).unwrap(), Value::Integer(3));
        assert_eq!(eval("CAST(id AS TEXT)", &row).unwrap(), Value::Text("2".into()));
        assert_eq!(
            eval("CASE id WHEN 1 THEN 'one' WHEN 2 THEN 'two' END", &row).unwrap(),
            Value::Text("two".into())
        );
        assert_eq!(eval("CASE WHEN name IS NULL THEN 7 ELSE 8 END", &row).unwrap(), Value::Integer(7));
    }

    #[test]
    fn test_function_error_is_evaluation_error() {
        let mut functions = FunctionRegistry::with_builtins().unwrap();
        functions
            .register_scalar("boom", 0, |_| Err("kaboom".into()))
            .unwrap();
        let expr = Parser::new("boom()").unwrap().parse_expr().unwrap();
        let scope = Scope::new();
        let compiled = ExprCompiler::new(&scope, &functions).compile(&expr).unwrap();
        let err = compiled.evaluate(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::Evaluation(ref m) if m.contains("kaboom")));
    }
}
