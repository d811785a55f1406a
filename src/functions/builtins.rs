//! Built-in scalar functions, aggregates and collations

use std::cmp::Ordering;

use super::registry::{Aggregate, FunctionRegistry, VARIADIC};
use crate::error::{BoxError, Result};
use crate::storage::tuple::hex_upper;
use crate::storage::Value;

type FnResult<T> = std::result::Result<T, BoxError>;

/// Install every built-in into the registry
pub fn register_builtins(registry: &mut FunctionRegistry) -> Result<()> {
    register_scalars(registry)?;
    register_aggregates(registry)?;
    register_collations(registry);
    Ok(())
}

fn register_scalars(registry: &mut FunctionRegistry) -> Result<()> {
    let scalars: &[(&str, i32, fn(&[Value]) -> FnResult<Value>)] = &[
        ("upper", 1, upper),
        ("lower", 1, lower),
        ("length", 1, length),
        ("abs", 1, abs),
        ("typeof", 1, type_of),
        ("coalesce", VARIADIC, coalesce),
        ("ifnull", 2, coalesce),
        ("nullif", 2, nullif),
        ("round", 1, round),
        ("round", 2, round),
        ("substr", 2, substr),
        ("substr", 3, substr),
        ("hex", 1, hex),
        ("quote", 1, quote),
        ("min", VARIADIC, scalar_min),
        ("max", VARIADIC, scalar_max),
    ];

    for (name, arity, func) in scalars {
        registry.register_scalar(name, *arity, *func)?;
    }
    Ok(())
}

fn register_aggregates(registry: &mut FunctionRegistry) -> Result<()> {
    registry.register_aggregate("count", 0, || Box::new(Count::rows()))?;
    registry.register_aggregate("count", 1, || Box::new(Count::non_null()))?;
    registry.register_aggregate("sum", 1, || Box::new(Sum::default()))?;
    registry.register_aggregate("total", 1, || Box::new(Total::default()))?;
    registry.register_aggregate("avg", 1, || Box::new(Avg::default()))?;
    registry.register_aggregate("min", 1, || Box::new(Extreme::min()))?;
    registry.register_aggregate("max", 1, || Box::new(Extreme::max()))?;
    registry.register_aggregate("group_concat", 1, || Box::new(GroupConcat::default()))?;
    registry.register_aggregate("group_concat", 2, || Box::new(GroupConcat::default()))?;
    Ok(())
}

fn register_collations(registry: &mut FunctionRegistry) {
    registry.register_collation("binary", |a, b| a.cmp(b));
    registry.register_collation("nocase", |a, b| {
        a.bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
    });
    registry.register_collation("rtrim", |a, b| {
        a.trim_end_matches(' ').cmp(b.trim_end_matches(' '))
    });
}

// ========== Scalar functions ==========

fn upper(args: &[Value]) -> FnResult<Value> {
    Ok(map_text(&args[0], |s| s.to_uppercase()))
}

fn lower(args: &[Value]) -> FnResult<Value> {
    Ok(map_text(&args[0], |s| s.to_lowercase()))
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value.to_text() {
        Some(text) => Value::Text(f(&text)),
        None => Value::Null,
    }
}

fn length(args: &[Value]) -> FnResult<Value> {
    Ok(match &args[0] {
        Value::Null => Value::Null,
        Value::Blob(b) => Value::Integer(b.len() as i64),
        other => Value::Integer(other.to_text().map_or(0, |s| s.chars().count()) as i64),
    })
}

fn abs(args: &[Value]) -> FnResult<Value> {
    match args[0].to_numeric() {
        Value::Integer(i) => i
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| "integer overflow".into()),
        Value::Real(f) => Ok(Value::Real(f.abs())),
        other => Ok(other),
    }
}

fn type_of(args: &[Value]) -> FnResult<Value> {
    Ok(Value::Text(args[0].type_name().to_string()))
}

fn coalesce(args: &[Value]) -> FnResult<Value> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

fn nullif(args: &[Value]) -> FnResult<Value> {
    if args[0] == args[1] {
        Ok(Value::Null)
    } else {
        Ok(args[0].clone())
    }
}

fn round(args: &[Value]) -> FnResult<Value> {
    let digits = args.get(1).and_then(Value::as_i64).unwrap_or(0).clamp(0, 15);
    Ok(match args[0].as_f64() {
        Some(x) => {
            let scale = 10f64.powi(digits as i32);
            Value::Real((x * scale).round() / scale)
        }
        None => Value::Null,
    })
}

fn substr(args: &[Value]) -> FnResult<Value> {
    let Some(text) = args[0].to_text() else {
        return Ok(Value::Null);
    };
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as i64;
    let start = args[1].as_i64().unwrap_or(0);
    let count = args.get(2).and_then(Value::as_i64);

    // 1-based start; negative counts from the end
    let mut begin = if start > 0 {
        start - 1
    } else if start < 0 {
        len + start
    } else {
        -1
    };
    let mut end = match count {
        Some(n) if n >= 0 => begin + n,
        Some(n) => {
            let stop = begin;
            begin += n;
            stop
        }
        None => len,
    };
    if start == 0 {
        // Position 0 is one before the first character
        end = end.max(0);
    }
    begin = begin.clamp(0, len);
    end = end.clamp(0, len);
    if begin >= end {
        return Ok(Value::Text(String::new()));
    }
    Ok(Value::Text(
        chars[begin as usize..end as usize].iter().collect(),
    ))
}

fn hex(args: &[Value]) -> FnResult<Value> {
    Ok(Value::Text(match &args[0] {
        Value::Blob(b) => hex_upper(b),
        other => other.to_text().map(|s| hex_upper(s.as_bytes())).unwrap_or_default(),
    }))
}

fn quote(args: &[Value]) -> FnResult<Value> {
    Ok(Value::Text(args[0].to_sql_literal()))
}

fn scalar_min(args: &[Value]) -> FnResult<Value> {
    scalar_extreme(args, Ordering::Less)
}

fn scalar_max(args: &[Value]) -> FnResult<Value> {
    scalar_extreme(args, Ordering::Greater)
}

fn scalar_extreme(args: &[Value], keep: Ordering) -> FnResult<Value> {
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let mut best: Option<&Value> = None;
    for arg in args {
        best = match best {
            Some(current) if arg.compare(current) != keep => Some(current),
            _ => Some(arg),
        };
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

// ========== Aggregates ==========

/// count(*) and count(x)
struct Count {
    count: i64,
    skip_nulls: bool,
}

impl Count {
    fn rows() -> Self {
        Self {
            count: 0,
            skip_nulls: false,
        }
    }

    fn non_null() -> Self {
        Self {
            count: 0,
            skip_nulls: true,
        }
    }
}

impl Aggregate for Count {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        if !(self.skip_nulls && args.first().map_or(true, Value::is_null)) {
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        Ok(Value::Integer(self.count))
    }
}

/// sum(x): integer while every input is an integer, NULL over no input
#[derive(Default)]
struct Sum {
    int_sum: i64,
    real_sum: f64,
    is_real: bool,
    seen: bool,
}

impl Aggregate for Sum {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        match args[0].to_numeric() {
            Value::Null => return Ok(()),
            Value::Integer(i) if !self.is_real => {
                self.int_sum = self
                    .int_sum
                    .checked_add(i)
                    .ok_or("integer overflow")?;
            }
            other => {
                if !self.is_real {
                    self.is_real = true;
                    self.real_sum = self.int_sum as f64;
                }
                self.real_sum += other.as_f64().unwrap_or(0.0);
            }
        }
        self.seen = true;
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        Ok(match (self.seen, self.is_real) {
            (false, _) => Value::Null,
            (true, false) => Value::Integer(self.int_sum),
            (true, true) => Value::Real(self.real_sum),
        })
    }
}

/// total(x): always real, 0.0 over no input
#[derive(Default)]
struct Total {
    sum: f64,
}

impl Aggregate for Total {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        self.sum += args[0].as_f64().unwrap_or(0.0);
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        Ok(Value::Real(self.sum))
    }
}

#[derive(Default)]
struct Avg {
    sum: f64,
    count: i64,
}

impl Aggregate for Avg {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        if let Some(x) = args[0].as_f64() {
            self.sum += x;
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        if self.count == 0 {
            Ok(Value::Null)
        } else {
            Ok(Value::Real(self.sum / self.count as f64))
        }
    }
}

/// min(x) / max(x) over non-NULL inputs
struct Extreme {
    best: Option<Value>,
    keep: Ordering,
}

impl Extreme {
    fn min() -> Self {
        Self {
            best: None,
            keep: Ordering::Less,
        }
    }

    fn max() -> Self {
        Self {
            best: None,
            keep: Ordering::Greater,
        }
    }
}

impl Aggregate for Extreme {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        let value = &args[0];
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.best {
            Some(best) => value.compare(best) == self.keep,
            None => true,
        };
        if replace {
            self.best = Some(value.clone());
        }
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        Ok(self.best.take().unwrap_or(Value::Null))
    }
}

#[derive(Default)]
struct GroupConcat {
    buffer: Option<String>,
}

impl Aggregate for GroupConcat {
    fn step(&mut self, args: &[Value]) -> FnResult<()> {
        let Some(text) = args[0].to_text() else {
            return Ok(());
        };
        let separator = match args.get(1) {
            Some(sep) => sep.to_text().unwrap_or_default(),
            None => ",".to_string(),
        };
        match &mut self.buffer {
            Some(buffer) => {
                buffer.push_str(&separator);
                buffer.push_str(&text);
            }
            None => self.buffer = Some(text),
        }
        Ok(())
    }

    fn finalize(&mut self) -> FnResult<Value> {
        Ok(self.buffer.take().map(Value::Text).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn call(registry: &FunctionRegistry, name: &str, args: &[Value]) -> Value {
        let func = registry.scalar(name, args.len()).unwrap();
        func(args).unwrap()
    }

    fn aggregate(registry: &FunctionRegistry, name: &str, rows: &[Value]) -> Value {
        let factory = registry.aggregate(name, 1).unwrap();
        let mut state = factory();
        for row in rows {
            state.step(std::slice::from_ref(row)).unwrap();
        }
        state.finalize().unwrap()
    }

    #[test]
    fn test_text_functions() {
        let registry = FunctionRegistry::with_builtins().unwrap();
        assert_eq!(call(&registry, "upper", &["abc".into()]), Value::from("ABC"));
        assert_eq!(call(&registry, "length", &["Österreich".into()]), Value::Integer(10));
        assert_eq!(
            call(&registry, "substr", &["hello".into(), 2.into(), 3.into()]),
            Value::from("ell")
        );
        assert_eq!(
            call(&registry, "substr", &["hello".into(), (-3).into()]),
            Value::from("llo")
        );
        assert_eq!(call(&registry, "hex", &[Value::Blob(vec![1, 255])]), Value::from("01FF"));
        assert_eq!(call(&registry, "typeof", &[Value::Real(1.0)]), Value::from("real"));
    }

    #[test]
    fn test_scalar_min_max() {
        let registry = FunctionRegistry::with_builtins().unwrap();
        assert_eq!(
            call(&registry, "max", &[1.into(), 7.into(), 3.into()]),
            Value::Integer(7)
        );
        assert!(call(&registry, "min", &[1.into(), Value::Null]).is_null());
    }

    #[test]
    fn test_sum_and_empty_input() {
        let registry = FunctionRegistry::with_builtins().unwrap();
        assert_eq!(
            aggregate(&registry, "sum", &[1.into(), 2.into()]),
            Value::Integer(3)
        );
        assert!(aggregate(&registry, "sum", &[]).is_null());
        assert_eq!(aggregate(&registry, "total", &[]), Value::Real(0.0));
        assert_eq!(
            aggregate(&registry, "avg", &[1.into(), 2.into()]),
            Value::Real(1.5)
        );
        assert_eq!(
            aggregate(&registry, "count", &[1.into(), Value::Null]),
            Value::Integer(1)
        );
        assert_eq!(
            aggregate(&registry, "group_concat", &["a".into(), "b".into()]),
            Value::from("a,b")
        );
    }

    #[test]
    fn test_registration_errors_propagate() {
        let mut registry = FunctionRegistry::new();
        register_builtins(&mut registry).unwrap();
        assert!(registry.scalar("coalesce", 5).is_some());
        assert!(registry.aggregate("group_concat", 2).is_some());

        let err = registry.register_scalar("upper", -2, upper).unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
        let err = registry
            .register_aggregate("count", 200, || Box::new(Count::rows()))
            .unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
    }

    #[test]
    fn test_builtin_collations() {
        let registry = FunctionRegistry::with_builtins().unwrap();
        let nocase = registry.collation("NOCASE").unwrap();
        assert_eq!(nocase("ABC", "abc"), Ordering::Equal);
        let rtrim = registry.collation("rtrim").unwrap();
        assert_eq!(rtrim("a  ", "a"), Ordering::Equal);
    }
}
