//! Tuple and Value types for PebbleSQL
//!
//! This module defines how data values are represented in memory.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::functions::Collation;

/// A storable scalar value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating point value (64-bit)
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage class rank used by the total order
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }

    /// Total order: NULL < numbers < text < blobs
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Real(b)) => compare_int_real(*a, *b),
            (Value::Real(a), Value::Integer(b)) => compare_int_real(*b, *a).reverse(),
            (Value::Real(a), Value::Real(b)) => compare_reals(*a, *b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Compare using a collation for text-vs-text pairs
    pub fn compare_with(&self, other: &Value, collation: Option<&Collation>) -> Ordering {
        match (self, other, collation) {
            (Value::Text(a), Value::Text(b), Some(collate)) => collate(a, b),
            _ => self.compare(other),
        }
    }

    /// Truthiness as used by WHERE and boolean operators. NULL has none.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(*i != 0),
            Value::Real(f) => Some(*f != 0.0),
            Value::Text(_) | Value::Blob(_) => match self.to_numeric() {
                Value::Integer(i) => Some(i != 0),
                Value::Real(f) => Some(f != 0.0),
                _ => Some(false),
            },
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Null => None,
            _ => self.to_numeric().as_i64(),
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            Value::Null => None,
            _ => self.to_numeric().as_f64(),
        }
    }

    /// Borrow the text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the bytes, if this is a blob value
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Name of the storage class, as reported by `typeof()`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Numeric view of a value. Text and blobs use their longest numeric prefix.
    pub fn to_numeric(&self) -> Value {
        match self {
            Value::Integer(_) | Value::Real(_) | Value::Null => self.clone(),
            Value::Text(s) => parse_numeric_prefix(s),
            Value::Blob(b) => parse_numeric_prefix(&String::from_utf8_lossy(b)),
        }
    }

    /// Render as text, used by `||` and text functions
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => Some(self.to_string()),
        }
    }

    /// Render as a SQL literal that parses back to an equal value
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            // -9223372036854775808 would lex as a real
            Value::Integer(i64::MIN) => format!("({} - 1)", i64::MIN + 1),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => format_real_literal(*f),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(b) => format!("X'{}'", hex_upper(b)),
        }
    }

    /// Add two values
    pub fn add(&self, other: &Value) -> Value {
        arithmetic(self, other, i64::checked_add, |a, b| a + b)
    }

    /// Subtract two values
    pub fn sub(&self, other: &Value) -> Value {
        arithmetic(self, other, i64::checked_sub, |a, b| a - b)
    }

    /// Multiply two values
    pub fn mul(&self, other: &Value) -> Value {
        arithmetic(self, other, i64::checked_mul, |a, b| a * b)
    }

    /// Divide two values. Division by zero yields NULL.
    pub fn div(&self, other: &Value) -> Value {
        if other.is_zero() {
            return Value::Null;
        }
        arithmetic(self, other, i64::checked_div, |a, b| a / b)
    }

    /// Remainder of two values. Modulo by zero yields NULL.
    pub fn rem(&self, other: &Value) -> Value {
        if other.is_zero() {
            return Value::Null;
        }
        arithmetic(self, other, i64::checked_rem, |a, b| a % b)
    }

    /// Arithmetic negation
    pub fn negate(&self) -> Value {
        match self.to_numeric() {
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Real(-(i as f64))),
            Value::Real(f) => Value::Real(-f),
            other => other,
        }
    }

    fn is_zero(&self) -> bool {
        match self.to_numeric() {
            Value::Integer(i) => i == 0,
            Value::Real(f) => f == 0.0,
            _ => false,
        }
    }
}

fn compare_int_real(a: i64, b: f64) -> Ordering {
    compare_reals(a as f64, b)
}

/// NaN sorts below every other number so the order stays total
fn compare_reals(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn real_or_null(f: f64) -> Value {
    if f.is_nan() {
        Value::Null
    } else {
        Value::Real(f)
    }
}

fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    match (left.to_numeric(), right.to_numeric()) {
        (Value::Integer(a), Value::Integer(b)) => match int_op(a, b) {
            Some(v) => Value::Integer(v),
            // Overflow promotes to real
            None => real_or_null(real_op(a as f64, b as f64)),
        },
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => real_or_null(real_op(x, y)),
            _ => Value::Null,
        },
    }
}

/// Parse the longest numeric prefix of a string, 0 when there is none
fn parse_numeric_prefix(s: &str) -> Value {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut is_real = false;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 || end > digits_start {
            is_real = true;
            end = frac;
        }
    }
    if end == digits_start {
        return Value::Integer(0);
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        let exp_digits = exp;
        while exp < bytes.len() && bytes[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > exp_digits {
            is_real = true;
            end = exp;
        }
    }

    let text = &trimmed[..end];
    if !is_real {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Integer(i);
        }
    }
    text.parse::<f64>()
        .map(Value::Real)
        .unwrap_or(Value::Integer(0))
}

/// Format a real so that it always reads back as a real
pub(crate) fn format_real_literal(f: f64) -> String {
    if f.is_nan() {
        "NULL".to_string()
    } else if f.is_infinite() {
        let literal = if f > 0.0 { "1e999" } else { "-1e999" };
        literal.to_string()
    } else {
        format!("{:?}", f)
    }
}

pub(crate) fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{:.1}", n)
            }
            Value::Real(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "X'{}'", hex_upper(b)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// A stored row: values positionally aligned with the table's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Values in this tuple
    values: Vec<Value>,
}

impl Tuple {
    /// Create a new tuple from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Create an empty tuple
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    /// Get a value by index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Set a value by index
    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.values.len() {
            self.values[index] = value;
        }
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if tuple is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the tuple and return the values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Concatenate two tuples
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(other.values.iter().cloned());
        Tuple::new(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Tuple::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Tuple {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_value_total_order() {
        assert_eq!(Value::Null.compare(&Value::Integer(-5)), Ordering::Less);
        assert_eq!(
            Value::Integer(5).compare(&Value::Text("1".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("zzz".into()).compare(&Value::Blob(vec![0])),
            Ordering::Less
        );
        assert_eq!(Value::Integer(2).compare(&Value::Real(1.5)), Ordering::Greater);
        assert_eq!(Value::Integer(1), Value::Real(1.0));
        assert_eq!(
            Value::Text("abc".into()).compare(&Value::Text("abd".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_with_collation() {
        let reverse: Collation = Arc::new(|a: &str, b: &str| b.cmp(a));
        let a = Value::Text("a".into());
        let b = Value::Text("b".into());
        assert_eq!(a.compare_with(&b, Some(&reverse)), Ordering::Greater);
        // Collations only apply to text pairs
        assert_eq!(
            Value::Integer(1).compare_with(&Value::Integer(2), Some(&reverse)),
            Ordering::Less
        );
    }

    #[test]
    fn test_value_arithmetic() {
        assert_eq!(Value::Integer(5).add(&Value::Integer(3)), Value::Integer(8));
        assert_eq!(Value::Real(3.0).mul(&Value::Integer(2)), Value::Real(6.0));
        assert!(Value::Integer(1).div(&Value::Integer(0)).is_null());
        assert!(Value::Null.add(&Value::Integer(1)).is_null());
        assert!(matches!(
            Value::Integer(i64::MAX).add(&Value::Integer(1)),
            Value::Real(_)
        ));
        assert_eq!(Value::Text("12abc".into()).add(&Value::Integer(1)), Value::Integer(13));
    }

    #[test]
    fn test_nan_never_escapes_arithmetic() {
        let inf = Value::Real(f64::INFINITY);
        assert!(inf.sub(&inf).is_null());
        assert!(Value::Real(0.0).mul(&inf).is_null());
        assert_eq!(inf.add(&Value::Integer(1)), inf);

        // a stored NaN still has a place in the order
        let nan = Value::Real(f64::NAN);
        assert_eq!(nan.compare(&Value::Real(-1e300)), Ordering::Less);
        assert_eq!(Value::Integer(0).compare(&nan), Ordering::Greater);
        assert_eq!(nan.compare(&Value::Real(f64::NAN)), Ordering::Equal);
        assert_ne!(nan, Value::Integer(5));
    }

    #[test]
    fn test_sql_literal_rendering() {
        assert_eq!(Value::Text("it's".into()).to_sql_literal(), "'it''s'");
        assert_eq!(Value::Real(100.0).to_sql_literal(), "100.0");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_sql_literal(), "X'DEAD'");
        assert_eq!(
            Value::Integer(i64::MIN).to_sql_literal(),
            "(-9223372036854775807 - 1)"
        );
        assert_eq!(Value::Integer(i64::MAX).to_sql_literal(), "9223372036854775807");
        assert_eq!(Value::Real(35.15).to_string(), "35.15");
        assert_eq!(Value::Real(100.0).to_string(), "100.0");
    }

    #[test]
    fn test_tuple_operations() {
        let mut tuple = Tuple::new(vec![Value::Integer(1), Value::Text("hello".into())]);
        assert_eq!(tuple.len(), 2);
        tuple.set(1, Value::Null);
        assert!(tuple.get(1).unwrap().is_null());

        let joined = tuple.concat(&Tuple::new(vec![Value::Real(2.5)]));
        assert_eq!(joined.len(), 3);
    }
}
