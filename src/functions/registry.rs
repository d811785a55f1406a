//! Function Registry
//!
//! Maps names to scalar functions, aggregate factories and collations.
//! Scalar and aggregate entries are keyed by lowercase name plus arity,
//! where an arity of `-1` accepts any number of arguments.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, Error, Result};
use crate::storage::Value;

/// A scalar SQL function, invoked once per row
pub type ScalarFunction =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// A text comparator
pub type Collation = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Produces a fresh aggregate state for every group
pub type AggregateFactory = Arc<dyn Fn() -> Box<dyn Aggregate> + Send + Sync>;

/// Arity accepting any number of arguments
pub const VARIADIC: i32 = -1;

/// Largest arity a function may declare
const MAX_ARITY: i32 = 127;

/// State of one aggregate computation over one group
pub trait Aggregate {
    /// Feed the arguments of one contributing row
    fn step(&mut self, args: &[Value]) -> std::result::Result<(), BoxError>;

    /// Produce the group's result after all rows were stepped
    fn finalize(&mut self) -> std::result::Result<Value, BoxError>;
}

/// Registry of user-visible SQL extensions for one connection
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    scalars: HashMap<(String, i32), ScalarFunction>,
    aggregates: HashMap<(String, i32), AggregateFactory>,
    collations: HashMap<String, Collation>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in functions and collations
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        super::builtins::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Register (or replace) a scalar function
    pub fn register_scalar<F>(&mut self, name: &str, arity: i32, func: F) -> Result<()>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        check_arity(name, arity)?;
        self.scalars.insert(key(name, arity), Arc::new(func));
        Ok(())
    }

    /// Remove a scalar function; returns whether it existed
    pub fn remove_scalar(&mut self, name: &str, arity: i32) -> bool {
        self.scalars.remove(&key(name, arity)).is_some()
    }

    /// Register (or replace) an aggregate factory
    pub fn register_aggregate<F>(&mut self, name: &str, arity: i32, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Aggregate> + Send + Sync + 'static,
    {
        check_arity(name, arity)?;
        self.aggregates.insert(key(name, arity), Arc::new(factory));
        Ok(())
    }

    /// Remove an aggregate; returns whether it existed
    pub fn remove_aggregate(&mut self, name: &str, arity: i32) -> bool {
        self.aggregates.remove(&key(name, arity)).is_some()
    }

    /// Register (or replace) a collation
    pub fn register_collation<F>(&mut self, name: &str, compare: F)
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.collations
            .insert(name.to_lowercase(), Arc::new(compare));
    }

    /// Remove a collation; returns whether it existed
    pub fn remove_collation(&mut self, name: &str) -> bool {
        self.collations.remove(&name.to_lowercase()).is_some()
    }

    /// Look up a scalar function for a call with `argc` arguments
    pub fn scalar(&self, name: &str, argc: usize) -> Option<&ScalarFunction> {
        lookup(&self.scalars, name, argc)
    }

    /// Look up an aggregate for a call with `argc` arguments
    pub fn aggregate(&self, name: &str, argc: usize) -> Option<&AggregateFactory> {
        lookup(&self.aggregates, name, argc)
    }

    /// Whether a call with `argc` arguments resolves to an aggregate
    pub fn is_aggregate(&self, name: &str, argc: usize) -> bool {
        self.aggregate(name, argc).is_some()
    }

    /// Resolve a collation by name
    pub fn collation(&self, name: &str) -> Result<Collation> {
        self.collations
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownCollation(name.to_string()))
    }

    /// Whether a collation is registered
    pub fn has_collation(&self, name: &str) -> bool {
        self.collations.contains_key(&name.to_lowercase())
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("scalars", &self.scalars.len())
            .field("aggregates", &self.aggregates.len())
            .field("collations", &self.collations.len())
            .finish()
    }
}

fn key(name: &str, arity: i32) -> (String, i32) {
    (name.to_lowercase(), arity)
}

fn check_arity(name: &str, arity: i32) -> Result<()> {
    if arity < VARIADIC || arity > MAX_ARITY {
        return Err(Error::Misuse(format!(
            "invalid arity {} for function '{}'",
            arity, name
        )));
    }
    Ok(())
}

fn lookup<'a, T>(map: &'a HashMap<(String, i32), T>, name: &str, argc: usize) -> Option<&'a T> {
    let name = name.to_lowercase();
    let exact = i32::try_from(argc).ok().and_then(|n| map.get(&(name.clone(), n)));
    exact.or_else(|| map.get(&(name, VARIADIC)))
}
