//! Extension functions
//!
//! This module contains the function registry (scalar functions, aggregates,
//! collations) and the built-ins every connection starts with.

pub mod builtins;
pub mod registry;

pub use registry::{
    Aggregate, AggregateFactory, Collation, FunctionRegistry, ScalarFunction, VARIADIC,
};
