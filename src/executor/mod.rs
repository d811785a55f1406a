//! Query execution module
//!
//! This module contains parameter binding, the query planner, expression
//! evaluation and the executor, along with the result sets they produce.

pub mod bind;
pub mod eval;
pub mod executor;
pub mod planner;
pub mod result;

pub use bind::bind_parameters;
pub use executor::{ExecutionEngine, QueryResult, QueryRows};
pub use planner::{LogicalPlan, OutputColumn, Planner};
pub use result::{ResultSet, Row, RowHeader, RowIndex, TextFactory};
