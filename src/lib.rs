//! PebbleSQL - a small embedded SQL engine written in Rust
//!
//! This library provides the pieces of an in-process SQL database:
//! - SQL parsing (lexer, parser, AST) with `?` and `:name` parameters
//! - Tables, the catalog and snapshot files
//! - Query planning and execution
//! - Extension registries: scalar functions, aggregates, collations,
//!   type adapters and converters
//! - Connections with a transaction scope, dump/load and backup

pub mod adapter;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod dump;
pub mod error;
pub mod executor;
pub mod functions;
pub mod sql;
pub mod storage;

pub use adapter::{AdapterRegistry, FromValue, Param, Params};
pub use backup::{Backup, BackupProgress};
pub use config::Config;
pub use connection::{Connection, Transaction};
pub use error::{BoxError, Error, Result};
pub use executor::{ResultSet, Row};
pub use functions::{Aggregate, FunctionRegistry, VARIADIC};
pub use storage::Value;

#[doc(hidden)]
pub use indexmap;
