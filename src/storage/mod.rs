//! Storage module
//!
//! This module contains the storage components:
//! - Values and tuples
//! - Copy-on-write tables
//! - The snapshot file format

pub mod file;
pub mod table;
pub mod tuple;

pub use table::Table;
pub use tuple::{Tuple, Value};
