//! Catalog module
//!
//! This module contains the system catalog, schema definitions, and column affinities.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::Catalog;
pub use schema::{Column, Schema};
pub use types::Affinity;
