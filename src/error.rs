//! Error types for PebbleSQL
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Boxed error returned by user-supplied callbacks (functions, converters)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for PebbleSQL
#[derive(Error, Debug)]
pub enum Error {
    // ========== Parser Errors ==========
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    // ========== Binding Errors ==========
    #[error("Binding error: {0}")]
    ParameterCount(String),

    #[error("Adaptation error: {0}")]
    Adaptation(String),

    // ========== Extension Errors ==========
    #[error("Extension error: no such collation sequence: {0}")]
    UnknownCollation(String),

    #[error("Extension error: no such function: {name} with {arity} argument(s)")]
    UnknownFunction { name: String, arity: usize },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: column '{0}' not found in {1}")]
    ColumnNotFound(String, String),

    #[error("Catalog error: duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Catalog error: ambiguous column name '{0}'")]
    AmbiguousColumn(String),

    // ========== Execution Errors ==========
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Busy: {0}")]
    ResultSetBusy(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Misuse: {0}")]
    Misuse(String),

    // ========== Storage Errors ==========
    #[error("Storage error: corrupt database file: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a syntax error at the given character offset
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Build an evaluation error
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation(message.into())
    }
}

/// Result type alias for PebbleSQL operations
pub type Result<T> = std::result::Result<T, Error>;
