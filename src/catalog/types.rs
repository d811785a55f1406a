//! Column affinities for PebbleSQL
//!
//! Declared column types are advisory: they are kept verbatim for dumps and
//! converter lookup, and reduced to an affinity used for display and for
//! deciding which primary keys are assigned automatically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type affinity derived from a column's declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

impl Affinity {
    /// Derive the affinity of a declared type name
    ///
    /// Rules are applied in order: `INT` → INTEGER; `CHAR`, `CLOB` or `TEXT` →
    /// TEXT; `BLOB` or no type → BLOB; `REAL`, `FLOA` or `DOUB` → REAL; anything
    /// else → NUMERIC.
    pub fn from_declared(declared: Option<&str>) -> Self {
        let Some(declared) = declared else {
            return Affinity::Blob;
        };
        let upper = declared.to_uppercase();

        if upper.contains("INT") {
            Affinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Affinity::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Affinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }

    /// Check if this affinity is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, Affinity::Integer | Affinity::Real | Affinity::Numeric)
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::Integer => write!(f, "INTEGER"),
            Affinity::Real => write!(f, "REAL"),
            Affinity::Text => write!(f, "TEXT"),
            Affinity::Blob => write!(f, "BLOB"),
            Affinity::Numeric => write!(f, "NUMERIC"),
        }
    }
}
