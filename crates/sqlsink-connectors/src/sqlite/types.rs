//! Arrow and JSON to `SQLite` type mapping.
//!
//! `SQLite` stores every value in one of a few storage classes and derives a
//! column's affinity from its declared type name. Columns are declared with
//! the storage class names directly:
//!
//! | Arrow                 | DDL       |
//! |-----------------------|-----------|
//! | `Int*`, `Boolean`     | `INTEGER` |
//! | `Float*`              | `REAL`    |
//! | `Utf8`, `Timestamp`   | `TEXT`    |

use std::fmt;

use arrow_schema::DataType;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Maps an Arrow `DataType` to a `SQLite` DDL type for CREATE/ALTER TABLE.
#[must_use]
#[allow(clippy::match_same_arms)]
pub fn arrow_to_sqlite_ddl_type(dt: &DataType) -> &'static str {
    match dt {
        DataType::Boolean => "INTEGER",
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => "INTEGER",
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => "INTEGER",
        DataType::Float16 | DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Binary | DataType::LargeBinary => "BLOB",
        _ => "TEXT",
    }
}

/// `SQLite` column affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// `INTEGER` affinity.
    Integer,
    /// `TEXT` affinity.
    Text,
    /// `BLOB` affinity (also used for columns without a declared type).
    Blob,
    /// `REAL` affinity.
    Real,
    /// `NUMERIC` affinity.
    Numeric,
}

impl Affinity {
    /// Derives the affinity of a declared column type using `SQLite`'s rules.
    ///
    /// `BIGINT` is `Integer`, `VARCHAR(20)` is `Text`, `DOUBLE` is `Real`
    /// and `BOOLEAN` is `Numeric`.
    #[must_use]
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    /// Affinity of a column declared for `dt`.
    #[must_use]
    pub fn of(dt: &DataType) -> Self {
        Self::from_declared_type(arrow_to_sqlite_ddl_type(dt))
    }

    /// Returns `true` if a column with this affinity can hold values
    /// declared with `other` without a type change.
    ///
    /// `NUMERIC` and `BLOB` columns accept every storage class.
    #[must_use]
    pub fn accepts(self, other: Self) -> bool {
        self == other || matches!(self, Self::Numeric | Self::Blob)
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Text => write!(f, "TEXT"),
            Self::Blob => write!(f, "BLOB"),
            Self::Real => write!(f, "REAL"),
            Self::Numeric => write!(f, "NUMERIC"),
        }
    }
}

/// Converts a JSON value into a `SQLite` value for binding.
///
/// Booleans are stored as `0`/`1`, nested values as JSON text.
#[must_use]
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
