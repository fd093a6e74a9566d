//! Loader error types.
//!
//! Provides a unified error hierarchy for the message pipeline:
//! - `SinkError`: Top-level error for everything that can abort a run
//! - `StorageError`: Errors raised by a [`StorageDriver`](crate::storage::StorageDriver)

use thiserror::Error;

/// Errors that can occur while processing the message stream.
///
/// Every variant is fatal for the run. The upstream extractor is expected
/// to resume from the last acknowledged checkpoint.
#[derive(Debug, Error)]
pub enum SinkError {
    /// An input line is not a valid JSON message.
    #[error("unable to parse message: {message}\n{line}")]
    Parse {
        /// The parser's description of the failure.
        message: String,
        /// The offending input line.
        line: String,
    },

    /// A message violates the stream protocol (missing field, record
    /// before schema, missing `key_properties`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A record or schema failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A schema change cannot be applied additively to an existing table.
    #[error("schema evolution error: table '{table}': {message}")]
    SchemaEvolution {
        /// The affected table.
        table: String,
        /// Why the change was rejected.
        message: String,
    },

    /// Storage failure (connectivity, DDL, DML, transaction).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid loader configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// An I/O error while reading input or writing checkpoints.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Builds a [`SinkError::Parse`] from a JSON error and the raw line.
    #[must_use]
    pub fn parse(err: &serde_json::Error, line: &str) -> Self {
        SinkError::Parse {
            message: err.to_string(),
            line: line.trim_end().to_string(),
        }
    }

    /// Short category name used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::Parse { .. } => "parse",
            SinkError::Protocol(_) => "protocol",
            SinkError::Validation(_) => "validation",
            SinkError::SchemaEvolution { .. } => "schema_evolution",
            SinkError::Storage(_) => "storage",
            SinkError::ConfigurationError(_) | SinkError::MissingConfig(_) => "configuration",
            SinkError::Io(_) => "io",
        }
    }
}

/// Errors returned by storage drivers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An insert collided with an existing primary key.
    ///
    /// Recovered by the batch loader, never surfaced to callers.
    #[error("unique constraint violated on table '{0}'")]
    UniqueViolation(String),

    /// A statement failed.
    #[error("database error: {0}")]
    Database(String),

    /// Begin/commit/rollback failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The database file could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl StorageError {
    /// Returns `true` for primary-key or unique conflicts.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad json").unwrap_err();
        let err = SinkError::parse(&json_err, "{bad json\n");
        let msg = err.to_string();
        assert!(msg.starts_with("unable to parse message"));
        assert!(msg.ends_with("{bad json"));
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_storage_error_into_sink_error() {
        let storage = StorageError::Database("disk I/O error".into());
        let err: SinkError = storage.into();
        assert!(matches!(err, SinkError::Storage(_)));
        assert!(err.to_string().contains("disk I/O error"));
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn test_schema_evolution_error() {
        let err = SinkError::SchemaEvolution {
            table: "users".into(),
            message: "column 'age' is INTEGER, schema declares TEXT".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("age"));
        assert_eq!(err.kind(), "schema_evolution");
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(StorageError::UniqueViolation("t".into()).is_unique_violation());
        assert!(!StorageError::Database("x".into()).is_unique_violation());
    }
}
