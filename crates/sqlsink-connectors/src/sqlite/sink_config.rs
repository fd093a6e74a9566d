//! `SQLite` sink configuration.
//!
//! [`SqliteSinkConfig`] holds every setting the loader needs, parsed from
//! a [`ConnectorConfig`] (usually the JSON config file given on the
//! command line).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ConnectorConfig;
use crate::error::SinkError;

/// Default number of buffered rows that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default name of the audit timestamp column.
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "__loaded_at";

/// Configuration for the `SQLite` sink.
#[derive(Debug, Clone)]
pub struct SqliteSinkConfig {
    /// Database location as configured. The file actually opened is
    /// [`database_path`](Self::database_path).
    pub database: PathBuf,

    /// Buffered rows per stream before a flush (default: 50).
    pub batch_size: usize,

    /// Audit timestamp column injected into every row (default: `__loaded_at`).
    pub timestamp_column: String,

    /// `SQLite` journal mode applied when the database is opened.
    pub journal_mode: JournalMode,
}

impl Default for SqliteSinkConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            journal_mode: JournalMode::Wal,
        }
    }
}

impl SqliteSinkConfig {
    /// Creates a config for the given database with default settings.
    #[must_use]
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Parses a sink config from a [`ConnectorConfig`].
    ///
    /// # Required keys
    ///
    /// - `database` - Database location
    ///
    /// # Errors
    ///
    /// Returns `SinkError::MissingConfig` if required keys are absent,
    /// or `SinkError::ConfigurationError` on invalid values.
    #[allow(clippy::field_reassign_with_default)]
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, SinkError> {
        let mut cfg = Self::default();

        cfg.database = PathBuf::from(config.require("database")?);

        if let Some(n) = config.get_parsed("batch_size")? {
            cfg.batch_size = n;
        }
        if let Some(v) = config.get("timestamp_column") {
            cfg.timestamp_column = v.to_string();
        }
        if let Some(v) = config.get("journal_mode") {
            cfg.journal_mode = v.parse().map_err(|_| {
                SinkError::ConfigurationError(format!(
                    "invalid journal_mode: '{v}' (expected wal/delete/truncate/memory)"
                ))
            })?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::ConfigurationError` on invalid values.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.database.as_os_str().is_empty() {
            return Err(SinkError::MissingConfig("database".into()));
        }
        if self.batch_size == 0 {
            return Err(SinkError::ConfigurationError(
                "batch_size must be > 0".into(),
            ));
        }
        if self.timestamp_column.trim().is_empty() {
            return Err(SinkError::ConfigurationError(
                "timestamp_column must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Returns the database file path: the configured location with its
    /// extension replaced by `.db`.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        database_file(&self.database)
    }
}

fn database_file(database: &Path) -> PathBuf {
    database.with_extension("db")
}

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-ahead log.
    Wal,
    /// Rollback journal deleted at commit.
    Delete,
    /// Rollback journal truncated at commit.
    Truncate,
    /// Rollback journal kept in memory.
    Memory,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
        }
    }
}

impl FromStr for JournalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wal" => Ok(Self::Wal),
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown journal mode: '{other}'")),
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wal => write!(f, "wal"),
            Self::Delete => write!(f, "delete"),
            Self::Truncate => write!(f, "truncate"),
            Self::Memory => write!(f, "memory"),
        }
    }
}
