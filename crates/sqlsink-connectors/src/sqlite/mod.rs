//! `SQLite` storage for the loader.
//!
//! Materializes streams into tables of a single local `SQLite` file:
//! - Tables are created from the flattened stream schema and only ever
//!   gain columns afterwards
//! - Keyed streams are upserted row by row (insert, update on conflict)
//! - Each flush is one `SQLite` transaction
//!
//! # Module Structure
//!
//! - [`sink_config`] - Configuration and journal modes
//! - [`store`] - `SqliteStore` implementing `StorageDriver`
//! - [`types`] - Arrow/JSON to `SQLite` type mapping
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlsink_connectors::sqlite::{SqliteSinkConfig, SqliteStore};
//!
//! let config = SqliteSinkConfig::new("/var/lib/warehouse");
//! let store = SqliteStore::open(&config)?; // opens /var/lib/warehouse.db
//! ```

pub mod sink_config;
pub mod store;
pub mod types;

pub use sink_config::{JournalMode, SqliteSinkConfig, DEFAULT_BATCH_SIZE, DEFAULT_TIMESTAMP_COLUMN};
pub use store::SqliteStore;

use crate::config::ConfigKeySpec;

/// Configuration keys understood by the `SQLite` loader.
#[must_use]
pub fn sqlite_sink_config_keys() -> Vec<ConfigKeySpec> {
    vec![
        ConfigKeySpec::required(
            "database",
            "Database location; the file opened is this path with a .db extension",
        ),
        ConfigKeySpec::optional("batch_size", "Buffered rows per stream before a flush", "50"),
        ConfigKeySpec::optional(
            "timestamp_column",
            "Audit column holding the load time of each row",
            DEFAULT_TIMESTAMP_COLUMN,
        ),
        ConfigKeySpec::optional(
            "journal_mode",
            "SQLite journal mode: wal/delete/truncate/memory",
            "wal",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;

    #[test]
    fn test_config_keys_required() {
        let keys = sqlite_sink_config_keys();
        let required: Vec<&str> = keys
            .iter()
            .filter(|k| k.required)
            .map(|k| k.key.as_str())
            .collect();
        assert_eq!(required, vec!["database"]);
    }

    #[test]
    fn test_config_keys_defaults_parse() {
        let mut config = ConnectorConfig::new("sqlite");
        config.set("database", "db");
        for key in sqlite_sink_config_keys() {
            if let Some(default) = key.default {
                config.set(key.key, default);
            }
        }
        let parsed = SqliteSinkConfig::from_config(&config).unwrap();
        assert_eq!(parsed.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(parsed.journal_mode, JournalMode::Wal);
    }

    #[test]
    fn test_missing_keys_reported() {
        let config = ConnectorConfig::new("sqlite");
        assert_eq!(
            config.missing_keys(&sqlite_sink_config_keys()),
            vec!["database".to_string()]
        );
    }
}
