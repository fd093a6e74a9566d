//! Loader configuration types.
//!
//! Provides a generic key-value configuration model:
//! - [`ConnectorConfig`]: Key-value configuration
//! - [`ConfigKeySpec`]: Specification for a configuration key
//!
//! Typed settings for the `SQLite` sink are parsed from a
//! [`ConnectorConfig`] by [`SqliteSinkConfig::from_config`](crate::sqlite::SqliteSinkConfig::from_config).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::SinkError;

/// Configuration for a loader instance.
///
/// Properties are kept as strings, whatever their origin (a JSON config
/// file, command-line overrides or programmatic setup).
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    /// The connector type identifier (e.g., "sqlite").
    connector_type: String,

    /// Configuration properties.
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates a new config with the given type.
    #[must_use]
    pub fn new(connector_type: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties: HashMap::new(),
        }
    }

    /// Creates a config from a JSON object, as found in a config file.
    ///
    /// Strings are taken as-is, numbers and booleans are stringified and
    /// `null` entries are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::ConfigurationError` if `value` is not an object or
    /// holds a nested object/array.
    pub fn from_json(connector_type: impl Into<String>, value: &Value) -> Result<Self, SinkError> {
        let obj = value.as_object().ok_or_else(|| {
            SinkError::ConfigurationError("config must be a JSON object".into())
        })?;

        let mut config = Self::new(connector_type);
        for (key, v) in obj {
            match v {
                Value::Null => {}
                Value::String(s) => config.set(key, s.clone()),
                Value::Bool(b) => config.set(key, b.to_string()),
                Value::Number(n) => config.set(key, n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(SinkError::ConfigurationError(format!(
                        "config key '{key}' must be a scalar value"
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Returns the connector type identifier.
    #[must_use]
    pub fn connector_type(&self) -> &str {
        &self.connector_type
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a required configuration property, returning an error if missing.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::MissingConfig` if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, SinkError> {
        self.get(key)
            .ok_or_else(|| SinkError::MissingConfig(key.to_string()))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, SinkError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.parse::<T>().map(Some).map_err(|e| {
                SinkError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Returns the required keys from `specs` that are not set, sorted.
    #[must_use]
    pub fn missing_keys(&self, specs: &[ConfigKeySpec]) -> Vec<String> {
        let mut missing: Vec<String> = specs
            .iter()
            .filter(|s| s.required && self.get(&s.key).is_none())
            .map(|s| s.key.clone())
            .collect();
        missing.sort();
        missing
    }
}

/// Specification for a configuration key.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// The configuration key name.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Whether this key is required.
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,
}

impl ConfigKeySpec {
    /// Creates a required configuration key spec.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional configuration key spec with a default value.
    #[must_use]
    pub fn optional(
        key: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: Some(default.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_basic_operations() {
        let mut config = ConnectorConfig::new("sqlite");
        config.set("database", "warehouse");
        config.set("batch_size", "10");

        assert_eq!(config.connector_type(), "sqlite");
        assert_eq!(config.get("database"), Some("warehouse"));
        assert_eq!(config.get("batch_size"), Some("10"));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_config_require() {
        let mut config = ConnectorConfig::new("sqlite");
        config.set("database", "warehouse");

        assert!(config.require("database").is_ok());
        assert!(matches!(
            config.require("missing"),
            Err(SinkError::MissingConfig(k)) if k == "missing"
        ));
    }

    #[test]
    fn test_config_parsed() {
        let mut config = ConnectorConfig::new("sqlite");
        config.set("batch_size", "1000");
        config.set("bad_number", "not_a_number");

        let size: Option<usize> = config.get_parsed("batch_size").unwrap();
        assert_eq!(size, Some(1000));

        let missing: Option<usize> = config.get_parsed("missing").unwrap();
        assert_eq!(missing, None);

        let bad: Result<Option<usize>, _> = config.get_parsed("bad_number");
        assert!(bad.is_err());
    }

    #[test]
    fn test_config_from_json() {
        let value = json!({
            "database": "/tmp/warehouse",
            "batch_size": 25,
            "verbose": true,
            "ignored": null
        });
        let config = ConnectorConfig::from_json("sqlite", &value).unwrap();
        assert_eq!(config.get("database"), Some("/tmp/warehouse"));
        assert_eq!(config.get("batch_size"), Some("25"));
        assert_eq!(config.get("verbose"), Some("true"));
        assert_eq!(config.get("ignored"), None);
    }

    #[test]
    fn test_config_from_json_rejects_non_object() {
        assert!(ConnectorConfig::from_json("sqlite", &json!([1, 2])).is_err());
        assert!(ConnectorConfig::from_json("sqlite", &json!({"nested": {"a": 1}})).is_err());
    }

    #[test]
    fn test_config_missing_keys() {
        let specs = vec![
            ConfigKeySpec::required("database", "Database path"),
            ConfigKeySpec::required("account", "Account name"),
            ConfigKeySpec::optional("batch_size", "Batch size", "50"),
        ];

        let mut config = ConnectorConfig::new("sqlite");
        config.set("database", "warehouse");
        assert_eq!(config.missing_keys(&specs), vec!["account".to_string()]);

        let empty_config = ConnectorConfig::new("sqlite");
        assert_eq!(
            empty_config.missing_keys(&specs),
            vec!["account".to_string(), "database".to_string()]
        );
    }
}
