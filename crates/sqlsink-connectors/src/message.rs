//! Input message model.
//!
//! Each input line is one JSON object with a `type` field:
//!
//! | `type`             | Fields                                     |
//! |--------------------|--------------------------------------------|
//! | `SCHEMA`           | `stream`, `schema`, `key_properties`       |
//! | `RECORD`           | `stream`, `record`                         |
//! | `STATE`            | `value`                                    |
//! | `ACTIVATE_VERSION` | `stream`, `version` (ignored)              |
//!
//! Any other `type` parses to [`Message::Unknown`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::SinkError;

/// A parsed input message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Declares (or redeclares) a stream's schema and primary key.
    Schema {
        /// Stream name.
        stream: String,
        /// The stream's JSON Schema.
        schema: Value,
        /// Primary-key property names. `None` when the field is absent.
        key_properties: Option<Vec<String>>,
    },
    /// One record of a stream.
    Record {
        /// Stream name.
        stream: String,
        /// The raw, nested record.
        record: Value,
    },
    /// A checkpoint, echoed to the output once it is safe.
    State {
        /// Opaque checkpoint payload.
        value: Value,
    },
    /// Accepted and ignored.
    ActivateVersion {
        /// Stream name, if given.
        stream: Option<String>,
    },
    /// A message whose `type` is not recognized.
    Unknown {
        /// The `type` as found on the line.
        message_type: String,
    },
}

/// Wire layout shared by every message type.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default, deserialize_with = "present")]
    message_type: Option<Value>,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default, deserialize_with = "present")]
    record: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    schema: Option<Value>,
    #[serde(default)]
    key_properties: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    value: Option<Value>,
}

/// Distinguishes an explicit `null` (`Some(Value::Null)`) from an absent
/// field (`None`).
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Parses one input line.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Parse` if the line is not a JSON object and
    /// `SinkError::Protocol` if a required field is missing or malformed.
    pub fn parse(line: &str) -> Result<Self, SinkError> {
        let value: Value = serde_json::from_str(line).map_err(|e| SinkError::parse(&e, line))?;
        if !value.is_object() {
            return Err(SinkError::Parse {
                message: "message is not a JSON object".into(),
                line: line.trim_end().to_string(),
            });
        }

        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| SinkError::Protocol(format!("malformed message ({e}): {}", line.trim_end())))?;

        let missing = |key: &str| {
            SinkError::Protocol(format!(
                "line is missing required key '{key}': {}",
                line.trim_end()
            ))
        };

        let message_type = envelope.message_type.ok_or_else(|| missing("type"))?;
        let message = match message_type.as_str() {
            Some("SCHEMA") => Message::Schema {
                stream: envelope.stream.ok_or_else(|| missing("stream"))?,
                schema: envelope.schema.ok_or_else(|| missing("schema"))?,
                key_properties: envelope.key_properties,
            },
            Some("RECORD") => Message::Record {
                stream: envelope.stream.ok_or_else(|| missing("stream"))?,
                record: envelope.record.ok_or_else(|| missing("record"))?,
            },
            Some("STATE") => Message::State {
                value: envelope.value.ok_or_else(|| missing("value"))?,
            },
            Some("ACTIVATE_VERSION") => Message::ActivateVersion {
                stream: envelope.stream,
            },
            Some(other) => Message::Unknown {
                message_type: other.to_string(),
            },
            None => Message::Unknown {
                message_type: message_type.to_string(),
            },
        };
        Ok(message)
    }

    /// Returns the wire `type` of this message.
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Message::Schema { .. } => "SCHEMA",
            Message::Record { .. } => "RECORD",
            Message::State { .. } => "STATE",
            Message::ActivateVersion { .. } => "ACTIVATE_VERSION",
            Message::Unknown { message_type } => message_type,
        }
    }

    /// Returns the stream this message belongs to, if any.
    #[must_use]
    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema { stream, .. } | Message::Record { stream, .. } => Some(stream),
            Message::ActivateVersion { stream } => stream.as_deref(),
            Message::State { .. } | Message::Unknown { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_schema() {
        let line = r#"{"type": "SCHEMA", "stream": "users", "schema": {"properties": {"id": {"type": "integer"}}}, "key_properties": ["id"]}"#;
        match Message::parse(line).unwrap() {
            Message::Schema {
                stream,
                schema,
                key_properties,
            } => {
                assert_eq!(stream, "users");
                assert_eq!(schema["properties"]["id"]["type"], json!("integer"));
                assert_eq!(key_properties, Some(vec!["id".to_string()]));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_schema_without_key_properties() {
        let line = r#"{"type": "SCHEMA", "stream": "users", "schema": {"properties": {}}}"#;
        let msg = Message::parse(line).unwrap();
        assert!(matches!(msg, Message::Schema { key_properties: None, .. }));
    }

    #[test]
    fn test_parse_record() {
        let line = r#"{"type": "RECORD", "stream": "users", "record": {"id": 1}}"#;
        let msg = Message::parse(line).unwrap();
        assert_eq!(
            msg,
            Message::Record {
                stream: "users".into(),
                record: json!({"id": 1}),
            }
        );
        assert_eq!(msg.stream(), Some("users"));
        assert_eq!(msg.message_type(), "RECORD");
    }

    #[test]
    fn test_parse_state_preserves_payload() {
        let line = r#"{"type": "STATE", "value": {"bookmarks": {"users": 10}}}"#;
        let msg = Message::parse(line).unwrap();
        assert_eq!(
            msg,
            Message::State {
                value: json!({"bookmarks": {"users": 10}})
            }
        );
    }

    #[test]
    fn test_parse_state_null_value() {
        let msg = Message::parse(r#"{"type": "STATE", "value": null}"#).unwrap();
        assert_eq!(msg, Message::State { value: Value::Null });
    }

    #[test]
    fn test_parse_state_missing_value() {
        let err = Message::parse(r#"{"type": "STATE"}"#).unwrap_err();
        assert!(matches!(err, SinkError::Protocol(_)));
    }

    #[test]
    fn test_parse_activate_version() {
        let line = r#"{"type": "ACTIVATE_VERSION", "stream": "users", "version": 3}"#;
        assert_eq!(
            Message::parse(line).unwrap(),
            Message::ActivateVersion {
                stream: Some("users".into())
            }
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        let msg = Message::parse(r#"{"type": "BATCH", "stream": "users"}"#).unwrap();
        assert_eq!(msg.message_type(), "BATCH");
        assert_eq!(msg.stream(), None);
    }

    #[test]
    fn test_missing_type_is_protocol_error() {
        let err = Message::parse(r#"{"stream": "users"}"#).unwrap_err();
        assert!(matches!(err, SinkError::Protocol(_)));
        assert!(err.to_string().contains("'type'"));
    }

    #[test]
    fn test_missing_stream_is_protocol_error() {
        for line in [
            r#"{"type": "RECORD", "record": {}}"#,
            r#"{"type": "SCHEMA", "schema": {}, "key_properties": []}"#,
        ] {
            let err = Message::parse(line).unwrap_err();
            assert!(err.to_string().contains("'stream'"), "{err}");
        }
    }

    #[test]
    fn test_missing_record_is_protocol_error() {
        let err = Message::parse(r#"{"type": "RECORD", "stream": "users"}"#).unwrap_err();
        assert!(err.to_string().contains("'record'"));
    }

    #[test]
    fn test_unparseable_line() {
        let err = Message::parse("{not json").unwrap_err();
        assert!(matches!(err, SinkError::Parse { .. }));

        let err = Message::parse("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, SinkError::Parse { .. }));

        assert!(Message::parse("").is_err());
    }

    #[test]
    fn test_malformed_key_properties() {
        let line = r#"{"type": "SCHEMA", "stream": "s", "schema": {}, "key_properties": "id"}"#;
        assert!(matches!(
            Message::parse(line).unwrap_err(),
            SinkError::Protocol(_)
        ));
    }
}
