//! Schema and record flattening.
//!
//! [`flatten_schema`] walks the `properties` of a JSON Schema and produces
//! one leaf definition per flat column. [`flatten_record`] walks a record
//! the same way, stopping at any path the stream declares as a column.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::warn;

use super::naming::{flatten_key, MAX_IDENTIFIER_LEN};
use super::types::json_type_includes;
use crate::error::SinkError;
use crate::storage::Row;

/// Flat column name to leaf JSON-Schema definition, ordered by name.
pub type FlatSchema = BTreeMap<String, Value>;

/// Flattens the `properties` of a JSON Schema into leaf column definitions.
///
/// Objects with nested `properties` are descended into; objects without
/// them are kept as opaque (semistructured) leaves. A property without a
/// `type` takes the first entry of its first alternative list (`anyOf`,
/// `oneOf`, ...) and is kept only for string or array alternatives.
///
/// # Errors
///
/// Returns `SinkError::Validation` if two property paths normalize to the
/// same column name, or a path is still too long after abbreviation.
pub fn flatten_schema(schema: &Value) -> Result<FlatSchema, SinkError> {
    let mut leaves = Vec::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        collect_leaves(properties, &[], &mut leaves);
    }

    let mut flat = FlatSchema::new();
    for (name, definition) in leaves {
        if name.chars().count() >= MAX_IDENTIFIER_LEN {
            return Err(SinkError::Validation(format!(
                "column name '{name}' exceeds {MAX_IDENTIFIER_LEN} characters after abbreviation"
            )));
        }
        if flat.insert(name.clone(), definition).is_some() {
            return Err(SinkError::Validation(format!(
                "duplicate column name produced in schema: {name}"
            )));
        }
    }
    Ok(flat)
}

fn collect_leaves(
    properties: &Map<String, Value>,
    parent: &[String],
    out: &mut Vec<(String, Value)>,
) {
    for (key, definition) in properties {
        let column = flatten_key(key, parent);

        if is_empty_definition(definition) {
            warn!(column = %column, "empty property definition, skipping");
            continue;
        }

        match definition.get("type") {
            Some(ty) if json_type_includes(ty, "object") => {
                match definition.get("properties").and_then(Value::as_object) {
                    Some(nested) => {
                        let mut path = parent.to_vec();
                        path.push(key.clone());
                        collect_leaves(nested, &path, out);
                    }
                    None => out.push((column, definition.clone())),
                }
            }
            Some(_) => out.push((column, definition.clone())),
            None => match first_alternative(definition) {
                Some(leaf) => out.push((column, leaf)),
                None => warn!(
                    column = %column,
                    "untyped property without a string or array alternative, skipping"
                ),
            },
        }
    }
}

fn is_empty_definition(definition: &Value) -> bool {
    match definition {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Resolves an untyped property (`{"anyOf": [...]}`) to a nullable leaf.
fn first_alternative(definition: &Value) -> Option<Value> {
    let first = definition
        .as_object()?
        .values()
        .next()?
        .as_array()?
        .first()?
        .as_object()?;

    let nullable = match first.get("type").and_then(Value::as_str) {
        Some("string") => "string",
        Some("array") => "array",
        _ => return None,
    };

    let mut leaf = first.clone();
    leaf.insert("type".into(), Value::from(vec!["null", nullable]));
    Some(Value::Object(leaf))
}

/// Flattens a record into a row keyed by flat column names.
///
/// Descends into nested objects unless the path is itself a declared
/// column. Objects and arrays stored at a leaf are serialized to JSON text.
#[must_use]
pub fn flatten_record(record: &Map<String, Value>, attributes: &HashSet<String>) -> Row {
    let mut row = Row::new();
    flatten_into(record, &[], attributes, &mut row);
    row
}

fn flatten_into(
    record: &Map<String, Value>,
    parent: &[String],
    attributes: &HashSet<String>,
    row: &mut Row,
) {
    for (key, value) in record {
        let column = flatten_key(key, parent);

        if attributes.contains(&column) {
            row.insert(column, to_leaf_value(value));
            continue;
        }

        match value {
            Value::Object(nested) => {
                let mut path = parent.to_vec();
                path.push(key.clone());
                flatten_into(nested, &path, attributes, row);
            }
            other => {
                row.insert(column, to_leaf_value(other));
            }
        }
    }
}

fn to_leaf_value(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_flatten_schema_nested_objects() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "info": {
                    "type": ["null", "object"],
                    "properties": {
                        "weather": {"type": "string"},
                        "mood": {"type": "string"}
                    }
                }
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        let names: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "info__mood", "info__weather"]);
        assert_eq!(flat["id"], json!({"type": "integer"}));
    }

    #[test]
    fn test_flatten_schema_object_without_properties_is_leaf() {
        let schema = json!({
            "properties": {
                "payload": {"type": "object"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["payload"], json!({"type": "object"}));
        assert!(flat.contains_key("tags"));
    }

    #[test]
    fn test_flatten_schema_camel_case_names() {
        let schema = json!({
            "properties": {
                "clientName": {"type": "string"},
                "agentOSVersion": {"type": "string"}
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert!(flat.contains_key("client_name"));
        assert!(flat.contains_key("agent_os_version"));
    }

    #[test]
    fn test_flatten_schema_rejects_duplicate_columns() {
        let schema = json!({
            "properties": {
                "clientName": {"type": "string"},
                "client_name": {"type": "string"}
            }
        });
        let err = flatten_schema(&schema).unwrap_err();
        assert!(matches!(err, SinkError::Validation(_)));
        assert!(err.to_string().contains("client_name"));
    }

    #[test]
    fn test_flatten_schema_nested_duplicate() {
        let schema = json!({
            "properties": {
                "info__weather": {"type": "string"},
                "info": {"type": "object", "properties": {"weather": {"type": "string"}}}
            }
        });
        assert!(flatten_schema(&schema).is_err());
    }

    #[test]
    fn test_flatten_schema_skips_empty_definition() {
        let schema = json!({
            "properties": {
                "id": {"type": "integer"},
                "unknown": {}
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert_eq!(flat.len(), 1);
        assert!(!flat.contains_key("unknown"));
    }

    #[test]
    fn test_flatten_schema_any_of() {
        let schema = json!({
            "properties": {
                "created": {"anyOf": [{"type": "string", "format": "date-time"}, {"type": "null"}]},
                "items": {"anyOf": [{"type": "array", "items": {}}, {"type": "null"}]},
                "amount": {"anyOf": [{"type": "number"}, {"type": "null"}]}
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert_eq!(
            flat["created"],
            json!({"type": ["null", "string"], "format": "date-time"})
        );
        assert_eq!(flat["items"]["type"], json!(["null", "array"]));
        assert!(!flat.contains_key("amount"));
    }

    #[test]
    fn test_flatten_schema_skips_untyped_without_alternative() {
        let schema = json!({
            "properties": {
                "id": {"type": "integer"},
                "note": {"description": "free text"},
                "flag": {"oneOf": [{"type": "boolean"}]},
                "empty": {"anyOf": []}
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_flatten_schema_without_properties() {
        let flat = flatten_schema(&json!({"type": "object"})).unwrap();
        assert!(flat.is_empty());
    }

    #[test]
    fn test_flatten_schema_names_below_limit() {
        let schema = json!({
            "properties": {
                "very_long_property_attribute_name": {
                    "type": "object",
                    "properties": {
                        "another_quite_long_intermediate_name": {
                            "type": "object",
                            "properties": {"innermost_attribute": {"type": "string"}}
                        }
                    }
                }
            }
        });
        let flat = flatten_schema(&schema).unwrap();
        assert!(flat.contains_key("vlpan__aqlin__innermost_attribute"));
        assert!(flat.keys().all(|k| k.len() < MAX_IDENTIFIER_LEN));
    }

    #[test]
    fn test_flatten_record_nested() {
        let record = json!({"id": 3, "info": {"weather": "sunny", "mood": "happy"}});
        let row = flatten_record(
            record.as_object().unwrap(),
            &attrs(&["id", "info__weather", "info__mood"]),
        );
        assert_eq!(row["id"], json!(3));
        assert_eq!(row["info__weather"], json!("sunny"));
        assert_eq!(row["info__mood"], json!("happy"));
    }

    #[test]
    fn test_flatten_record_declared_object_kept_as_text() {
        let record = json!({"id": 1, "payload": {"a": 1, "b": [1, 2]}});
        let row = flatten_record(record.as_object().unwrap(), &attrs(&["id", "payload"]));
        assert_eq!(row.len(), 2);
        let text = row["payload"].as_str().unwrap();
        let reparsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(reparsed, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_flatten_record_arrays_serialized() {
        let record = json!({"tags": ["a", "b"], "extra": [1]});
        let row = flatten_record(record.as_object().unwrap(), &attrs(&["tags"]));
        assert_eq!(row["tags"], json!("[\"a\",\"b\"]"));
        assert_eq!(row["extra"], json!("[1]"));
    }

    #[test]
    fn test_flatten_record_normalizes_names() {
        let record = json!({"clientName": "acme", "Address": {"zipCode": "1234"}});
        let row = flatten_record(record.as_object().unwrap(), &attrs(&["client_name"]));
        assert_eq!(row["client_name"], json!("acme"));
        assert_eq!(row["address__zip_code"], json!("1234"));
    }
}
