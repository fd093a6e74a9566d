//! JSON Schema to Arrow type mapping.
//!
//! Table definitions are expressed as Arrow schemas; the storage driver
//! maps the Arrow types to its own DDL.

use arrow_schema::{DataType, TimeUnit};
use serde_json::Value;

/// Returns `true` if a JSON Schema `type` (string or list) names `name`.
#[must_use]
pub fn json_type_includes(ty: &Value, name: &str) -> bool {
    match ty {
        Value::String(s) => s == name,
        Value::Array(items) => items.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

/// Maps a leaf JSON-Schema definition to the Arrow type of its column.
///
/// | JSON Schema                     | Arrow     |
/// |---------------------------------|-----------|
/// | `object`, `array`, `date-time`  | `Utf8`    |
/// | `number`                        | `Float64` |
/// | `integer` + `string`            | `Utf8`    |
/// | `integer`                       | `Int64`   |
/// | `boolean`                       | `Boolean` |
/// | anything else                   | `Utf8`    |
#[must_use]
pub fn json_schema_to_arrow(definition: &Value) -> DataType {
    let ty = definition.get("type").unwrap_or(&Value::Null);
    let format = definition.get("format").and_then(Value::as_str);

    if json_type_includes(ty, "object")
        || json_type_includes(ty, "array")
        || format == Some("date-time")
    {
        DataType::Utf8
    } else if json_type_includes(ty, "number") {
        DataType::Float64
    } else if json_type_includes(ty, "integer") && json_type_includes(ty, "string") {
        DataType::Utf8
    } else if json_type_includes(ty, "integer") {
        DataType::Int64
    } else if json_type_includes(ty, "boolean") {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// Arrow type of the audit timestamp column.
#[must_use]
pub fn audit_timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}
