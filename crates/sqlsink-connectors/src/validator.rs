//! Record validation against a stream's JSON Schema.

use std::fmt;

use serde_json::Value;

use crate::error::SinkError;

/// Validates raw records before they are flattened.
pub trait RecordValidator: Send {
    /// Checks `record` against the stream's schema.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Validation` describing every violation.
    fn validate(&self, record: &Value) -> Result<(), SinkError>;
}

/// Builds a validator from a stream's JSON Schema.
pub type ValidatorFactory = fn(&Value) -> Result<Box<dyn RecordValidator>, SinkError>;

/// Draft 4 JSON Schema validator with format assertions enabled.
pub struct JsonSchemaValidator {
    inner: jsonschema::Validator,
}

impl JsonSchemaValidator {
    /// Compiles a validator for `schema`.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Validation` if the schema itself is invalid.
    pub fn new(schema: &Value) -> Result<Self, SinkError> {
        let inner = jsonschema::draft4::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| SinkError::Validation(format!("invalid JSON schema: {e}")))?;
        Ok(Self { inner })
    }

    /// [`ValidatorFactory`] producing boxed [`JsonSchemaValidator`]s.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Validation` if the schema itself is invalid.
    pub fn boxed(schema: &Value) -> Result<Box<dyn RecordValidator>, SinkError> {
        Ok(Box::new(Self::new(schema)?))
    }
}

impl RecordValidator for JsonSchemaValidator {
    fn validate(&self, record: &Value) -> Result<(), SinkError> {
        let violations: Vec<String> = self
            .inner
            .iter_errors(record)
            .map(|e| e.to_string())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Validation(format!(
                "record {record} does not match schema: {}",
                violations.join("; ")
            )))
        }
    }
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}
