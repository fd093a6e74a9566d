//! Stream registry.
//!
//! Holds everything the pipeline knows about each stream: its key
//! properties, validator, target table, row template and
//! buffer. Entries are created by the first SCHEMA message of a stream and
//! replaced by later ones; they live for the whole run.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::buffer::{PreparedRow, RecordBuffer};
use crate::error::SinkError;
use crate::schema::flatten_record;
use crate::storage::{Row, TableDefinition};
use crate::validator::RecordValidator;

/// Formats a load time the way audit timestamp columns store it.
///
/// `2024-05-01 10:00:00.000000` (UTC, microseconds).
#[must_use]
pub fn audit_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Registered state of one stream.
pub struct StreamEntry {
    name: String,
    table: TableDefinition,
    key_properties: Vec<String>,
    validator: Box<dyn RecordValidator>,
    template: Row,
    attributes: HashSet<String>,
    buffer: RecordBuffer,
}

impl StreamEntry {
    /// Creates an entry for a freshly (re)declared stream.
    ///
    /// The buffer deduplicates on `key_properties` when there are any.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: TableDefinition,
        key_properties: Vec<String>,
        validator: Box<dyn RecordValidator>,
    ) -> Self {
        let template = table.empty_row();
        let attributes = template.keys().cloned().collect();
        let buffer = RecordBuffer::for_keys(&key_properties);
        Self {
            name: name.into(),
            table,
            key_properties,
            validator,
            template,
            attributes,
            buffer,
        }
    }

    /// Stream name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target table.
    #[must_use]
    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    /// Normalized key properties as declared.
    #[must_use]
    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    /// Buffered rows.
    #[must_use]
    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    /// Mutable access to the buffer.
    pub fn buffer_mut(&mut self) -> &mut RecordBuffer {
        &mut self.buffer
    }

    /// Turns a raw record into a full table row.
    ///
    /// Validates the record, flattens it, checks that every key property
    /// is present, stamps `timestamp_column` with `loaded_at` unless the
    /// record carries it, and fills undeclared columns with `null`.
    /// Flattened attributes that are not table columns are dropped, but
    /// the dedup key is read before that, so undeclared key properties
    /// still deduplicate.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Validation` if the record fails its schema, is
    /// not an object, or lacks key properties.
    pub fn prepare_row(
        &self,
        record: &Value,
        timestamp_column: &str,
        loaded_at: &str,
    ) -> Result<PreparedRow, SinkError> {
        self.validator.validate(record)?;

        let object = record.as_object().ok_or_else(|| {
            SinkError::Validation(format!("record must be a JSON object: {record}"))
        })?;
        let mut flat = flatten_record(object, &self.attributes);

        let missing: Vec<&str> = self
            .key_properties
            .iter()
            .filter(|k| !flat.contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SinkError::Validation(format!(
                "record {record} is missing key properties {missing:?}"
            )));
        }

        flat.entry(timestamp_column.to_string())
            .or_insert_with(|| Value::String(loaded_at.to_string()));

        let mut row = self.template.clone();
        for (column, value) in &flat {
            if self.attributes.contains(column) {
                row.insert(column.clone(), value.clone());
            } else {
                debug!(stream = %self.name, %column, "dropping attribute not in table");
            }
        }
        Ok(PreparedRow::new(&self.key_properties, &flat, row))
    }
}

impl std::fmt::Debug for StreamEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEntry")
            .field("name", &self.name)
            .field("table", &self.table.name)
            .field("key_properties", &self.key_properties)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

/// All known streams, in order of first registration.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: IndexMap<String, StreamEntry>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry`, replacing (and returning) any previous entry for
    /// the same stream. A replaced stream keeps its registration position.
    pub fn register(&mut self, entry: StreamEntry) -> Option<StreamEntry> {
        self.streams.insert(entry.name.clone(), entry)
    }

    /// Returns `true` if `stream` has a schema.
    #[must_use]
    pub fn contains(&self, stream: &str) -> bool {
        self.streams.contains_key(stream)
    }

    /// Looks up a stream.
    #[must_use]
    pub fn get(&self, stream: &str) -> Option<&StreamEntry> {
        self.streams.get(stream)
    }

    /// Looks up a stream for mutation.
    pub fn get_mut(&mut self, stream: &str) -> Option<&mut StreamEntry> {
        self.streams.get_mut(stream)
    }

    /// Streams with buffered rows, in registration order.
    #[must_use]
    pub fn dirty_streams(&self) -> Vec<String> {
        self.streams
            .values()
            .filter(|e| !e.buffer.is_empty())
            .map(|e| e.name.clone())
            .collect()
    }

    /// Streams with buffered rows, as a set.
    #[must_use]
    pub fn dirty_set(&self) -> BTreeSet<String> {
        self.dirty_streams().into_iter().collect()
    }

    /// Iterates over registered streams.
    pub fn iter(&self) -> impl Iterator<Item = &StreamEntry> {
        self.streams.values()
    }

    /// Number of registered streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns `true` if no stream is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
