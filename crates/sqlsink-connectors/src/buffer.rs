//! Per-stream record buffers.
//!
//! Streams with key properties buffer in [`RecordBuffer::Dedup`] mode, so
//! one flush persists only the latest row per key. Streams without keys
//! buffer every row in arrival order.
//!
//! The dedup key is taken from the flattened record, not the stored row,
//! so key properties that are not table columns still deduplicate.

use indexmap::IndexMap;
use serde_json::Value;

use crate::storage::Row;

/// A table row together with the dedup key of the record it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    /// JSON text of the record's key property values, in declared order.
    pub key: String,
    /// Full table row.
    pub row: Row,
}

impl PreparedRow {
    /// Builds a prepared row, reading `key_properties` from `source`.
    /// Missing key values count as `null`.
    #[must_use]
    pub fn new(key_properties: &[String], source: &Row, row: Row) -> Self {
        Self {
            key: dedup_key(key_properties, source),
            row,
        }
    }
}

/// Rows waiting to be flushed for one stream.
#[derive(Debug, Clone)]
pub enum RecordBuffer {
    /// Every row, in arrival order.
    Append(Vec<Row>),
    /// Latest row per key, in order of first arrival of each key.
    Dedup(IndexMap<String, Row>),
}

impl RecordBuffer {
    /// Creates the buffer variant matching a stream's key properties.
    #[must_use]
    pub fn for_keys(key_properties: &[String]) -> Self {
        if key_properties.is_empty() {
            RecordBuffer::Append(Vec::new())
        } else {
            RecordBuffer::Dedup(IndexMap::new())
        }
    }

    /// Adds a row. In dedup mode a row with an already buffered key
    /// replaces the earlier one in place.
    pub fn add(&mut self, prepared: PreparedRow) {
        match self {
            RecordBuffer::Append(rows) => rows.push(prepared.row),
            RecordBuffer::Dedup(rows) => {
                rows.insert(prepared.key, prepared.row);
            }
        }
    }

    /// Number of buffered rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            RecordBuffer::Append(rows) => rows.len(),
            RecordBuffer::Dedup(rows) => rows.len(),
        }
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for the keyed variant.
    #[must_use]
    pub fn is_dedup(&self) -> bool {
        matches!(self, RecordBuffer::Dedup(_))
    }

    /// Removes and returns every buffered row in flush order.
    pub fn drain(&mut self) -> Vec<Row> {
        match self {
            RecordBuffer::Append(rows) => std::mem::take(rows),
            RecordBuffer::Dedup(rows) => rows.drain(..).map(|(_, row)| row).collect(),
        }
    }
}

fn dedup_key(key_properties: &[String], source: &Row) -> String {
    let values: Vec<&Value> = key_properties
        .iter()
        .map(|k| source.get(k).unwrap_or(&Value::Null))
        .collect();
    serde_json::to_string(&values).unwrap_or_default()
}
