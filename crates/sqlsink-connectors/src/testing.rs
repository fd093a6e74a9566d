//! Testing utilities.
//!
//! Builders for input lines and helpers for running a [`Pipeline`] against
//! an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::pipeline::{Pipeline, PipelineConfig};
use crate::sqlite::SqliteStore;

/// Builds a `SCHEMA` line.
#[must_use]
pub fn schema_message(stream: &str, schema: Value, key_properties: &[&str]) -> String {
    json!({
        "type": "SCHEMA",
        "stream": stream,
        "schema": schema,
        "key_properties": key_properties,
    })
    .to_string()
}

/// Builds a `RECORD` line.
#[must_use]
pub fn record_message(stream: &str, record: Value) -> String {
    json!({"type": "RECORD", "stream": stream, "record": record}).to_string()
}

/// Builds a `STATE` line.
#[must_use]
pub fn state_message(value: Value) -> String {
    json!({"type": "STATE", "value": value}).to_string()
}

/// Builds an `ACTIVATE_VERSION` line.
#[must_use]
pub fn activate_version_message(stream: &str, version: u64) -> String {
    json!({"type": "ACTIVATE_VERSION", "stream": stream, "version": version}).to_string()
}

/// Clock pinned to `2024-05-01 10:00:00 UTC`.
///
/// # Panics
///
/// Never; the date is valid.
#[must_use]
pub fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
        .single()
        .expect("valid fixed timestamp")
}

/// Parses every checkpoint line written to `output`.
///
/// # Panics
///
/// Panics if `output` holds anything but JSON lines.
#[must_use]
pub fn emitted_states(output: &[u8]) -> Vec<Value> {
    std::str::from_utf8(output)
        .expect("checkpoint output is UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("checkpoint line is JSON"))
        .collect()
}

/// Creates a pipeline over a fresh in-memory database, collecting
/// checkpoints in a buffer and stamping rows with [`fixed_clock`].
///
/// # Panics
///
/// Panics if the in-memory database cannot be opened.
#[must_use]
pub fn memory_pipeline(batch_size: usize) -> Pipeline<SqliteStore, Vec<u8>> {
    let config = PipelineConfig {
        batch_size,
        ..PipelineConfig::default()
    };
    let store = SqliteStore::open_in_memory().expect("in-memory database");
    Pipeline::new(config, store, Vec::new()).with_clock(fixed_clock)
}
