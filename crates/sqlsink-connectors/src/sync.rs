//! Table synchronization.
//!
//! Turns a stream's flattened schema into a [`TableDefinition`] and
//! reconciles it with storage: missing tables are created, existing tables
//! only ever gain nullable columns. Redeclaring an existing column with a
//! type its storage cannot hold is rejected before any column is added.

use std::collections::HashMap;

use arrow_schema::Field;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::schema::types::audit_timestamp_type;
use crate::schema::{json_schema_to_arrow, table_name, FlatSchema};
use crate::storage::{ColumnInfo, StorageDriver, TableDefinition};

/// What [`sync_table`] did to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The table did not exist and was created.
    Created,
    /// The table existed and these columns were added.
    Evolved {
        /// Added column names, in definition order.
        added: Vec<String>,
    },
    /// The table already had every column.
    Unchanged,
}

/// Builds the target table for a stream.
///
/// Columns follow the flattened schema (sorted by name); key columns are
/// `NOT NULL`. The audit timestamp column is appended last unless the
/// schema declares it. Key properties with no matching column are ignored.
#[must_use]
pub fn build_table_definition(
    stream: &str,
    flat_schema: &FlatSchema,
    key_properties: &[String],
    timestamp_column: &str,
) -> TableDefinition {
    let primary_key: Vec<String> = key_properties
        .iter()
        .filter(|key| {
            let declared = flat_schema.contains_key(key.as_str());
            if !declared {
                warn!(stream, key = %key, "key property is not a schema column, ignoring");
            }
            declared
        })
        .cloned()
        .collect();

    let mut fields: Vec<Field> = flat_schema
        .iter()
        .map(|(name, definition)| {
            let is_key = primary_key.iter().any(|k| k == name);
            Field::new(name, json_schema_to_arrow(definition), !is_key)
        })
        .collect();

    if !flat_schema.contains_key(timestamp_column) {
        fields.push(Field::new(timestamp_column, audit_timestamp_type(), true));
    }

    TableDefinition::new(table_name(stream), fields, primary_key)
}

/// Applies `table` to storage.
///
/// # Errors
///
/// Returns `SinkError::SchemaEvolution` if an existing column cannot hold
/// its redeclared type, or `SinkError::Storage` on DDL failure.
pub fn sync_table<D: StorageDriver + ?Sized>(
    driver: &mut D,
    table: &TableDefinition,
) -> Result<SyncOutcome, SinkError> {
    let exists = driver.list_tables()?.iter().any(|t| t == &table.name);
    if !exists {
        driver.create_table(table)?;
        info!(table = %table.name, columns = table.schema.fields().len(), "created table");
        return Ok(SyncOutcome::Created);
    }

    let existing: HashMap<String, ColumnInfo> = driver
        .list_columns(&table.name)?
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let conflicts: Vec<String> = table
        .schema
        .fields()
        .iter()
        .filter_map(|field| {
            let column = existing.get(field.name())?;
            (!driver.is_compatible(column, field)).then(|| {
                format!(
                    "column '{}' is declared {} and cannot hold {}",
                    field.name(),
                    column.declared_type,
                    field.data_type()
                )
            })
        })
        .collect();
    if !conflicts.is_empty() {
        return Err(SinkError::SchemaEvolution {
            table: table.name.clone(),
            message: conflicts.join("; "),
        });
    }

    let mut added = Vec::new();
    for field in table.schema.fields() {
        if existing.contains_key(field.name()) {
            continue;
        }
        let column = Field::new(field.name(), field.data_type().clone(), true);
        driver.add_column(&table.name, &column)?;
        info!(table = %table.name, column = %field.name(), data_type = %field.data_type(), "added column");
        added.push(field.name().clone());
    }

    if added.is_empty() {
        Ok(SyncOutcome::Unchanged)
    } else {
        Ok(SyncOutcome::Evolved { added })
    }
}
