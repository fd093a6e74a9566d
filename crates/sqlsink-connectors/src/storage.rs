//! Storage driver abstraction.
//!
//! The pipeline talks to the database only through [`StorageDriver`] and
//! [`StorageTransaction`]. Table layouts are described with Arrow schemas;
//! each driver maps the Arrow types to its own DDL.
//!
//! The `SQLite` implementation lives in [`crate::sqlite`].

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow_schema::{Field, Schema, SchemaRef};
use serde_json::Value;

use crate::error::StorageError;

/// A flat row: column name to JSON value.
pub type Row = BTreeMap<String, Value>;

/// A column as it exists in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Type as declared in the table DDL.
    pub declared_type: String,
}

/// Target layout of a table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns, in DDL order.
    pub schema: SchemaRef,
    /// Primary-key columns, in declaration order. Empty for append-only tables.
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    /// Creates a table definition.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<Field>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(Schema::new(fields)),
            primary_key,
        }
    }

    /// Returns the column names in DDL order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    /// Returns `true` if the table has primary-key columns.
    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Returns a row with every column mapped to `null`.
    #[must_use]
    pub fn empty_row(&self) -> Row {
        self.schema
            .fields()
            .iter()
            .map(|f| (f.name().clone(), Value::Null))
            .collect()
    }
}

/// Schema-level operations on the backing store.
pub trait StorageDriver {
    /// Lists user tables.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` if the catalog cannot be read.
    fn list_tables(&self) -> Result<Vec<String>, StorageError>;

    /// Lists the columns of `table` in storage order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` if the catalog cannot be read.
    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StorageError>;

    /// Creates a table as defined.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` on DDL failure.
    fn create_table(&mut self, table: &TableDefinition) -> Result<(), StorageError>;

    /// Adds a nullable column to an existing table.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` on DDL failure.
    fn add_column(&mut self, table: &str, field: &Field) -> Result<(), StorageError>;

    /// Returns `true` if values of `field` can be stored in the existing
    /// column without a type change.
    fn is_compatible(&self, existing: &ColumnInfo, field: &Field) -> bool;

    /// Starts a unit of work. Dropping the transaction without committing
    /// rolls it back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Transaction` if the transaction cannot start.
    fn begin(&mut self) -> Result<Box<dyn StorageTransaction + '_>, StorageError>;
}

/// Row-level operations inside a single unit of work.
pub trait StorageTransaction {
    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UniqueViolation` on a primary-key conflict,
    /// `StorageError::Database` on any other failure.
    fn insert(&mut self, table: &TableDefinition, row: &Row) -> Result<(), StorageError>;

    /// Inserts all rows, returning how many were written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` on failure.
    fn insert_batch(&mut self, table: &TableDefinition, rows: &[Row]) -> Result<usize, StorageError>;

    /// Updates the row whose `key_columns` match `row`, returning the
    /// number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Database` on failure.
    fn update(
        &mut self,
        table: &TableDefinition,
        key_columns: &[String],
        row: &Row,
    ) -> Result<usize, StorageError>;

    /// Commits the unit of work.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Transaction` if the commit fails.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}
