//! `SQLite` storage driver.
//!
//! [`SqliteStore`] implements [`StorageDriver`] over a single `rusqlite`
//! connection. Every flush runs inside one `SQLite` transaction; a
//! transaction dropped without commit is rolled back.

use std::path::{Path, PathBuf};

use arrow_schema::Field;
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode, Transaction};
use serde_json::Value;
use tracing::{debug, info};

use super::sink_config::{JournalMode, SqliteSinkConfig};
use super::types::{arrow_to_sqlite_ddl_type, json_to_sql, Affinity};
use crate::error::StorageError;
use crate::storage::{ColumnInfo, Row, StorageDriver, StorageTransaction, TableDefinition};

/// `SQLite` implementation of [`StorageDriver`].
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) the database file named by `config` and applies
    /// its journal mode.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionFailed` if the file cannot be opened
    /// or configured.
    pub fn open(config: &SqliteSinkConfig) -> Result<Self, StorageError> {
        Self::open_path(config.database_path(), config.journal_mode)
    }

    /// Opens the database at `path` exactly as given.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionFailed` if the file cannot be opened
    /// or configured.
    pub fn open_path(path: impl AsRef<Path>, journal_mode: JournalMode) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::ConnectionFailed(format!("{}: {e}", path.display()))
        })?;
        let applied: String = conn
            .pragma_update_and_check(None, "journal_mode", journal_mode.pragma_value(), |row| {
                row.get(0)
            })
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!(path = %path.display(), journal_mode = %applied, "opened SQLite database");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionFailed` if `SQLite` cannot allocate it.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        Ok(Self { conn, path: None })
    }

    /// Returns the database file path, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ── SQL Generation ──

    /// Builds CREATE TABLE DDL from a table definition.
    ///
    /// ```sql
    /// CREATE TABLE IF NOT EXISTS "users" (
    ///     "id" INTEGER NOT NULL,
    ///     "name" TEXT,
    ///     PRIMARY KEY ("id")
    /// )
    /// ```
    #[must_use]
    pub fn build_create_table_sql(table: &TableDefinition) -> String {
        let mut column_defs: Vec<String> = table
            .schema
            .fields()
            .iter()
            .map(|f| {
                let nullable = if f.is_nullable() { "" } else { " NOT NULL" };
                format!(
                    "    {} {}{}",
                    quote_ident(f.name()),
                    arrow_to_sqlite_ddl_type(f.data_type()),
                    nullable
                )
            })
            .collect();

        if table.has_primary_key() {
            column_defs.push(format!("    PRIMARY KEY ({})", quoted_list(&table.primary_key)));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_ident(&table.name),
            column_defs.join(",\n")
        )
    }

    /// Builds the ALTER TABLE statement adding a nullable column.
    ///
    /// ```sql
    /// ALTER TABLE "users" ADD COLUMN "email" TEXT
    /// ```
    #[must_use]
    pub fn build_add_column_sql(table: &str, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(field.name()),
            arrow_to_sqlite_ddl_type(field.data_type())
        )
    }

    /// Builds the parameterized INSERT statement for every column.
    ///
    /// ```sql
    /// INSERT INTO "users" ("id", "name") VALUES (?1, ?2)
    /// ```
    #[must_use]
    pub fn build_insert_sql(table: &TableDefinition) -> String {
        let columns = table.column_names();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&table.name),
            quoted_list(&columns),
            placeholders.join(", ")
        )
    }

    /// Builds the UPDATE statement keyed by `key_columns`.
    ///
    /// Non-key columns are bound first, key columns last:
    ///
    /// ```sql
    /// UPDATE "users" SET "name" = ?1 WHERE "id" = ?2
    /// ```
    ///
    /// Returns `None` for key-only tables, where there is nothing to update.
    #[must_use]
    pub fn build_update_sql(table: &TableDefinition, key_columns: &[String]) -> Option<String> {
        let set_columns = non_key_columns(table, key_columns);
        if set_columns.is_empty() {
            return None;
        }

        let assignments: Vec<String> = set_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect();
        let conditions: Vec<String> = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), set_columns.len() + i + 1))
            .collect();

        Some(format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(&table.name),
            assignments.join(", "),
            conditions.join(" AND ")
        ))
    }
}

impl StorageDriver for SqliteStore {
    fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(db_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(names)
    }

    fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(db_error)?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    declared_type: row.get(1)?,
                })
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(columns)
    }

    fn create_table(&mut self, table: &TableDefinition) -> Result<(), StorageError> {
        let sql = Self::build_create_table_sql(table);
        debug!(table = %table.name, %sql, "creating table");
        self.conn.execute_batch(&sql).map_err(db_error)
    }

    fn add_column(&mut self, table: &str, field: &Field) -> Result<(), StorageError> {
        let sql = Self::build_add_column_sql(table, field);
        debug!(table, %sql, "adding column");
        self.conn.execute_batch(&sql).map_err(db_error)
    }

    fn is_compatible(&self, existing: &ColumnInfo, field: &Field) -> bool {
        Affinity::from_declared_type(&existing.declared_type).accepts(Affinity::of(field.data_type()))
    }

    fn begin(&mut self) -> Result<Box<dyn StorageTransaction + '_>, StorageError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A flush in progress on a [`SqliteStore`].
struct SqliteTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl StorageTransaction for SqliteTransaction<'_> {
    fn insert(&mut self, table: &TableDefinition, row: &Row) -> Result<(), StorageError> {
        let sql = SqliteStore::build_insert_sql(table);
        let mut stmt = self.tx.prepare_cached(&sql).map_err(db_error)?;
        let values = table.column_names().into_iter().map(|c| column_value(row, c));
        stmt.execute(params_from_iter(values))
            .map_err(|e| write_error(&table.name, e))?;
        Ok(())
    }

    fn insert_batch(&mut self, table: &TableDefinition, rows: &[Row]) -> Result<usize, StorageError> {
        let sql = SqliteStore::build_insert_sql(table);
        let columns = table.column_names();
        let mut stmt = self.tx.prepare_cached(&sql).map_err(db_error)?;
        for row in rows {
            let values = columns.iter().map(|c| column_value(row, c));
            stmt.execute(params_from_iter(values))
                .map_err(|e| write_error(&table.name, e))?;
        }
        Ok(rows.len())
    }

    fn update(
        &mut self,
        table: &TableDefinition,
        key_columns: &[String],
        row: &Row,
    ) -> Result<usize, StorageError> {
        let Some(sql) = SqliteStore::build_update_sql(table, key_columns) else {
            return Ok(0);
        };
        let set_columns = non_key_columns(table, key_columns);
        let values = set_columns
            .iter()
            .copied()
            .chain(key_columns.iter().map(String::as_str))
            .map(|c| column_value(row, c));

        let mut stmt = self.tx.prepare_cached(&sql).map_err(db_error)?;
        stmt.execute(params_from_iter(values))
            .map_err(|e| write_error(&table.name, e))
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .commit()
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }
}

fn non_key_columns<'a>(table: &'a TableDefinition, key_columns: &[String]) -> Vec<&'a str> {
    table
        .column_names()
        .into_iter()
        .filter(|c| !key_columns.iter().any(|k| k == c))
        .collect()
}

fn column_value(row: &Row, column: &str) -> rusqlite::types::Value {
    row.get(column).map_or(rusqlite::types::Value::Null, json_to_sql)
}

/// Quotes an identifier for use in SQL text.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn db_error(err: rusqlite::Error) -> StorageError {
    StorageError::Database(err.to_string())
}

fn write_error(table: &str, err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE) =>
        {
            StorageError::UniqueViolation(table.to_string())
        }
        _ => StorageError::Database(format!("table '{table}': {err}")),
    }
}

/// Reads every row of `table` as JSON objects, ordered by rowid.
///
/// Used by tests and diagnostics; values come back in their stored class.
///
/// # Errors
///
/// Returns `StorageError::Database` if the query fails.
pub fn read_rows(conn: &Connection, table: &str) -> Result<Vec<Row>, StorageError> {
    let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
    let mut stmt = conn.prepare(&sql).map_err(db_error)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map([], |r| {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = match r.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::from(v),
                    rusqlite::types::ValueRef::Real(v) => Value::from(v),
                    rusqlite::types::ValueRef::Text(t) => {
                        Value::String(String::from_utf8_lossy(t).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::from(b.to_vec()),
                };
                row.insert(name.clone(), value);
            }
            Ok(row)
        })
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    Ok(rows)
}
