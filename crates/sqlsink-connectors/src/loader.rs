//! Batch loading.
//!
//! Writes one stream's buffered rows inside a single unit of work. Keyed
//! tables are upserted row by row: insert first, update by key on a
//! primary-key conflict. Tables without keys get one append batch.

use tracing::debug;

use crate::error::SinkError;
use crate::storage::{Row, StorageDriver, TableDefinition};

/// Outcome of one [`load_rows`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Rows written in total.
    pub rows_written: usize,
    /// Rows written by insert.
    pub inserted: usize,
    /// Rows written by the update fallback.
    pub updated: usize,
}

/// Writes `rows` to `table` and commits.
///
/// Nothing is written (and nothing committed) when `rows` is empty. On any
/// error the unit of work is rolled back.
///
/// # Errors
///
/// Returns `SinkError::Storage` on any storage failure other than a
/// recovered key conflict.
pub fn load_rows<D: StorageDriver + ?Sized>(
    driver: &mut D,
    table: &TableDefinition,
    rows: &[Row],
) -> Result<LoadResult, SinkError> {
    if rows.is_empty() {
        return Ok(LoadResult::default());
    }

    let mut tx = driver.begin()?;
    let mut result = LoadResult::default();

    if table.has_primary_key() {
        for row in rows {
            match tx.insert(table, row) {
                Ok(()) => result.inserted += 1,
                Err(e) if e.is_unique_violation() => {
                    tx.update(table, &table.primary_key, row)?;
                    result.updated += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    } else {
        result.inserted = tx.insert_batch(table, rows)?;
    }

    tx.commit()?;
    result.rows_written = result.inserted + result.updated;
    debug!(
        table = %table.name,
        inserted = result.inserted,
        updated = result.updated,
        "batch committed"
    );
    Ok(result)
}
