//! Loader metrics.
//!
//! [`SinkMetrics`] provides lock-free atomic counters for the pipeline,
//! readable at any time as a [`MetricsSnapshot`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for loader statistics.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Total RECORD messages accepted.
    pub records_received: AtomicU64,

    /// Total rows written (inserted or updated).
    pub rows_written: AtomicU64,

    /// Total rows that hit a key conflict and were updated instead.
    pub upsert_fallbacks: AtomicU64,

    /// Total non-empty buffer flushes.
    pub flushes: AtomicU64,

    /// Total tables created.
    pub tables_created: AtomicU64,

    /// Total columns added to existing tables.
    pub columns_added: AtomicU64,

    /// Total checkpoints parked behind dirty streams.
    pub checkpoints_buffered: AtomicU64,

    /// Total checkpoints written to the output.
    pub checkpoints_emitted: AtomicU64,

    /// Total messages skipped (unknown type, `ACTIVATE_VERSION`).
    pub messages_skipped: AtomicU64,
}

impl SinkMetrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted RECORD message.
    pub fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful flush of `rows` rows, `updated` of them via
    /// the conflict fallback.
    pub fn record_flush(&self, rows: u64, updated: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.upsert_fallbacks.fetch_add(updated, Ordering::Relaxed);
    }

    /// Records a created table.
    pub fn record_table_created(&self) {
        self.tables_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records columns added to an existing table.
    pub fn record_columns_added(&self, count: u64) {
        self.columns_added.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a parked checkpoint.
    pub fn record_checkpoint_buffered(&self) {
        self.checkpoints_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an emitted checkpoint.
    pub fn record_checkpoint_emitted(&self) {
        self.checkpoints_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a skipped message.
    pub fn record_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            upsert_fallbacks: self.upsert_fallbacks.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            tables_created: self.tables_created.load(Ordering::Relaxed),
            columns_added: self.columns_added.load(Ordering::Relaxed),
            checkpoints_buffered: self.checkpoints_buffered.load(Ordering::Relaxed),
            checkpoints_emitted: self.checkpoints_emitted.load(Ordering::Relaxed),
            messages_skipped: self.messages_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// RECORD messages accepted.
    pub records_received: u64,
    /// Rows written.
    pub rows_written: u64,
    /// Rows updated after a key conflict.
    pub upsert_fallbacks: u64,
    /// Non-empty flushes.
    pub flushes: u64,
    /// Tables created.
    pub tables_created: u64,
    /// Columns added.
    pub columns_added: u64,
    /// Checkpoints parked.
    pub checkpoints_buffered: u64,
    /// Checkpoints emitted.
    pub checkpoints_emitted: u64,
    /// Messages skipped.
    pub messages_skipped: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records={} rows_written={} upserts={} flushes={} tables_created={} \
             columns_added={} checkpoints_buffered={} checkpoints_emitted={} skipped={}",
            self.records_received,
            self.rows_written,
            self.upsert_fallbacks,
            self.flushes,
            self.tables_created,
            self.columns_added,
            self.checkpoints_buffered,
            self.checkpoints_emitted,
            self.messages_skipped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_zeros() {
        assert_eq!(SinkMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_flush() {
        let m = SinkMetrics::new();
        m.record_flush(10, 3);
        m.record_flush(5, 0);
        let s = m.snapshot();
        assert_eq!(s.flushes, 2);
        assert_eq!(s.rows_written, 15);
        assert_eq!(s.upsert_fallbacks, 3);
    }

    #[test]
    fn test_counters() {
        let m = SinkMetrics::new();
        m.record_received();
        m.record_received();
        m.record_table_created();
        m.record_columns_added(2);
        m.record_checkpoint_buffered();
        m.record_checkpoint_emitted();
        m.record_skipped();

        let s = m.snapshot();
        assert_eq!(s.records_received, 2);
        assert_eq!(s.tables_created, 1);
        assert_eq!(s.columns_added, 2);
        assert_eq!(s.checkpoints_buffered, 1);
        assert_eq!(s.checkpoints_emitted, 1);
        assert_eq!(s.messages_skipped, 1);
    }

    #[test]
    fn test_snapshot_display_and_serialize() {
        let m = SinkMetrics::new();
        m.record_flush(4, 1);
        let s = m.snapshot();
        assert!(s.to_string().contains("rows_written=4"));

        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["upsert_fallbacks"], 1);
    }
}
