//! Checkpoint gating.
//!
//! A checkpoint may only be acknowledged once every record that preceded
//! it has been committed. When a checkpoint arrives while streams still
//! hold buffered rows, [`CheckpointLedger`] parks it together with the set
//! of those streams. Each flush removes its stream from every parked
//! entry; entries whose set becomes empty are ready, and only the most
//! recent ready checkpoint is released.

use std::collections::{BTreeSet, VecDeque};

use serde_json::Value;
use tracing::debug;

/// A checkpoint waiting for streams to flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCheckpoint {
    /// Checkpoint payload, exactly as received.
    pub state: Value,
    /// Streams that must still flush before the checkpoint is ready.
    pub streams: BTreeSet<String>,
}

impl PendingCheckpoint {
    /// Returns `true` once no stream is left to flush.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Append-ordered ledger of pending checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLedger {
    entries: VecDeque<PendingCheckpoint>,
}

impl CheckpointLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a newly received checkpoint.
    ///
    /// With no dirty streams the checkpoint is ready at once and returned
    /// for immediate emission. Otherwise it is parked until every stream in
    /// `dirty_streams` has flushed.
    pub fn offer(&mut self, state: Value, dirty_streams: BTreeSet<String>) -> Option<Value> {
        if dirty_streams.is_empty() {
            return Some(state);
        }
        debug!(streams = ?dirty_streams, "checkpoint buffered until streams flush");
        self.entries.push_back(PendingCheckpoint {
            state,
            streams: dirty_streams,
        });
        None
    }

    /// Records that `stream` has flushed all rows it buffered so far.
    pub fn mark_flushed(&mut self, stream: &str) {
        for entry in &mut self.entries {
            entry.streams.remove(stream);
        }
    }

    /// Removes every ready entry and returns the most recent of them.
    ///
    /// Older ready checkpoints are dropped: the latest one already covers
    /// everything they acknowledge.
    pub fn take_latest_ready(&mut self) -> Option<Value> {
        let mut latest = None;
        let mut superseded = 0usize;
        self.entries.retain(|entry| {
            if entry.is_ready() {
                if latest.replace(entry.state.clone()).is_some() {
                    superseded += 1;
                }
                false
            } else {
                true
            }
        });
        if superseded > 0 {
            debug!(superseded, "dropping superseded checkpoints");
        }
        latest
    }

    /// Pending entries, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingCheckpoint> {
        self.entries.iter()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no checkpoint is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
