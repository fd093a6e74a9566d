//! # sqlsink Connectors
//!
//! Loads a line-delimited message stream (`SCHEMA`, `RECORD`, `STATE`)
//! into a relational store and echoes checkpoints once the records they
//! cover are durable.
//!
//! ## Building blocks
//!
//! - [`message`] - Input line parsing
//! - [`schema`] - Schema flattening and identifier naming
//! - [`storage`] - Storage driver traits
//! - [`sqlite`] - `SQLite` storage driver
//! - [`pipeline`] - The message-processing loop
//! - [`testing`] - Message builders and in-memory helpers
//!
//! ## Data flow
//!
//! ```text
//! stdin line -> Message::parse -> Pipeline
//!   SCHEMA: flatten_schema -> sync_table -> StreamRegistry
//!   RECORD: prepare_row -> RecordBuffer --(batch_size)--> load_rows
//!   STATE:  CheckpointLedger --(all covering streams flushed)--> stdout
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::float_cmp,
        clippy::unreadable_literal,
        clippy::cast_possible_truncation,
        clippy::needless_pass_by_value,
        unused_mut
    )
)]

// ── Foundations ──

/// Loader error types.
pub mod error;

/// Key/value configuration.
pub mod config;

/// Loader metrics.
pub mod metrics;

// ── Input ──

/// Input message model.
pub mod message;

/// Schema flattening, naming and type mapping.
pub mod schema;

/// Record validation against stream schemas.
pub mod validator;

// ── Storage ──

/// Storage driver traits and table definitions.
pub mod storage;

/// `SQLite` storage driver.
pub mod sqlite;

/// Table creation and additive evolution.
pub mod sync;

/// Transactional batch writes.
pub mod loader;

// ── Pipeline ──

/// Per-stream record buffers.
pub mod buffer;

/// Per-stream registered state.
pub mod registry;

/// Checkpoint gating.
pub mod checkpoint;

/// The message-processing loop.
pub mod pipeline;

/// Testing utilities (message builders, in-memory pipelines).
pub mod testing;

pub use error::{SinkError, StorageError};
pub use message::Message;
pub use pipeline::{Pipeline, PipelineConfig};
pub use sqlite::{SqliteSinkConfig, SqliteStore};
