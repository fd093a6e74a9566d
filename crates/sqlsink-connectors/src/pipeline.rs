//! Message pipeline.
//!
//! [`Pipeline`] consumes the input stream one line at a time, keeps tables
//! in sync with declared schemas, buffers records per stream and writes
//! acknowledged checkpoints to its output once every record that preceded
//! them has been committed.
//!
//! ## Flush triggers
//!
//! A stream's buffer is flushed when it reaches `batch_size` rows, when the
//! stream's schema is redeclared, and at end of input.
//!
//! ## Checkpoints
//!
//! A STATE message received while no stream holds buffered rows is written
//! out immediately. Otherwise it waits in the [`CheckpointLedger`] until the
//! streams that were dirty at that moment have flushed. Only the most recent
//! ready checkpoint is written, and a `null` payload is never written.

use std::io::{BufRead, Write};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointLedger;
use crate::error::SinkError;
use crate::message::Message;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::registry::{audit_timestamp, StreamEntry, StreamRegistry};
use crate::schema::{flatten_key, flatten_schema};
use crate::sqlite::{SqliteSinkConfig, DEFAULT_BATCH_SIZE, DEFAULT_TIMESTAMP_COLUMN};
use crate::storage::StorageDriver;
use crate::sync::{build_table_definition, sync_table, SyncOutcome};
use crate::validator::{JsonSchemaValidator, ValidatorFactory};

/// Storage-independent pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Buffered rows per stream before a flush.
    pub batch_size: usize,
    /// Audit timestamp column stamped onto every row.
    pub timestamp_column: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
        }
    }
}

impl From<&SqliteSinkConfig> for PipelineConfig {
    fn from(config: &SqliteSinkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            timestamp_column: config.timestamp_column.clone(),
        }
    }
}

/// Drives one run of the loader over a storage driver and a checkpoint
/// output.
pub struct Pipeline<D: StorageDriver, W: Write> {
    config: PipelineConfig,
    driver: D,
    output: W,
    registry: StreamRegistry,
    ledger: CheckpointLedger,
    metrics: SinkMetrics,
    validator_factory: ValidatorFactory,
    clock: fn() -> DateTime<Utc>,
    last_emitted_state: Option<Value>,
}

impl<D: StorageDriver, W: Write> Pipeline<D, W> {
    /// Creates a pipeline with JSON Schema record validation and the
    /// system clock.
    pub fn new(config: impl Into<PipelineConfig>, driver: D, output: W) -> Self {
        Self {
            config: config.into(),
            driver,
            output,
            registry: StreamRegistry::new(),
            ledger: CheckpointLedger::new(),
            metrics: SinkMetrics::new(),
            validator_factory: JsonSchemaValidator::boxed,
            clock: Utc::now,
            last_emitted_state: None,
        }
    }

    /// Replaces the record validator factory.
    #[must_use]
    pub fn with_validator_factory(mut self, factory: ValidatorFactory) -> Self {
        self.validator_factory = factory;
        self
    }

    /// Replaces the clock used for audit timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    // ── Driving ──

    /// Processes every line of `input`, then drains all buffers.
    ///
    /// Stops at the first error. Rows already committed stay committed and
    /// no checkpoint is written for the failed tail.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while reading or processing a line,
    /// or while draining.
    pub fn run<R: BufRead>(&mut self, mut input: R) -> Result<MetricsSnapshot, SinkError> {
        let mut buf = Vec::new();
        let mut line_number = 0usize;
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;
            if let Err(e) = self.process_bytes(&buf) {
                error!(line = line_number, kind = e.kind(), "stopping at failed message");
                return Err(e);
            }
        }
        self.finish()?;
        Ok(self.metrics.snapshot())
    }

    /// Decodes one raw input line, including its terminator, and
    /// processes it. Lines that are not UTF-8 are parse errors.
    fn process_bytes(&mut self, raw: &[u8]) -> Result<(), SinkError> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = std::str::from_utf8(raw).map_err(|e| SinkError::Parse {
            message: format!("input line is not valid UTF-8: {e}"),
            line: String::from_utf8_lossy(raw).into_owned(),
        })?;
        self.process_line(line)
    }

    /// Parses and processes one input line.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Parse` or `SinkError::Protocol` for malformed
    /// lines, otherwise whatever [`process_message`](Self::process_message)
    /// returns.
    pub fn process_line(&mut self, line: &str) -> Result<(), SinkError> {
        let message = Message::parse(line)?;
        self.process_message(message)
    }

    /// Processes one parsed message.
    ///
    /// # Errors
    ///
    /// Returns an error for records of undeclared streams, invalid records
    /// and schemas, incompatible schema changes, storage failures and
    /// output failures.
    pub fn process_message(&mut self, message: Message) -> Result<(), SinkError> {
        match message {
            Message::Schema {
                stream,
                schema,
                key_properties,
            } => self.handle_schema(&stream, &schema, key_properties),
            Message::Record { stream, record } => self.handle_record(&stream, &record),
            Message::State { value } => self.handle_state(value),
            Message::ActivateVersion { stream } => {
                warn!(stream = stream.as_deref().unwrap_or(""), "ignoring ACTIVATE_VERSION message");
                self.metrics.record_skipped();
                Ok(())
            }
            Message::Unknown { message_type } => {
                warn!(%message_type, "skipping message of unknown type");
                self.metrics.record_skipped();
                Ok(())
            }
        }
    }

    /// Flushes every stream that still holds rows, in registration order,
    /// and writes the checkpoint that thereby becomes ready.
    ///
    /// # Errors
    ///
    /// Returns the first flush or output error.
    pub fn finish(&mut self) -> Result<(), SinkError> {
        for stream in self.registry.dirty_streams() {
            self.flush_stream(&stream)?;
        }
        if !self.ledger.is_empty() {
            warn!(pending = self.ledger.len(), "checkpoints still pending at end of input");
        }
        info!(metrics = %self.metrics.snapshot(), "input drained");
        Ok(())
    }

    // ── Handlers ──

    fn handle_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: Option<Vec<String>>,
    ) -> Result<(), SinkError> {
        if !schema.get("properties").is_some_and(Value::is_object) {
            return Err(SinkError::Validation(format!(
                "schema for stream '{stream}' must declare top-level properties"
            )));
        }
        let key_properties = key_properties.ok_or_else(|| {
            SinkError::Protocol(format!(
                "key_properties field is required for stream '{stream}'"
            ))
        })?;
        let key_properties: Vec<String> =
            key_properties.iter().map(|k| flatten_key(k, &[])).collect();

        let flat_schema = flatten_schema(schema)?;
        let validator = (self.validator_factory)(schema)?;
        let table = build_table_definition(
            stream,
            &flat_schema,
            &key_properties,
            &self.config.timestamp_column,
        );

        if self.registry.contains(stream) {
            debug!(stream, "schema redeclared, flushing buffered rows");
            self.flush_stream(stream)?;
        }

        let outcome = sync_table(&mut self.driver, &table).inspect_err(|e| {
            error!(stream, table = %table.name, kind = e.kind(), "failed to apply schema");
        })?;
        match outcome {
            SyncOutcome::Created => self.metrics.record_table_created(),
            SyncOutcome::Evolved { added } => self.metrics.record_columns_added(added.len() as u64),
            SyncOutcome::Unchanged => {}
        }

        self.registry.register(StreamEntry::new(
            stream,
            table,
            key_properties,
            validator,
        ));
        Ok(())
    }

    fn handle_record(&mut self, stream: &str, record: &Value) -> Result<(), SinkError> {
        let loaded_at = audit_timestamp((self.clock)());
        let timestamp_column = self.config.timestamp_column.as_str();
        let entry = self.registry.get_mut(stream).ok_or_else(|| {
            SinkError::Protocol(format!(
                "a record for stream '{stream}' was encountered before a corresponding schema"
            ))
        })?;

        let prepared = entry.prepare_row(record, timestamp_column, &loaded_at)?;
        entry.buffer_mut().add(prepared);
        self.metrics.record_received();

        if entry.buffer().len() >= self.config.batch_size {
            self.flush_stream(stream)?;
        }
        Ok(())
    }

    fn handle_state(&mut self, state: Value) -> Result<(), SinkError> {
        match self.ledger.offer(state, self.registry.dirty_set()) {
            Some(ready) => self.emit_state(ready),
            None => {
                self.metrics.record_checkpoint_buffered();
                Ok(())
            }
        }
    }

    // ── Flushing ──

    fn flush_stream(&mut self, stream: &str) -> Result<(), SinkError> {
        let Some(entry) = self.registry.get_mut(stream) else {
            return Ok(());
        };
        if entry.buffer().is_empty() {
            return Ok(());
        }

        let rows = entry.buffer_mut().drain();
        let result = crate::loader::load_rows(&mut self.driver, entry.table(), &rows)?;
        self.metrics
            .record_flush(result.rows_written as u64, result.updated as u64);
        debug!(stream, rows = result.rows_written, "flushed stream");

        self.ledger.mark_flushed(stream);
        if let Some(state) = self.ledger.take_latest_ready() {
            self.emit_state(state)?;
        }
        Ok(())
    }

    fn emit_state(&mut self, state: Value) -> Result<(), SinkError> {
        if state.is_null() {
            debug!("not emitting null checkpoint");
            return Ok(());
        }
        let line = serde_json::to_string(&state).map_err(std::io::Error::from)?;
        writeln!(self.output, "{line}")?;
        self.output.flush()?;
        debug!(state = %line, "emitted checkpoint");
        self.metrics.record_checkpoint_emitted();
        self.last_emitted_state = Some(state);
        Ok(())
    }

    // ── Accessors ──

    /// The most recently written checkpoint.
    #[must_use]
    pub fn last_emitted_state(&self) -> Option<&Value> {
        self.last_emitted_state.as_ref()
    }

    /// Run counters.
    #[must_use]
    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Known streams.
    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Checkpoints waiting for flushes.
    #[must_use]
    pub fn ledger(&self) -> &CheckpointLedger {
        &self.ledger
    }

    /// Settings in effect.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The storage driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The checkpoint output.
    #[must_use]
    pub fn output(&self) -> &W {
        &self.output
    }
}

impl<D: StorageDriver, W: Write> std::fmt::Debug for Pipeline<D, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("ledger", &self.ledger)
            .field("last_emitted_state", &self.last_emitted_state)
            .finish_non_exhaustive()
    }
}
