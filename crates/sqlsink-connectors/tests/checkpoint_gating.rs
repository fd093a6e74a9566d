//! End-to-end checkpoint gating tests.
//!
//! A checkpoint line may only appear on the output once every record that
//! preceded it has been committed to the database file.

use serde_json::{json, Value};

use sqlsink_connectors::sqlite::store::read_rows;
use sqlsink_connectors::testing::{
    emitted_states, fixed_clock, record_message, schema_message, state_message,
};
use sqlsink_connectors::{Pipeline, SinkError, SqliteSinkConfig, SqliteStore};

fn open_pipeline(dir: &std::path::Path, batch_size: usize) -> Pipeline<SqliteStore, Vec<u8>> {
    let mut config = SqliteSinkConfig::new(dir.join("warehouse"));
    config.batch_size = batch_size;
    let store = SqliteStore::open(&config).unwrap();
    Pipeline::new(&config, store, Vec::new()).with_clock(fixed_clock)
}

fn simple_schema(stream: &str) -> String {
    schema_message(
        stream,
        json!({"properties": {
            "id": {"type": "integer"},
            "v": {"type": ["null", "string"]}
        }}),
        &["id"],
    )
}

fn committed(p: &Pipeline<SqliteStore, Vec<u8>>, table: &str) -> usize {
    read_rows(p.driver().connection(), table).unwrap().len()
}

// ── Scenario 1: checkpoint released by a threshold flush ──

#[test]
fn test_checkpoint_emitted_only_after_covering_flush() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 3);

    p.process_line(&simple_schema("A")).unwrap();
    p.process_line(&simple_schema("B")).unwrap();
    p.process_line(&record_message("A", json!({"id": 1}))).unwrap();
    p.process_line(&state_message(json!({"A": 1}))).unwrap();
    assert!(p.output().is_empty());

    p.process_line(&record_message("A", json!({"id": 2}))).unwrap();
    assert!(p.output().is_empty());
    assert_eq!(committed(&p, "a"), 0);

    p.process_line(&record_message("A", json!({"id": 3}))).unwrap();
    assert_eq!(committed(&p, "a"), 3);
    assert_eq!(std::str::from_utf8(p.output()).unwrap(), "{\"A\":1}\n");
}

#[test]
fn test_checkpoint_waits_for_every_dirty_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 2);

    p.process_line(&simple_schema("A")).unwrap();
    p.process_line(&simple_schema("B")).unwrap();
    p.process_line(&record_message("A", json!({"id": 1}))).unwrap();
    p.process_line(&record_message("B", json!({"id": 1}))).unwrap();
    p.process_line(&state_message(json!({"seq": 1}))).unwrap();

    p.process_line(&record_message("A", json!({"id": 2}))).unwrap();
    assert_eq!(committed(&p, "a"), 2);
    assert!(p.output().is_empty());

    p.process_line(&record_message("B", json!({"id": 2}))).unwrap();
    assert_eq!(emitted_states(p.output()), vec![json!({"seq": 1})]);
}

// ── Scenario 2: latest-only emission ──

#[test]
fn test_only_latest_ready_checkpoint_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 3);

    p.process_line(&simple_schema("A")).unwrap();
    p.process_line(&record_message("A", json!({"id": 1}))).unwrap();
    p.process_line(&state_message(json!({"seq": 1}))).unwrap();
    p.process_line(&record_message("A", json!({"id": 2}))).unwrap();
    p.process_line(&state_message(json!({"seq": 2}))).unwrap();
    p.process_line(&record_message("A", json!({"id": 3}))).unwrap();

    assert_eq!(emitted_states(p.output()), vec![json!({"seq": 2})]);
    assert_eq!(p.last_emitted_state(), Some(&json!({"seq": 2})));
    assert!(p.ledger().is_empty());
}

// ── Scenario 3: several checkpoints across streams ──

#[test]
fn test_multiple_states_drained_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let input = [
        simple_schema("A"),
        simple_schema("B"),
        state_message(json!({"seq": 0})),
        record_message("A", json!({"id": 1})),
        state_message(json!({"seq": 1})),
        record_message("B", json!({"id": 1})),
        state_message(json!({"seq": 2})),
    ]
    .join("\n");

    p.run(input.as_bytes()).unwrap();
    assert_eq!(
        emitted_states(p.output()),
        vec![json!({"seq": 0}), json!({"seq": 1}), json!({"seq": 2})]
    );
}

#[test]
fn test_end_of_input_drains_and_emits() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let input = [
        simple_schema("A"),
        record_message("A", json!({"id": 1})),
        record_message("A", json!({"id": 2})),
        state_message(json!({"bookmark": "x"})),
    ]
    .join("\n");

    let metrics = p.run(input.as_bytes()).unwrap();
    assert_eq!(committed(&p, "a"), 2);
    assert_eq!(emitted_states(p.output()), vec![json!({"bookmark": "x"})]);
    assert_eq!(metrics.checkpoints_buffered, 1);
    assert_eq!(metrics.checkpoints_emitted, 1);
}

#[test]
fn test_state_payload_echoed_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);
    p.process_line(r#"{"type":"STATE","value":{"z":1,"a":[true,null],"m":{"k":"v"}}}"#)
        .unwrap();
    assert_eq!(
        std::str::from_utf8(p.output()).unwrap(),
        "{\"z\":1,\"a\":[true,null],\"m\":{\"k\":\"v\"}}\n"
    );
}

// ── Scenario 4: failures never release checkpoints ──

#[test]
fn test_failed_run_writes_no_pending_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let input = [
        simple_schema("A"),
        record_message("A", json!({"id": 1})),
        state_message(json!({"seq": 1})),
        "this is not json".to_string(),
    ]
    .join("\n");

    let err = p.run(input.as_bytes()).unwrap_err();
    assert!(matches!(err, SinkError::Parse { .. }));
    assert!(p.output().is_empty());
    assert_eq!(committed(&p, "a"), 0);
}

#[test]
fn test_invalid_record_stops_before_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let input = [
        simple_schema("A"),
        record_message("A", json!({"id": 1})),
        state_message(json!({"seq": 1})),
        record_message("A", json!({"v": "no key"})),
    ]
    .join("\n");

    let err = p.run(input.as_bytes()).unwrap_err();
    assert!(matches!(err, SinkError::Validation(_)));
    assert!(p.output().is_empty());
    let pending: Vec<Value> = p.ledger().pending().map(|e| e.state.clone()).collect();
    assert_eq!(pending, vec![json!({"seq": 1})]);
}

#[test]
fn test_non_utf8_line_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let mut input = format!(
        "{}\n{}\n{}\n",
        simple_schema("A"),
        record_message("A", json!({"id": 1})),
        state_message(json!({"seq": 1}))
    )
    .into_bytes();
    input.extend_from_slice(b"\xff\xfe\n");

    let err = p.run(input.as_slice()).unwrap_err();
    assert!(matches!(err, SinkError::Parse { ref message, .. } if message.contains("UTF-8")));
    assert!(p.output().is_empty());
    assert_eq!(committed(&p, "a"), 0);
}

#[test]
fn test_crlf_line_endings_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = open_pipeline(dir.path(), 50);

    let input = [
        simple_schema("A"),
        record_message("A", json!({"id": 1})),
        state_message(json!({"seq": 1})),
    ]
    .join("\r\n");

    p.run(input.as_bytes()).unwrap();
    assert_eq!(committed(&p, "a"), 1);
    assert_eq!(emitted_states(p.output()), vec![json!({"seq": 1})]);
}
