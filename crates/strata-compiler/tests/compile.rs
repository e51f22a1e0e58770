//! Compiling chains of queries through published tables.

use std::fs;

use arrow_schema::{DataType, Field, Fields, TimeUnit};
use strata_compiler::{Compiler, CompilerConfig, CompilerError, PipelineProfile};
use strata_core::catalog::{QueryTable, TableType};
use strata_core::rel::{AggregateCall, AggregateHint, RelNode, ScalarExpr};
use strata_core::time::{TimestampProvenance, MS_PER_HOUR};
use strata_sql::planner::manifest::HintManifest;

fn events() -> QueryTable {
    QueryTable::new(
        "events",
        Fields::from(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("ts", DataType::Timestamp(TimeUnit::Millisecond, None), false),
            Field::new("v", DataType::Int64, true),
        ]),
        1,
        TableType::Stream,
        TimestampProvenance::source(&[1]),
    )
}

fn last_hour(ts: usize) -> ScalarExpr {
    ScalarExpr::gt(
        ScalarExpr::col(ts),
        ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(MS_PER_HOUR)),
    )
}

fn count_by_id(input: RelNode) -> RelNode {
    input.aggregate(vec![0], vec![AggregateCall::count_star("n")])
}

#[test]
fn test_config_file_drives_compiler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    fs::write(
        &path,
        r#"
profile = "full"
sliding_window_panes = 4
"#,
    )
    .unwrap();

    let config = CompilerConfig::from_file(&path).unwrap();
    assert_eq!(config.profile, PipelineProfile::Full);
    let mut compiler = Compiler::builder().config(config).table(events()).build().unwrap();
    assert_eq!(compiler.pipeline().len(), 3);

    let node = count_by_id(compiler.scan("events").unwrap().filter(last_hour(1)));
    let compiled = compiler.compile("hourly", &node).unwrap();
    match compiled.manifest.hints.as_slice() {
        [HintManifest::Aggregate(AggregateHint::Sliding(hint))] => {
            assert_eq!(hint.slide_ms, MS_PER_HOUR / 4);
        }
        other => panic!("unexpected hints {other:?}"),
    }
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = CompilerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, CompilerError::Io(_)));
}

#[test]
fn test_now_filter_travels_to_next_query() {
    let mut compiler = Compiler::builder().table(events()).build().unwrap();
    let recent = compiler.scan("events").unwrap().filter(last_hour(1));
    let published = compiler.compile("recent_events", &recent).unwrap();
    assert!(published.table.pullups.now_filter.is_some());
    // the filter stays pending, so nothing filters the written rows
    assert!(!published.manifest.explain.contains("Filter"));

    // the re-attached filter turns the aggregate into a sliding window
    let node = count_by_id(compiler.scan("recent_events").unwrap());
    let counts = compiler.compile("recent_counts", &node).unwrap();
    assert_eq!(counts.stage.name, "stream");
    assert_eq!(counts.table.table_type, TableType::TemporalState);
    assert!(matches!(
        counts.manifest.hints.as_slice(),
        [HintManifest::Aggregate(AggregateHint::Sliding(_))]
    ));
}

#[test]
fn test_key_dedup_dropped_when_read_from_other_stage() {
    let mut compiler = Compiler::builder().table(events()).build().unwrap();
    let node = count_by_id(compiler.scan("events").unwrap().filter(last_hour(1)));
    let hourly = compiler.compile("hourly", &node).unwrap();
    assert_eq!(hourly.stage.name, "stream");
    assert!(hourly.table.pullups.top_n.is_primary_key_dedup(hourly.table.num_primary_keys));
    let pending = hourly.table.pullups.top_n.clone();

    let scan = compiler.scan("hourly").unwrap();
    let same_stage = compiler.convert_on("stream", &scan).unwrap();
    assert_eq!(same_stage.top_n, pending);

    // keyed writes of the stream stage already keep one row per key
    let other_stage = compiler.convert_on("database", &scan).unwrap();
    assert!(other_stage.top_n.is_empty());
    assert_eq!(
        other_stage
            .rel
            .count_nodes(&|n| matches!(n, RelNode::PartitionLimit { .. })),
        0
    );
}

#[test]
fn test_compiled_manifest_renders_json() {
    let mut compiler = Compiler::builder().table(events()).build().unwrap();
    let node = compiler.scan("events").unwrap().project_columns(&[2, 0]);
    let compiled = compiler.compile("values", &node).unwrap();
    let json = compiled.manifest.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["stage"], "stream");
    assert_eq!(value["primary_key"], serde_json::json!([0]));
    assert_eq!(value["columns"][0]["name"], "id");
}

#[test]
fn test_unknown_table_lists_suggestion() {
    let compiler = Compiler::builder().table(events()).build().unwrap();
    let err = compiler.scan("evnts").unwrap_err();
    assert_eq!(err.code(), "STR-1100");
    assert!(err.to_string().contains("events"));
}
