//! Plan conversion benchmarks.
//!
//! Measures a single-stage conversion and a full stage selection for the
//! query shapes the converter specializes: scans of nested tables, temporal
//! joins and sliding-window aggregates.
//!
//! Run with: cargo bench --bench converter_bench

use std::hint::black_box;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, TimeUnit};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use strata_core::catalog::{nested_field, QueryTable, TableType};
use strata_core::rel::{AggregateCall, JoinKind, RelNode, ScalarExpr};
use strata_core::time::{TimestampProvenance, MS_PER_HOUR};
use strata_core::{Catalog, ExecutionPipeline, TableId};
use strata_sql::{find_cheapest, ConverterConfig, PlanConverter, SimpleCostModel};

// ── Helpers ─────────────────────────────────────────────────────────

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

struct Setup {
    catalog: Catalog,
    pipeline: ExecutionPipeline,
    config: ConverterConfig,
    queries: Vec<(&'static str, RelNode)>,
}

fn scan(catalog: &Catalog, vid: usize) -> RelNode {
    let vt = catalog.virtual_table(vid);
    RelNode::scan(TableId::Virtual(vid), vt.name.clone(), vt.fields.clone())
}

fn setup() -> Setup {
    let mut catalog = Catalog::new();
    let events = catalog
        .add_table(
            QueryTable::new(
                "events",
                Fields::from(vec![
                    Field::new("id", DataType::Int64, false),
                    Field::new("ts", ts_type(), false),
                    Field::new("v", DataType::Int64, true),
                ]),
                1,
                TableType::Stream,
                TimestampProvenance::source(&[1]),
            ),
            "events_v",
        )
        .unwrap();
    let customers = catalog
        .add_table(
            QueryTable::new(
                "customers",
                Fields::from(vec![
                    Field::new("customer_id", DataType::Int64, false),
                    Field::new("name", DataType::Utf8, true),
                    Field::new("updated", ts_type(), false),
                ]),
                1,
                TableType::TemporalState,
                TimestampProvenance::source(&[2]),
            ),
            "customers_v",
        )
        .unwrap();
    let orders = catalog
        .add_table(
            QueryTable::new(
                "orders",
                Fields::from(vec![
                    Field::new("order_id", DataType::Int64, false),
                    Field::new("customer_id", DataType::Int64, false),
                    Field::new("order_ts", ts_type(), false),
                    nested_field(
                        "items",
                        Fields::from(vec![
                            Field::new("item_id", DataType::Int64, false),
                            Field::new("qty", DataType::Int64, false),
                        ]),
                    ),
                ]),
                1,
                TableType::Stream,
                TimestampProvenance::source(&[2]),
            ),
            "orders_v",
        )
        .unwrap();
    let items = catalog.add_child(orders, "items", "orders_v.items", 1).unwrap();

    let recent = ScalarExpr::gt(
        ScalarExpr::col(1),
        ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(MS_PER_HOUR)),
    );
    let queries = vec![
        ("nested_scan", scan(&catalog, items)),
        (
            "temporal_join",
            scan(&catalog, orders).join(
                scan(&catalog, customers),
                JoinKind::Default,
                ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
            ),
        ),
        (
            "sliding_aggregate",
            scan(&catalog, events)
                .filter(recent)
                .aggregate(vec![0], vec![AggregateCall::count_star("n")]),
        ),
    ];
    Setup {
        catalog,
        pipeline: ExecutionPipeline::stream_and_database(),
        config: ConverterConfig::default(),
        queries,
    }
}

// ── Benchmarks ──────────────────────────────────────────────────────

fn bench_convert(c: &mut Criterion) {
    let s = setup();
    let Some(stage) = s.pipeline.get("stream").map(Arc::clone) else {
        return;
    };
    let mut group = c.benchmark_group("convert_stream_stage");
    for (name, node) in &s.queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), node, |b, node| {
            b.iter(|| {
                let converter =
                    PlanConverter::new(&s.catalog, &s.pipeline, Arc::clone(&stage), &s.config);
                black_box(converter.convert(black_box(node)))
            });
        });
    }
    group.finish();
}

fn bench_find_cheapest(c: &mut Criterion) {
    let s = setup();
    let mut group = c.benchmark_group("find_cheapest");
    for (name, node) in &s.queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), node, |b, node| {
            b.iter(|| {
                black_box(find_cheapest(
                    black_box(node),
                    &s.catalog,
                    &s.pipeline,
                    &s.config,
                    &SimpleCostModel,
                ))
            });
        });
    }
    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let s = setup();
    let plans: Vec<_> = s
        .queries
        .iter()
        .filter_map(|(name, node)| {
            find_cheapest(node, &s.catalog, &s.pipeline, &s.config, &SimpleCostModel)
                .ok()
                .map(|selected| (*name, selected.plan))
        })
        .collect();
    let mut group = c.benchmark_group("materialize");
    for (name, plan) in &plans {
        group.bench_with_input(BenchmarkId::from_parameter(name), plan, |b, plan| {
            b.iter(|| black_box(plan.clone().materialize()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_convert, bench_find_cheapest, bench_materialize);
criterion_main!(benches);
