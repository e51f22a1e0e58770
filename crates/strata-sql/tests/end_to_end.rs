//! End-to-end conversion tests over a small catalog.

use std::sync::{Arc, Once};

use arrow_schema::{DataType, Field, Fields, TimeUnit};
use strata_core::catalog::{nested_field, QueryTable, TableType};
use strata_core::rel::eval::{canonical, evaluate, EvalContext};
use strata_core::rel::{
    AggregateCall, AggregateHint, Collation, FieldCollation, JoinHint, JoinKind, ProjectExpr,
    RelNode, ScalarExpr, ScalarFunction, ScalarValue,
};
use strata_core::time::{TimestampProvenance, MS_PER_HOUR, MS_PER_MINUTE, UPPER_BOUND_INTERVAL_MS};
use strata_core::{Capability, Catalog, ExecutionPipeline, ExecutionStage, TableId};
use strata_sql::{
    find_cheapest, AnnotatedPlan, ConverterConfig, PlanConverter, PlanningError, SimpleCostModel,
    StageSelectionError,
};

static INIT: Once = Once::new();

/// Route planner logs to the test output; `RUST_LOG` overrides the level.
fn init_tracing() {
    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

struct Env {
    catalog: Catalog,
    pipeline: ExecutionPipeline,
    config: ConverterConfig,
    events: usize,
    customers: usize,
    orders: usize,
    items: usize,
}

impl Env {
    fn new() -> Self {
        init_tracing();
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
        Self {
            catalog,
            pipeline: ExecutionPipeline::stream_and_database(),
            config: ConverterConfig::default(),
            events,
            customers,
            orders,
            items,
        }
    }

    fn scan(&self, vid: usize) -> RelNode {
        let vt = self.catalog.virtual_table(vid);
        RelNode::scan(TableId::Virtual(vid), vt.name.clone(), vt.fields.clone())
    }

    fn convert(&self, stage: &str, node: &RelNode) -> Result<AnnotatedPlan, PlanningError> {
        let stage = Arc::clone(self.pipeline.get(stage).unwrap());
        PlanConverter::new(&self.catalog, &self.pipeline, stage, &self.config).convert(node)
    }
}

fn recent(ts: usize, ms: i64) -> ScalarExpr {
    ScalarExpr::gt(
        ScalarExpr::col(ts),
        ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(ms)),
    )
}

/// One query per conversion rule.
fn queries(env: &Env) -> Vec<RelNode> {
    let events = env.catalog.virtual_table(env.events).fields.clone();
    let minute = ScalarExpr::call(ScalarFunction::end_of_minute(), vec![ScalarExpr::col(1)]);
    vec![
        env.scan(env.items),
        env.scan(env.events).aggregate(vec![0], vec![AggregateCall::count_star("n")]),
        env.scan(env.events)
            .filter(recent(1, MS_PER_HOUR))
            .aggregate(vec![0], vec![AggregateCall::count_star("n")]),
        env.scan(env.orders).join(
            env.scan(env.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        ),
        env.scan(env.events).join(
            env.scan(env.orders),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(2), ScalarExpr::col(4)),
        ),
        env.scan(env.items).project_columns(&[2, 0]),
        RelNode::union_all(vec![env.scan(env.events), env.scan(env.orders)]),
        env.scan(env.events).filter(recent(1, MS_PER_HOUR)),
        env.scan(env.events).project(vec![
            ProjectExpr::new(minute.clone(), "minute", &events),
            ProjectExpr::column(2, &events),
        ]),
        env.scan(env.events)
            .project(vec![
                ProjectExpr::new(minute, "minute", &events),
                ProjectExpr::column(2, &events),
            ])
            .aggregate(vec![0], vec![AggregateCall::count_star("n")]),
        env.scan(env.orders).aggregate(vec![1], vec![AggregateCall::count_star("n")]),
        env.scan(env.events).sort(Collation::of(vec![FieldCollation::asc(2)])),
        env.scan(env.events).sort_limit(Collation::of(vec![FieldCollation::desc(1)]), 3),
        env.scan(env.events).join(
            env.scan(env.events),
            JoinKind::Default,
            ScalarExpr::and(vec![
                ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
                ScalarExpr::gt_eq(
                    ScalarExpr::col(1),
                    ScalarExpr::minus(ScalarExpr::col(4), ScalarExpr::interval_ms(MS_PER_MINUTE)),
                ),
            ]),
        ),
        env.scan(env.items).join(
            env.scan(env.orders),
            JoinKind::Inner,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
        ),
    ]
}

#[test]
fn test_root_key_aggregate_scenario() {
    let env = Env::new();
    let node = env
        .scan(env.events)
        .aggregate(vec![0], vec![AggregateCall::count_star("n")]);
    let selected =
        find_cheapest(&node, &env.catalog, &env.pipeline, &env.config, &SimpleCostModel).unwrap();
    assert_eq!(selected.stage.name, "stream");
    let plan = selected.plan;
    assert_eq!(plan.table_type, TableType::Stream);
    assert_eq!(plan.primary_key.targets(), &[0]);
    assert!(plan.timestamp.is_fixed());
    assert_eq!(plan.timestamp.best_index(), Some(1));
    assert_eq!(plan.select.targets(), &[0, 2]);
}

#[test]
fn test_temporal_join_scenario() {
    let env = Env::new();
    let node = env.scan(env.orders).join(
        env.scan(env.customers),
        JoinKind::Default,
        ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
    );
    let selected =
        find_cheapest(&node, &env.catalog, &env.pipeline, &env.config, &SimpleCostModel).unwrap();
    let plan = selected.plan;
    assert_eq!(plan.table_type, TableType::Stream);
    assert_eq!(plan.primary_key.targets(), &[0]);
    assert_eq!(plan.timestamp.best_index(), Some(2));
    match &plan.rel {
        RelNode::Join {
            hint: Some(JoinHint::Temporal(hint)),
            ..
        } => assert_eq!(hint.state_primary_key, vec![0]),
        other => panic!("expected temporal join, got {}", other.explain()),
    }
}

#[test]
fn test_sliding_window_scenario() {
    let env = Env::new();
    let node = env
        .scan(env.events)
        .filter(recent(1, MS_PER_HOUR))
        .aggregate(vec![0], vec![AggregateCall::count_star("n")]);
    let plan = env.convert("stream", &node).unwrap();
    assert_eq!(plan.table_type, TableType::TemporalState);
    assert_eq!(plan.rel.count_nodes(&|n| matches!(n, RelNode::Filter { .. })), 0);
    match &plan.rel {
        RelNode::Aggregate {
            hint: Some(AggregateHint::Sliding(hint)),
            ..
        } => assert_eq!(hint.window_ms, MS_PER_HOUR),
        other => panic!("expected sliding aggregate, got {}", other.explain()),
    }
    assert_eq!(plan.top_n.limit, Some(1));
    assert_eq!(plan.top_n.partition, plan.primary_key.targets_as_list());
}

#[test]
fn test_materialized_plans_are_continuous() {
    let env = Env::new();
    for node in queries(&env) {
        let mut converted = 0;
        for stage in ["stream", "database"] {
            let Ok(plan) = env.convert(stage, &node) else {
                continue;
            };
            converted += 1;
            let (plan, manifest) = plan.materialize().unwrap();
            assert!(plan.is_continuous(), "{plan}");
            assert!(!plan.has_pending());
            assert_eq!(manifest.primary_key, plan.primary_key.targets_as_list());
        }
        assert!(converted > 0, "no stage converts {}", node.explain());
    }
}

#[test]
fn test_state_plans_have_no_time() {
    let env = Env::new();
    let mut seen_state = false;
    for node in queries(&env) {
        for stage in ["stream", "database"] {
            let Ok(plan) = env.convert(stage, &node) else {
                continue;
            };
            if plan.table_type == TableType::State {
                seen_state = true;
                assert!(plan.timestamp.is_empty(), "{plan}");
                assert!(plan.now_filter.is_none(), "{plan}");
            }
        }
    }
    assert!(seen_state);
}

#[test]
fn test_trivial_projections_compose() {
    let env = Env::new();
    let twice = env
        .scan(env.events)
        .project_columns(&[2, 0, 1])
        .project_columns(&[1, 2, 0]);
    let once = env.scan(env.events).project_columns(&[0, 1, 2]);
    let a = env.convert("stream", &twice).unwrap();
    let b = env.convert("stream", &once).unwrap();
    assert_eq!(a.rel, b.rel);
    assert_eq!(a.select, b.select);
    assert_eq!(a.rel.count_nodes(&|n| matches!(n, RelNode::Project { .. })), 0);
}

fn int(v: i64) -> ScalarValue {
    ScalarValue::Int64(v)
}

#[test]
fn test_self_join_collapse_preserves_rows() {
    let env = Env::new();
    let base = env.catalog.base_of(env.orders);
    let items = vec![
        vec![int(10), int(2)],
        vec![int(11), int(1)],
        vec![int(12), int(5)],
    ];
    let ctx = EvalContext::new(0)
        .with_table(
            TableId::Query(base),
            vec![vec![
                int(1),
                int(7),
                ScalarValue::TimestampMs(1_000),
                ScalarValue::List(items),
            ]],
        )
        .with_table(
            TableId::Virtual(env.orders),
            vec![vec![int(1), int(7), ScalarValue::TimestampMs(1_000)]],
        )
        .with_table(
            TableId::Virtual(env.items),
            vec![
                vec![int(1), int(10), int(2)],
                vec![int(1), int(11), int(1)],
                vec![int(1), int(12), int(5)],
            ],
        );

    let node = env.scan(env.items).join(
        env.scan(env.orders),
        JoinKind::Inner,
        ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
    );
    let expected = canonical(evaluate(&node, &ctx).unwrap());
    assert_eq!(expected.len(), 3);

    let plan = env.convert("stream", &node).unwrap();
    assert_eq!(plan.rel.count_nodes(&|n| matches!(n, RelNode::Join { .. })), 0);
    let num_visible = plan.select.source_length();
    let (plan, _) = plan.materialize().unwrap();
    let rows = evaluate(&plan.rel, &ctx)
        .unwrap()
        .into_iter()
        .map(|mut row| {
            row.truncate(num_visible);
            row
        })
        .collect();
    assert_eq!(canonical(rows), expected);
}

#[test]
fn test_interval_join_gets_synthetic_bound() {
    let env = Env::new();
    let condition = ScalarExpr::and(vec![
        ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
        ScalarExpr::gt_eq(
            ScalarExpr::col(1),
            ScalarExpr::minus(ScalarExpr::col(4), ScalarExpr::interval_ms(5 * MS_PER_MINUTE)),
        ),
    ]);
    let node = env
        .scan(env.events)
        .join(env.scan(env.events), JoinKind::Default, condition);
    let plan = env.convert("stream", &node).unwrap();
    assert_eq!(plan.table_type, TableType::Stream);
    match &plan.rel {
        RelNode::Join {
            hint: Some(JoinHint::Interval(hint)),
            condition,
            ..
        } => {
            assert_eq!(hint.lower_bound_ms, -UPPER_BOUND_INTERVAL_MS);
            // key equality, the written bound and the synthetic one
            assert_eq!(condition.conjunctions().len(), 3);
        }
        other => panic!("expected interval join, got {}", other.explain()),
    }
}

#[test]
fn test_union_branches_get_own_timestamp() {
    let env = Env::new();
    let node = RelNode::union_all(vec![env.scan(env.events), env.scan(env.orders)]);
    let plan = env.convert("stream", &node).unwrap();
    let RelNode::Union { inputs, .. } = &plan.rel else {
        panic!("expected union, got {}", plan.rel.kind_name());
    };
    for input in inputs {
        let fields = input.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[3].name(), "_timestamp");
    }
    assert!(plan.timestamp.is_fixed());
    assert_eq!(plan.timestamp.best_index(), Some(3));
    assert_eq!(plan.primary_key.targets(), &[0]);
}

#[test]
fn test_every_failed_stage_is_reported() {
    let env = Env::new();
    let node = env.scan(env.orders).join(
        env.scan(env.customers),
        JoinKind::Temporal,
        ScalarExpr::eq(ScalarExpr::col(2), ScalarExpr::col(4)),
    );
    let err = find_cheapest(&node, &env.catalog, &env.pipeline, &env.config, &SimpleCostModel)
        .unwrap_err();
    let StageSelectionError::NoViableStage { failures } = err else {
        panic!("expected no viable stage");
    };
    let stages: Vec<&str> = failures.iter().map(|f| f.stage.as_str()).collect();
    assert_eq!(stages, vec!["stream", "database"]);
    assert!(failures
        .iter()
        .all(|f| matches!(f.error, PlanningError::InvalidTemporalJoin(_))));
}

#[test]
fn test_stage_without_capability_is_skipped() {
    let mut env = Env::new();
    env.pipeline = ExecutionPipeline::new(vec![
        ExecutionStage::stream("stream").without(Capability::WindowAggregate),
        ExecutionStage::database("database"),
    ]);
    let node = env
        .scan(env.events)
        .filter(recent(1, MS_PER_HOUR))
        .aggregate(vec![0], vec![AggregateCall::count_star("n")]);
    let selected =
        find_cheapest(&node, &env.catalog, &env.pipeline, &env.config, &SimpleCostModel).unwrap();
    assert_eq!(selected.stage.name, "database");
    assert_eq!(selected.rejected.len(), 1);
    assert_eq!(selected.plan.table_type, TableType::State);
}
