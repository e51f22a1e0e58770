//! Aggregate conversion.
//!
//! The rules, in order of preference:
//!
//! 1. grouping by a timestamp candidate is a tumbling window,
//! 2. a pending recent-now-filter on a write stage becomes a sliding window,
//! 3. grouping by the root key of a stream keeps it a stream,
//! 4. other streams get a running aggregate per input row,
//! 5. everything else is a plain aggregate producing state.
//!
//! Tumbling windows may contain buckets that are still filling up. Consumers
//! that need closed buckets must compare against the current bucket boundary
//! themselves.

use strata_core::catalog::TableType;
use strata_core::execution::Capability;
use strata_core::index_map::IndexMap;
use strata_core::rel::{
    AggregateCall, AggregateHint, Collation, FieldCollation, ProjectExpr, RelNode, ScalarExpr,
    SlidingAggregationHint, TumbleAggregationHint,
};
use strata_core::time::{DerivationKind, NowFilter, TimestampProvenance};
use strata_core::topn::TopNConstraint;
use tracing::debug;

use super::{AnnotatedPlan, PlanConverter, PlanningError};

/// Output positions of an aggregate whose operator sorts its group columns.
#[derive(Debug)]
struct AggregateLayout {
    /// Group columns as the operator receives them.
    sorted: Vec<usize>,
    primary_key: Vec<usize>,
    select: Vec<usize>,
    width: usize,
}

impl AggregateLayout {
    /// Output position of input group column `column`.
    fn position(&self, column: usize) -> Option<usize> {
        self.sorted.binary_search(&column).ok()
    }
}

/// Derives primary key and select map of an aggregate over `keys` (in the
/// order the query wrote them) plus `hidden` group columns that are only
/// carried along.
fn aggregate_pk_and_select(keys: &[usize], hidden: &[usize], num_calls: usize) -> AggregateLayout {
    let mut sorted: Vec<usize> = keys.iter().chain(hidden).copied().collect();
    sorted.sort_unstable();
    sorted.dedup();
    let position = |c: usize| sorted.binary_search(&c).unwrap_or_else(|_| unreachable!());
    let primary_key: Vec<usize> = keys.iter().map(|&k| position(k)).collect();
    let select = primary_key
        .iter()
        .copied()
        .chain(sorted.len()..sorted.len() + num_calls)
        .collect();
    let width = sorted.len() + num_calls;
    AggregateLayout {
        sorted,
        primary_key,
        select,
        width,
    }
}

/// The tumbling hint for grouping by input column `timestamp`.
fn tumble_hint(input: &RelNode, timestamp: usize) -> TumbleAggregationHint {
    if let RelNode::Project { exprs, .. } = input {
        if let Some(ScalarExpr::Call { function, args }) = exprs.get(timestamp).map(|e| &e.expr) {
            if let (Some(bucket), Some(source)) =
                (function.bucket(), args.first().and_then(ScalarExpr::as_column))
            {
                return TumbleAggregationHint::function(timestamp, source, bucket);
            }
        }
    }
    TumbleAggregationHint::Instant { timestamp }
}

impl PlanConverter<'_> {
    pub(crate) fn visit_aggregate(
        &self,
        input: &RelNode,
        group_by: &[usize],
        grouping_sets: &[Vec<usize>],
        calls: &[AggregateCall],
    ) -> Result<AnnotatedPlan, PlanningError> {
        if !grouping_sets.is_empty() {
            return Err(PlanningError::Unsupported("grouping sets".into()));
        }
        if let Some(call) = calls.iter().find(|c| c.ordered || c.filter.is_some()) {
            return Err(PlanningError::Unsupported(format!(
                "ordered or filtered aggregate call {call}"
            )));
        }
        let mut plan = self.visit(input)?;
        // deduplication happens before grouping
        plan.inline_top_n()?;
        plan.sort = Collation::empty();
        let select = plan.select.clone();
        let keys: Vec<usize> = group_by.iter().map(|&g| select.map(g)).collect();
        let calls: Vec<AggregateCall> = calls.iter().map(|c| c.remap(|a| select.map(a))).collect();
        plan.analysis.require_aggregates(&calls)?;

        let timestamp_keys: Vec<usize> = keys
            .iter()
            .copied()
            .filter(|&k| plan.timestamp.is_candidate(k))
            .collect();
        if plan.table_type == TableType::Stream {
            match timestamp_keys.as_slice() {
                [] => {}
                [ts] => return self.tumble_aggregate(plan, &keys, calls, *ts),
                _ => {
                    return Err(PlanningError::InvalidWindow(format!(
                        "grouping by more than one timestamp: {timestamp_keys:?}"
                    )))
                }
            }
            if let Some(filter) = plan.now_filter.filter(|f| f.is_recent()) {
                if self.stage.is_write() {
                    return self.sliding_aggregate(plan, &keys, calls, filter);
                }
            }
            if self.is_root_key_grouping(&plan, &keys) {
                return self.root_key_aggregate(plan, &keys, calls);
            }
        }
        if plan.table_type != TableType::State
            && plan.timestamp.has_candidates()
            && self.stage.is_write()
            && self.stage.supports(Capability::WindowAggregate)
        {
            return self.running_aggregate(plan, &keys, calls);
        }
        self.plain_aggregate(plan, &keys, calls)
    }

    fn is_root_key_grouping(&self, plan: &AnnotatedPlan, keys: &[usize]) -> bool {
        let Some(n) = plan.num_root_pks.filter(|&n| n > 0) else {
            return false;
        };
        self.stage.is_write()
            && self.stage.supports(Capability::DirectWrite)
            && plan.timestamp.has_candidates()
            && keys.len() >= n
            && plan.primary_key.source_length() >= n
            && keys[..n] == plan.primary_key.targets()[..n]
    }

    /// Moves the pending now-filter onto the aggregate output if it bounds
    /// `timestamp`; any other now-filter is applied first.
    fn carry_now_filter(
        plan: &mut AnnotatedPlan,
        timestamp: usize,
    ) -> Result<Option<NowFilter>, PlanningError> {
        match plan.now_filter {
            Some(filter) if filter.timestamp == timestamp => {
                plan.now_filter = None;
                Ok(Some(filter))
            }
            Some(_) => {
                plan.inline_now_filter()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn tumble_aggregate(
        &self,
        mut plan: AnnotatedPlan,
        keys: &[usize],
        calls: Vec<AggregateCall>,
        timestamp: usize,
    ) -> Result<AnnotatedPlan, PlanningError> {
        plan.analysis.require(Capability::WindowAggregate)?;
        let kind = plan
            .timestamp
            .candidate(timestamp)
            .map_or(DerivationKind::SourceDefined, |c| c.kind);
        let now_filter = Self::carry_now_filter(&mut plan, timestamp)?;
        let hint = tumble_hint(&plan.rel, timestamp);
        debug!(?hint, "tumbling window aggregate");

        let layout = aggregate_pk_and_select(keys, &[], calls.len());
        let position = |c: usize| layout.position(c);
        let output_ts = layout.position(timestamp).unwrap_or_default();
        let rel = plan
            .rel
            .aggregate(layout.sorted.clone(), calls)
            .with_aggregate_hint(AggregateHint::Tumble(hint));
        let mut out = AnnotatedPlan::new(rel, TableType::Stream, layout.primary_key.clone(), plan.analysis);
        out.timestamp = TimestampProvenance::fixed(output_ts, kind);
        out.now_filter = now_filter.and_then(|f| f.remap(position));
        out.select = IndexMap::of(layout.select, layout.width);
        Ok(out)
    }

    fn sliding_aggregate(
        &self,
        mut plan: AnnotatedPlan,
        keys: &[usize],
        calls: Vec<AggregateCall>,
        filter: NowFilter,
    ) -> Result<AnnotatedPlan, PlanningError> {
        let window_ms = filter.interval_ms;
        let slide_ms = window_ms / i64::from(self.config.sliding_window_panes.max(1));
        if slide_ms <= 0 || slide_ms >= window_ms {
            return Err(PlanningError::InvalidWindow(format!(
                "slide of {slide_ms}ms for a window of {window_ms}ms"
            )));
        }
        plan.analysis.require(Capability::WindowAggregate)?;
        plan.now_filter = None;
        let hint = SlidingAggregationHint {
            timestamp: filter.timestamp,
            window_ms,
            slide_ms,
        };
        debug!(window_ms, slide_ms, "now-filter becomes sliding window");

        let layout = aggregate_pk_and_select(keys, &[filter.timestamp], calls.len());
        let output_ts = layout.position(filter.timestamp).unwrap_or_default();
        let rel = plan
            .rel
            .aggregate(layout.sorted.clone(), calls)
            .with_aggregate_hint(AggregateHint::Sliding(hint));
        let mut out = AnnotatedPlan::new(
            rel,
            TableType::TemporalState,
            layout.primary_key.clone(),
            plan.analysis,
        );
        out.timestamp = TimestampProvenance::fixed(output_ts, DerivationKind::WindowBucketed);
        out.top_n = TopNConstraint::dedup_window_aggregation(layout.primary_key, output_ts);
        out.select = IndexMap::of(layout.select, layout.width);
        Ok(out)
    }

    fn root_key_aggregate(
        &self,
        mut plan: AnnotatedPlan,
        keys: &[usize],
        calls: Vec<AggregateCall>,
    ) -> Result<AnnotatedPlan, PlanningError> {
        plan.analysis.require(Capability::DirectWrite)?;
        let timestamp = plan
            .now_filter
            .map(|f| f.timestamp)
            .or_else(|| plan.timestamp.best_index())
            .unwrap_or_default();
        let kind = plan
            .timestamp
            .candidate(timestamp)
            .map_or(DerivationKind::SourceDefined, |c| c.kind);
        let now_filter = Self::carry_now_filter(&mut plan, timestamp)?;
        debug!(timestamp, "root key aggregate keeps stream");

        let layout = aggregate_pk_and_select(keys, &[timestamp], calls.len());
        let position = |c: usize| layout.position(c);
        let output_ts = layout.position(timestamp).unwrap_or_default();
        let rel = plan
            .rel
            .aggregate(layout.sorted.clone(), calls)
            .with_aggregate_hint(AggregateHint::Tumble(TumbleAggregationHint::Instant {
                timestamp,
            }));
        let mut out = AnnotatedPlan::new(rel, TableType::Stream, layout.primary_key.clone(), plan.analysis);
        out.timestamp = TimestampProvenance::fixed(output_ts, kind);
        out.now_filter = now_filter.and_then(|f| f.remap(position));
        out.select = IndexMap::of(layout.select, layout.width);
        // every group key is now part of the root key
        out.num_root_pks = Some(keys.len());
        Ok(out)
    }

    /// One output row per input row with the running aggregate of its group.
    fn running_aggregate(
        &self,
        mut plan: AnnotatedPlan,
        keys: &[usize],
        calls: Vec<AggregateCall>,
    ) -> Result<AnnotatedPlan, PlanningError> {
        plan.analysis.require(Capability::WindowAggregate)?;
        let timestamp = plan
            .now_filter
            .map(|f| f.timestamp)
            .or_else(|| plan.timestamp.best_index())
            .unwrap_or_default();
        let kind = plan
            .timestamp
            .candidate(timestamp)
            .map_or(DerivationKind::SourceDefined, |c| c.kind);
        // the window must only count rows the filter keeps
        plan.inline_now_filter()?;

        let fields = plan.rel.fields();
        let mut exprs: Vec<ProjectExpr> = keys.iter().map(|&k| ProjectExpr::column(k, &fields)).collect();
        exprs.push(ProjectExpr::column(timestamp, &fields));
        let order_by = Collation::of(vec![FieldCollation::asc(timestamp)]);
        let num_calls = calls.len();
        for call in calls {
            let name = call.name.clone();
            let over = ScalarExpr::Over {
                call,
                partition_by: keys.to_vec(),
                order_by: order_by.clone(),
            };
            exprs.push(ProjectExpr::new(over, name, &fields));
        }
        debug!(groups = keys.len(), timestamp, "running aggregate");

        let g = keys.len();
        let width = exprs.len();
        let mut out = AnnotatedPlan::new(
            plan.rel.project(exprs),
            TableType::TemporalState,
            (0..g).collect(),
            plan.analysis,
        );
        out.timestamp = TimestampProvenance::fixed(g, kind);
        out.select = IndexMap::of((0..g).chain(g + 1..g + 1 + num_calls).collect(), width);
        Ok(out)
    }

    fn plain_aggregate(
        &self,
        mut plan: AnnotatedPlan,
        keys: &[usize],
        calls: Vec<AggregateCall>,
    ) -> Result<AnnotatedPlan, PlanningError> {
        plan.inline_all()?;
        let layout = aggregate_pk_and_select(keys, &[], calls.len());
        let rel = plan.rel.aggregate(layout.sorted, calls);
        let mut out = AnnotatedPlan::new(rel, TableType::State, layout.primary_key, plan.analysis);
        out.select = IndexMap::of(layout.select, layout.width);
        Ok(out)
    }
}
