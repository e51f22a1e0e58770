//! Join conversion.
//!
//! Rules are tried in order: self-join collapse over a shredded entity,
//! temporal join, interval join, and finally a plain join producing state.

use rustc_hash::FxHashSet;
use strata_core::catalog::{TableType, VirtualKind};
use strata_core::execution::{Capability, ExecutionAnalysis};
use strata_core::index_map::{IndexMap, IndexMapBuilder};
use strata_core::lineage::LineageJoinKind;
use strata_core::rel::{
    Collation, IntervalJoinHint, JoinCostHint, JoinHint, JoinKind, RelNode, ScalarExpr,
    TemporalJoinHint,
};
use strata_core::time::{BoundComparison, TimeOperand, TimePredicate, UPPER_BOUND_INTERVAL_MS};
use tracing::debug;

use super::time_predicate::JoinCondition;
use super::{AnnotatedPlan, PlanConverter, PlanningError};

/// Converted inputs of a join with the condition in joined-row coordinates.
struct JoinInputs {
    left: AnnotatedPlan,
    right: AnnotatedPlan,
    kind: JoinKind,
    condition: ScalarExpr,
    analyzed: JoinCondition,
    analysis: ExecutionAnalysis,
}

impl JoinInputs {
    fn left_width(&self) -> usize {
        self.left.field_count()
    }

    fn width(&self) -> usize {
        self.left.field_count() + self.right.field_count()
    }

    fn rel_kind(&self) -> JoinKind {
        if self.kind == JoinKind::Left {
            JoinKind::Left
        } else {
            JoinKind::Inner
        }
    }
}

fn joined_sort(left: &Collation, right: &Collation, offset: usize) -> Collation {
    left.join(&right.remap(|c| c + offset))
}

/// Bounds of `right - left` found in an interval join condition.
#[derive(Debug, Default)]
struct IntervalBounds {
    columns: Option<(usize, usize)>,
    lower: Option<(TimePredicate, i64)>,
    upper: Option<(TimePredicate, i64)>,
    equality: bool,
}

impl IntervalBounds {
    fn collect(predicates: &[TimePredicate], left_width: usize) -> Result<Self, String> {
        let mut bounds = Self::default();
        for p in predicates {
            let (Some(a), Some(b)) = (p.larger.column(), p.smaller.column()) else {
                return Err(format!("'{p}' does not compare two timestamps"));
            };
            let right_larger = a >= left_width;
            let columns = if right_larger { (b, a) } else { (a, b) };
            if bounds.columns.is_some_and(|c| c != columns) {
                return Err("bounds compare different timestamp columns".into());
            }
            bounds.columns = Some(columns);
            // right - left, as bounded by this predicate
            let value = if right_larger {
                p.interval_ms
            } else {
                -p.interval_ms
            };
            if p.comparison == BoundComparison::Eq {
                if bounds.lower.is_some() || bounds.upper.is_some() {
                    return Err("equality bound combined with other bounds".into());
                }
                bounds.lower = Some((*p, value));
                bounds.upper = Some((*p, value));
                bounds.equality = true;
            } else if right_larger {
                if bounds.upper.is_some() {
                    return Err("more than one upper bound".into());
                }
                bounds.upper = Some((*p, value));
            } else {
                if bounds.lower.is_some() {
                    return Err("more than one lower bound".into());
                }
                bounds.lower = Some((*p, value));
            }
        }
        if bounds.columns.is_none() {
            return Err("no time bound between the inputs".into());
        }
        Ok(bounds)
    }
}

impl PlanConverter<'_> {
    pub(crate) fn visit_join(
        &self,
        left: &RelNode,
        right: &RelNode,
        kind: JoinKind,
        condition: &ScalarExpr,
    ) -> Result<AnnotatedPlan, PlanningError> {
        if matches!(kind, JoinKind::Right | JoinKind::Full) {
            return Err(PlanningError::UnsupportedJoin(kind));
        }
        if condition.contains_now() {
            return Err(PlanningError::Unsupported(
                "now() in a join condition".into(),
            ));
        }
        let l = self.visit(left)?;
        let r = self.visit(right)?;
        let analysis = self.combine(&l.analysis, &r.analysis)?;
        let lw = l.field_count();
        let lv = l.select.source_length();
        let condition = condition.remap_columns(&|c| {
            if c < lv {
                l.select.map(c)
            } else {
                lw + r.select.map(c - lv)
            }
        });
        let analyzed = JoinCondition::analyze(&condition, lw, |c| {
            if c < lw {
                l.timestamp.is_candidate(c)
            } else {
                r.timestamp.is_candidate(c - lw)
            }
        });
        let join = JoinInputs {
            left: l,
            right: r,
            kind,
            condition,
            analyzed,
            analysis,
        };

        if matches!(kind, JoinKind::Default | JoinKind::Inner | JoinKind::Left) {
            if let Some(plan) = self.collapse_self_join(&join)? {
                return Ok(plan);
            }
        }
        if matches!(kind, JoinKind::Default | JoinKind::Temporal | JoinKind::Left) {
            if let Some(plan) = self.temporal_join(&join)? {
                return Ok(plan);
            }
        }
        if matches!(
            kind,
            JoinKind::Default | JoinKind::Inner | JoinKind::Interval | JoinKind::Left
        ) {
            if let Some(plan) = self.interval_join(&join)? {
                return Ok(plan);
            }
        }
        self.state_join(join)
    }

    /// Joins two unrollings of the same entity on their ancestor keys by
    /// reusing the left rows, unnesting right levels the left lacks. Left
    /// joins only collapse when no level is missing.
    fn collapse_self_join(&self, j: &JoinInputs) -> Result<Option<AnnotatedPlan>, PlanningError> {
        let (Some(left_lineage), Some(right_lineage)) = (&j.left.lineage, &j.right.lineage) else {
            return Ok(None);
        };
        if j.left.has_pending() || j.right.has_pending() || !j.analyzed.is_equi_join() {
            return Ok(None);
        }
        let Some(mut mapping) = left_lineage.join_tree_map(right_lineage, &j.analyzed.equalities)
        else {
            return Ok(None);
        };

        let unmatched: Vec<_> = right_lineage
            .ids()
            .filter(|&rid| mapping.get(rid).is_none())
            .collect();
        // a left row without children would need null right columns
        if j.kind == JoinKind::Left && !unmatched.is_empty() {
            return Ok(None);
        }

        let mut plan = j.left.clone();
        plan.analysis = j.analysis.clone();
        let mut lineage = left_lineage.clone();
        let mut new_pks = Vec::new();
        for rid in unmatched {
            let level = right_lineage.get(rid);
            let Some(parent) = level.parent.and_then(|p| mapping.get(p)) else {
                return Ok(None);
            };
            let vt = self.catalog.virtual_table(level.table);
            let VirtualKind::Child { shred_field, .. } = vt.kind else {
                return Ok(None);
            };
            plan.analysis.require(Capability::Denormalize)?;
            let offset = plan.rel.field_count();
            let column = lineage.get(parent).offset + shred_field;
            plan.rel = plan.rel.unnest(column, false, vt.level_fields.clone());
            let lid = lineage.add_child(
                parent,
                level.table,
                LineageJoinKind::Inner,
                offset,
                vt.level_fields.len(),
                vt.num_local_pks,
            );
            new_pks.extend(lineage.get(lid).local_pks());
            mapping.insert(rid, lid);
        }

        let width = plan.rel.field_count();
        let right_column = |c: usize| {
            let rid = right_lineage.locate(c)?;
            let lid = mapping.get(rid)?;
            Some(lineage.get(lid).offset + c - right_lineage.get(rid).offset)
        };
        let Some(right_select) = j.right.select.try_remap(width, right_column) else {
            return Ok(None);
        };
        let mut select = IndexMapBuilder::extending(&plan.select, right_select.source_length());
        select.add_all(right_select.targets().iter().copied());
        let mut primary_key = IndexMapBuilder::extending(&plan.primary_key, new_pks.len());
        primary_key.add_all(new_pks);

        debug!(levels = lineage.len(), "collapsed self-join");
        plan.select = select.build(width);
        plan.primary_key = primary_key.build(width);
        plan.lineage = Some(lineage);
        Ok(Some(plan))
    }

    fn temporal_join(&self, j: &JoinInputs) -> Result<Option<AnnotatedPlan>, PlanningError> {
        let explicit = j.kind == JoinKind::Temporal;
        let swapped = match (j.left.table_type, j.right.table_type) {
            (TableType::Stream, TableType::TemporalState) => false,
            (TableType::TemporalState, TableType::Stream) if j.kind != JoinKind::Left => true,
            (l, r) => {
                if explicit {
                    return Err(PlanningError::InvalidTemporalJoin(format!(
                        "expected a stream and a versioned state table, found {l} and {r}"
                    )));
                }
                return Ok(None);
            }
        };
        let (stream, state) = if swapped {
            (&j.right, &j.left)
        } else {
            (&j.left, &j.right)
        };
        // (stream column, state column), each relative to its input
        let equalities: Vec<(usize, usize)> = j
            .analyzed
            .equalities
            .iter()
            .map(|&(l, r)| if swapped { (r, l) } else { (l, r) })
            .collect();

        let state_keys: FxHashSet<usize> = equalities.iter().map(|&(_, t)| t).collect();
        let state_pk: FxHashSet<usize> = state.primary_key.targets().iter().copied().collect();
        let failure = if state_pk.is_empty() || state_keys != state_pk {
            Some("the condition must equate the full primary key of the versioned table")
        } else if !j.analyzed.is_equi_join() {
            Some("the condition may only contain key equalities")
        } else if state.now_filter.is_some() {
            Some("the versioned table carries a now-filter")
        } else if !state.timestamp.has_candidates() || !stream.timestamp.has_candidates() {
            Some("both inputs need a timestamp")
        } else {
            None
        };
        if let Some(reason) = failure {
            if explicit {
                return Err(PlanningError::InvalidTemporalJoin(reason.into()));
            }
            debug!(reason, "not a temporal join");
            return Ok(None);
        }

        let mut stream = stream.clone();
        let mut state = state.clone();
        // the stream keeps its columns in front, so its now-filter stays
        // valid; it cannot move past a pending Top-N
        if !stream.top_n.is_empty() {
            stream.inline_all()?;
        }
        state.inline_all()?;
        let mut analysis = j.analysis.clone();
        analysis.require(Capability::TemporalJoin)?;

        let sw = stream.field_count();
        let width = j.width();
        let condition = ScalarExpr::and(
            equalities
                .iter()
                .map(|&(s, t)| ScalarExpr::eq(ScalarExpr::col(s), ScalarExpr::col(t + sw)))
                .collect(),
        );
        let timestamp = match stream.now_filter {
            Some(filter) if stream.timestamp.is_candidate(filter.timestamp) => {
                stream.timestamp.fix_as_timestamp(filter.timestamp)
            }
            _ => stream.timestamp.fix_best(),
        };
        let hint = TemporalJoinHint {
            stream_timestamp: timestamp.best_index().unwrap_or_default(),
            state_timestamp: state.timestamp.best_index().unwrap_or_default(),
            state_primary_key: state.primary_key.targets_as_list(),
        };
        // visible columns keep the order the query wrote them in
        let (select, sort) = if swapped {
            let mut select = IndexMapBuilder::with_capacity(
                state.select.source_length() + stream.select.source_length(),
            );
            select.add_all(state.select.targets().iter().map(|&c| c + sw));
            select.add_all(stream.select.targets().iter().copied());
            (
                select.build(width),
                state.sort.remap(|c| c + sw).join(&stream.sort),
            )
        } else {
            (
                stream.select.join(&state.select, sw),
                joined_sort(&stream.sort, &state.sort, sw),
            )
        };
        let rel = stream
            .rel
            .join(state.rel, j.rel_kind(), condition)
            .with_join_hint(JoinHint::Temporal(hint));
        let mut plan = AnnotatedPlan::new(
            rel,
            TableType::Stream,
            stream.primary_key.targets_as_list(),
            analysis,
        );
        plan.timestamp = timestamp;
        plan.now_filter = stream.now_filter;
        plan.select = select;
        plan.sort = sort;
        plan.num_root_pks = stream.num_root_pks;
        Ok(Some(plan))
    }

    fn interval_join(&self, j: &JoinInputs) -> Result<Option<AnnotatedPlan>, PlanningError> {
        let explicit = j.kind == JoinKind::Interval;
        let fail = |reason: String| {
            if explicit {
                Err(PlanningError::InvalidIntervalJoin(reason))
            } else {
                debug!(%reason, "not an interval join");
                Ok(None)
            }
        };
        let (l, r) = (&j.left, &j.right);
        if l.table_type != TableType::Stream
            || r.table_type != TableType::Stream
            || !l.timestamp.has_candidates()
            || !r.timestamp.has_candidates()
        {
            return fail("both inputs must be streams with a timestamp".into());
        }
        let lw = j.left_width();

        let mut predicates = j.analyzed.time_predicates.clone();
        let mut shared_root = None;
        if predicates.is_empty() {
            // events of the same root entity correlate one-to-one
            match (l.num_root_pks, r.num_root_pks) {
                (Some(n), Some(m)) if n == m && n > 0 => {
                    let equated = (0..n).all(|i| {
                        j.analyzed
                            .equalities
                            .contains(&(l.primary_key.map(i), r.primary_key.map(i)))
                    });
                    if !equated {
                        return fail("no time bound between the inputs".into());
                    }
                    let (Some(lt), Some(rt)) = (l.timestamp.best_index(), r.timestamp.best_index())
                    else {
                        return fail("no time bound between the inputs".into());
                    };
                    predicates.push(TimePredicate::new(
                        TimeOperand::Column(rt + lw),
                        TimeOperand::Column(lt),
                        BoundComparison::Eq,
                        0,
                    ));
                    shared_root = Some(n);
                }
                _ => return fail("no time bound between the inputs".into()),
            }
        }

        let mut bounds = match IntervalBounds::collect(&predicates, lw) {
            Ok(b) => b,
            Err(reason) => return fail(reason),
        };
        let user_upper = bounds.upper.is_some() && !bounds.equality;
        match (bounds.lower, bounds.upper) {
            (Some((lower, _)), None) => {
                let injected = lower.inverse_with_interval(UPPER_BOUND_INTERVAL_MS);
                predicates.push(injected);
                bounds.upper = Some((injected, UPPER_BOUND_INTERVAL_MS));
            }
            (None, Some((upper, _))) => {
                let injected = upper.inverse_with_interval(UPPER_BOUND_INTERVAL_MS);
                predicates.push(injected);
                bounds.lower = Some((injected, -UPPER_BOUND_INTERVAL_MS));
            }
            _ => {}
        }
        let (Some((lc, rc)), Some((_, lower_ms)), Some((_, upper_ms))) =
            (bounds.columns, bounds.lower, bounds.upper)
        else {
            return fail("incomplete time bounds".into());
        };

        let mut left = l.clone();
        let mut right = r.clone();
        left.inline_all()?;
        right.inline_all()?;
        let mut analysis = j.analysis.clone();
        analysis.require(Capability::IntervalJoin)?;

        let timestamp_column = if j.kind == JoinKind::Left || bounds.equality || !user_upper {
            lc
        } else {
            rc
        };
        let timestamp = if timestamp_column < lw {
            left.timestamp.fix_as_timestamp(timestamp_column)
        } else {
            right.timestamp.offset(lw).fix_as_timestamp(timestamp_column)
        };

        let mut conjuncts = j.analyzed.non_time_expr(lw).conjunctions();
        conjuncts.extend(predicates.iter().map(TimePredicate::to_expr));
        let hint = IntervalJoinHint {
            left_timestamp: lc,
            right_timestamp: rc,
            lower_bound_ms: lower_ms,
            upper_bound_ms: upper_ms,
        };
        debug!(lower_ms, upper_ms, "interval join");

        let width = j.width();
        let primary_key = match shared_root {
            Some(n) => {
                let extra = right.primary_key.source_length() - n;
                let mut pk = IndexMapBuilder::extending(&left.primary_key, extra);
                pk.add_all(right.primary_key.targets()[n..].iter().map(|&c| c + lw));
                pk.build(width)
            }
            None => left.primary_key.join(&right.primary_key, lw),
        };
        let rel = left
            .rel
            .join(right.rel, j.rel_kind(), ScalarExpr::and(conjuncts))
            .with_join_hint(JoinHint::Interval(hint));
        let mut plan = AnnotatedPlan::new(rel, TableType::Stream, Vec::new(), analysis);
        plan.primary_key = primary_key;
        plan.timestamp = timestamp;
        plan.select = left.select.join(&right.select, lw);
        plan.sort = joined_sort(&left.sort, &right.sort, lw);
        plan.num_root_pks = shared_root;
        Ok(Some(plan))
    }

    /// Plain equality join. Time semantics are lost.
    fn state_join(&self, j: JoinInputs) -> Result<AnnotatedPlan, PlanningError> {
        let rel_kind = j.rel_kind();
        let lw = j.left_width();
        let width = j.width();
        let JoinInputs {
            mut left,
            mut right,
            condition,
            analyzed,
            analysis,
            ..
        } = j;
        left.inline_all()?;
        right.inline_all()?;
        let hint = JoinCostHint {
            left_type: left.table_type,
            right_type: right.table_type,
            num_equalities: analyzed.equalities.len(),
        };
        let primary_key = if rel_kind == JoinKind::Left {
            IndexMap::of(left.primary_key.targets_as_list(), width)
        } else {
            left.primary_key.join(&right.primary_key, lw)
        };
        let select = left.select.join(&right.select, lw);
        let sort = joined_sort(&left.sort, &right.sort, lw);
        let rel = left
            .rel
            .join(right.rel, rel_kind, condition)
            .with_join_hint(JoinHint::Cost(hint));
        let mut plan = AnnotatedPlan::new(rel, TableType::State, Vec::new(), analysis);
        plan.primary_key = primary_key;
        plan.select = select;
        plan.sort = sort;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::Fixture;
    use strata_core::time::MS_PER_MINUTE;

    fn hint_of(plan: &AnnotatedPlan) -> Option<&JoinHint> {
        match &plan.rel {
            RelNode::Join { hint, .. } => hint.as_ref(),
            _ => None,
        }
    }

    #[test]
    fn test_temporal_join_orders_customers() {
        let fx = Fixture::new();
        // orders_v(order_id, customer_id, order_ts) customers_v(customer_id, name, updated)
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.primary_key.targets(), &[0]);
        assert_eq!(plan.timestamp.best_index(), Some(2));
        assert!(plan.timestamp.is_fixed());
        assert_eq!(plan.select.targets(), &[0, 1, 2, 4, 5, 6]);
        match hint_of(&plan) {
            Some(JoinHint::Temporal(h)) => assert_eq!(h.state_primary_key, vec![0]),
            other => panic!("unexpected hint {other:?}"),
        }
        assert!(plan.analysis.required().contains(&Capability::TemporalJoin));
    }

    #[test]
    fn test_temporal_join_keeps_stream_now_filter() {
        use strata_core::rel::{AggregateCall, AggregateHint};
        use strata_core::time::MS_PER_HOUR;

        let fx = Fixture::new();
        let recent = ScalarExpr::gt(
            ScalarExpr::col(2),
            ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(MS_PER_HOUR)),
        );
        let joined = fx.scan(fx.orders).filter(recent).join(
            fx.scan(fx.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let plan = fx.convert("stream", &joined).unwrap();
        assert!(matches!(hint_of(&plan), Some(JoinHint::Temporal(_))));
        assert_eq!(plan.now_filter.map(|f| f.timestamp), Some(2));
        assert_eq!(plan.timestamp.best_index(), Some(2));

        let node = joined.aggregate(vec![1], vec![AggregateCall::count_star("cnt")]);
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::TemporalState);
        match &plan.rel {
            RelNode::Aggregate {
                hint: Some(AggregateHint::Sliding(h)),
                ..
            } => assert_eq!(h.window_ms, MS_PER_HOUR),
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_temporal_join_swaps_state_to_the_right() {
        let fx = Fixture::new();
        let node = fx.scan(fx.customers).join(
            fx.scan(fx.orders),
            JoinKind::Inner,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(4)),
        );
        // inner joins are only temporal when the kind is left open
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::State);

        let node = fx.scan(fx.customers).join(
            fx.scan(fx.orders),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(4)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        // customers columns first, as written
        assert_eq!(plan.select.targets(), &[4, 5, 6, 0, 1, 2]);
        assert_eq!(plan.primary_key.targets(), &[0]);
    }

    #[test]
    fn test_explicit_temporal_join_on_non_key_fails() {
        let fx = Fixture::new();
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Temporal,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(4)),
        );
        let err = fx.convert("stream", &node).unwrap_err();
        assert!(matches!(err, PlanningError::InvalidTemporalJoin(_)));
    }

    #[test]
    fn test_temporal_join_not_supported_by_database() {
        let fx = Fixture::new();
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let err = fx.convert("database", &node).unwrap_err();
        assert!(matches!(err, PlanningError::Capability(_)));
    }

    #[test]
    fn test_interval_join_injects_missing_bound() {
        let fx = Fixture::new();
        // events(id, ts, v) twice; l.id = r.id AND l.ts >= r.ts - 5m
        let condition = ScalarExpr::and(vec![
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
            ScalarExpr::gt_eq(
                ScalarExpr::col(1),
                ScalarExpr::minus(ScalarExpr::col(4), ScalarExpr::interval_ms(5 * MS_PER_MINUTE)),
            ),
        ]);
        let node = fx
            .scan(fx.events)
            .join(fx.scan(fx.events), JoinKind::Default, condition);
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.primary_key.targets(), &[0, 3]);
        match hint_of(&plan) {
            Some(JoinHint::Interval(h)) => {
                assert_eq!(h.upper_bound_ms, 5 * MS_PER_MINUTE);
                assert_eq!(h.lower_bound_ms, -UPPER_BOUND_INTERVAL_MS);
            }
            other => panic!("unexpected hint {other:?}"),
        }
        assert!(plan.timestamp.is_fixed());
    }

    #[test]
    fn test_shared_root_key_becomes_interval_join() {
        let fx = Fixture::new();
        // orders_v(order_id, customer_id, order_ts) events_v(id, ts, v)
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.events),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.primary_key.targets(), &[0]);
        assert_eq!(plan.timestamp.best_index(), Some(2));
        assert_eq!(plan.num_root_pks, Some(1));
    }

    #[test]
    fn test_unbounded_stream_join_becomes_state() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).join(
            fx.scan(fx.orders),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(2), ScalarExpr::col(4)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::State);
        assert!(plan.timestamp.is_empty());
        assert_eq!(plan.primary_key.targets(), &[0, 3]);
        assert!(matches!(hint_of(&plan), Some(JoinHint::Cost(_))));
    }

    #[test]
    fn test_right_join_rejected() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).join(
            fx.scan(fx.orders),
            JoinKind::Right,
            ScalarExpr::eq(ScalarExpr::col(2), ScalarExpr::col(4)),
        );
        assert!(matches!(
            fx.convert("stream", &node),
            Err(PlanningError::UnsupportedJoin(JoinKind::Right))
        ));
    }

    #[test]
    fn test_now_in_join_condition_rejected() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).join(
            fx.scan(fx.orders),
            JoinKind::Default,
            ScalarExpr::gt(ScalarExpr::col(1), ScalarExpr::now()),
        );
        assert!(matches!(
            fx.convert("stream", &node),
            Err(PlanningError::Unsupported(_))
        ));
    }

    #[test]
    fn test_child_joined_to_parent_collapses() {
        let fx = Fixture::new();
        // items(order_id, item_id, qty) with orders(order_id, customer_id, order_ts)
        let node = fx.scan(fx.items).join(
            fx.scan(fx.orders),
            JoinKind::Inner,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.rel.count_nodes(&|n| matches!(n, RelNode::Join { .. })), 0);
        assert_eq!(plan.select.targets(), &[0, 4, 5, 0, 1, 2]);
        assert_eq!(plan.primary_key.targets(), &[0, 4]);
        assert_eq!(plan.table_type, TableType::Stream);
    }

    #[test]
    fn test_parent_joined_to_child_unnests() {
        let fx = Fixture::new();
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.items),
            JoinKind::Inner,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(3)),
        );
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.rel.kind_name(), "Unnest");
        assert_eq!(plan.select.targets(), &[0, 1, 2, 0, 4, 5]);
        assert_eq!(plan.primary_key.targets(), &[0, 4]);
        assert_eq!(plan.lineage.as_ref().map(|l| l.len()), Some(2));
        assert!(plan.analysis.required().contains(&Capability::Denormalize));
    }
}
