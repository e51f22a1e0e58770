//! Filter conversion: now-filter extraction and merging.

use strata_core::rel::{RelNode, ScalarExpr};
use strata_core::time::NowFilter;
use tracing::debug;

use super::time_predicate::extract_time_predicate;
use super::{AnnotatedPlan, PlanConverter, PlanningError};

impl PlanConverter<'_> {
    pub(crate) fn visit_filter(
        &self,
        input: &RelNode,
        predicate: &ScalarExpr,
    ) -> Result<AnnotatedPlan, PlanningError> {
        let mut plan = self.visit(input)?;
        plan.inline_top_n()?;
        let select = &plan.select;
        let predicate = predicate.remap_columns(&|c| select.map(c));

        let mut remaining = Vec::new();
        for conjunct in predicate.conjunctions() {
            if !conjunct.contains_now() {
                remaining.push(conjunct);
                continue;
            }
            let extracted = extract_time_predicate(&conjunct, |c| plan.timestamp.is_candidate(c))
                .and_then(|p| NowFilter::from_predicate(&p));
            let Some(filter) = extracted else {
                remaining.push(conjunct);
                continue;
            };
            let merged = match &plan.now_filter {
                None => filter,
                Some(existing) => existing.merge(&filter).ok_or_else(|| {
                    PlanningError::unsatisfiable(
                        format!("now-filters '{existing}' and '{filter}' conflict"),
                        &plan.rel,
                    )
                })?,
            };
            debug!(now_filter = %merged, "extracted now-filter");
            plan.timestamp = plan.timestamp.fix_as_timestamp(filter.timestamp);
            plan.now_filter = Some(merged);
        }

        if !remaining.is_empty() {
            plan.analysis.require_expressions(remaining.iter())?;
            plan.rel = plan.rel.filter(ScalarExpr::and(remaining));
            plan.lineage = None;
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::Fixture;
    use strata_core::rel::ScalarValue;
    use strata_core::time::{NowComparison, MS_PER_HOUR};

    fn recent(ts: usize, ms: i64) -> ScalarExpr {
        ScalarExpr::gt(
            ScalarExpr::col(ts),
            ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(ms)),
        )
    }

    #[test]
    fn test_now_comparison_becomes_now_filter() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).filter(recent(1, MS_PER_HOUR));
        let plan = fx.convert("stream", &node).unwrap();
        let filter = plan.now_filter.unwrap();
        assert_eq!(filter.timestamp, 1);
        assert_eq!(filter.comparison, NowComparison::Gt);
        assert_eq!(filter.interval_ms, MS_PER_HOUR);
        assert!(plan.timestamp.is_fixed());
        assert_eq!(plan.rel.kind_name(), "Scan");
    }

    #[test]
    fn test_tighter_now_filter_wins() {
        let fx = Fixture::new();
        let node = fx
            .scan(fx.events)
            .filter(recent(1, 2 * MS_PER_HOUR))
            .filter(recent(1, MS_PER_HOUR));
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.now_filter.unwrap().interval_ms, MS_PER_HOUR);
    }

    #[test]
    fn test_conflicting_now_filters_are_unsatisfiable() {
        let fx = Fixture::new();
        let older = ScalarExpr::lt(
            ScalarExpr::col(1),
            ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(2 * MS_PER_HOUR)),
        );
        let node = fx
            .scan(fx.events)
            .filter(ScalarExpr::and(vec![recent(1, MS_PER_HOUR), older]));
        let err = fx.convert("stream", &node).unwrap_err();
        assert!(matches!(err, PlanningError::Unsatisfiable { .. }));
    }

    #[test]
    fn test_other_conjuncts_stay_concrete() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).filter(ScalarExpr::and(vec![
            recent(1, MS_PER_HOUR),
            ScalarExpr::gt(ScalarExpr::col(2), ScalarExpr::lit(ScalarValue::Int64(5))),
        ]));
        let plan = fx.convert("stream", &node).unwrap();
        assert!(plan.now_filter.is_some());
        assert_eq!(plan.rel.kind_name(), "Filter");
        assert!(plan.lineage.is_none());
    }

    #[test]
    fn test_read_stage_inlines_now_filter() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).filter(recent(1, MS_PER_HOUR));
        let plan = fx.convert("database", &node).unwrap();
        assert!(plan.now_filter.is_none());
        assert_eq!(plan.rel.kind_name(), "Filter");
    }
}
