//! Sort conversion.
//!
//! An unlimited sort is only recorded. A sort with a limit becomes a pending
//! Top-N constraint over the whole table; the table keeps its type.

use strata_core::catalog::TableType;
use strata_core::execution::Capability;
use strata_core::rel::{Collation, RelNode};
use strata_core::time::TimestampProvenance;
use strata_core::topn::TopNConstraint;
use tracing::debug;

use super::{AnnotatedPlan, PlanConverter, PlanningError};

impl PlanConverter<'_> {
    pub(crate) fn visit_sort(
        &self,
        input: &RelNode,
        collation: &Collation,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<AnnotatedPlan, PlanningError> {
        if offset.is_some() {
            return Err(PlanningError::Unsupported("OFFSET".into()));
        }
        let mut plan = self.visit(input)?;
        let select = plan.select.clone();
        let collation = collation.remap(|c| select.map(c));
        let Some(limit) = limit else {
            plan.sort = collation;
            return Ok(plan);
        };

        plan.inline_all()?;
        let constraint = TopNConstraint::new(Vec::new(), false, collation, Some(limit), plan.table_type);
        debug!(constraint = %constraint, "sort with limit");
        plan.analysis.require(Capability::Sort)?;
        plan.table_type = constraint.table_type();
        plan.top_n = constraint;
        plan.sort = Collation::empty();
        if plan.table_type == TableType::State {
            plan.timestamp = TimestampProvenance::none();
        }
        plan.lineage = None;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::Fixture;
    use strata_core::rel::FieldCollation;

    #[test]
    fn test_sort_without_limit_is_recorded() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events).sort(Collation::of(vec![FieldCollation::desc(1)]));
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.sort.indexes().collect::<Vec<_>>(), vec![1]);
        assert_eq!(plan.rel.kind_name(), "Scan");
    }

    #[test]
    fn test_sort_with_limit_keeps_table_type() {
        let fx = Fixture::new();
        let node = fx
            .scan(fx.events)
            .sort_limit(Collation::of(vec![FieldCollation::desc(2)]), 10);
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.timestamp.best_index(), Some(1));
        assert_eq!(plan.top_n.limit, Some(10));
        assert_eq!(plan.top_n.source_type, TableType::Stream);
        assert!(plan.sort.is_empty());

        // customers_v(customer_id, name, updated) is versioned
        let node = fx
            .scan(fx.customers)
            .sort_limit(Collation::of(vec![FieldCollation::asc(1)]), 5);
        let plan = fx.convert("stream", &node).unwrap();
        assert_eq!(plan.table_type, TableType::TemporalState);
        assert_eq!(plan.timestamp.best_index(), Some(2));
        assert_eq!(plan.top_n.limit, Some(5));
    }

    #[test]
    fn test_sort_with_limit_over_state_drops_time() {
        let fx = Fixture::new();
        let node = fx
            .scan(fx.orders)
            .aggregate(vec![1], vec![strata_core::rel::AggregateCall::count_star("n")])
            .sort_limit(Collation::of(vec![FieldCollation::desc(1)]), 3);
        let plan = fx.convert("database", &node).unwrap();
        assert_eq!(plan.table_type, TableType::State);
        assert!(plan.timestamp.is_empty());
    }

    #[test]
    fn test_database_stage_applies_limit() {
        let fx = Fixture::new();
        let node = fx
            .scan(fx.events)
            .sort_limit(Collation::of(vec![FieldCollation::desc(2)]), 10);
        let plan = fx.convert("database", &node).unwrap();
        assert!(plan.top_n.is_empty());
        assert_eq!(plan.rel.kind_name(), "PartitionLimit");
    }

    #[test]
    fn test_offset_rejected() {
        let fx = Fixture::new();
        let node = RelNode::Sort {
            input: Box::new(fx.scan(fx.events)),
            collation: Collation::empty(),
            limit: Some(5),
            offset: Some(5),
        };
        assert!(matches!(
            fx.convert("stream", &node),
            Err(PlanningError::Unsupported(_))
        ));
    }
}
