//! Scan conversion and eager denormalization of nested entities.

use std::sync::Arc;

use strata_core::catalog::{Pullups, QueryTable, TableType, VirtualKind};
use strata_core::execution::{Capability, ExecutionAnalysis};
use strata_core::index_map::IndexMap;
use strata_core::lineage::{JoinLineage, LineageJoinKind};
use strata_core::rel::{Collation, RelNode};
use strata_core::time::TimestampProvenance;
use strata_core::topn::TopNConstraint;
use strata_core::TableId;
use tracing::debug;

use super::{AnnotatedPlan, PlanConverter, PlanningError};

impl PlanConverter<'_> {
    pub(crate) fn visit_scan(&self, table: TableId) -> Result<AnnotatedPlan, PlanningError> {
        match table {
            TableId::Query(id) => self.scan_query_table(id),
            TableId::Virtual(id) => self.scan_virtual_table(id),
        }
    }

    /// Analysis for a scan of `base`, moving to the stage that materialized
    /// it when that stage is a read stage.
    fn scan_analysis(&self, base: &QueryTable) -> Result<ExecutionAnalysis, PlanningError> {
        let Some(stage_name) = &base.stage else {
            return Ok(self.start_analysis());
        };
        let Some(stage) = self.pipeline.get(stage_name) else {
            return Ok(self.start_analysis());
        };
        if stage.name == self.stage.name || !stage.is_read() {
            return Ok(self.start_analysis());
        }
        if !self.config.allow_stage_change {
            return Err(PlanningError::StageChange {
                from: self.stage.name.clone(),
                to: stage.name.clone(),
            });
        }
        Ok(ExecutionAnalysis::start(Arc::clone(stage)))
    }

    /// Pull-ups of `base` as they apply on the current stage.
    ///
    /// A primary-key deduplication materialized by another write stage is
    /// enforced by its keyed writes and dropped. State tables have no time.
    fn effective_pullups(&self, base: &QueryTable) -> Pullups {
        let mut pullups = base.pullups.clone();
        let written_elsewhere = base.stage.as_deref().is_some_and(|s| {
            s != self.stage.name && self.pipeline.get(s).is_some_and(|st| st.is_write())
        });
        if written_elsewhere && pullups.top_n.is_primary_key_dedup(base.num_primary_keys) {
            debug!(table = %base.name, "dropping key deduplication enforced by writes");
            pullups.top_n = TopNConstraint::empty();
        }
        if base.table_type == TableType::State {
            pullups.now_filter = None;
        }
        pullups
    }

    fn base_timestamp(base: &QueryTable) -> TimestampProvenance {
        if base.table_type == TableType::State {
            TimestampProvenance::none()
        } else {
            base.timestamp.clone()
        }
    }

    fn scan_query_table(&self, id: usize) -> Result<AnnotatedPlan, PlanningError> {
        let base = self.catalog.query(id);
        let rel = RelNode::scan(TableId::Query(id), base.name.clone(), base.fields.clone());
        let analysis = self.scan_analysis(base)?;
        let pullups = self.effective_pullups(base);
        let mut plan = AnnotatedPlan::new(
            rel,
            base.table_type,
            (0..base.num_primary_keys).collect(),
            analysis,
        );
        plan.timestamp = Self::base_timestamp(base);
        plan.now_filter = pullups.now_filter;
        plan.top_n = pullups.top_n;
        plan.sort = pullups.sort;
        plan.num_root_pks = Some(base.num_primary_keys);
        Ok(plan)
    }

    fn scan_virtual_table(&self, id: usize) -> Result<AnnotatedPlan, PlanningError> {
        let vt = self.catalog.virtual_table(id);
        let base_id = self.catalog.base_of(id);
        let base = self.catalog.query(base_id);
        let needs_unnest = !vt.is_root();
        if self.stage.supports(Capability::Denormalize) {
            return self.scan_denormalized(id, base_id);
        }
        debug!(table = %vt.name, needs_unnest, "scanning virtual table without denormalization");

        let analysis = self.scan_analysis(base)?;
        let pullups = self.effective_pullups(base);
        let rel = RelNode::scan(TableId::Virtual(id), vt.name.clone(), vt.fields.clone());
        let mut plan = AnnotatedPlan::new(
            rel,
            base.table_type,
            (0..vt.num_primary_keys()).collect(),
            analysis,
        );
        let root_pks = self.catalog.virtual_table(self.catalog.ancestry(id)[0]).num_local_pks;
        plan.num_root_pks = Some(root_pks);

        if vt.is_root() {
            // base columns move to their position among the own columns
            let position = |c: usize| vt.own_columns.iter().position(|&o| o == c);
            let pullups = pullups.remap(position);
            plan.timestamp = Self::base_timestamp(base).remap(position);
            plan.now_filter = pullups.now_filter;
            plan.top_n = pullups.top_n;
            plan.sort = pullups.sort;
        } else if pullups.now_filter.is_some() || !pullups.top_n.is_empty() {
            return Err(PlanningError::Unsupported(format!(
                "pending constraints of '{}' on nested table '{}'",
                base.name, vt.name
            )));
        }
        Ok(plan)
    }

    /// Unrolls the ancestry of virtual table `id` into an explicit chain of
    /// unnests over the base row, recording the lineage of every level.
    fn scan_denormalized(&self, id: usize, base_id: usize) -> Result<AnnotatedPlan, PlanningError> {
        let base = self.catalog.query(base_id);
        let mut analysis = self.scan_analysis(base)?;
        let pullups = self.effective_pullups(base);
        let ancestry = self.catalog.ancestry(id);
        let root = self.catalog.virtual_table(ancestry[0]);

        let mut rel = RelNode::scan(TableId::Query(base_id), base.name.clone(), base.fields.clone());
        let mut lineage = JoinLineage::root(ancestry[0], 0, base.fields.len(), root.num_local_pks);
        let mut top_n = pullups.top_n;
        let mut sort = pullups.sort;
        if ancestry.len() > 1 {
            analysis.require(Capability::Denormalize)?;
            // the root's deduplication must run before its rows are repeated
            if !top_n.is_empty() {
                analysis.require(Capability::Sort)?;
                rel = top_n.inline(rel);
                top_n = TopNConstraint::empty();
            }
            sort = Collation::empty();
        }

        let mut parent_offset = 0;
        for &level in &ancestry[1..] {
            let vt = self.catalog.virtual_table(level);
            let VirtualKind::Child { shred_field, .. } = vt.kind else {
                unreachable!("ancestry below the root holds child tables");
            };
            let offset = rel.field_count();
            rel = rel.unnest(parent_offset + shred_field, false, vt.level_fields.clone());
            lineage.add_child(
                lineage.leaf(),
                level,
                LineageJoinKind::Inner,
                offset,
                vt.level_fields.len(),
                vt.num_local_pks,
            );
            parent_offset = offset;
        }

        let width = rel.field_count();
        let primary_key: Vec<usize> = lineage.tables().iter().flat_map(|t| t.local_pks()).collect();
        let leaf = lineage.get(lineage.leaf());
        let leaf_vt = self.catalog.virtual_table(id);
        let select: Vec<usize> = lineage.tables()[..lineage.len() - 1]
            .iter()
            .flat_map(|t| t.local_pks())
            .chain(leaf_vt.own_columns.iter().map(|&c| leaf.offset + c))
            .collect();

        let mut plan = AnnotatedPlan::new(rel, base.table_type, primary_key, analysis);
        plan.select = IndexMap::of(select, width);
        plan.timestamp = Self::base_timestamp(base);
        plan.now_filter = pullups.now_filter;
        plan.top_n = top_n;
        plan.sort = sort;
        plan.num_root_pks = Some(root.num_local_pks);
        plan.lineage = Some(lineage);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::{orders_table, Fixture};
    use strata_core::time::NowFilter;
    use strata_core::Catalog;

    #[test]
    fn test_root_scan_on_stream_stage() {
        let fx = Fixture::new();
        let plan = fx.convert("stream", &fx.scan(fx.orders)).unwrap();
        assert_eq!(plan.table_type, TableType::Stream);
        assert_eq!(plan.primary_key.targets(), &[0]);
        assert_eq!(plan.select.targets(), &[0, 1, 2]);
        assert_eq!(plan.field_count(), 4);
        assert_eq!(plan.timestamp.best_index(), Some(2));
        assert_eq!(plan.lineage.as_ref().map(JoinLineage::len), Some(1));
        assert!(!plan.analysis.required().contains(&Capability::Denormalize));
    }

    #[test]
    fn test_child_scan_unnests_parent() {
        let fx = Fixture::new();
        let plan = fx.convert("stream", &fx.scan(fx.items)).unwrap();
        assert_eq!(plan.rel.kind_name(), "Unnest");
        // order_id, customer_id, order_ts, items | item_id, qty
        assert_eq!(plan.field_count(), 6);
        assert_eq!(plan.primary_key.targets(), &[0, 4]);
        assert_eq!(plan.select.targets(), &[0, 4, 5]);
        assert_eq!(plan.timestamp.best_index(), Some(2));
        assert_eq!(plan.num_root_pks, Some(1));
        assert!(plan.analysis.required().contains(&Capability::Denormalize));
    }

    #[test]
    fn test_child_scan_without_denormalize() {
        let fx = Fixture::new();
        let plan = fx.convert("database", &fx.scan(fx.items)).unwrap();
        assert_eq!(plan.rel.kind_name(), "Scan");
        assert_eq!(plan.primary_key.targets(), &[0, 1]);
        assert!(plan.timestamp.is_empty());
    }

    #[test]
    fn test_root_scan_carries_now_filter_pullup() {
        let mut catalog = Catalog::new();
        let pullups = Pullups {
            now_filter: Some(NowFilter::recent(2, 1_000)),
            ..Pullups::default()
        };
        let orders = catalog
            .add_table(orders_table().with_pullups(pullups), "orders_v")
            .unwrap();
        let mut fx = Fixture::new();
        fx.catalog = catalog;
        fx.orders = orders;
        let plan = fx.converter("stream").convert(&fx.scan(fx.orders)).unwrap();
        assert_eq!(plan.now_filter.map(|n| n.timestamp), Some(2));

        // the database stage is a read stage: the filter is applied right away
        let plan = fx.converter("database").convert(&fx.scan(fx.orders)).unwrap();
        assert!(plan.now_filter.is_none());
        assert_eq!(plan.rel.kind_name(), "Filter");
    }

    #[test]
    fn test_scan_of_key_dedup_written_by_stream_stage() {
        let mut catalog = Catalog::new();
        let pullups = Pullups {
            top_n: TopNConstraint::dedup_window_aggregation(vec![0], 2),
            ..Pullups::default()
        };
        let table = orders_table().with_pullups(pullups).with_stage("stream");
        let orders = catalog.add_table(table, "orders_v").unwrap();
        let mut fx = Fixture::new();
        fx.catalog = catalog;
        fx.orders = orders;
        let plan = fx.convert("database", &fx.scan(fx.orders)).unwrap();
        assert!(plan.top_n.is_empty());
        assert_eq!(plan.rel.kind_name(), "Scan");
    }

    #[test]
    fn test_scan_of_read_stage_table_needs_stage_change() {
        let mut catalog = Catalog::new();
        let table = orders_table().with_stage("database");
        let orders = catalog.add_table(table, "orders_v").unwrap();
        let mut fx = Fixture::new();
        fx.catalog = catalog;
        fx.orders = orders;
        let err = fx.convert("stream", &fx.scan(fx.orders)).unwrap_err();
        assert!(matches!(err, PlanningError::StageChange { .. }));
    }
}
