//! `UNION ALL` conversion.

use strata_core::catalog::TableType;
use strata_core::execution::Capability;
use strata_core::index_map::IndexMap;
use strata_core::rel::{Collation, RelNode};
use strata_core::time::{DerivationKind, TimestampProvenance};
use tracing::debug;

use super::annotated::project_columns_named;
use super::{AnnotatedPlan, PlanConverter, PlanningError, UNION_TIMESTAMP_COLUMN_NAME};

impl PlanConverter<'_> {
    pub(crate) fn visit_union(
        &self,
        inputs: &[RelNode],
        all: bool,
    ) -> Result<AnnotatedPlan, PlanningError> {
        if !all {
            return Err(PlanningError::Unsupported("UNION without ALL".into()));
        }
        match inputs {
            [] => return Err(PlanningError::IncompatibleUnion("no inputs".into())),
            [single] => return self.visit(single),
            _ => {}
        }

        let mut branches = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut plan = self.visit(input)?;
            plan.inline_all()?;
            plan.sort = Collation::empty();
            let plan = plan.align()?;
            if plan.table_type != TableType::Stream {
                return Err(PlanningError::IncompatibleUnion(format!(
                    "branch {} is a {} table",
                    branches.len(),
                    plan.table_type
                )));
            }
            branches.push(plan);
        }

        let first = &branches[0];
        for (i, b) in branches.iter().enumerate().skip(1) {
            if b.field_count() != first.field_count()
                || b.select.source_length() != first.select.source_length()
                || b.primary_key.targets() != first.primary_key.targets()
            {
                return Err(PlanningError::IncompatibleUnion(format!(
                    "branch {i} has primary key {:?} over {} columns, expected {:?} over {}",
                    b.primary_key.targets(),
                    b.field_count(),
                    first.primary_key.targets(),
                    first.field_count()
                )));
            }
        }

        let mut analysis = first.analysis.clone();
        for b in &branches[1..] {
            analysis = self.combine(&analysis, &b.analysis)?;
        }
        analysis.require(Capability::Union)?;

        // aligned branches list visible columns first; hidden candidates
        // are not part of the union's row type
        let num_visible = first.select.source_length();
        let common: Vec<usize> = first
            .timestamp
            .indexes()
            .filter(|&c| c < num_visible)
            .filter(|&c| branches.iter().all(|b| b.timestamp.is_candidate(c)))
            .collect();
        let primary_key = first.primary_key.targets_as_list();
        let num_root_pks = first
            .num_root_pks
            .filter(|n| branches.iter().all(|b| b.num_root_pks == Some(*n)));

        let (rels, timestamp, width): (Vec<RelNode>, _, _) = if common.is_empty() {
            // no shared timestamp: every branch exposes its own as a new column
            let width = first.field_count();
            let mut rels = Vec::with_capacity(branches.len());
            for (i, b) in branches.into_iter().enumerate() {
                let Some(ts) = b.timestamp.best_index() else {
                    return Err(PlanningError::IncompatibleUnion(format!(
                        "branch {i} has no timestamp"
                    )));
                };
                let columns: Vec<usize> = (0..width).chain([ts]).collect();
                rels.push(project_columns_named(
                    b.rel,
                    &columns,
                    Some((width, UNION_TIMESTAMP_COLUMN_NAME)),
                ));
            }
            debug!(column = width, "union appends a common timestamp");
            (
                rels,
                TimestampProvenance::fixed(width, DerivationKind::SourceDefined),
                width + 1,
            )
        } else {
            let timestamp = first.timestamp.restrict_to(&common);
            let width = first.field_count();
            (
                branches.into_iter().map(|b| b.rel).collect(),
                timestamp,
                width,
            )
        };

        let mut plan = AnnotatedPlan::new(
            RelNode::union_all(rels),
            TableType::Stream,
            primary_key,
            analysis,
        );
        plan.timestamp = timestamp;
        plan.select = IndexMap::identity_into(num_visible, width);
        plan.num_root_pks = num_root_pks;
        Ok(plan)
    }
}
