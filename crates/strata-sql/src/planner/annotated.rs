//! The annotated plan produced by every converter visit.

use std::fmt;

use arrow_schema::Fields;
use strata_core::catalog::TableType;
use strata_core::execution::{Capability, ExecutionAnalysis};
use strata_core::index_map::{is_dense_range, IndexMap};
use strata_core::lineage::JoinLineage;
use strata_core::rel::{Collation, ProjectExpr, RelNode};
use strata_core::time::{NowFilter, TimestampProvenance};
use strata_core::topn::TopNConstraint;

use super::manifest::PlanManifest;
use super::PlanningError;

/// A relational sub-tree plus everything the converter knows about it.
///
/// All column positions (primary key, timestamp, now-filter, Top-N, sort)
/// refer to columns of `rel`. `select` maps the columns visible to the
/// parent operator onto columns of `rel`; columns of `rel` outside `select`
/// are hidden but kept so keys and timestamps survive projections.
#[derive(Debug, Clone)]
pub struct AnnotatedPlan {
    /// Rewritten relational sub-tree.
    pub rel: RelNode,
    /// Row semantics.
    pub table_type: TableType,
    /// Primary-key columns.
    pub primary_key: IndexMap,
    /// Candidate event-time columns.
    pub timestamp: TimestampProvenance,
    /// Visible columns.
    pub select: IndexMap,
    /// Capabilities required so far.
    pub analysis: ExecutionAnalysis,
    /// Lineage of a shredded entity, while the plan is still a pure
    /// unrolling of one.
    pub lineage: Option<JoinLineage>,
    /// Pending now-filter.
    pub now_filter: Option<NowFilter>,
    /// Pending Top-N constraint.
    pub top_n: TopNConstraint,
    /// Declared sort order, not materialized.
    pub sort: Collation,
    /// Number of leading primary-key columns inherited from a root entity.
    pub num_root_pks: Option<usize>,
}

impl AnnotatedPlan {
    /// A plan over `rel` with identity select, no timestamp and nothing
    /// pending.
    #[must_use]
    pub fn new(rel: RelNode, table_type: TableType, primary_key: Vec<usize>, analysis: ExecutionAnalysis) -> Self {
        let width = rel.field_count();
        Self {
            rel,
            table_type,
            primary_key: IndexMap::of(primary_key, width),
            timestamp: TimestampProvenance::none(),
            select: IndexMap::identity(width),
            analysis,
            lineage: None,
            now_filter: None,
            top_n: TopNConstraint::empty(),
            sort: Collation::empty(),
            num_root_pks: None,
        }
    }

    /// Width of `rel`.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.rel.field_count()
    }

    /// Fields of the visible columns.
    #[must_use]
    pub fn visible_fields(&self) -> Fields {
        let fields = self.rel.fields();
        self.select
            .targets()
            .iter()
            .map(|&t| fields[t].clone())
            .collect()
    }

    /// Whether a constraint is pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.now_filter.is_some() || !self.top_n.is_empty()
    }

    /// Whether primary-key and visible columns together cover `0..n`.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        is_dense_range(
            self.primary_key
                .targets()
                .iter()
                .chain(self.select.targets())
                .copied(),
        )
    }

    /// Applies a pending now-filter as a filter operator.
    ///
    /// # Errors
    ///
    /// Fails if the stage cannot evaluate `now()`.
    pub fn inline_now_filter(&mut self) -> Result<(), PlanningError> {
        if let Some(filter) = self.now_filter.take() {
            self.analysis.require(Capability::NowFunction)?;
            let rel = std::mem::replace(&mut self.rel, RelNode::Union { inputs: Vec::new(), all: true });
            self.rel = filter.inline(rel);
        }
        Ok(())
    }

    /// Applies a pending Top-N constraint as sort plus partition limit.
    ///
    /// # Errors
    ///
    /// Fails if the stage cannot sort.
    pub fn inline_top_n(&mut self) -> Result<(), PlanningError> {
        if self.top_n.is_empty() {
            return Ok(());
        }
        self.analysis.require(Capability::Sort)?;
        let top_n = std::mem::take(&mut self.top_n);
        let rel = std::mem::replace(&mut self.rel, RelNode::Union { inputs: Vec::new(), all: true });
        self.rel = top_n.inline(rel);
        Ok(())
    }

    /// Applies every pending constraint, now-filter first.
    ///
    /// # Errors
    ///
    /// Fails if the stage lacks a capability the constraints need.
    pub fn inline_all(&mut self) -> Result<(), PlanningError> {
        self.inline_now_filter()?;
        self.inline_top_n()
    }

    /// Projects `rel` so that visible columns come first, followed by
    /// hidden primary-key columns, hidden sort columns and, if hidden, the
    /// best timestamp candidate. Pending constraints are applied first.
    ///
    /// # Errors
    ///
    /// Fails if pending constraints cannot be applied.
    pub fn align(mut self) -> Result<Self, PlanningError> {
        self.inline_all()?;
        // visible columns keep their order even when one is selected twice
        let mut columns: Vec<usize> = self.select.targets_as_list();
        let num_visible = columns.len();
        let hidden: Vec<usize> = self
            .primary_key
            .targets()
            .iter()
            .copied()
            .chain(self.sort.indexes())
            .chain(self.timestamp.best_index())
            .collect();
        for c in hidden {
            if !columns.contains(&c) {
                columns.push(c);
            }
        }

        let width = self.field_count();
        if columns.len() == width && columns.iter().enumerate().all(|(i, &c)| i == c) {
            return Ok(self);
        }

        let position = |c: usize| columns.iter().position(|&x| x == c);
        let new_width = columns.len();
        let primary_key = self
            .primary_key
            .try_remap(new_width, position)
            .unwrap_or_else(|| unreachable!("primary key columns are kept by align"));
        let timestamp = self.timestamp.remap(position);
        let sort = self.sort.remap(|c| position(c).unwrap_or(c));
        Ok(Self {
            rel: self.rel.project_columns(&columns),
            primary_key,
            timestamp,
            select: IndexMap::identity_into(num_visible, new_width),
            sort,
            lineage: None,
            ..self
        })
    }

    /// Applies pending constraints, aligns columns and describes the result
    /// for the physical-plan generator.
    ///
    /// # Errors
    ///
    /// Fails if pending constraints cannot be applied on the plan's stage.
    ///
    /// # Panics
    ///
    /// Panics if the aligned primary-key and visible columns do not cover
    /// `0..n`; that is a converter defect.
    pub fn materialize(self) -> Result<(AnnotatedPlan, PlanManifest), PlanningError> {
        let plan = self.align()?;
        assert!(
            plan.is_continuous(),
            "materialized plan is not continuous: pk={:?} select={:?}",
            plan.primary_key.targets(),
            plan.select.targets()
        );
        let manifest = PlanManifest::from_plan(&plan);
        Ok((plan, manifest))
    }

    /// Asserts the structural invariants every visit must keep.
    ///
    /// # Panics
    ///
    /// Panics on a violation; these are converter defects.
    pub fn check_invariants(&self) {
        let width = self.field_count();
        assert_eq!(
            self.primary_key.target_length(),
            width,
            "primary key map does not point into the plan"
        );
        assert_eq!(
            self.select.target_length(),
            width,
            "select map does not point into the plan"
        );
        if self.table_type == TableType::State {
            assert!(
                self.timestamp.is_empty(),
                "state plan carries timestamp {}",
                self.timestamp
            );
            assert!(self.now_filter.is_none(), "state plan carries a now-filter");
        }
        assert!(
            self.timestamp.indexes().all(|i| i < width),
            "timestamp {} outside plan of width {width}",
            self.timestamp
        );
        if let Some(filter) = &self.now_filter {
            assert!(
                self.timestamp.is_candidate(filter.timestamp),
                "now-filter on ${} which is not a timestamp candidate",
                filter.timestamp
            );
        }
        assert!(
            self.sort.indexes().all(|i| i < width),
            "sort order outside plan of width {width}"
        );
        assert!(
            self.top_n
                .partition
                .iter()
                .copied()
                .chain(self.top_n.collation.indexes())
                .all(|i| i < width),
            "top-n constraint outside plan of width {width}"
        );
    }
}

impl fmt::Display for AnnotatedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} pk={:?} ts={} select={:?} stage={}",
            self.table_type,
            self.primary_key.targets(),
            self.timestamp,
            self.select.targets(),
            self.analysis.stage().name
        )?;
        if let Some(n) = &self.now_filter {
            writeln!(f, "now-filter: {n}")?;
        }
        if !self.top_n.is_empty() {
            writeln!(f, "top-n: {}", self.top_n)?;
        }
        write!(f, "{}", self.rel.explain())
    }
}

/// Projects `rel` to `columns` keeping names. Shared by union alignment.
pub(crate) fn project_columns_named(
    rel: RelNode,
    columns: &[usize],
    renamed: Option<(usize, &str)>,
) -> RelNode {
    let fields = rel.fields();
    let exprs = columns
        .iter()
        .enumerate()
        .map(|(pos, &c)| match renamed {
            Some((at, name)) if at == pos => ProjectExpr::renamed_column(c, name, &fields),
            _ => ProjectExpr::column(c, &fields),
        })
        .collect();
    rel.project(exprs)
}
