//! Plan annotation and rewrite engine.
//!
//! [`PlanConverter`] walks a [`RelNode`] tree bottom-up and produces an
//! [`AnnotatedPlan`] for every node: the rewritten relational sub-tree plus
//! primary-key lineage, timestamp provenance, pending now-filter and Top-N
//! constraints, and the capabilities the sub-plan needs from its stage.
//!
//! One converter targets exactly one execution stage. Comparing stages is
//! the job of [`stage_selection::find_cheapest`], which runs a fresh
//! converter per stage.

pub mod aggregate;
pub mod annotated;
pub mod cost;
pub mod filter;
pub mod join;
pub mod manifest;
pub mod project;
pub mod scan;
pub mod sort;
pub mod stage_selection;
pub mod time_predicate;
pub mod union;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::execution::{CapabilityMismatch, ExecutionAnalysis, ExecutionPipeline, ExecutionStage};
use strata_core::rel::{JoinKind, RelNode};
use strata_core::Catalog;
use tracing::debug;

pub use annotated::AnnotatedPlan;
pub use manifest::PlanManifest;

/// Default number of panes a sliding window is divided into.
pub const DEFAULT_SLIDING_WINDOW_PANES: u32 = 50;

/// Name of the timestamp column appended to union branches without a
/// common timestamp.
pub const UNION_TIMESTAMP_COLUMN_NAME: &str = "_timestamp";

/// Converter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Let a plan continue in another stage than the one it started in.
    pub allow_stage_change: bool,
    /// Panes per sliding window; slide width is window width divided by this.
    pub sliding_window_panes: u32,
    /// Skip stages before this one during stage selection.
    pub start_stage: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            allow_stage_change: false,
            sliding_window_panes: DEFAULT_SLIDING_WINDOW_PANES,
            start_stage: None,
        }
    }
}

/// Planning errors. All of them fail the current stage trial only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanningError {
    /// Operator or modifier without a streaming rewrite.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Join type without a streaming rewrite.
    #[error("Unsupported join type: {0}")]
    UnsupportedJoin(JoinKind),

    /// Constraints that cannot hold together.
    #[error("Unsatisfiable: {reason}\n{plan}")]
    Unsatisfiable {
        /// What conflicted.
        reason: String,
        /// Explain output of the offending sub-plan.
        plan: String,
    },

    /// Invalid window aggregation.
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// Explicit temporal join whose shape does not match.
    #[error("Invalid temporal join: {0}")]
    InvalidTemporalJoin(String),

    /// Explicit interval join whose shape does not match.
    #[error("Invalid interval join: {0}")]
    InvalidIntervalJoin(String),

    /// Union branches that do not line up.
    #[error("Incompatible union: {0}")]
    IncompatibleUnion(String),

    /// The stage lacks a required capability.
    #[error(transparent)]
    Capability(#[from] CapabilityMismatch),

    /// The plan would have to move to another stage.
    #[error("Stage change from '{from}' to '{to}' is not allowed")]
    StageChange {
        /// Stage of the trial.
        from: String,
        /// Stage the plan would move to.
        to: String,
    },
}

impl PlanningError {
    /// Structured error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        use crate::error::codes;
        match self {
            Self::Unsupported(_) => codes::UNSUPPORTED_OPERATOR,
            Self::UnsupportedJoin(_) => codes::JOIN_TYPE_UNSUPPORTED,
            Self::Unsatisfiable { .. } => codes::UNSATISFIABLE,
            Self::InvalidWindow(_) => codes::WINDOW_INVALID,
            Self::InvalidTemporalJoin(_) => codes::TEMPORAL_JOIN_INVALID,
            Self::InvalidIntervalJoin(_) => codes::INTERVAL_JOIN_INVALID,
            Self::IncompatibleUnion(_) => codes::UNION_INCOMPATIBLE,
            Self::Capability(_) => codes::CAPABILITY_MISSING,
            Self::StageChange { .. } => codes::STAGE_CHANGE,
        }
    }

    pub(crate) fn unsatisfiable(reason: impl Into<String>, plan: &RelNode) -> Self {
        Self::Unsatisfiable {
            reason: reason.into(),
            plan: plan.explain(),
        }
    }
}

/// Bottom-up converter for one execution stage.
///
/// The converter never mutates its input tree; each visit builds a new
/// annotated sub-plan from its children's results.
#[derive(Debug)]
pub struct PlanConverter<'a> {
    catalog: &'a Catalog,
    pipeline: &'a ExecutionPipeline,
    stage: Arc<ExecutionStage>,
    config: &'a ConverterConfig,
}

impl<'a> PlanConverter<'a> {
    /// Creates a converter targeting `stage`.
    #[must_use]
    pub fn new(
        catalog: &'a Catalog,
        pipeline: &'a ExecutionPipeline,
        stage: Arc<ExecutionStage>,
        config: &'a ConverterConfig,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            stage,
            config,
        }
    }

    /// The targeted stage.
    #[must_use]
    pub fn stage(&self) -> &Arc<ExecutionStage> {
        &self.stage
    }

    /// Converts a whole query.
    ///
    /// The returned plan may still carry pending constraints; call
    /// [`AnnotatedPlan::materialize`] before handing it off.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError`] if any operator cannot be planned on the
    /// targeted stage.
    pub fn convert(&self, node: &RelNode) -> Result<AnnotatedPlan, PlanningError> {
        self.visit(node)
    }

    fn visit(&self, node: &RelNode) -> Result<AnnotatedPlan, PlanningError> {
        let plan = match node {
            RelNode::Scan { table, .. } => self.visit_scan(*table)?,
            RelNode::Filter { input, predicate } => self.visit_filter(input, predicate)?,
            RelNode::Project { input, exprs, hint } => {
                self.visit_project(input, exprs, hint.as_ref())?
            }
            RelNode::Join {
                left,
                right,
                kind,
                condition,
                ..
            } => self.visit_join(left, right, *kind, condition)?,
            RelNode::Aggregate {
                input,
                group_by,
                grouping_sets,
                calls,
                ..
            } => self.visit_aggregate(input, group_by, grouping_sets, calls)?,
            RelNode::Union { inputs, all } => self.visit_union(inputs, *all)?,
            RelNode::Sort {
                input,
                collation,
                limit,
                offset,
            } => self.visit_sort(input, collation, *limit, *offset)?,
            RelNode::Unnest { .. } | RelNode::PartitionLimit { .. } => {
                return Err(PlanningError::Unsupported(format!(
                    "{} in an input plan",
                    node.kind_name()
                )));
            }
        };
        self.finish(plan)
    }

    /// Post-processing shared by every visit.
    fn finish(&self, mut plan: AnnotatedPlan) -> Result<AnnotatedPlan, PlanningError> {
        let stage = Arc::clone(plan.analysis.stage());
        if stage.name != self.stage.name && !self.config.allow_stage_change {
            return Err(PlanningError::StageChange {
                from: self.stage.name.clone(),
                to: stage.name.clone(),
            });
        }
        if stage.is_read() {
            plan.inline_all()?;
        }
        plan.check_invariants();
        debug!(
            stage = %stage.name,
            table_type = %plan.table_type,
            timestamp = %plan.timestamp,
            "annotated {}",
            plan.rel.kind_name()
        );
        Ok(plan)
    }

    /// Analysis of the current stage with no requirements.
    fn start_analysis(&self) -> ExecutionAnalysis {
        ExecutionAnalysis::start(Arc::clone(&self.stage))
    }

    /// Union of two sibling analyses, failing if they target different
    /// stages.
    fn combine(
        &self,
        left: &ExecutionAnalysis,
        right: &ExecutionAnalysis,
    ) -> Result<ExecutionAnalysis, PlanningError> {
        if left.stage().name != right.stage().name {
            return Err(PlanningError::StageChange {
                from: left.stage().name.clone(),
                to: right.stage().name.clone(),
            });
        }
        Ok(left.combine(right))
    }
}
