//! Picks the execution stage for a query by converting it once per stage
//! and keeping the cheapest trial that succeeds.

use std::fmt;
use std::sync::Arc;

use strata_core::execution::{ExecutionPipeline, ExecutionStage};
use strata_core::rel::RelNode;
use strata_core::Catalog;
use tracing::{debug, info, warn};

use super::cost::CostModel;
use super::{AnnotatedPlan, ConverterConfig, PlanConverter, PlanningError};

/// Why one stage could not run the query.
#[derive(Debug, Clone)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// The error of the trial.
    pub error: PlanningError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.stage, self.error.code(), self.error)
    }
}

fn format_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stage selection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageSelectionError {
    /// Every tried stage failed.
    #[error("No stage can execute the query:\n{}", format_failures(.failures))]
    NoViableStage {
        /// One entry per tried stage, in pipeline order.
        failures: Vec<StageFailure>,
    },

    /// The pipeline has no stages.
    #[error("Execution pipeline has no stages")]
    EmptyPipeline,

    /// The configured start stage is not in the pipeline.
    #[error("Unknown start stage '{0}'")]
    UnknownStage(String),
}

/// The winning trial.
#[derive(Debug, Clone)]
pub struct SelectedPlan {
    /// Converted plan, pending constraints still attached.
    pub plan: AnnotatedPlan,
    /// Stage the plan runs in.
    pub stage: Arc<ExecutionStage>,
    /// Cost under the model used for selection.
    pub cost: u64,
    /// Stages that failed, in pipeline order.
    pub rejected: Vec<StageFailure>,
}

/// Converts `node` once per stage of `pipeline` and returns the cheapest
/// successful plan. Ties go to the earlier stage.
///
/// Stages before [`ConverterConfig::start_stage`] are skipped.
///
/// # Errors
///
/// Returns [`StageSelectionError::NoViableStage`] with every per-stage
/// failure if no trial succeeds.
pub fn find_cheapest(
    node: &RelNode,
    catalog: &Catalog,
    pipeline: &ExecutionPipeline,
    config: &ConverterConfig,
    cost_model: &dyn CostModel,
) -> Result<SelectedPlan, StageSelectionError> {
    if pipeline.is_empty() {
        return Err(StageSelectionError::EmptyPipeline);
    }
    let start = match &config.start_stage {
        Some(name) => pipeline
            .position(name)
            .ok_or_else(|| StageSelectionError::UnknownStage(name.clone()))?,
        None => 0,
    };

    let mut best: Option<(AnnotatedPlan, Arc<ExecutionStage>, u64)> = None;
    let mut failures = Vec::new();
    for stage in &pipeline.stages()[start..] {
        let converter = PlanConverter::new(catalog, pipeline, Arc::clone(stage), config);
        match converter.convert(node) {
            Ok(plan) => {
                let cost = cost_model.cost(&plan);
                debug!(stage = %stage.name, cost, "stage trial succeeded");
                if best.as_ref().is_none_or(|(_, _, c)| cost < *c) {
                    best = Some((plan, Arc::clone(stage), cost));
                }
            }
            Err(error) => {
                warn!(stage = %stage.name, code = error.code(), %error, "stage rejected");
                failures.push(StageFailure {
                    stage: stage.name.clone(),
                    error,
                });
            }
        }
    }

    match best {
        Some((plan, stage, cost)) => {
            info!(stage = %stage.name, cost, rejected = failures.len(), "selected stage");
            Ok(SelectedPlan {
                plan,
                stage,
                cost,
                rejected: failures,
            })
        }
        None => Err(StageSelectionError::NoViableStage { failures }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::cost::SimpleCostModel;
    use crate::planner::test_utils::Fixture;
    use strata_core::rel::{JoinKind, ScalarExpr};

    #[test]
    fn test_cheapest_stage_wins() {
        let fx = Fixture::new();
        let node = fx.scan(fx.events);
        let selected =
            find_cheapest(&node, &fx.catalog, &fx.pipeline, &fx.config, &SimpleCostModel).unwrap();
        assert_eq!(selected.stage.name, "stream");
        assert_eq!(selected.cost, 1);
        assert!(selected.rejected.is_empty());
    }

    #[test]
    fn test_rejected_stage_is_reported() {
        let fx = Fixture::new();
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let selected =
            find_cheapest(&node, &fx.catalog, &fx.pipeline, &fx.config, &SimpleCostModel).unwrap();
        assert_eq!(selected.stage.name, "stream");
        assert_eq!(selected.rejected.len(), 1);
        assert_eq!(selected.rejected[0].stage, "database");
    }

    #[test]
    fn test_all_stages_failing_lists_every_reason() {
        let mut fx = Fixture::new();
        fx.config.start_stage = Some("database".into());
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Temporal,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let err = find_cheapest(&node, &fx.catalog, &fx.pipeline, &fx.config, &SimpleCostModel)
            .unwrap_err();
        match &err {
            StageSelectionError::NoViableStage { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, "database");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_unknown_start_stage() {
        let mut fx = Fixture::new();
        fx.config.start_stage = Some("warehouse".into());
        let err = find_cheapest(&fx.scan(fx.events), &fx.catalog, &fx.pipeline, &fx.config, &SimpleCostModel)
            .unwrap_err();
        assert!(matches!(err, StageSelectionError::UnknownStage(_)));
    }

    #[test]
    fn test_empty_pipeline() {
        let fx = Fixture::new();
        let pipeline = ExecutionPipeline::new(Vec::new());
        let err = find_cheapest(&fx.scan(fx.events), &fx.catalog, &pipeline, &fx.config, &SimpleCostModel)
            .unwrap_err();
        assert!(matches!(err, StageSelectionError::EmptyPipeline));
    }
}
