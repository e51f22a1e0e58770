//! Cost of an annotated plan on its stage.

use strata_core::execution::EngineKind;
use strata_core::rel::{JoinHint, RelNode};

use super::AnnotatedPlan;

/// Penalty for a join between state tables in a stream engine.
pub const STATE_JOIN_PENALTY: u64 = 10;

/// Penalty for work a read engine repeats on every query.
pub const READ_TIME_PENALTY: u64 = 5;

/// Assigns a comparable cost to a converted plan.
///
/// Costs are only compared between trials of the same query, so any
/// monotone scale works.
pub trait CostModel: Send + Sync {
    /// Cost of `plan` on the stage recorded in its analysis.
    fn cost(&self, plan: &AnnotatedPlan) -> u64;
}

/// Operator count weighted by the stage, plus engine-specific penalties.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleCostModel;

impl CostModel for SimpleCostModel {
    fn cost(&self, plan: &AnnotatedPlan) -> u64 {
        let stage = plan.analysis.stage();
        let base = plan.rel.node_count() as u64 * u64::from(stage.cost_weight);
        let penalty = match stage.engine {
            EngineKind::Stream => {
                let state_joins = plan.rel.count_nodes(&|n| {
                    matches!(
                        n,
                        RelNode::Join {
                            hint: Some(JoinHint::Cost(_)),
                            ..
                        }
                    )
                });
                state_joins as u64 * STATE_JOIN_PENALTY
            }
            EngineKind::Database | EngineKind::Server => {
                let read_work = plan.rel.count_nodes(&|n| {
                    matches!(
                        n,
                        RelNode::PartitionLimit { .. } | RelNode::Sort { .. } | RelNode::Unnest { .. }
                    )
                });
                let pending = usize::from(plan.now_filter.is_some()) + usize::from(!plan.top_n.is_empty());
                (read_work + pending) as u64 * READ_TIME_PENALTY
            }
        };
        base + penalty
    }
}
