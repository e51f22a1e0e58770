//! Serializable description of a materialized plan for the physical-plan
//! generator.

use serde::Serialize;
use strata_core::catalog::TableType;
use strata_core::execution::{Capability, EngineKind};
use strata_core::rel::{AggregateHint, JoinHint, RelNode};
use strata_core::time::TimestampCandidate;

use super::AnnotatedPlan;

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnManifest {
    /// Column name.
    pub name: String,
    /// Arrow data type, rendered.
    pub data_type: String,
    /// Whether the column can be null.
    pub nullable: bool,
    /// Whether the query selects the column.
    pub visible: bool,
}

/// Physical hint found in the plan, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operator", content = "hint", rename_all = "snake_case")]
pub enum HintManifest {
    /// Join hint.
    Join(JoinHint),
    /// Aggregate hint.
    Aggregate(AggregateHint),
}

/// What the generator needs to know about a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanManifest {
    /// Stage name.
    pub stage: String,
    /// Engine of the stage.
    pub engine: EngineKind,
    /// Table type of the result.
    pub table_type: TableType,
    /// Primary-key columns.
    pub primary_key: Vec<usize>,
    /// Event-time column, if any.
    pub timestamp: Option<TimestampCandidate>,
    /// Columns of the result.
    pub columns: Vec<ColumnManifest>,
    /// Capabilities the plan uses.
    pub required_capabilities: Vec<Capability>,
    /// Physical hints.
    pub hints: Vec<HintManifest>,
    /// Explain tree of the plan.
    pub explain: String,
}

fn collect_hints(node: &RelNode, out: &mut Vec<HintManifest>) {
    match node {
        RelNode::Join { hint: Some(h), .. } => out.push(HintManifest::Join(h.clone())),
        RelNode::Aggregate { hint: Some(h), .. } => out.push(HintManifest::Aggregate(h.clone())),
        _ => {}
    }
    for input in node.inputs() {
        collect_hints(input, out);
    }
}

impl PlanManifest {
    /// Describes `plan`. The plan should be materialized.
    #[must_use]
    pub fn from_plan(plan: &AnnotatedPlan) -> Self {
        let fields = plan.rel.fields();
        let columns = fields
            .iter()
            .enumerate()
            .map(|(i, f)| ColumnManifest {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                nullable: f.is_nullable(),
                visible: plan.select.contains_target(i),
            })
            .collect();
        let mut hints = Vec::new();
        collect_hints(&plan.rel, &mut hints);
        let stage = plan.analysis.stage();
        Self {
            stage: stage.name.clone(),
            engine: stage.engine,
            table_type: plan.table_type,
            primary_key: plan.primary_key.targets_as_list(),
            timestamp: plan.timestamp.best().copied(),
            columns,
            required_capabilities: plan.analysis.required().iter().copied().collect(),
            hints,
            explain: plan.rel.explain(),
        }
    }

    /// Renders the manifest as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which does not happen for manifests
    /// built by [`PlanManifest::from_plan`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::test_utils::Fixture;
    use strata_core::rel::{JoinKind, ScalarExpr};

    #[test]
    fn test_manifest_of_temporal_join() {
        let fx = Fixture::new();
        let node = fx.scan(fx.orders).join(
            fx.scan(fx.customers),
            JoinKind::Default,
            ScalarExpr::eq(ScalarExpr::col(1), ScalarExpr::col(3)),
        );
        let (plan, manifest) = fx.convert("stream", &node).unwrap().materialize().unwrap();
        assert_eq!(manifest.table_type, TableType::Stream);
        assert_eq!(manifest.columns.len(), plan.field_count());
        assert_eq!(manifest.columns.iter().filter(|c| c.visible).count(), 6);
        assert!(matches!(manifest.hints.as_slice(), [HintManifest::Join(JoinHint::Temporal(_))]));
        assert!(manifest.required_capabilities.contains(&Capability::TemporalJoin));

        let json = manifest.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["table_type"], "Stream");
        assert_eq!(value["hints"][0]["operator"], "join");
    }
}
