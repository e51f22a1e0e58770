//! Projection conversion.
//!
//! Trivial projections only re-point the select map and rename the columns
//! they pick in place. Projections carrying a
//! ranking hint become deferred Top-N constraints. Everything else is
//! materialized, with primary-key, timestamp and sort columns re-appended
//! behind the visible ones.

use rustc_hash::FxHashMap;
use strata_core::catalog::TableType;
use strata_core::index_map::IndexMap;
use strata_core::rel::{
    BucketSpec, Collation, FieldCollation, ProjectExpr, RelNode, ScalarExpr, SortDirection,
    TopNHint, TopNKind,
};
use strata_core::time::{DerivationKind, TimestampProvenance};
use strata_core::topn::TopNConstraint;
use tracing::{debug, warn};

use super::{AnnotatedPlan, PlanConverter, PlanningError};

/// Input columns of a projection made only of bare column references.
fn trivial_columns(input: &RelNode, exprs: &[ProjectExpr]) -> Option<Vec<usize>> {
    let width = input.fields().len();
    exprs
        .iter()
        .map(|e| e.expr.as_column().filter(|&c| c < width))
        .collect()
}

/// The names a trivial projection gives its target columns of `rel`, keeping
/// only those that differ. `None` if one target would need two names.
fn renamed_targets(
    rel: &RelNode,
    targets: &[usize],
    exprs: &[ProjectExpr],
) -> Option<Vec<(usize, String)>> {
    let fields = rel.fields();
    let mut names: Vec<(usize, &str)> = Vec::with_capacity(targets.len());
    for (&t, e) in targets.iter().zip(exprs) {
        let name = e.field.name().as_str();
        match names.iter().find(|(c, _)| *c == t) {
            Some(&(_, n)) if n != name => return None,
            Some(_) => {}
            None => names.push((t, name)),
        }
    }
    Some(
        names
            .into_iter()
            .filter(|&(t, n)| fields[t].name().as_str() != n)
            .map(|(t, n)| (t, n.to_owned()))
            .collect(),
    )
}

/// Renames columns of `rel` without moving any of them.
fn rename_columns(rel: RelNode, renames: &[(usize, String)]) -> RelNode {
    if renames.is_empty() {
        return rel;
    }
    let fields = rel.fields();
    let exprs = (0..fields.len())
        .map(|c| match renames.iter().find(|(t, _)| *t == c) {
            Some((_, name)) => ProjectExpr::renamed_column(c, name, &fields),
            None => ProjectExpr::column(c, &fields),
        })
        .collect();
    rel.project(exprs)
}

/// The column of a single descending collation, if it is a timestamp
/// candidate.
fn latest_first(collation: &Collation, timestamp: &TimestampProvenance) -> Option<usize> {
    match collation.fields() {
        [f] if f.direction == SortDirection::Descending && timestamp.is_candidate(f.index) => {
            Some(f.index)
        }
        _ => None,
    }
}

/// A projected timestamp-preserving call over a timestamp candidate.
struct PreservedTimestamp {
    output: usize,
    input: usize,
    bucket: Option<BucketSpec>,
}

impl PreservedTimestamp {
    fn kind(&self) -> DerivationKind {
        if self.bucket.is_some() {
            DerivationKind::WindowBucketed
        } else {
            DerivationKind::PreservedThroughFunction
        }
    }
}

impl PlanConverter<'_> {
    pub(crate) fn visit_project(
        &self,
        input: &RelNode,
        exprs: &[ProjectExpr],
        hint: Option<&TopNHint>,
    ) -> Result<AnnotatedPlan, PlanningError> {
        if let Some(hint) = hint {
            return self.visit_ranking_project(input, exprs, hint);
        }
        let columns = trivial_columns(input, exprs);
        let mut plan = self.visit(input)?;
        if let Some(columns) = columns {
            let targets: Vec<usize> = columns.iter().map(|&c| plan.select.map(c)).collect();
            if let Some(renames) = renamed_targets(&plan.rel, &targets, exprs) {
                let width = plan.field_count();
                plan.rel = rename_columns(plan.rel, &renames);
                plan.select = IndexMap::of(targets, width);
                return Ok(plan);
            }
        }
        self.project_computed(plan, exprs)
    }

    /// Top-N, `SELECT DISTINCT` and `DISTINCT ON` projections. The ordering
    /// and limit come from a sort directly below the projection.
    fn visit_ranking_project(
        &self,
        input: &RelNode,
        exprs: &[ProjectExpr],
        hint: &TopNHint,
    ) -> Result<AnnotatedPlan, PlanningError> {
        let (source, collation, limit) = match input {
            RelNode::Sort {
                offset: Some(_), ..
            } => {
                return Err(PlanningError::Unsupported("OFFSET in a ranking".into()));
            }
            RelNode::Sort {
                input,
                collation,
                limit,
                ..
            } => (input.as_ref(), collation.clone(), *limit),
            other => (other, Collation::empty(), None),
        };
        let Some(columns) = trivial_columns(source, exprs) else {
            return Err(PlanningError::Unsupported(
                "ranking hint on a computed projection".into(),
            ));
        };

        let mut plan = self.visit(source)?;
        plan.inline_all()?;
        let select = plan.select.clone();
        let partition: Vec<usize> = hint.partition.iter().map(|&c| select.map(c)).collect();
        let collation = collation.remap(|c| select.map(c));
        let projected: Vec<usize> = columns.iter().map(|&c| select.map(c)).collect();

        let mut primary_key = None;
        let mut timestamp = None;
        let constraint = match hint.kind {
            TopNKind::TopN => {
                let keyed = limit == Some(1) && !partition.is_empty();
                let latest = latest_first(&collation, &plan.timestamp)
                    .filter(|_| keyed && plan.table_type != TableType::State);
                if keyed {
                    primary_key = Some(partition.clone());
                }
                timestamp = latest;
                TopNConstraint::new(partition, latest.is_some(), collation, limit, plan.table_type)
            }
            TopNKind::SelectDistinct => {
                let partition = if partition.is_empty() {
                    projected.clone()
                } else {
                    partition
                };
                timestamp = plan.timestamp.best_index();
                let collation = timestamp.map_or_else(Collation::empty, |ts| {
                    Collation::of(vec![FieldCollation::desc(ts)])
                });
                primary_key = Some(partition.clone());
                TopNConstraint::new(partition, true, collation, None, plan.table_type)
            }
            TopNKind::DistinctOn => {
                if partition.is_empty() {
                    return Err(PlanningError::Unsupported("DISTINCT ON without keys".into()));
                }
                if plan.table_type != TableType::Stream {
                    return Err(PlanningError::Unsupported(format!(
                        "DISTINCT ON over a {} table",
                        plan.table_type
                    )));
                }
                let Some(latest) = latest_first(&collation, &plan.timestamp) else {
                    return Err(PlanningError::Unsupported(
                        "DISTINCT ON must order by one timestamp descending".into(),
                    ));
                };
                timestamp = Some(latest);
                primary_key = Some(partition.clone());
                TopNConstraint::new(partition, true, collation, Some(1), plan.table_type)
            }
        };
        debug!(kind = ?hint.kind, constraint = %constraint, "ranking projection");

        let Some(renames) = renamed_targets(&plan.rel, &projected, exprs) else {
            return Err(PlanningError::Unsupported(
                "ranking projection names one column twice".into(),
            ));
        };
        plan.rel = rename_columns(plan.rel, &renames);

        let width = plan.field_count();
        if let Some(pk) = primary_key {
            plan.primary_key = IndexMap::of(pk, width);
        }
        if constraint.is_empty() {
            plan.sort = constraint.collation;
        } else {
            plan.table_type = constraint.table_type();
            plan.top_n = constraint;
            plan.sort = Collation::empty();
            plan.lineage = None;
        }
        if plan.table_type == TableType::State {
            plan.timestamp = TimestampProvenance::none();
        } else if let Some(ts) = timestamp {
            plan.timestamp = plan.timestamp.fix_as_timestamp(ts);
        }
        plan.select = IndexMap::of(projected, width);
        Ok(plan)
    }

    fn project_computed(
        &self,
        mut plan: AnnotatedPlan,
        exprs: &[ProjectExpr],
    ) -> Result<AnnotatedPlan, PlanningError> {
        plan.inline_top_n()?;
        let select = plan.select.clone();
        let mut out: Vec<ProjectExpr> = exprs
            .iter()
            .map(|e| ProjectExpr {
                expr: e.expr.remap_columns(&|c| select.map(c)),
                field: e.field.clone(),
            })
            .collect();
        plan.analysis
            .require_expressions(out.iter().map(|e| &e.expr))?;

        let mut mapping: FxHashMap<usize, usize> = FxHashMap::default();
        let mut preserved = Vec::new();
        for (i, e) in out.iter().enumerate() {
            match &e.expr {
                ScalarExpr::Column(c) => {
                    if mapping.contains_key(c) {
                        if plan.primary_key.contains_target(*c) {
                            warn!(column = *c, output = i, "primary key column projected twice");
                        }
                    } else {
                        mapping.insert(*c, i);
                    }
                }
                ScalarExpr::Call { function, args } if function.preserves_timestamp() => {
                    if let Some(c) = args.first().and_then(ScalarExpr::as_column) {
                        if plan.timestamp.is_candidate(c) {
                            preserved.push(PreservedTimestamp {
                                output: i,
                                input: c,
                                bucket: function.bucket(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        // A fixed timestamp computed through a preserving function moves to
        // the function output.
        let moved = if plan.timestamp.is_fixed() {
            let fixed = plan.timestamp.best_index();
            preserved.iter().find(|p| Some(p.input) == fixed)
        } else {
            None
        };
        let mut now_filter = plan.now_filter.take();
        if let (Some(p), Some(nf)) = (moved, now_filter) {
            match p.bucket {
                Some(bucket) => {
                    now_filter = Some(nf.with_timestamp(p.output).add_interval(bucket.width_ms));
                }
                None => {
                    plan.now_filter = Some(nf);
                    plan.inline_now_filter()?;
                    now_filter = None;
                }
            }
        }

        let rel_fields = plan.rel.fields();
        let mut append = |c: usize, out: &mut Vec<ProjectExpr>| {
            if !mapping.contains_key(&c) {
                mapping.insert(c, out.len());
                out.push(ProjectExpr::column(c, &rel_fields));
            }
        };
        for &c in plan.primary_key.targets() {
            append(c, &mut out);
        }
        if moved.is_none() {
            for c in plan.timestamp.indexes() {
                append(c, &mut out);
            }
        }
        for c in plan.sort.indexes() {
            append(c, &mut out);
        }

        let position = |c: usize| mapping.get(&c).copied();
        let timestamp = match moved {
            Some(p) => TimestampProvenance::fixed(p.output, p.kind()),
            None => {
                let mut ts = plan.timestamp.remap(position);
                if !ts.is_fixed() {
                    for p in &preserved {
                        ts.add_candidate(p.output, p.kind());
                    }
                }
                ts
            }
        };
        let now_filter = match (moved, now_filter) {
            (Some(_), nf) => nf,
            (None, nf) => nf.and_then(|n| n.remap(position)),
        };

        let width = out.len();
        let primary_key = plan
            .primary_key
            .try_remap(width, position)
            .unwrap_or_else(|| unreachable!("primary key columns were appended"));
        let sort = plan.sort.remap(|c| position(c).unwrap_or(c));
        Ok(AnnotatedPlan {
            rel: plan.rel.project(out),
            primary_key,
            timestamp,
            select: IndexMap::identity_into(exprs.len(), width),
            now_filter,
            sort,
            lineage: None,
            ..plan
        })
    }
}
