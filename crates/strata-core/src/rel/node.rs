//! Relational operator tree.
//!
//! [`RelNode`] is a closed set of operators. Upstream produces trees made of
//! `Scan`, `Filter`, `Project`, `Join`, `Aggregate`, `Union` and `Sort`; the
//! converter additionally emits `Unnest` when shredding nested collections
//! and `PartitionLimit` when materializing a Top-N constraint.

use std::fmt;
use std::sync::Arc;

use arrow_schema::{Field, FieldRef, Fields};

use super::aggregate::AggregateCall;
use super::collation::Collation;
use super::expr::ScalarExpr;
use super::hint::{AggregateHint, JoinHint, TopNHint};
use crate::catalog::TableId;

/// Join kinds accepted by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Unspecified: the converter picks a temporal, interval or inner join.
    Default,
    /// Inner join.
    Inner,
    /// Left outer join.
    Left,
    /// Right outer join.
    Right,
    /// Full outer join.
    Full,
    /// Explicit stream-to-state temporal join.
    Temporal,
    /// Explicit stream-to-stream interval join.
    Interval,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "DEFAULT",
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
            Self::Temporal => "TEMPORAL",
            Self::Interval => "INTERVAL",
        };
        f.write_str(name)
    }
}

/// One output column of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectExpr {
    /// Expression over the input row.
    pub expr: ScalarExpr,
    /// Output field.
    pub field: FieldRef,
}

impl ProjectExpr {
    /// Named expression, typed against `input`.
    #[must_use]
    pub fn new(expr: ScalarExpr, name: impl Into<String>, input: &Fields) -> Self {
        let data_type = expr.data_type(input);
        Self {
            expr,
            field: Arc::new(Field::new(name.into(), data_type, true)),
        }
    }

    /// Pass-through of input column `index`, keeping its field.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a column of `input`.
    #[must_use]
    pub fn column(index: usize, input: &Fields) -> Self {
        Self {
            expr: ScalarExpr::Column(index),
            field: Arc::clone(&input[index]),
        }
    }

    /// Pass-through of input column `index` under a new name.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a column of `input`.
    #[must_use]
    pub fn renamed_column(index: usize, name: &str, input: &Fields) -> Self {
        Self {
            expr: ScalarExpr::Column(index),
            field: Arc::new(input[index].as_ref().clone().with_name(name)),
        }
    }
}

/// A relational operator tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RelNode {
    /// Scan of a catalog relation.
    Scan {
        /// Catalog id.
        table: TableId,
        /// Display name.
        name: String,
        /// Row type.
        fields: Fields,
    },
    /// Row filter.
    Filter {
        /// Input.
        input: Box<RelNode>,
        /// Boolean predicate.
        predicate: ScalarExpr,
    },
    /// Projection.
    Project {
        /// Input.
        input: Box<RelNode>,
        /// Output columns.
        exprs: Vec<ProjectExpr>,
        /// Optional ranking hint.
        hint: Option<TopNHint>,
    },
    /// Binary join.
    Join {
        /// Left input.
        left: Box<RelNode>,
        /// Right input.
        right: Box<RelNode>,
        /// Join kind.
        kind: JoinKind,
        /// Condition over the concatenated row.
        condition: ScalarExpr,
        /// Physical hint.
        hint: Option<JoinHint>,
    },
    /// Grouped aggregation. Output is the group columns in ascending input
    /// order followed by one column per call.
    Aggregate {
        /// Input.
        input: Box<RelNode>,
        /// Group columns, sorted ascending without duplicates.
        group_by: Vec<usize>,
        /// Additional grouping sets. Empty for a plain `GROUP BY`.
        grouping_sets: Vec<Vec<usize>>,
        /// Aggregate calls.
        calls: Vec<AggregateCall>,
        /// Physical hint.
        hint: Option<AggregateHint>,
    },
    /// Union of inputs with identical row types.
    Union {
        /// Inputs.
        inputs: Vec<RelNode>,
        /// `UNION ALL` when true.
        all: bool,
    },
    /// Ordering with optional limit and offset.
    Sort {
        /// Input.
        input: Box<RelNode>,
        /// Sort order.
        collation: Collation,
        /// `LIMIT`.
        limit: Option<usize>,
        /// `OFFSET`.
        offset: Option<usize>,
    },
    /// Expands a nested collection column into one row per element,
    /// appending the element's columns to the parent row.
    Unnest {
        /// Input.
        input: Box<RelNode>,
        /// Nested collection column of the input.
        column: usize,
        /// Keep parent rows with an empty collection (null-padded).
        outer: bool,
        /// Row type of one element.
        element_fields: Fields,
    },
    /// Keeps the first `limit` rows per partition in input order, or one
    /// row per partition when `distinct`.
    PartitionLimit {
        /// Input.
        input: Box<RelNode>,
        /// Partition columns.
        partition: Vec<usize>,
        /// Rows kept per partition.
        limit: Option<usize>,
        /// Keep exactly one row per partition.
        distinct: bool,
    },
}

fn nullable(fields: &Fields) -> impl Iterator<Item = FieldRef> + '_ {
    fields
        .iter()
        .map(|f| Arc::new(f.as_ref().clone().with_nullable(true)))
}

impl RelNode {
    /// Scan of a catalog relation.
    #[must_use]
    pub fn scan(table: TableId, name: impl Into<String>, fields: Fields) -> Self {
        Self::Scan {
            table,
            name: name.into(),
            fields,
        }
    }

    /// Filters rows by `predicate`.
    #[must_use]
    pub fn filter(self, predicate: ScalarExpr) -> Self {
        Self::Filter {
            input: Box::new(self),
            predicate,
        }
    }

    /// Projects `exprs`.
    #[must_use]
    pub fn project(self, exprs: Vec<ProjectExpr>) -> Self {
        Self::Project {
            input: Box::new(self),
            exprs,
            hint: None,
        }
    }

    /// Projects the given columns, keeping their fields.
    #[must_use]
    pub fn project_columns(self, columns: &[usize]) -> Self {
        let fields = self.fields();
        let exprs = columns
            .iter()
            .map(|&c| ProjectExpr::column(c, &fields))
            .collect();
        self.project(exprs)
    }

    /// Projects the given columns and attaches a ranking hint.
    #[must_use]
    pub fn project_with_hint(self, columns: &[usize], hint: TopNHint) -> Self {
        match self.project_columns(columns) {
            Self::Project { input, exprs, .. } => Self::Project {
                input,
                exprs,
                hint: Some(hint),
            },
            other => other,
        }
    }

    /// Joins with `right` on `condition`.
    #[must_use]
    pub fn join(self, right: RelNode, kind: JoinKind, condition: ScalarExpr) -> Self {
        Self::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            condition,
            hint: None,
        }
    }

    /// Aggregates by `group_by`. The group columns are normalized to
    /// ascending order without duplicates.
    #[must_use]
    pub fn aggregate(self, mut group_by: Vec<usize>, calls: Vec<AggregateCall>) -> Self {
        group_by.sort_unstable();
        group_by.dedup();
        Self::Aggregate {
            input: Box::new(self),
            group_by,
            grouping_sets: Vec::new(),
            calls,
            hint: None,
        }
    }

    /// `UNION ALL` of `inputs`.
    #[must_use]
    pub fn union_all(inputs: Vec<RelNode>) -> Self {
        Self::Union { inputs, all: true }
    }

    /// Orders rows by `collation`.
    #[must_use]
    pub fn sort(self, collation: Collation) -> Self {
        Self::Sort {
            input: Box::new(self),
            collation,
            limit: None,
            offset: None,
        }
    }

    /// Orders rows by `collation` and keeps the first `limit`.
    #[must_use]
    pub fn sort_limit(self, collation: Collation, limit: usize) -> Self {
        Self::Sort {
            input: Box::new(self),
            collation,
            limit: Some(limit),
            offset: None,
        }
    }

    /// Expands the nested collection at `column`.
    #[must_use]
    pub fn unnest(self, column: usize, outer: bool, element_fields: Fields) -> Self {
        Self::Unnest {
            input: Box::new(self),
            column,
            outer,
            element_fields,
        }
    }

    /// Restricts rows per partition.
    #[must_use]
    pub fn partition_limit(self, partition: Vec<usize>, limit: Option<usize>, distinct: bool) -> Self {
        Self::PartitionLimit {
            input: Box::new(self),
            partition,
            limit,
            distinct,
        }
    }

    /// Attaches a join hint. No effect on other operators.
    #[must_use]
    pub fn with_join_hint(self, new_hint: JoinHint) -> Self {
        match self {
            Self::Join {
                left,
                right,
                kind,
                condition,
                ..
            } => Self::Join {
                left,
                right,
                kind,
                condition,
                hint: Some(new_hint),
            },
            other => other,
        }
    }

    /// Attaches an aggregate hint. No effect on other operators.
    #[must_use]
    pub fn with_aggregate_hint(self, new_hint: AggregateHint) -> Self {
        match self {
            Self::Aggregate {
                input,
                group_by,
                grouping_sets,
                calls,
                ..
            } => Self::Aggregate {
                input,
                group_by,
                grouping_sets,
                calls,
                hint: Some(new_hint),
            },
            other => other,
        }
    }

    /// Output row type.
    #[must_use]
    pub fn fields(&self) -> Fields {
        match self {
            Self::Scan { fields, .. } => fields.clone(),
            Self::Filter { input, .. }
            | Self::Sort { input, .. }
            | Self::PartitionLimit { input, .. } => input.fields(),
            Self::Project { exprs, .. } => exprs.iter().map(|e| Arc::clone(&e.field)).collect(),
            Self::Join {
                left, right, kind, ..
            } => {
                let l = left.fields();
                let r = right.fields();
                let left_iter: Vec<FieldRef> = match kind {
                    JoinKind::Right | JoinKind::Full => nullable(&l).collect(),
                    _ => l.iter().cloned().collect(),
                };
                let right_iter: Vec<FieldRef> = match kind {
                    JoinKind::Left | JoinKind::Full => nullable(&r).collect(),
                    _ => r.iter().cloned().collect(),
                };
                left_iter.into_iter().chain(right_iter).collect()
            }
            Self::Aggregate {
                input,
                group_by,
                calls,
                ..
            } => {
                let in_fields = input.fields();
                group_by
                    .iter()
                    .map(|&g| Arc::clone(&in_fields[g]))
                    .chain(calls.iter().map(|c| Arc::new(c.field())))
                    .collect()
            }
            Self::Union { inputs, .. } => inputs.first().map(RelNode::fields).unwrap_or_default(),
            Self::Unnest {
                input,
                outer,
                element_fields,
                ..
            } => {
                let parent = input.fields();
                let element: Vec<FieldRef> = if *outer {
                    nullable(element_fields).collect()
                } else {
                    element_fields.iter().cloned().collect()
                };
                parent.iter().cloned().chain(element).collect()
            }
        }
    }

    /// Number of output columns.
    #[must_use]
    pub fn field_count(&self) -> usize {
        match self {
            Self::Scan { fields, .. } => fields.len(),
            Self::Filter { input, .. }
            | Self::Sort { input, .. }
            | Self::PartitionLimit { input, .. } => input.field_count(),
            Self::Project { exprs, .. } => exprs.len(),
            Self::Join { left, right, .. } => left.field_count() + right.field_count(),
            Self::Aggregate {
                group_by, calls, ..
            } => group_by.len() + calls.len(),
            Self::Union { inputs, .. } => inputs.first().map_or(0, RelNode::field_count),
            Self::Unnest {
                input,
                element_fields,
                ..
            } => input.field_count() + element_fields.len(),
        }
    }

    /// Direct inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<&RelNode> {
        match self {
            Self::Scan { .. } => Vec::new(),
            Self::Filter { input, .. }
            | Self::Project { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Unnest { input, .. }
            | Self::PartitionLimit { input, .. } => vec![input.as_ref()],
            Self::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Union { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Operator name used in explain output.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "Scan",
            Self::Filter { .. } => "Filter",
            Self::Project { .. } => "Project",
            Self::Join { .. } => "Join",
            Self::Aggregate { .. } => "Aggregate",
            Self::Union { .. } => "Union",
            Self::Sort { .. } => "Sort",
            Self::Unnest { .. } => "Unnest",
            Self::PartitionLimit { .. } => "PartitionLimit",
        }
    }

    /// Total number of operators in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.inputs().iter().map(|n| n.node_count()).sum::<usize>()
    }

    /// Counts operators satisfying `pred`.
    pub fn count_nodes(&self, pred: &impl Fn(&RelNode) -> bool) -> usize {
        usize::from(pred(self))
            + self
                .inputs()
                .iter()
                .map(|n| n.count_nodes(pred))
                .sum::<usize>()
    }

    /// Indented explain rendering of the tree.
    #[must_use]
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;
        let _ = write!(out, "{}{}", "  ".repeat(depth), self.kind_name());
        let _ = match self {
            Self::Scan { name, table, .. } => write!(out, ": {name} [{table}]"),
            Self::Filter { predicate, .. } => write!(out, ": {predicate}"),
            Self::Project { exprs, hint, .. } => {
                let list: Vec<String> = exprs
                    .iter()
                    .map(|e| format!("{}={}", e.field.name(), e.expr))
                    .collect();
                let _ = write!(out, ": {}", list.join(", "));
                match hint {
                    Some(h) => write!(out, " hint={:?}{:?}", h.kind, h.partition),
                    None => Ok(()),
                }
            }
            Self::Join {
                kind,
                condition,
                hint,
                ..
            } => {
                let _ = write!(out, ": {kind} ON {condition}");
                match hint {
                    Some(h) => write!(out, " hint={h:?}"),
                    None => Ok(()),
                }
            }
            Self::Aggregate {
                group_by,
                calls,
                hint,
                ..
            } => {
                let list: Vec<String> = calls.iter().map(ToString::to_string).collect();
                let _ = write!(out, ": group={group_by:?} calls=[{}]", list.join(", "));
                match hint {
                    Some(h) => write!(out, " hint={h:?}"),
                    None => Ok(()),
                }
            }
            Self::Union { all, .. } => write!(out, ": all={all}"),
            Self::Sort {
                collation,
                limit,
                offset,
                ..
            } => write!(out, ": {collation} limit={limit:?} offset={offset:?}"),
            Self::Unnest { column, outer, .. } => write!(out, ": ${column} outer={outer}"),
            Self::PartitionLimit {
                partition,
                limit,
                distinct,
                ..
            } => write!(
                out,
                ": partition={partition:?} limit={limit:?} distinct={distinct}"
            ),
        };
        out.push('\n');
        for input in self.inputs() {
            input.explain_into(out, depth + 1);
        }
    }
}

impl fmt::Display for RelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;

    fn fields(names: &[&str]) -> Fields {
        names
            .iter()
            .map(|n| Field::new(*n, DataType::Int64, false))
            .collect()
    }

    #[test]
    fn test_join_fields_nullable_on_outer_side() {
        let l = RelNode::scan(TableId::Query(0), "l", fields(&["a"]));
        let r = RelNode::scan(TableId::Query(1), "r", fields(&["b", "c"]));
        let j = l.join(r, JoinKind::Left, ScalarExpr::col(0));
        let f = j.fields();
        assert_eq!(f.len(), 3);
        assert!(!f[0].is_nullable());
        assert!(f[1].is_nullable());
        assert_eq!(j.field_count(), 3);
    }

    #[test]
    fn test_aggregate_normalizes_group_by() {
        let s = RelNode::scan(TableId::Query(0), "t", fields(&["a", "b", "c"]));
        let agg = s.aggregate(vec![2, 0, 2], vec![AggregateCall::count_star("cnt")]);
        match &agg {
            RelNode::Aggregate { group_by, .. } => assert_eq!(group_by, &vec![0, 2]),
            other => panic!("unexpected {other}"),
        }
        let names: Vec<String> = agg.fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["a", "c", "cnt"]);
    }

    #[test]
    fn test_explain_and_counts() {
        let s = RelNode::scan(TableId::Query(0), "t", fields(&["a", "b"]));
        let p = s.project_columns(&[1]).filter(ScalarExpr::col(0));
        assert_eq!(p.node_count(), 3);
        assert_eq!(p.count_nodes(&|n| matches!(n, RelNode::Project { .. })), 1);
        let explain = p.explain();
        assert!(explain.starts_with("Filter: $0\n  Project: b=$1\n    Scan: t"));
    }
}
