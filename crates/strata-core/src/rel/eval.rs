//! Reference row evaluator.
//!
//! Executes a [`RelNode`] tree over small in-memory fixtures. It exists to
//! check that plan rewrites preserve results (for example that collapsing a
//! self-join over a shredded entity yields the same rows as the physical
//! join). Joins are nested loops and grouping is linear; it is not meant
//! for production volumes.
//!
//! Temporal and interval joins evaluate as plain joins on their condition.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use super::aggregate::{AggregateCall, AggregateFunction};
use super::collation::{Collation, SortDirection};
use super::expr::{BinaryOp, ScalarExpr};
use super::function::FunctionKind;
use super::node::{JoinKind, ProjectExpr, RelNode};
use super::value::ScalarValue;
use crate::catalog::TableId;

/// A positional row.
pub type Row = Vec<ScalarValue>;

/// Errors raised while evaluating a plan.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// No fixture rows were registered for a scanned table.
    #[error("no rows registered for table {0}")]
    MissingTable(TableId),

    /// A function without reference semantics was called.
    #[error("function '{0}' cannot be evaluated")]
    UnsupportedFunction(String),

    /// Column reference outside the row.
    #[error("column ${0} outside row of width {1}")]
    ColumnOutOfRange(usize, usize),

    /// Operand types do not fit the operator.
    #[error("type error: {0}")]
    Type(String),

    /// The operator is not supported by the evaluator.
    #[error("unsupported operator: {0}")]
    Unsupported(String),
}

/// Fixture rows per table plus the processing time used for `now()`.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    tables: FxHashMap<TableId, Vec<Row>>,
    now_ms: i64,
}

impl EvalContext {
    /// Creates a context where `now()` returns `now_ms`.
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            tables: FxHashMap::default(),
            now_ms,
        }
    }

    /// Registers the rows of `table`.
    #[must_use]
    pub fn with_table(mut self, table: TableId, rows: Vec<Row>) -> Self {
        self.tables.insert(table, rows);
        self
    }

    /// Current processing time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }
}

/// Evaluates `node` and returns its rows.
///
/// # Errors
///
/// Returns [`EvalError`] if a table is missing, an expression is ill-typed,
/// or an operator has no reference semantics.
pub fn evaluate(node: &RelNode, ctx: &EvalContext) -> Result<Vec<Row>, EvalError> {
    match node {
        RelNode::Scan { table, .. } => ctx
            .tables
            .get(table)
            .cloned()
            .ok_or(EvalError::MissingTable(*table)),
        RelNode::Filter { input, predicate } => {
            let rows = evaluate(input, ctx)?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                if evaluate_expr(predicate, &row, ctx)?.is_true() {
                    out.push(row);
                }
            }
            Ok(out)
        }
        RelNode::Project { input, exprs, .. } => {
            let rows = evaluate(input, ctx)?;
            project(&rows, exprs, ctx)
        }
        RelNode::Join {
            left,
            right,
            kind,
            condition,
            ..
        } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            join(
                &l,
                &r,
                left.field_count(),
                right.field_count(),
                *kind,
                condition,
                ctx,
            )
        }
        RelNode::Aggregate {
            input,
            group_by,
            grouping_sets,
            calls,
            ..
        } => {
            if !grouping_sets.is_empty() {
                return Err(EvalError::Unsupported("grouping sets".into()));
            }
            let rows = evaluate(input, ctx)?;
            aggregate(&rows, group_by, calls)
        }
        RelNode::Union { inputs, all } => {
            let mut out = Vec::new();
            for input in inputs {
                out.extend(evaluate(input, ctx)?);
            }
            if !*all {
                let mut distinct: Vec<Row> = Vec::with_capacity(out.len());
                for row in out {
                    if !distinct.contains(&row) {
                        distinct.push(row);
                    }
                }
                out = distinct;
            }
            Ok(out)
        }
        RelNode::Sort {
            input,
            collation,
            limit,
            offset,
        } => {
            let mut rows = evaluate(input, ctx)?;
            sort_rows(&mut rows, collation);
            let skip = offset.unwrap_or(0);
            let take = limit.unwrap_or(usize::MAX);
            Ok(rows.into_iter().skip(skip).take(take).collect())
        }
        RelNode::Unnest {
            input,
            column,
            outer,
            element_fields,
        } => {
            let rows = evaluate(input, ctx)?;
            let mut out = Vec::new();
            for row in rows {
                let elements = match row.get(*column) {
                    Some(ScalarValue::List(elements)) => elements.clone(),
                    Some(ScalarValue::Null) => Vec::new(),
                    Some(other) => {
                        return Err(EvalError::Type(format!("cannot unnest {other}")));
                    }
                    None => return Err(EvalError::ColumnOutOfRange(*column, row.len())),
                };
                if elements.is_empty() && *outer {
                    let mut padded = row.clone();
                    padded.extend(std::iter::repeat_n(ScalarValue::Null, element_fields.len()));
                    out.push(padded);
                }
                for element in elements {
                    let mut expanded = row.clone();
                    expanded.extend(element);
                    out.push(expanded);
                }
            }
            Ok(out)
        }
        RelNode::PartitionLimit {
            input,
            partition,
            limit,
            distinct,
        } => {
            let rows = evaluate(input, ctx)?;
            let keep = if *distinct { Some(1) } else { *limit };
            let Some(keep) = keep else {
                return Ok(rows);
            };
            let mut seen: Vec<(Row, usize)> = Vec::new();
            let mut out = Vec::new();
            for row in rows {
                let key: Row = partition.iter().map(|&p| row[p].clone()).collect();
                let count = match seen.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, c)) => c,
                    None => {
                        seen.push((key, 0));
                        let last = seen.len() - 1;
                        &mut seen[last].1
                    }
                };
                if *count < keep {
                    *count += 1;
                    out.push(row);
                }
            }
            Ok(out)
        }
    }
}

/// Evaluates a scalar expression against one row.
///
/// # Errors
///
/// Returns [`EvalError`] for out-of-range columns, type mismatches and
/// functions without reference semantics.
pub fn evaluate_expr(
    expr: &ScalarExpr,
    row: &[ScalarValue],
    ctx: &EvalContext,
) -> Result<ScalarValue, EvalError> {
    match expr {
        ScalarExpr::Column(i) => row
            .get(*i)
            .cloned()
            .ok_or(EvalError::ColumnOutOfRange(*i, row.len())),
        ScalarExpr::Literal(v) => Ok(v.clone()),
        ScalarExpr::Binary { op, left, right } => {
            let l = evaluate_expr(left, row, ctx)?;
            let r = evaluate_expr(right, row, ctx)?;
            binary(*op, &l, &r)
        }
        ScalarExpr::Not(e) => match evaluate_expr(e, row, ctx)? {
            ScalarValue::Boolean(b) => Ok(ScalarValue::Boolean(!b)),
            ScalarValue::Null => Ok(ScalarValue::Null),
            other => Err(EvalError::Type(format!("NOT {other}"))),
        },
        ScalarExpr::IsNull(e) => Ok(ScalarValue::Boolean(evaluate_expr(e, row, ctx)?.is_null())),
        ScalarExpr::Call { function, args } => match function.kind {
            FunctionKind::Now => Ok(ScalarValue::TimestampMs(ctx.now_ms)),
            FunctionKind::TimeBucket(spec) => {
                let arg = single_arg(args, row, ctx)?;
                Ok(match arg.as_i64() {
                    Some(ts) => ScalarValue::TimestampMs(spec.end_of_bucket(ts)),
                    None => ScalarValue::Null,
                })
            }
            FunctionKind::TimestampPreserving => single_arg(args, row, ctx),
            FunctionKind::Plain => Err(EvalError::UnsupportedFunction(function.name.clone())),
        },
        ScalarExpr::Over { .. } => Err(EvalError::Unsupported(
            "window expression outside projection".into(),
        )),
    }
}

fn single_arg(
    args: &[ScalarExpr],
    row: &[ScalarValue],
    ctx: &EvalContext,
) -> Result<ScalarValue, EvalError> {
    match args {
        [arg] => evaluate_expr(arg, row, ctx),
        _ => Err(EvalError::Type(format!(
            "expected one argument, got {}",
            args.len()
        ))),
    }
}

fn binary(op: BinaryOp, l: &ScalarValue, r: &ScalarValue) -> Result<ScalarValue, EvalError> {
    use ScalarValue as V;
    match op {
        BinaryOp::And => Ok(V::Boolean(l.is_true() && r.is_true())),
        BinaryOp::Or => Ok(V::Boolean(l.is_true() || r.is_true())),
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => Ok(match l.compare(r) {
            None => V::Null,
            Some(ord) => V::Boolean(match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::NotEq => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::LtEq => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }),
        }),
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
            if l.is_null() || r.is_null() {
                return Ok(V::Null);
            }
            if matches!(l, V::Float64(_)) || matches!(r, V::Float64(_)) {
                let (a, b) = match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(EvalError::Type(format!("{l} and {r}"))),
                };
                return Ok(V::Float64(match op {
                    BinaryOp::Plus => a + b,
                    BinaryOp::Minus => a - b,
                    BinaryOp::Multiply => a * b,
                    _ => a / b,
                }));
            }
            let (a, b) = match (l.as_i64(), r.as_i64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(EvalError::Type(format!("{l} and {r}"))),
            };
            let value = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                _ if b == 0 => return Ok(V::Null),
                _ => a / b,
            };
            Ok(match (l, r) {
                (V::TimestampMs(_), V::TimestampMs(_)) => V::IntervalMs(value),
                (V::TimestampMs(_), _) | (_, V::TimestampMs(_)) => V::TimestampMs(value),
                (V::IntervalMs(_), V::IntervalMs(_)) => V::IntervalMs(value),
                _ => V::Int64(value),
            })
        }
    }
}

fn project(
    rows: &[Row],
    exprs: &[ProjectExpr],
    ctx: &EvalContext,
) -> Result<Vec<Row>, EvalError> {
    let mut windows: FxHashMap<usize, Vec<ScalarValue>> = FxHashMap::default();
    for (pos, e) in exprs.iter().enumerate() {
        if let ScalarExpr::Over {
            call,
            partition_by,
            order_by,
        } = &e.expr
        {
            windows.insert(pos, running_window(rows, call, partition_by, order_by)?);
        }
    }
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let mut projected = Vec::with_capacity(exprs.len());
        for (pos, e) in exprs.iter().enumerate() {
            match windows.get(&pos) {
                Some(values) => projected.push(values[idx].clone()),
                None => projected.push(evaluate_expr(&e.expr, row, ctx)?),
            }
        }
        out.push(projected);
    }
    Ok(out)
}

/// Running aggregate per row, unbounded preceding to current row.
fn running_window(
    rows: &[Row],
    call: &AggregateCall,
    partition_by: &[usize],
    order_by: &Collation,
) -> Result<Vec<ScalarValue>, EvalError> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], order_by));
    let mut result = vec![ScalarValue::Null; rows.len()];
    let mut partitions: Vec<(Row, Vec<usize>)> = Vec::new();
    for idx in order {
        let key: Row = partition_by.iter().map(|&p| rows[idx][p].clone()).collect();
        let members = match partitions.iter_mut().find(|(k, _)| *k == key) {
            Some((_, m)) => m,
            None => {
                partitions.push((key, Vec::new()));
                let last = partitions.len() - 1;
                &mut partitions[last].1
            }
        };
        members.push(idx);
        let frame: Vec<&Row> = members.iter().map(|&m| &rows[m]).collect();
        result[idx] = accumulate(call, &frame)?;
    }
    Ok(result)
}

fn aggregate(
    rows: &[Row],
    group_by: &[usize],
    calls: &[AggregateCall],
) -> Result<Vec<Row>, EvalError> {
    let mut groups: Vec<(Row, Vec<&Row>)> = Vec::new();
    for row in rows {
        let key: Row = group_by.iter().map(|&g| row[g].clone()).collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }
    if groups.is_empty() && group_by.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }
    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut result = key;
        for call in calls {
            result.push(accumulate(call, &members)?);
        }
        out.push(result);
    }
    Ok(out)
}

fn accumulate(call: &AggregateCall, rows: &[&Row]) -> Result<ScalarValue, EvalError> {
    let mut values: Vec<ScalarValue> = Vec::new();
    for row in rows {
        if let Some(f) = call.filter {
            if !row[f].is_true() {
                continue;
            }
        }
        match call.args.first() {
            Some(&a) => {
                if !row[a].is_null() {
                    values.push(row[a].clone());
                }
            }
            None => values.push(ScalarValue::Int64(1)),
        }
    }
    if call.distinct {
        let mut distinct: Vec<ScalarValue> = Vec::with_capacity(values.len());
        for v in values {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }
        values = distinct;
    }
    let count = i64::try_from(values.len()).map_err(|e| EvalError::Type(e.to_string()))?;
    Ok(match call.function {
        AggregateFunction::Count => ScalarValue::Int64(count),
        AggregateFunction::Sum => {
            if values.is_empty() {
                ScalarValue::Null
            } else if values.iter().any(|v| matches!(v, ScalarValue::Float64(_))) {
                ScalarValue::Float64(values.iter().filter_map(ScalarValue::as_f64).sum())
            } else {
                ScalarValue::Int64(values.iter().filter_map(ScalarValue::as_i64).sum())
            }
        }
        AggregateFunction::Min => values
            .into_iter()
            .min_by(ScalarValue::sort_cmp)
            .unwrap_or(ScalarValue::Null),
        AggregateFunction::Max => values
            .into_iter()
            .max_by(ScalarValue::sort_cmp)
            .unwrap_or(ScalarValue::Null),
        AggregateFunction::Avg => {
            if values.is_empty() {
                ScalarValue::Null
            } else {
                let sum: f64 = values.iter().filter_map(ScalarValue::as_f64).sum();
                #[allow(clippy::cast_precision_loss)]
                ScalarValue::Float64(sum / count as f64)
            }
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn join(
    left: &[Row],
    right: &[Row],
    left_width: usize,
    right_width: usize,
    kind: JoinKind,
    condition: &ScalarExpr,
    ctx: &EvalContext,
) -> Result<Vec<Row>, EvalError> {
    let keep_left = matches!(kind, JoinKind::Left | JoinKind::Full);
    let keep_right = matches!(kind, JoinKind::Right | JoinKind::Full);
    let mut right_matched = vec![false; right.len()];
    let mut out = Vec::new();
    for l in left {
        let mut matched = false;
        for (ri, r) in right.iter().enumerate() {
            let mut combined = l.clone();
            combined.extend(r.iter().cloned());
            if evaluate_expr(condition, &combined, ctx)?.is_true() {
                matched = true;
                right_matched[ri] = true;
                out.push(combined);
            }
        }
        if !matched && keep_left {
            let mut padded = l.clone();
            padded.extend(std::iter::repeat_n(ScalarValue::Null, right_width));
            out.push(padded);
        }
    }
    if keep_right {
        for (ri, r) in right.iter().enumerate() {
            if !right_matched[ri] {
                let mut padded: Row = std::iter::repeat_n(ScalarValue::Null, left_width).collect();
                padded.extend(r.iter().cloned());
                out.push(padded);
            }
        }
    }
    Ok(out)
}

fn compare_rows(a: &Row, b: &Row, collation: &Collation) -> Ordering {
    for c in collation.fields() {
        let ord = a[c.index].sort_cmp(&b[c.index]);
        let ord = match c.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort by `collation`.
pub fn sort_rows(rows: &mut [Row], collation: &Collation) {
    rows.sort_by(|a, b| compare_rows(a, b, collation));
}

/// Rows in a canonical order, for comparing results as multisets.
#[must_use]
pub fn canonical(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rel::collation::FieldCollation;
    use arrow_schema::{DataType, Field, Fields};

    fn int(v: i64) -> ScalarValue {
        ScalarValue::Int64(v)
    }

    fn fields(n: usize) -> Fields {
        (0..n)
            .map(|i| Field::new(format!("c{i}"), DataType::Int64, true))
            .collect()
    }

    #[test]
    fn test_filter_and_aggregate() {
        let t = TableId::Query(0);
        let ctx = EvalContext::new(0).with_table(
            t,
            vec![vec![int(1), int(10)], vec![int(1), int(5)], vec![int(2), int(7)]],
        );
        let plan = RelNode::scan(t, "t", fields(2))
            .filter(ScalarExpr::gt(ScalarExpr::col(1), ScalarExpr::lit(int(6))))
            .aggregate(
                vec![0],
                vec![AggregateCall::new(
                    AggregateFunction::Sum,
                    vec![1],
                    "s",
                    DataType::Int64,
                )],
            );
        let rows = canonical(evaluate(&plan, &ctx).unwrap());
        assert_eq!(rows, vec![vec![int(1), int(10)], vec![int(2), int(7)]]);
    }

    #[test]
    fn test_unnest_and_partition_limit() {
        let t = TableId::Query(0);
        let children = ScalarValue::List(vec![vec![int(0)], vec![int(1)]]);
        let ctx = EvalContext::new(0).with_table(t, vec![vec![int(9), children]]);
        let plan = RelNode::scan(t, "t", fields(2)).unnest(1, false, fields(1));
        let rows = evaluate(&plan, &ctx).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][2], int(1));

        let limited = plan
            .sort(Collation::of(vec![FieldCollation::desc(2)]))
            .partition_limit(vec![0], None, true);
        let rows = evaluate(&limited, &ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][2], int(1));
    }

    #[test]
    fn test_left_join_pads_nulls() {
        let l = TableId::Query(0);
        let r = TableId::Query(1);
        let ctx = EvalContext::new(0)
            .with_table(l, vec![vec![int(1)], vec![int(2)]])
            .with_table(r, vec![vec![int(1)]]);
        let plan = RelNode::scan(l, "l", fields(1)).join(
            RelNode::scan(r, "r", fields(1)),
            JoinKind::Left,
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(1)),
        );
        let rows = canonical(evaluate(&plan, &ctx).unwrap());
        assert_eq!(
            rows,
            vec![vec![int(1), int(1)], vec![int(2), ScalarValue::Null]]
        );
    }

    #[test]
    fn test_running_window() {
        let t = TableId::Query(0);
        let ctx = EvalContext::new(0).with_table(
            t,
            vec![vec![int(1), int(3)], vec![int(1), int(1)], vec![int(2), int(2)]],
        );
        let input = fields(2);
        let over = ScalarExpr::Over {
            call: AggregateCall::count_star("cnt"),
            partition_by: vec![0],
            order_by: Collation::of(vec![FieldCollation::asc(1)]),
        };
        let plan = RelNode::scan(t, "t", input.clone()).project(vec![
            ProjectExpr::column(0, &input),
            ProjectExpr::new(over, "cnt", &input),
            ProjectExpr::column(1, &input),
        ]);
        let rows = evaluate(&plan, &ctx).unwrap();
        assert_eq!(rows[0], vec![int(1), int(2), int(3)]);
        assert_eq!(rows[1], vec![int(1), int(1), int(1)]);
        assert_eq!(rows[2], vec![int(2), int(1), int(2)]);
    }

    #[test]
    fn test_now_arithmetic() {
        let ctx = EvalContext::new(10_000);
        let e = ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(4_000));
        assert_eq!(
            evaluate_expr(&e, &[], &ctx).unwrap(),
            ScalarValue::TimestampMs(6_000)
        );
    }
}
