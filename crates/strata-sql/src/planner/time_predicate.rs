//! Recognition of time comparisons in filter and join conditions.

use strata_core::rel::{BinaryOp, ScalarExpr, ScalarValue};
use strata_core::time::{BoundComparison, TimeOperand, TimePredicate};

/// A time operand optionally shifted by an interval literal.
fn offset_operand(
    expr: &ScalarExpr,
    is_candidate: &impl Fn(usize) -> bool,
) -> Option<(TimeOperand, i64)> {
    match expr {
        ScalarExpr::Column(i) if is_candidate(*i) => Some((TimeOperand::Column(*i), 0)),
        ScalarExpr::Call { function, .. } if function.is_now() => Some((TimeOperand::Now, 0)),
        ScalarExpr::Binary { op, left, right } => {
            let sign = match op {
                BinaryOp::Plus => 1,
                BinaryOp::Minus => -1,
                _ => return None,
            };
            let ScalarExpr::Literal(ScalarValue::IntervalMs(ms)) = right.as_ref() else {
                return None;
            };
            let (operand, inner) = offset_operand(left, is_candidate)?;
            Some((operand, inner + sign * ms))
        }
        _ => None,
    }
}

/// Normalizes `a ± x <op> b ± y` where both sides are timestamp candidates
/// (as decided by `is_candidate`) or `now()`.
///
/// Returns `None` for anything else, including comparisons of an operand
/// with itself and of `now()` with `now()`.
#[must_use]
pub fn extract_time_predicate(
    expr: &ScalarExpr,
    is_candidate: impl Fn(usize) -> bool,
) -> Option<TimePredicate> {
    let ScalarExpr::Binary { op, left, right } = expr else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    let (a, x) = offset_operand(left, &is_candidate)?;
    let (b, y) = offset_operand(right, &is_candidate)?;
    if a == b {
        return None;
    }
    // a + x <op> b + y
    let predicate = match op {
        BinaryOp::Lt => TimePredicate::new(a, b, BoundComparison::Lt, y - x),
        BinaryOp::LtEq => TimePredicate::new(a, b, BoundComparison::Le, y - x),
        BinaryOp::Gt => TimePredicate::new(b, a, BoundComparison::Lt, x - y),
        BinaryOp::GtEq => TimePredicate::new(b, a, BoundComparison::Le, x - y),
        BinaryOp::Eq => TimePredicate::new(a, b, BoundComparison::Eq, y - x),
        _ => return None,
    };
    Some(predicate)
}

/// A join condition split into the parts the join rules care about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinCondition {
    /// Column equalities across the sides as `(left column, right column)`,
    /// the right column relative to the right input.
    pub equalities: Vec<(usize, usize)>,
    /// Time bounds between one left and one right timestamp candidate, in
    /// joined-row coordinates.
    pub time_predicates: Vec<TimePredicate>,
    /// Every other conjunct.
    pub remaining: Vec<ScalarExpr>,
}

impl JoinCondition {
    /// Decomposes `condition` over a joined row whose left input has
    /// `left_width` columns. `is_timestamp` tells which joined-row columns
    /// are timestamp candidates of their side.
    #[must_use]
    pub fn analyze(
        condition: &ScalarExpr,
        left_width: usize,
        is_timestamp: impl Fn(usize) -> bool,
    ) -> Self {
        let mut out = Self::default();
        let is_left = |c: usize| c < left_width;
        for conjunct in condition.conjunctions() {
            if conjunct.is_true_literal() {
                continue;
            }
            if let Some(p) = extract_time_predicate(&conjunct, &is_timestamp) {
                let cols: Vec<usize> = p.columns().collect();
                if cols.len() == 2 && is_left(cols[0]) != is_left(cols[1]) {
                    out.time_predicates.push(p);
                    continue;
                }
            }
            if let ScalarExpr::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } = &conjunct
            {
                if let (Some(a), Some(b)) = (left.as_column(), right.as_column()) {
                    match (is_left(a), is_left(b)) {
                        (true, false) => {
                            out.equalities.push((a, b - left_width));
                            continue;
                        }
                        (false, true) => {
                            out.equalities.push((b, a - left_width));
                            continue;
                        }
                        _ => {}
                    }
                }
            }
            out.remaining.push(conjunct);
        }
        out
    }

    /// Whether the condition is a pure equi-join.
    #[must_use]
    pub fn is_equi_join(&self) -> bool {
        self.time_predicates.is_empty() && self.remaining.is_empty()
    }

    /// Left columns of the equalities.
    pub fn left_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.equalities.iter().map(|&(l, _)| l)
    }

    /// Right columns of the equalities, relative to the right input.
    pub fn right_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.equalities.iter().map(|&(_, r)| r)
    }

    /// Condition expression of the equalities and remaining conjuncts,
    /// leaving out time predicates.
    #[must_use]
    pub fn non_time_expr(&self, left_width: usize) -> ScalarExpr {
        let mut conjuncts: Vec<ScalarExpr> = self
            .equalities
            .iter()
            .map(|&(l, r)| ScalarExpr::eq(ScalarExpr::col(l), ScalarExpr::col(r + left_width)))
            .collect();
        conjuncts.extend(self.remaining.iter().cloned());
        ScalarExpr::and(conjuncts)
    }
}
