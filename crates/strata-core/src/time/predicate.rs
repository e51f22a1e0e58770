//! Normalized time comparisons.
//!
//! Every comparison between two timestamps (or a timestamp and `now()`),
//! optionally offset by an interval literal, is normalized to
//! `larger - smaller <cmp> interval` with `<cmp>` one of `<`, `<=`, `=`.

use std::fmt;

use crate::rel::{BinaryOp, ScalarExpr};

/// One side of a time comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeOperand {
    /// A timestamp column.
    Column(usize),
    /// Current processing time.
    Now,
}

impl TimeOperand {
    /// Column position, if this is a column.
    #[must_use]
    pub fn column(self) -> Option<usize> {
        match self {
            Self::Column(i) => Some(i),
            Self::Now => None,
        }
    }

    /// Whether this is `now()`.
    #[must_use]
    pub fn is_now(self) -> bool {
        self == Self::Now
    }

    fn to_expr(self) -> ScalarExpr {
        match self {
            Self::Column(i) => ScalarExpr::col(i),
            Self::Now => ScalarExpr::now(),
        }
    }
}

impl fmt::Display for TimeOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(i) => write!(f, "${i}"),
            Self::Now => write!(f, "now()"),
        }
    }
}

/// Comparison of a normalized time predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundComparison {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=`
    Eq,
}

impl BoundComparison {
    fn op(self) -> BinaryOp {
        match self {
            Self::Lt => BinaryOp::Lt,
            Self::Le => BinaryOp::LtEq,
            Self::Eq => BinaryOp::Eq,
        }
    }
}

/// `larger - smaller <comparison> interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimePredicate {
    /// Operand bounded from above.
    pub larger: TimeOperand,
    /// Operand the bound is relative to.
    pub smaller: TimeOperand,
    /// Comparison.
    pub comparison: BoundComparison,
    /// Interval in milliseconds.
    pub interval_ms: i64,
}

impl TimePredicate {
    /// Creates a predicate.
    #[must_use]
    pub fn new(
        larger: TimeOperand,
        smaller: TimeOperand,
        comparison: BoundComparison,
        interval_ms: i64,
    ) -> Self {
        Self {
            larger,
            smaller,
            comparison,
            interval_ms,
        }
    }

    /// Whether one operand is `now()`.
    #[must_use]
    pub fn has_now(&self) -> bool {
        self.larger.is_now() || self.smaller.is_now()
    }

    /// Whether this is an equality.
    #[must_use]
    pub fn is_equality(&self) -> bool {
        self.comparison == BoundComparison::Eq
    }

    /// Column operands.
    pub fn columns(&self) -> impl Iterator<Item = usize> {
        self.larger.column().into_iter().chain(self.smaller.column())
    }

    /// The opposite bound `smaller - larger <= interval_ms`.
    #[must_use]
    pub fn inverse_with_interval(&self, interval_ms: i64) -> Self {
        Self {
            larger: self.smaller,
            smaller: self.larger,
            comparison: BoundComparison::Le,
            interval_ms,
        }
    }

    /// Moves column operands through `f`.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> usize) -> Self {
        let m = |o: TimeOperand| match o {
            TimeOperand::Column(i) => TimeOperand::Column(f(i)),
            TimeOperand::Now => TimeOperand::Now,
        };
        Self {
            larger: m(self.larger),
            smaller: m(self.smaller),
            ..*self
        }
    }

    /// `larger <cmp> smaller + interval`.
    #[must_use]
    pub fn to_expr(&self) -> ScalarExpr {
        let smaller = self.smaller.to_expr();
        let rhs = if self.interval_ms == 0 {
            smaller
        } else {
            ScalarExpr::plus(smaller, ScalarExpr::interval_ms(self.interval_ms))
        };
        ScalarExpr::binary(self.comparison.op(), self.larger.to_expr(), rhs)
    }
}

impl fmt::Display for TimePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cmp = match self.comparison {
            BoundComparison::Lt => "<",
            BoundComparison::Le => "<=",
            BoundComparison::Eq => "=",
        };
        write!(
            f,
            "{} {cmp} {} + {}ms",
            self.larger, self.smaller, self.interval_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_swaps_operands() {
        let p = TimePredicate::new(
            TimeOperand::Column(0),
            TimeOperand::Column(3),
            BoundComparison::Lt,
            5_000,
        );
        let inv = p.inverse_with_interval(7);
        assert_eq!(inv.larger, TimeOperand::Column(3));
        assert_eq!(inv.smaller, TimeOperand::Column(0));
        assert_eq!(inv.comparison, BoundComparison::Le);
        assert_eq!(inv.interval_ms, 7);
    }

    #[test]
    fn test_to_expr_renders_offset() {
        let p = TimePredicate::new(
            TimeOperand::Now,
            TimeOperand::Column(2),
            BoundComparison::Le,
            1_000,
        );
        assert_eq!(p.to_expr().to_string(), "(now() <= ($2 + INTERVAL 1000ms))");
        assert_eq!(p.remap(|i| i + 1).columns().collect::<Vec<_>>(), vec![3]);
    }
}
