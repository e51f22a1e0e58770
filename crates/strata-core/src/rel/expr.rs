//! Scalar expressions over positional column references.

use std::collections::BTreeSet;
use std::fmt;

use arrow_schema::{DataType, Fields};

use super::aggregate::AggregateCall;
use super::collation::Collation;
use super::function::ScalarFunction;
use super::value::ScalarValue;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Logical `AND`.
    And,
    /// Logical `OR`.
    Or,
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOp {
    /// Returns true for the six comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// A type-resolved scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    /// Reference to an input column by position.
    Column(usize),
    /// Constant.
    Literal(ScalarValue),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<ScalarExpr>,
        /// Right operand.
        right: Box<ScalarExpr>,
    },
    /// Logical negation.
    Not(Box<ScalarExpr>),
    /// `IS NULL` test.
    IsNull(Box<ScalarExpr>),
    /// Scalar function call.
    Call {
        /// The function.
        function: ScalarFunction,
        /// Arguments.
        args: Vec<ScalarExpr>,
    },
    /// Running window aggregate: unbounded preceding to current row.
    Over {
        /// The aggregate call, with argument columns of the input.
        call: AggregateCall,
        /// Partition columns.
        partition_by: Vec<usize>,
        /// Window ordering.
        order_by: Collation,
    },
}

impl ScalarExpr {
    /// Column reference.
    #[must_use]
    pub fn col(index: usize) -> Self {
        Self::Column(index)
    }

    /// Literal.
    #[must_use]
    pub fn lit(value: ScalarValue) -> Self {
        Self::Literal(value)
    }

    /// Interval literal in milliseconds.
    #[must_use]
    pub fn interval_ms(ms: i64) -> Self {
        Self::Literal(ScalarValue::IntervalMs(ms))
    }

    /// Call of `now()`.
    #[must_use]
    pub fn now() -> Self {
        Self::Call {
            function: ScalarFunction::now(),
            args: Vec::new(),
        }
    }

    /// Function call.
    #[must_use]
    pub fn call(function: ScalarFunction, args: Vec<ScalarExpr>) -> Self {
        Self::Call { function, args }
    }

    /// Binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left = right`
    #[must_use]
    pub fn eq(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    /// `left > right`
    #[must_use]
    pub fn gt(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::Gt, left, right)
    }

    /// `left >= right`
    #[must_use]
    pub fn gt_eq(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::GtEq, left, right)
    }

    /// `left < right`
    #[must_use]
    pub fn lt(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    /// `left <= right`
    #[must_use]
    pub fn lt_eq(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::LtEq, left, right)
    }

    /// `left + right`
    #[must_use]
    pub fn plus(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::Plus, left, right)
    }

    /// `left - right`
    #[must_use]
    pub fn minus(left: ScalarExpr, right: ScalarExpr) -> Self {
        Self::binary(BinaryOp::Minus, left, right)
    }

    /// Conjunction of `exprs`. An empty list yields literal `true`.
    #[must_use]
    pub fn and(exprs: Vec<ScalarExpr>) -> Self {
        let mut iter = exprs.into_iter();
        match iter.next() {
            None => Self::Literal(ScalarValue::Boolean(true)),
            Some(first) => iter.fold(first, |acc, e| Self::binary(BinaryOp::And, acc, e)),
        }
    }

    /// Column position if this is a bare column reference.
    #[must_use]
    pub fn as_column(&self) -> Option<usize> {
        match self {
            Self::Column(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns true for literal `true`.
    #[must_use]
    pub fn is_true_literal(&self) -> bool {
        matches!(self, Self::Literal(ScalarValue::Boolean(true)))
    }

    /// Flattens nested `AND`s into a list of conjuncts.
    #[must_use]
    pub fn conjunctions(&self) -> Vec<ScalarExpr> {
        let mut out = Vec::new();
        collect_conjunctions(self, &mut out);
        out
    }

    /// Returns true if `now()` appears anywhere in the expression.
    #[must_use]
    pub fn contains_now(&self) -> bool {
        self.any_call(&|f| f.is_now())
    }

    /// Returns true if any function call satisfies `pred`.
    pub fn any_call(&self, pred: &impl Fn(&ScalarFunction) -> bool) -> bool {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::Over { .. } => false,
            Self::Binary { left, right, .. } => left.any_call(pred) || right.any_call(pred),
            Self::Not(e) | Self::IsNull(e) => e.any_call(pred),
            Self::Call { function, args } => {
                pred(function) || args.iter().any(|a| a.any_call(pred))
            }
        }
    }

    /// Visits every function call in the expression.
    pub fn for_each_call(&self, f: &mut impl FnMut(&ScalarFunction)) {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::Over { .. } => {}
            Self::Binary { left, right, .. } => {
                left.for_each_call(f);
                right.for_each_call(f);
            }
            Self::Not(e) | Self::IsNull(e) => e.for_each_call(f),
            Self::Call { function, args } => {
                f(function);
                for a in args {
                    a.for_each_call(f);
                }
            }
        }
    }

    /// All column positions referenced by the expression.
    #[must_use]
    pub fn columns(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<usize>) {
        match self {
            Self::Column(i) => {
                out.insert(*i);
            }
            Self::Literal(_) => {}
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Not(e) | Self::IsNull(e) => e.collect_columns(out),
            Self::Call { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Self::Over {
                call,
                partition_by,
                order_by,
            } => {
                out.extend(call.args.iter().copied());
                out.extend(call.filter);
                out.extend(partition_by.iter().copied());
                out.extend(order_by.indexes());
            }
        }
    }

    /// Rewrites every column reference with `f`.
    #[must_use]
    pub fn remap_columns(&self, f: &impl Fn(usize) -> usize) -> ScalarExpr {
        match self {
            Self::Column(i) => Self::Column(f(*i)),
            Self::Literal(v) => Self::Literal(v.clone()),
            Self::Binary { op, left, right } => Self::Binary {
                op: *op,
                left: Box::new(left.remap_columns(f)),
                right: Box::new(right.remap_columns(f)),
            },
            Self::Not(e) => Self::Not(Box::new(e.remap_columns(f))),
            Self::IsNull(e) => Self::IsNull(Box::new(e.remap_columns(f))),
            Self::Call { function, args } => Self::Call {
                function: function.clone(),
                args: args.iter().map(|a| a.remap_columns(f)).collect(),
            },
            Self::Over {
                call,
                partition_by,
                order_by,
            } => Self::Over {
                call: call.remap(f),
                partition_by: partition_by.iter().map(|&p| f(p)).collect(),
                order_by: order_by.remap(f),
            },
        }
    }

    /// Result type of the expression over `input`.
    #[must_use]
    pub fn data_type(&self, input: &Fields) -> DataType {
        match self {
            Self::Column(i) => input
                .get(*i)
                .map_or(DataType::Null, |f| f.data_type().clone()),
            Self::Literal(v) => v.data_type(),
            Self::Binary { op, left, .. } => {
                if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
                    DataType::Boolean
                } else {
                    left.data_type(input)
                }
            }
            Self::Not(_) | Self::IsNull(_) => DataType::Boolean,
            Self::Call { function, .. } => function.return_type.clone(),
            Self::Over { call, .. } => call.data_type.clone(),
        }
    }
}

fn collect_conjunctions(expr: &ScalarExpr, out: &mut Vec<ScalarExpr>) {
    match expr {
        ScalarExpr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            collect_conjunctions(left, out);
            collect_conjunctions(right, out);
        }
        e if e.is_true_literal() => {}
        e => out.push(e.clone()),
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(i) => write!(f, "${i}"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Not(e) => write!(f, "NOT {e}"),
            Self::IsNull(e) => write!(f, "{e} IS NULL"),
            Self::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Self::Over {
                call,
                partition_by,
                order_by,
            } => {
                write!(f, "{call} OVER (PARTITION BY ")?;
                for (i, p) in partition_by.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "${p}")?;
                }
                write!(f, " ORDER BY {order_by})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conjunctions_flatten() {
        let e = ScalarExpr::and(vec![
            ScalarExpr::eq(ScalarExpr::col(0), ScalarExpr::col(1)),
            ScalarExpr::and(vec![
                ScalarExpr::gt(ScalarExpr::col(2), ScalarExpr::now()),
                ScalarExpr::lit(ScalarValue::Boolean(true)),
            ]),
        ]);
        let conj = e.conjunctions();
        assert_eq!(conj.len(), 2);
        assert!(conj[1].contains_now());
        assert!(!conj[0].contains_now());
    }

    #[test]
    fn test_remap_columns() {
        let e = ScalarExpr::plus(ScalarExpr::col(0), ScalarExpr::col(3));
        let r = e.remap_columns(&|i| i + 10);
        assert_eq!(r.columns().into_iter().collect::<Vec<_>>(), vec![10, 13]);
    }

    #[test]
    fn test_display() {
        let e = ScalarExpr::gt(
            ScalarExpr::col(1),
            ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(1000)),
        );
        assert_eq!(e.to_string(), "($1 > (now() - INTERVAL 1000ms))");
    }
}
