//! Deferred now-filters.
//!
//! A now-filter is the predicate `timestamp <cmp> now() - interval` kept as
//! metadata instead of a filter operator, so an aggregation above it can
//! turn it into a sliding window.

use std::fmt;

use serde::Serialize;

use super::predicate::{BoundComparison, TimeOperand, TimePredicate};
use crate::rel::{BinaryOp, RelNode, ScalarExpr};

/// Comparison of the timestamp against `now() - interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NowComparison {
    /// Strictly more recent than the bound.
    Gt,
    /// At least as recent as the bound.
    Ge,
    /// Strictly older than the bound.
    Lt,
    /// At most as recent as the bound.
    Le,
}

impl NowComparison {
    /// Whether the filter keeps recent rows.
    #[must_use]
    pub fn is_recent(self) -> bool {
        matches!(self, Self::Gt | Self::Ge)
    }

    fn is_strict(self) -> bool {
        matches!(self, Self::Gt | Self::Lt)
    }

    fn op(self) -> BinaryOp {
        match self {
            Self::Gt => BinaryOp::Gt,
            Self::Ge => BinaryOp::GtEq,
            Self::Lt => BinaryOp::Lt,
            Self::Le => BinaryOp::LtEq,
        }
    }
}

/// `timestamp <comparison> now() - interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NowFilter {
    /// Timestamp column.
    pub timestamp: usize,
    /// Comparison.
    pub comparison: NowComparison,
    /// Interval in milliseconds.
    pub interval_ms: i64,
}

impl NowFilter {
    /// Rows whose timestamp lies within `interval_ms` of now.
    #[must_use]
    pub fn recent(timestamp: usize, interval_ms: i64) -> Self {
        Self {
            timestamp,
            comparison: NowComparison::Gt,
            interval_ms,
        }
    }

    /// Converts a normalized predicate between a column and `now()`.
    ///
    /// Returns `None` for equalities and predicates without exactly one
    /// `now()` operand.
    #[must_use]
    pub fn from_predicate(predicate: &TimePredicate) -> Option<Self> {
        let strict = match predicate.comparison {
            BoundComparison::Lt => true,
            BoundComparison::Le => false,
            BoundComparison::Eq => return None,
        };
        match (predicate.larger, predicate.smaller) {
            // now - ts < iv  =>  ts > now - iv
            (TimeOperand::Now, TimeOperand::Column(ts)) => Some(Self {
                timestamp: ts,
                comparison: if strict {
                    NowComparison::Gt
                } else {
                    NowComparison::Ge
                },
                interval_ms: predicate.interval_ms,
            }),
            // ts - now < iv  =>  ts < now - (-iv)
            (TimeOperand::Column(ts), TimeOperand::Now) => Some(Self {
                timestamp: ts,
                comparison: if strict {
                    NowComparison::Lt
                } else {
                    NowComparison::Le
                },
                interval_ms: -predicate.interval_ms,
            }),
            _ => None,
        }
    }

    /// Whether the filter keeps recent rows.
    #[must_use]
    pub fn is_recent(&self) -> bool {
        self.comparison.is_recent()
    }

    /// Conjunction of two now-filters, or `None` if they cannot be
    /// expressed as one (different timestamps or opposite directions).
    #[must_use]
    pub fn merge(&self, other: &NowFilter) -> Option<NowFilter> {
        if self.timestamp != other.timestamp
            || self.comparison.is_recent() != other.comparison.is_recent()
        {
            return None;
        }
        let tighter = match self.interval_ms.cmp(&other.interval_ms) {
            std::cmp::Ordering::Equal => {
                if self.comparison.is_strict() {
                    self
                } else {
                    other
                }
            }
            // recent: smaller interval is tighter; older: larger interval
            std::cmp::Ordering::Less => {
                if self.is_recent() {
                    self
                } else {
                    other
                }
            }
            std::cmp::Ordering::Greater => {
                if self.is_recent() {
                    other
                } else {
                    self
                }
            }
        };
        Some(*tighter)
    }

    /// Moves the timestamp through `f`.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> Option<usize>) -> Option<NowFilter> {
        f(self.timestamp).map(|timestamp| Self { timestamp, ..*self })
    }

    /// Same filter on another column.
    #[must_use]
    pub fn with_timestamp(&self, timestamp: usize) -> Self {
        Self { timestamp, ..*self }
    }

    /// Widens the filter by `ms` in its keeping direction.
    #[must_use]
    pub fn add_interval(&self, ms: i64) -> Self {
        let interval_ms = if self.is_recent() {
            self.interval_ms + ms
        } else {
            self.interval_ms - ms
        };
        Self {
            interval_ms,
            ..*self
        }
    }

    /// The predicate as an expression.
    #[must_use]
    pub fn to_expr(&self) -> ScalarExpr {
        ScalarExpr::binary(
            self.comparison.op(),
            ScalarExpr::col(self.timestamp),
            ScalarExpr::minus(ScalarExpr::now(), ScalarExpr::interval_ms(self.interval_ms)),
        )
    }

    /// Applies the filter on top of `input`.
    #[must_use]
    pub fn inline(&self, input: RelNode) -> RelNode {
        input.filter(self.to_expr())
    }
}

impl fmt::Display for NowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}
