//! Physical hints attached to relational operators.
//!
//! Upstream attaches [`TopNHint`]s to projections. The converter attaches
//! the join and aggregation hints when it specializes an operator, so the
//! physical-plan generator can pick the right engine operator without
//! re-deriving time semantics.

use serde::Serialize;

use super::function::BucketSpec;
use crate::catalog::TableType;

/// Kind of ranking or deduplication requested by a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TopNKind {
    /// `ROW_NUMBER() OVER (PARTITION BY .. ORDER BY ..) <= n`.
    TopN,
    /// `SELECT DISTINCT ..`.
    SelectDistinct,
    /// `SELECT DISTINCT ON (..) ..`.
    DistinctOn,
}

/// Ranking hint on a trivial projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopNHint {
    /// Requested semantics.
    pub kind: TopNKind,
    /// Partition columns in the projection's input coordinates.
    pub partition: Vec<usize>,
}

/// Stream-to-versioned-state lookup join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalJoinHint {
    /// Stream-side timestamp column in the join output.
    pub stream_timestamp: usize,
    /// State-side timestamp column, relative to the state input.
    pub state_timestamp: usize,
    /// State-side primary key columns, relative to the state input.
    pub state_primary_key: Vec<usize>,
}

/// Time-bounded stream-to-stream join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalJoinHint {
    /// Left timestamp column in the join output.
    pub left_timestamp: usize,
    /// Right timestamp column in the join output.
    pub right_timestamp: usize,
    /// Lower bound of `right - left` in milliseconds.
    pub lower_bound_ms: i64,
    /// Upper bound of `right - left` in milliseconds.
    pub upper_bound_ms: i64,
}

/// Inputs to the engine's join cost estimate for a plain state join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinCostHint {
    /// Type of the left input.
    pub left_type: TableType,
    /// Type of the right input.
    pub right_type: TableType,
    /// Number of equality conditions.
    pub num_equalities: usize,
}

/// Hint on a join operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JoinHint {
    /// Latest-value lookup per stream event.
    Temporal(TemporalJoinHint),
    /// Bounded interval join.
    Interval(IntervalJoinHint),
    /// Plain join between state tables.
    Cost(JoinCostHint),
}

/// Tumbling window aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TumbleAggregationHint {
    /// Aggregation keyed on the event instant itself.
    Instant {
        /// Timestamp column of the input.
        timestamp: usize,
    },
    /// Aggregation keyed on a bucketing function output.
    Function {
        /// Bucket column of the input.
        timestamp: usize,
        /// Column the bucketing function was applied to.
        input_timestamp: usize,
        /// Bucket width in milliseconds.
        width_ms: i64,
        /// Bucket offset in milliseconds.
        offset_ms: i64,
    },
}

impl TumbleAggregationHint {
    /// Hint for a bucketing function over `input_timestamp`.
    #[must_use]
    pub fn function(timestamp: usize, input_timestamp: usize, bucket: BucketSpec) -> Self {
        Self::Function {
            timestamp,
            input_timestamp,
            width_ms: bucket.width_ms,
            offset_ms: bucket.offset_ms,
        }
    }
}

/// Sliding window aggregation derived from a now-filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlidingAggregationHint {
    /// Timestamp column of the input.
    pub timestamp: usize,
    /// Window width in milliseconds.
    pub window_ms: i64,
    /// Slide (pane) width in milliseconds.
    pub slide_ms: i64,
}

/// Hint on an aggregate operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AggregateHint {
    /// Tumbling aggregation.
    Tumble(TumbleAggregationHint),
    /// Sliding aggregation.
    Sliding(SlidingAggregationHint),
}
