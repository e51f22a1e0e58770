//! Relational plan model.
//!
//! A small, positional relational algebra: operators reference input
//! columns by index, and every operator derives its output schema as Arrow
//! [`Fields`](arrow_schema::Fields).

pub mod aggregate;
pub mod collation;
pub mod eval;
pub mod expr;
pub mod function;
pub mod hint;
pub mod node;
pub mod value;

pub use aggregate::{AggregateCall, AggregateFunction};
pub use collation::{Collation, FieldCollation, SortDirection};
pub use expr::{BinaryOp, ScalarExpr};
pub use function::{BucketSpec, FunctionKind, ScalarFunction};
pub use hint::{
    AggregateHint, IntervalJoinHint, JoinCostHint, JoinHint, SlidingAggregationHint,
    TemporalJoinHint, TopNHint, TopNKind, TumbleAggregationHint,
};
pub use node::{JoinKind, ProjectExpr, RelNode};
pub use value::ScalarValue;
