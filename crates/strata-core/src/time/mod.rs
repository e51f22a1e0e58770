//! Event-time tracking.
//!
//! - [`timestamp`]: candidate event-time columns and their provenance
//! - [`predicate`]: normalized comparisons between timestamps and `now()`
//! - [`now_filter`]: deferred "within an interval of now" predicates

pub mod now_filter;
pub mod predicate;
pub mod timestamp;

pub use now_filter::{NowComparison, NowFilter};
pub use predicate::{BoundComparison, TimeOperand, TimePredicate};
pub use timestamp::{DerivationKind, TimestampCandidate, TimestampProvenance};

/// Interval used to close one-sided time bounds: 999 years in milliseconds.
pub const UPPER_BOUND_INTERVAL_MS: i64 = 999 * 365 * 24 * 3600 * 1000;

/// Milliseconds per second.
pub const MS_PER_SECOND: i64 = 1_000;
/// Milliseconds per minute.
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
/// Milliseconds per hour.
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
/// Milliseconds per day.
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
