//! Scalar function descriptors.
//!
//! The converter only needs to know how a function relates to time: whether
//! it is the current-time function, a time-bucketing (tumbling) function, or
//! a function whose output inherits the event time of its argument.

use std::fmt;

use arrow_schema::{DataType, TimeUnit};

use crate::execution::Capability;

/// Bucket geometry of a time-tumbling function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketSpec {
    /// Bucket width in milliseconds.
    pub width_ms: i64,
    /// Offset of the bucket grid from the epoch in milliseconds.
    pub offset_ms: i64,
}

impl BucketSpec {
    /// Bucket grid of the given width aligned to the epoch.
    #[must_use]
    pub const fn of_width(width_ms: i64) -> Self {
        Self {
            width_ms,
            offset_ms: 0,
        }
    }

    /// Last millisecond of the bucket containing `ts`.
    #[must_use]
    pub fn end_of_bucket(&self, ts: i64) -> i64 {
        let shifted = ts - self.offset_ms;
        let start = shifted.div_euclid(self.width_ms) * self.width_ms + self.offset_ms;
        start + self.width_ms - 1
    }
}

/// How a function relates to event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Current processing time.
    Now,
    /// Maps a timestamp to the end of its tumbling bucket.
    TimeBucket(BucketSpec),
    /// Output is a timestamp that inherits its argument's provenance.
    TimestampPreserving,
    /// No time semantics.
    Plain,
}

/// A type-resolved scalar function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScalarFunction {
    /// Function name as written in the query.
    pub name: String,
    /// Time semantics.
    pub kind: FunctionKind,
    /// Result type.
    pub return_type: DataType,
    /// Capability a stage needs to evaluate this function, if any.
    pub capability: Option<Capability>,
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

impl ScalarFunction {
    /// The `now()` function.
    #[must_use]
    pub fn now() -> Self {
        Self {
            name: "now".to_string(),
            kind: FunctionKind::Now,
            return_type: timestamp_type(),
            capability: Some(Capability::NowFunction),
        }
    }

    /// A tumbling bucket function of the given geometry.
    #[must_use]
    pub fn time_bucket(name: impl Into<String>, spec: BucketSpec) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::TimeBucket(spec),
            return_type: timestamp_type(),
            capability: None,
        }
    }

    /// `end_of_minute(ts)`.
    #[must_use]
    pub fn end_of_minute() -> Self {
        Self::time_bucket("end_of_minute", BucketSpec::of_width(MINUTE_MS))
    }

    /// `end_of_hour(ts)`.
    #[must_use]
    pub fn end_of_hour() -> Self {
        Self::time_bucket("end_of_hour", BucketSpec::of_width(HOUR_MS))
    }

    /// `end_of_day(ts)`.
    #[must_use]
    pub fn end_of_day() -> Self {
        Self::time_bucket("end_of_day", BucketSpec::of_width(DAY_MS))
    }

    /// A function returning a timestamp derived from its argument's time.
    #[must_use]
    pub fn timestamp_preserving(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::TimestampPreserving,
            return_type: timestamp_type(),
            capability: None,
        }
    }

    /// A function without time semantics.
    #[must_use]
    pub fn plain(name: impl Into<String>, return_type: DataType) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::Plain,
            return_type,
            capability: None,
        }
    }

    /// Requires `capability` from any stage evaluating this function.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Returns true for `now()`.
    #[must_use]
    pub fn is_now(&self) -> bool {
        self.kind == FunctionKind::Now
    }

    /// Bucket geometry if this is a tumbling function.
    #[must_use]
    pub fn bucket(&self) -> Option<BucketSpec> {
        match self.kind {
            FunctionKind::TimeBucket(spec) => Some(spec),
            _ => None,
        }
    }

    /// Returns true if the output inherits the argument's event time.
    #[must_use]
    pub fn preserves_timestamp(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::TimeBucket(_) | FunctionKind::TimestampPreserving
        )
    }
}

impl fmt::Display for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
