//! Literal values carried by scalar expressions and evaluated rows.

use std::cmp::Ordering;
use std::fmt;

use arrow_schema::{DataType, IntervalUnit, TimeUnit};

/// A single scalar value.
///
/// `List` holds the rows of a nested collection; each element row is a
/// positional list of values matching the collection's element fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Timestamp in milliseconds since the epoch.
    TimestampMs(i64),
    /// Interval length in milliseconds.
    IntervalMs(i64),
    /// Nested collection of element rows.
    List(Vec<Vec<ScalarValue>>),
}

impl ScalarValue {
    /// Returns true for `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Arrow type of this value. `NULL` reports [`DataType::Null`].
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::TimestampMs(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
            Self::IntervalMs(_) => DataType::Interval(IntervalUnit::DayTime),
            // Element types are not tracked on literals.
            Self::List(_) => DataType::Null,
        }
    }

    /// Truthiness for predicate evaluation. `NULL` is false.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    /// Numeric view used for arithmetic on time and integer values.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) | Self::TimestampMs(v) | Self::IntervalMs(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view of a numeric value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// SQL comparison. Returns `None` if either side is `NULL` or the types
    /// are not comparable.
    #[must_use]
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            (Self::Float64(_), _) | (_, Self::Float64(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }

    /// Total order used for sorting rows: `NULL` sorts last.
    #[must_use]
    pub fn sort_cmp(&self, other: &ScalarValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::TimestampMs(v) => write!(f, "TIMESTAMP {v}"),
            Self::IntervalMs(v) => write!(f, "INTERVAL {v}ms"),
            Self::List(rows) => write!(f, "LIST[{}]", rows.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_mixed_numeric() {
        let a = ScalarValue::Int64(3);
        let b = ScalarValue::Float64(3.5);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(
            ScalarValue::TimestampMs(10).compare(&ScalarValue::TimestampMs(10)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_null_is_unknown() {
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Int64(1)), None);
        assert_eq!(
            ScalarValue::Null.sort_cmp(&ScalarValue::Int64(1)),
            Ordering::Greater
        );
    }
}
