//! Aggregate function calls.

use std::fmt;

use arrow_schema::{DataType, Field};

use crate::execution::Capability;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// `COUNT(*)` or `COUNT(x)`.
    Count,
    /// `SUM(x)`.
    Sum,
    /// `MIN(x)`.
    Min,
    /// `MAX(x)`.
    Max,
    /// `AVG(x)`.
    Avg,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        };
        f.write_str(name)
    }
}

/// One aggregate call over positional argument columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    /// The aggregate function.
    pub function: AggregateFunction,
    /// Argument column positions. Empty for `COUNT(*)`.
    pub args: Vec<usize>,
    /// `DISTINCT` modifier.
    pub distinct: bool,
    /// Column of a `FILTER (WHERE ..)` clause, if present.
    pub filter: Option<usize>,
    /// Whether the call has a `WITHIN GROUP (ORDER BY ..)` clause.
    pub ordered: bool,
    /// Output column name.
    pub name: String,
    /// Output type.
    pub data_type: DataType,
    /// Capability a stage needs to compute this call, if any.
    pub capability: Option<Capability>,
}

impl AggregateCall {
    /// Creates a plain call of `function` over `args`.
    #[must_use]
    pub fn new(
        function: AggregateFunction,
        args: Vec<usize>,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            function,
            args,
            distinct: false,
            filter: None,
            ordered: false,
            name: name.into(),
            data_type,
            capability: None,
        }
    }

    /// `COUNT(*)`.
    #[must_use]
    pub fn count_star(name: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Count, Vec::new(), name, DataType::Int64)
    }

    /// Rewrites argument and filter columns with `f`.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> usize) -> Self {
        Self {
            args: self.args.iter().map(|&a| f(a)).collect(),
            filter: self.filter.map(&f),
            ..self.clone()
        }
    }

    /// Output field of this call.
    #[must_use]
    pub fn field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), true)
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.args.is_empty() {
            write!(f, "*")?;
        }
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "${a}")?;
        }
        write!(f, ")")
    }
}
