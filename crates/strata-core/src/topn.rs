//! Deferred Top-N constraints.
//!
//! Deduplication, ranking and row limits are carried as metadata for as long
//! as possible. Materializing one appends a sort (if the constraint has a
//! collation) and a partitioned row restriction.

use std::fmt;

use serde::Serialize;

use crate::catalog::TableType;
use crate::rel::{Collation, FieldCollation, RelNode};

/// Partitioned ranking, deduplication or limit not yet materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopNConstraint {
    /// Partition columns.
    pub partition: Vec<usize>,
    /// Keep one row per distinct partition.
    pub distinct: bool,
    /// Order within each partition.
    pub collation: Collation,
    /// Rows kept per partition.
    pub limit: Option<usize>,
    /// Type of the table the constraint applies to.
    pub source_type: TableType,
}

impl Default for TopNConstraint {
    fn default() -> Self {
        Self::empty()
    }
}

impl TopNConstraint {
    /// The no-op constraint.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            partition: Vec::new(),
            distinct: false,
            collation: Collation::empty(),
            limit: None,
            source_type: TableType::State,
        }
    }

    /// Creates a constraint.
    #[must_use]
    pub fn new(
        partition: Vec<usize>,
        distinct: bool,
        collation: Collation,
        limit: Option<usize>,
        source_type: TableType,
    ) -> Self {
        Self {
            partition,
            distinct,
            collation,
            limit,
            source_type,
        }
    }

    /// Keep the latest row per primary key, ordered by `timestamp`.
    #[must_use]
    pub fn dedup_window_aggregation(primary_key: Vec<usize>, timestamp: usize) -> Self {
        Self {
            partition: primary_key,
            distinct: false,
            collation: Collation::of(vec![FieldCollation::desc(timestamp)]),
            limit: Some(1),
            source_type: TableType::TemporalState,
        }
    }

    /// Whether the constraint does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partition.is_empty() && !self.distinct && self.limit.is_none()
    }

    /// Whether a row limit applies.
    #[must_use]
    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    /// Whether there are partition columns.
    #[must_use]
    pub fn has_partition(&self) -> bool {
        !self.partition.is_empty()
    }

    /// Whether this keeps one row per leading `num_primary_keys` columns.
    #[must_use]
    pub fn is_primary_key_dedup(&self, num_primary_keys: usize) -> bool {
        self.limit == Some(1)
            && self.partition.len() == num_primary_keys
            && self.partition.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Type of the table produced once the constraint applies.
    ///
    /// State stays state. Keeping the latest row per partition versions the
    /// source, ranking within partitions yields state, and a plain limit
    /// over the whole table keeps the source type.
    #[must_use]
    pub fn table_type(&self) -> TableType {
        match self.source_type {
            TableType::State => TableType::State,
            _ if self.distinct => TableType::TemporalState,
            _ if self.has_partition() => TableType::State,
            source => source,
        }
    }

    /// Moves partition and collation columns through `f`.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> usize) -> Self {
        Self {
            partition: self.partition.iter().map(|&p| f(p)).collect(),
            collation: self.collation.remap(&f),
            ..self.clone()
        }
    }

    /// Materializes the constraint on top of `input`.
    #[must_use]
    pub fn inline(&self, input: RelNode) -> RelNode {
        if self.is_empty() {
            return input;
        }
        let sorted = if self.collation.is_empty() {
            input
        } else {
            input.sort(self.collation.clone())
        };
        sorted.partition_limit(self.partition.clone(), self.limit, self.distinct)
    }
}

impl fmt::Display for TopNConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "partition={:?}", self.partition)?;
        if self.distinct {
            write!(f, " distinct")?;
        }
        if !self.collation.is_empty() {
            write!(f, " order=[{}]", self.collation)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit={limit}")?;
        }
        Ok(())
    }
}

/// Serializable summary used in manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopNSummary {
    /// Partition columns.
    pub partition: Vec<usize>,
    /// Distinct flag.
    pub distinct: bool,
    /// Limit per partition.
    pub limit: Option<usize>,
}

impl From<&TopNConstraint> for TopNSummary {
    fn from(c: &TopNConstraint) -> Self {
        Self {
            partition: c.partition.clone(),
            distinct: c.distinct,
            limit: c.limit,
        }
    }
}
