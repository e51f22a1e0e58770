//! Sort orders.

use std::fmt;

/// Sort direction of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Sort specification for a single column. Nulls always sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldCollation {
    /// Column position.
    pub index: usize,
    /// Direction.
    pub direction: SortDirection,
}

impl FieldCollation {
    /// Ascending order on `index`.
    #[must_use]
    pub const fn asc(index: usize) -> Self {
        Self {
            index,
            direction: SortDirection::Ascending,
        }
    }

    /// Descending order on `index`.
    #[must_use]
    pub const fn desc(index: usize) -> Self {
        Self {
            index,
            direction: SortDirection::Descending,
        }
    }
}

/// An ordered list of field collations. Empty means "no order".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Collation(Vec<FieldCollation>);

impl Collation {
    /// No ordering.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Ordering by the given fields, most significant first.
    #[must_use]
    pub fn of(fields: Vec<FieldCollation>) -> Self {
        Self(fields)
    }

    /// Returns true if no ordering is specified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The field collations.
    #[must_use]
    pub fn fields(&self) -> &[FieldCollation] {
        &self.0
    }

    /// Column positions referenced by this ordering.
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|c| c.index)
    }

    /// Rewrites every column position with `f`.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> usize) -> Self {
        Self(
            self.0
                .iter()
                .map(|c| FieldCollation {
                    index: f(c.index),
                    direction: c.direction,
                })
                .collect(),
        )
    }

    /// Concatenates two orderings, skipping fields already ordered by `self`.
    #[must_use]
    pub fn join(&self, other: &Collation) -> Self {
        let mut fields = self.0.clone();
        for c in &other.0 {
            if !fields.iter().any(|f| f.index == c.index) {
                fields.push(*c);
            }
        }
        Self(fields)
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let dir = match c.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            write!(f, "${} {dir}", c.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_skips_duplicates() {
        let a = Collation::of(vec![FieldCollation::desc(1)]);
        let b = Collation::of(vec![FieldCollation::asc(1), FieldCollation::asc(4)]);
        let joined = a.join(&b);
        assert_eq!(
            joined.fields(),
            &[FieldCollation::desc(1), FieldCollation::asc(4)]
        );
    }

    #[test]
    fn test_remap_and_display() {
        let c = Collation::of(vec![FieldCollation::asc(0), FieldCollation::desc(2)]);
        assert_eq!(c.remap(|i| i + 3).to_string(), "$3 ASC, $5 DESC");
    }
}
