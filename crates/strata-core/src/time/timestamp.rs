//! Timestamp provenance.
//!
//! A plan carries zero or more candidate event-time columns. Until one is
//! fixed, any of them may become the authoritative timestamp. Fixing is
//! irreversible for the rest of the branch.

use std::fmt;

use serde::Serialize;

/// How a candidate column obtained its event-time meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DerivationKind {
    /// Declared as event time by the source.
    SourceDefined,
    /// Output of a timestamp-preserving function over a candidate.
    PreservedThroughFunction,
    /// Output of a time-bucketing function over a candidate.
    WindowBucketed,
}

impl DerivationKind {
    /// Whether candidates of both kinds may be merged across branches.
    #[must_use]
    pub fn is_compatible(self, other: Self) -> bool {
        match (self, other) {
            (Self::WindowBucketed, Self::WindowBucketed) => true,
            (Self::WindowBucketed, _) | (_, Self::WindowBucketed) => false,
            _ => true,
        }
    }

    fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::PreservedThroughFunction
        }
    }
}

/// One candidate event-time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimestampCandidate {
    /// Column position.
    pub index: usize,
    /// Derivation.
    pub kind: DerivationKind,
    /// Registration order; lower ranks are preferred.
    pub rank: u32,
}

/// Candidate event-time columns of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampProvenance {
    candidates: Vec<TimestampCandidate>,
    fixed: bool,
}

impl TimestampProvenance {
    /// No event time.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Source-declared candidates, ranked in the given order.
    #[must_use]
    pub fn source(indexes: &[usize]) -> Self {
        let mut provenance = Self::none();
        for &i in indexes {
            provenance.add_candidate(i, DerivationKind::SourceDefined);
        }
        provenance
    }

    /// A provenance with a single fixed candidate.
    #[must_use]
    pub fn fixed(index: usize, kind: DerivationKind) -> Self {
        Self {
            candidates: vec![TimestampCandidate {
                index,
                kind,
                rank: 0,
            }],
            fixed: true,
        }
    }

    /// Whether there is no candidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether there is at least one candidate.
    #[must_use]
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    /// Whether a candidate was fixed as the timestamp.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// All candidates in registration order.
    #[must_use]
    pub fn candidates(&self) -> &[TimestampCandidate] {
        &self.candidates
    }

    /// Candidate column positions.
    pub fn indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.candidates.iter().map(|c| c.index)
    }

    /// Whether `index` is a candidate.
    #[must_use]
    pub fn is_candidate(&self, index: usize) -> bool {
        self.candidates.iter().any(|c| c.index == index)
    }

    /// The candidate at `index`, if any.
    #[must_use]
    pub fn candidate(&self, index: usize) -> Option<&TimestampCandidate> {
        self.candidates.iter().find(|c| c.index == index)
    }

    /// The fixed candidate, or the lowest ranked one (ties broken by column).
    #[must_use]
    pub fn best(&self) -> Option<&TimestampCandidate> {
        if self.fixed {
            return self.candidates.first();
        }
        self.candidates.iter().min_by_key(|c| (c.rank, c.index))
    }

    /// Column position of [`best`](Self::best).
    #[must_use]
    pub fn best_index(&self) -> Option<usize> {
        self.best().map(|c| c.index)
    }

    /// Registers a new candidate. Re-registering a candidate is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the provenance is fixed.
    pub fn add_candidate(&mut self, index: usize, kind: DerivationKind) {
        assert!(!self.fixed, "cannot add candidate ${index} to fixed timestamp");
        if self.is_candidate(index) {
            return;
        }
        let rank = self
            .candidates
            .iter()
            .map(|c| c.rank + 1)
            .max()
            .unwrap_or(0);
        self.candidates.push(TimestampCandidate { index, kind, rank });
    }

    /// Collapses the provenance to the candidate at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a candidate.
    #[must_use]
    pub fn fix_as_timestamp(&self, index: usize) -> Self {
        let candidate = self
            .candidate(index)
            .copied()
            .unwrap_or_else(|| panic!("${index} is not a timestamp candidate of {self}"));
        Self {
            candidates: vec![candidate],
            fixed: true,
        }
    }

    /// Fixes the best candidate, if any.
    #[must_use]
    pub fn fix_best(&self) -> Self {
        match self.best_index() {
            Some(i) => self.fix_as_timestamp(i),
            None => Self::none(),
        }
    }

    /// Keeps only candidates whose position is in `indexes`.
    #[must_use]
    pub fn restrict_to(&self, indexes: &[usize]) -> Self {
        let candidates: Vec<_> = self
            .candidates
            .iter()
            .filter(|c| indexes.contains(&c.index))
            .copied()
            .collect();
        Self {
            fixed: self.fixed && !candidates.is_empty(),
            candidates,
        }
    }

    /// Moves candidates through `f`, dropping those without a new position.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> Option<usize>) -> Self {
        let candidates: Vec<_> = self
            .candidates
            .iter()
            .filter_map(|c| {
                f(c.index).map(|index| TimestampCandidate { index, ..*c })
            })
            .collect();
        Self {
            fixed: self.fixed && !candidates.is_empty(),
            candidates,
        }
    }

    /// Shifts every candidate right by `offset` columns.
    #[must_use]
    pub fn offset(&self, offset: usize) -> Self {
        self.remap(|i| Some(i + offset))
    }

    /// Candidates shared by both branches at the same position with
    /// compatible derivations.
    #[must_use]
    pub fn union(&self, other: &TimestampProvenance) -> Self {
        let candidates: Vec<_> = self
            .candidates
            .iter()
            .filter_map(|c| {
                let o = other.candidate(c.index)?;
                c.kind.is_compatible(o.kind).then(|| TimestampCandidate {
                    index: c.index,
                    kind: c.kind.merge(o.kind),
                    rank: c.rank.min(o.rank),
                })
            })
            .collect();
        Self {
            fixed: self.fixed && other.fixed && !candidates.is_empty(),
            candidates,
        }
    }
}

impl fmt::Display for TimestampProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fixed {
            write!(f, "fixed")?;
        }
        write!(f, "[")?;
        for (i, c) in self.candidates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "${}", c.index)?;
        }
        write!(f, "]")
    }
}
