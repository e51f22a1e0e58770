//! Dense source-to-target column position mappings.
//!
//! An [`IndexMap`] records where each column of a logical row ended up
//! inside a relational tree. Every visit of the plan converter re-expresses
//! its inputs' maps ("this column used to be column *i*, it is now column
//! *j*") after projecting, aggregating or joining.
//!
//! The source domain is always the contiguous range `0..source_length`.
//! Targets are bounded by `target_length` (the width of the relation the
//! map points into) and need not be injective.

use std::fmt;

/// A dense mapping `source index -> target index` over `0..source_length`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IndexMap {
    targets: Vec<usize>,
    target_length: usize,
}

impl IndexMap {
    /// Identity map over `n` columns pointing into a relation of width `n`.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::identity_into(n, n)
    }

    /// Identity map over `n` columns pointing into a wider relation.
    ///
    /// # Panics
    ///
    /// Panics if `n > target_length`.
    #[must_use]
    pub fn identity_into(n: usize, target_length: usize) -> Self {
        assert!(
            n <= target_length,
            "identity map of {n} columns exceeds target length {target_length}"
        );
        Self {
            targets: (0..n).collect(),
            target_length,
        }
    }

    /// Map with no source columns.
    #[must_use]
    pub fn empty(target_length: usize) -> Self {
        Self {
            targets: Vec::new(),
            target_length,
        }
    }

    /// Creates a map from explicit targets.
    ///
    /// # Panics
    ///
    /// Panics if any target is outside `0..target_length`.
    #[must_use]
    pub fn of(targets: Vec<usize>, target_length: usize) -> Self {
        if let Some(bad) = targets.iter().find(|&&t| t >= target_length) {
            panic!("index map target {bad} outside target length {target_length}");
        }
        Self {
            targets,
            target_length,
        }
    }

    /// Number of source columns.
    #[must_use]
    pub fn source_length(&self) -> usize {
        self.targets.len()
    }

    /// Width of the relation the targets point into.
    #[must_use]
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Returns true if the map has no source columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Maps a source index to its target.
    ///
    /// # Panics
    ///
    /// Mapping an index outside `0..source_length` is a contract violation.
    #[must_use]
    pub fn map(&self, index: usize) -> usize {
        match self.targets.get(index) {
            Some(&t) => t,
            None => panic!(
                "index {index} outside index map of source length {}",
                self.targets.len()
            ),
        }
    }

    /// Maps a source index, returning `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<usize> {
        self.targets.get(index).copied()
    }

    /// Map-then-map: the result sends `i` to `then.map(self.map(i))`.
    ///
    /// # Panics
    ///
    /// Panics if one of this map's targets is not a source of `then`.
    #[must_use]
    pub fn compose(&self, then: &IndexMap) -> IndexMap {
        IndexMap {
            targets: self.targets.iter().map(|&t| then.map(t)).collect(),
            target_length: then.target_length,
        }
    }

    /// Concatenates two maps, shifting `other`'s targets by this map's
    /// target length.
    #[must_use]
    pub fn append(&self, other: &IndexMap) -> IndexMap {
        let offset = self.target_length;
        let mut targets = self.targets.clone();
        targets.extend(other.targets.iter().map(|t| t + offset));
        IndexMap {
            targets,
            target_length: offset + other.target_length,
        }
    }

    /// Places two maps into disjoint column ranges: `other` lands at
    /// `offset`, which must not overlap this map's target range.
    ///
    /// # Panics
    ///
    /// Panics if `offset < self.target_length()`.
    #[must_use]
    pub fn join(&self, other: &IndexMap, offset: usize) -> IndexMap {
        assert!(
            offset >= self.target_length,
            "join offset {offset} overlaps target length {}",
            self.target_length
        );
        let mut targets = self.targets.clone();
        targets.extend(other.targets.iter().map(|t| t + offset));
        IndexMap {
            targets,
            target_length: offset + other.target_length,
        }
    }

    /// Rewrites every target with `f`, pointing into a relation of width
    /// `target_length`.
    #[must_use]
    pub fn remap(&self, target_length: usize, f: impl Fn(usize) -> usize) -> IndexMap {
        IndexMap::of(self.targets.iter().map(|&t| f(t)).collect(), target_length)
    }

    /// Like [`IndexMap::remap`] but returns `None` if any target has no
    /// image under `f`.
    #[must_use]
    pub fn try_remap(
        &self,
        target_length: usize,
        f: impl Fn(usize) -> Option<usize>,
    ) -> Option<IndexMap> {
        let targets = self
            .targets
            .iter()
            .map(|&t| f(t))
            .collect::<Option<Vec<_>>>()?;
        Some(IndexMap::of(targets, target_length))
    }

    /// The targets in source order.
    #[must_use]
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// The targets in source order, as an owned list.
    #[must_use]
    pub fn targets_as_list(&self) -> Vec<usize> {
        self.targets.clone()
    }

    /// Returns true if some source maps to `target`.
    #[must_use]
    pub fn contains_target(&self, target: usize) -> bool {
        self.targets.contains(&target)
    }

    /// First source index that maps to `target`.
    #[must_use]
    pub fn source_of(&self, target: usize) -> Option<usize> {
        self.targets.iter().position(|&t| t == target)
    }

    /// Iterates `(source, target)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.targets.iter().copied().enumerate()
    }

    /// Returns true if every source maps to itself and the target relation
    /// has no extra columns. Such a map can be dropped entirely.
    #[must_use]
    pub fn is_trivial_permutation(&self) -> bool {
        self.targets.len() == self.target_length
            && self.targets.iter().enumerate().all(|(i, &t)| i == t)
    }

    /// Returns true if the targets are a permutation of `0..source_length`.
    #[must_use]
    pub fn is_permutation(&self) -> bool {
        let mut seen = vec![false; self.targets.len()];
        for &t in &self.targets {
            match seen.get_mut(t) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    /// Returns true if the distinct targets form the range `0..k`.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        is_dense_range(self.targets.iter().copied())
    }
}

/// Returns true if the distinct values of `indexes` form `0..k` for some `k`.
#[must_use]
pub fn is_dense_range(indexes: impl IntoIterator<Item = usize>) -> bool {
    let mut values: Vec<usize> = indexes.into_iter().collect();
    values.sort_unstable();
    values.dedup();
    values.iter().enumerate().all(|(i, &v)| i == v)
}

impl fmt::Display for IndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, t) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{i}->{t}")?;
        }
        write!(f, "]/{}", self.target_length)
    }
}

/// Growable builder that is consumed into an immutable [`IndexMap`].
#[derive(Debug, Clone, Default)]
pub struct IndexMapBuilder {
    targets: Vec<usize>,
}

impl IndexMapBuilder {
    /// Creates an empty builder with room for `capacity` sources.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            targets: Vec::with_capacity(capacity),
        }
    }

    /// Starts from the targets of an existing map, reserving room for
    /// `additional` more sources.
    #[must_use]
    pub fn extending(base: &IndexMap, additional: usize) -> Self {
        let mut targets = Vec::with_capacity(base.source_length() + additional);
        targets.extend_from_slice(base.targets());
        Self { targets }
    }

    /// Appends one target.
    pub fn add(&mut self, target: usize) -> &mut Self {
        self.targets.push(target);
        self
    }

    /// Appends several targets.
    pub fn add_all(&mut self, targets: impl IntoIterator<Item = usize>) -> &mut Self {
        self.targets.extend(targets);
        self
    }

    /// Returns true if `target` was already added.
    #[must_use]
    pub fn contains(&self, target: usize) -> bool {
        self.targets.contains(&target)
    }

    /// Number of sources added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Consumes the builder.
    ///
    /// # Panics
    ///
    /// Panics if a target is outside `0..target_length`.
    #[must_use]
    pub fn build(self, target_length: usize) -> IndexMap {
        IndexMap::of(self.targets, target_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = IndexMap::identity(3);
        assert_eq!(m.targets(), &[0, 1, 2]);
        assert!(m.is_trivial_permutation());
        assert!(m.is_dense());
    }

    #[test]
    fn test_identity_into_wider_relation_is_not_trivial() {
        let m = IndexMap::identity_into(2, 4);
        assert_eq!(m.target_length(), 4);
        assert!(!m.is_trivial_permutation());
        assert!(m.is_dense());
    }

    #[test]
    #[should_panic(expected = "outside index map")]
    fn test_map_out_of_range_panics() {
        let m = IndexMap::identity(2);
        let _ = m.map(2);
    }

    #[test]
    #[should_panic(expected = "outside target length")]
    fn test_of_rejects_target_out_of_range() {
        let _ = IndexMap::of(vec![0, 5], 3);
    }

    #[test]
    fn test_compose() {
        let first = IndexMap::of(vec![2, 0], 3);
        let second = IndexMap::of(vec![4, 5, 1], 6);
        let composed = first.compose(&second);
        assert_eq!(composed.targets(), &[1, 4]);
        assert_eq!(composed.target_length(), 6);
    }

    #[test]
    fn test_append_shifts_by_target_length() {
        let left = IndexMap::of(vec![1, 0], 3);
        let right = IndexMap::of(vec![0, 1], 2);
        let appended = left.append(&right);
        assert_eq!(appended.targets(), &[1, 0, 3, 4]);
        assert_eq!(appended.target_length(), 5);
    }

    #[test]
    fn test_join_places_ranges_disjointly() {
        let left = IndexMap::of(vec![0, 2], 4);
        let right = IndexMap::of(vec![1], 3);
        let joined = left.join(&right, 4);
        assert_eq!(joined.targets(), &[0, 2, 5]);
        assert_eq!(joined.target_length(), 7);
    }

    #[test]
    fn test_remap_and_try_remap() {
        let m = IndexMap::of(vec![0, 1], 2);
        assert_eq!(m.remap(4, |t| t + 2).targets(), &[2, 3]);
        assert!(m.try_remap(2, |t| (t == 0).then_some(0)).is_none());
    }

    #[test]
    fn test_permutation_and_density() {
        assert!(IndexMap::of(vec![1, 0, 2], 3).is_permutation());
        assert!(!IndexMap::of(vec![1, 1], 3).is_permutation());
        assert!(IndexMap::of(vec![1, 1, 0], 3).is_dense());
        assert!(!IndexMap::of(vec![0, 2], 3).is_dense());
    }

    #[test]
    fn test_builder_extending() {
        let base = IndexMap::of(vec![0, 3], 4);
        let mut b = IndexMapBuilder::extending(&base, 1);
        b.add(5);
        assert!(b.contains(3));
        let m = b.build(6);
        assert_eq!(m.targets(), &[0, 3, 5]);
        assert_eq!(m.source_of(5), Some(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(IndexMap::of(vec![1, 0], 2).to_string(), "[0->1, 1->0]/2");
    }
}
