//! Join lineage of shredded entities.
//!
//! When a nested entity is unrolled into a flat row (parent columns followed
//! by each unnested child level), the lineage records which column range
//! belongs to which virtual table. Joining two such rows on their ancestor
//! keys can then be recognized as a self-join and collapsed.

use rustc_hash::{FxHashMap, FxHashSet};

/// Position of a table inside a [`JoinLineage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinTableId(pub usize);

/// How a lineage level was reached from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineageJoinKind {
    /// Rows without children are dropped.
    Inner,
    /// Rows without children are kept with null child columns.
    Left,
}

/// One level of a shredded entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// Virtual table id in the catalog.
    pub table: usize,
    /// Parent level, `None` for the root.
    pub parent: Option<JoinTableId>,
    /// How the level was joined to its parent.
    pub kind: LineageJoinKind,
    /// First column of this level in the flat row.
    pub offset: usize,
    /// Number of columns of this level.
    pub width: usize,
    /// Leading local primary-key columns of this level.
    pub num_local_pks: usize,
}

impl JoinTable {
    /// Local primary-key columns in flat-row coordinates.
    pub fn local_pks(&self) -> impl Iterator<Item = usize> {
        self.offset..self.offset + self.num_local_pks
    }

    /// Whether `column` lies inside this level.
    #[must_use]
    pub fn contains(&self, column: usize) -> bool {
        (self.offset..self.offset + self.width).contains(&column)
    }
}

/// Tree of shredded levels. Parents always precede their children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLineage {
    tables: Vec<JoinTable>,
}

impl JoinLineage {
    /// Lineage with a single root level.
    #[must_use]
    pub fn root(table: usize, offset: usize, width: usize, num_local_pks: usize) -> Self {
        Self {
            tables: vec![JoinTable {
                table,
                parent: None,
                kind: LineageJoinKind::Inner,
                offset,
                width,
                num_local_pks,
            }],
        }
    }

    /// Adds a child level.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not part of the lineage.
    pub fn add_child(
        &mut self,
        parent: JoinTableId,
        table: usize,
        kind: LineageJoinKind,
        offset: usize,
        width: usize,
        num_local_pks: usize,
    ) -> JoinTableId {
        assert!(parent.0 < self.tables.len(), "unknown lineage parent {parent:?}");
        self.tables.push(JoinTable {
            table,
            parent: Some(parent),
            kind,
            offset,
            width,
            num_local_pks,
        });
        JoinTableId(self.tables.len() - 1)
    }

    /// The level with the given id.
    #[must_use]
    pub fn get(&self, id: JoinTableId) -> &JoinTable {
        &self.tables[id.0]
    }

    /// All levels, parents first.
    #[must_use]
    pub fn tables(&self) -> &[JoinTable] {
        &self.tables
    }

    /// Ids of all levels, parents first.
    pub fn ids(&self) -> impl Iterator<Item = JoinTableId> {
        (0..self.tables.len()).map(JoinTableId)
    }

    /// Number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the lineage is empty. Never true for a constructed lineage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The most recently added level.
    #[must_use]
    pub fn leaf(&self) -> JoinTableId {
        JoinTableId(self.tables.len() - 1)
    }

    /// First level of the given virtual table.
    #[must_use]
    pub fn find(&self, table: usize) -> Option<JoinTableId> {
        self.tables.iter().position(|t| t.table == table).map(JoinTableId)
    }

    /// Level owning `column`.
    #[must_use]
    pub fn locate(&self, column: usize) -> Option<JoinTableId> {
        self.tables.iter().position(|t| t.contains(column)).map(JoinTableId)
    }

    /// Total flat-row width covered by the lineage.
    #[must_use]
    pub fn width(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.offset + t.width)
            .max()
            .unwrap_or(0)
    }

    /// Matches the levels of `right` onto the levels of `self` using the
    /// join's equality pairs `(left column, right column)`.
    ///
    /// A right level maps onto a left level of the same virtual table whose
    /// parent is the image of the right level's parent, provided every local
    /// primary key of the pair is equated. Right levels that do not match
    /// (and their descendants) stay unmapped. Returns `None` unless the root
    /// matches and every equality is consumed by a match.
    #[must_use]
    pub fn join_tree_map(
        &self,
        right: &JoinLineage,
        equalities: &[(usize, usize)],
    ) -> Option<LineageMapping> {
        let pairs: FxHashSet<(usize, usize)> = equalities.iter().copied().collect();
        let mut consumed: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut mapped: FxHashMap<JoinTableId, JoinTableId> = FxHashMap::default();
        let mut taken: FxHashSet<JoinTableId> = FxHashSet::default();

        for rid in right.ids() {
            let r = right.get(rid);
            let expected_parent = match r.parent {
                None => None,
                Some(p) => match mapped.get(&p) {
                    Some(lp) => Some(*lp),
                    None => continue,
                },
            };
            let candidate = self.ids().find(|lid| {
                let l = self.get(*lid);
                !taken.contains(lid)
                    && l.table == r.table
                    && l.parent == expected_parent
                    && l.local_pks().zip(r.local_pks()).all(|p| pairs.contains(&p))
            });
            if let Some(lid) = candidate {
                let l = self.get(lid);
                consumed.extend(l.local_pks().zip(r.local_pks()));
                mapped.insert(rid, lid);
                taken.insert(lid);
            }
        }

        let root_matched = right
            .ids()
            .filter(|id| right.get(*id).parent.is_none())
            .all(|id| mapped.contains_key(&id));
        if !root_matched || consumed.len() != pairs.len() {
            return None;
        }
        Some(LineageMapping { mapped })
    }
}

/// Result of [`JoinLineage::join_tree_map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageMapping {
    mapped: FxHashMap<JoinTableId, JoinTableId>,
}

impl LineageMapping {
    /// Left level matched by the right level `id`.
    #[must_use]
    pub fn get(&self, id: JoinTableId) -> Option<JoinTableId> {
        self.mapped.get(&id).copied()
    }

    /// Number of matched levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    /// Records that the right level `right` now lives at left level `left`.
    pub fn insert(&mut self, right: JoinTableId, left: JoinTableId) {
        self.mapped.insert(right, left);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Root `o` (3 columns, 1 pk) with child `items` (2 columns, 1 pk).
    fn orders_with_items() -> JoinLineage {
        let mut l = JoinLineage::root(0, 0, 3, 1);
        l.add_child(JoinTableId(0), 1, LineageJoinKind::Inner, 3, 2, 1);
        l
    }

    #[test]
    fn test_locate_and_width() {
        let l = orders_with_items();
        assert_eq!(l.width(), 5);
        assert_eq!(l.locate(4), Some(JoinTableId(1)));
        assert_eq!(l.locate(5), None);
        assert_eq!(l.find(1), Some(JoinTableId(1)));
        assert_eq!(l.leaf(), JoinTableId(1));
    }

    #[test]
    fn test_join_tree_map_matches_parent() {
        let child_side = orders_with_items();
        let parent_side = JoinLineage::root(0, 0, 3, 1);
        // items joined back to their order on the order key
        let m = child_side.join_tree_map(&parent_side, &[(0, 0)]).unwrap();
        assert_eq!(m.get(JoinTableId(0)), Some(JoinTableId(0)));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_join_tree_map_leaves_unmatched_children() {
        let parent_side = JoinLineage::root(0, 0, 3, 1);
        let child_side = orders_with_items();
        let m = parent_side.join_tree_map(&child_side, &[(0, 0)]).unwrap();
        assert_eq!(m.get(JoinTableId(0)), Some(JoinTableId(0)));
        assert_eq!(m.get(JoinTableId(1)), None);
    }

    #[test]
    fn test_join_tree_map_requires_all_equalities() {
        let a = JoinLineage::root(0, 0, 3, 1);
        let b = JoinLineage::root(0, 0, 3, 1);
        assert!(a.join_tree_map(&b, &[(0, 0), (1, 2)]).is_none());
        assert!(a.join_tree_map(&b, &[(0, 1)]).is_none());
        assert!(a.join_tree_map(&JoinLineage::root(7, 0, 3, 1), &[(0, 0)]).is_none());
    }
}
