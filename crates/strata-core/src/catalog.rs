//! Catalog of relations visible to the planner.
//!
//! Two kinds of relation exist:
//!
//! - [`QueryTable`]: a base relation, either imported or produced by an
//!   earlier planned query. Its rows may contain nested collections
//!   (`List<Struct>` columns).
//! - [`VirtualTable`]: a flat view over one level of a query table. The root
//!   view exposes the non-nested columns; each child view exposes one nested
//!   collection as `ancestor primary keys ++ own non-nested columns`.

use std::fmt;

use arrow_schema::{DataType, Field, FieldRef, Fields};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::rel::Collation;
use crate::time::{NowFilter, TimestampProvenance};
use crate::topn::TopNConstraint;

/// Semantics of a table's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableType {
    /// Append-only rows with an event time.
    Stream,
    /// Current values only.
    State,
    /// Versioned state, queryable as of a point in time.
    TemporalState,
}

impl TableType {
    /// Whether rows carry event time.
    #[must_use]
    pub fn has_timestamp(self) -> bool {
        !matches!(self, Self::State)
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "STREAM"),
            Self::State => write!(f, "STATE"),
            Self::TemporalState => write!(f, "TEMPORAL_STATE"),
        }
    }
}

/// Identifier of a catalog relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableId {
    /// A [`QueryTable`].
    Query(usize),
    /// A [`VirtualTable`].
    Virtual(usize),
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(i) => write!(f, "q#{i}"),
            Self::Virtual(i) => write!(f, "v#{i}"),
        }
    }
}

/// Constraints a planned query left pending, re-attached when the table is
/// scanned again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pullups {
    /// Pending now-filter.
    pub now_filter: Option<NowFilter>,
    /// Pending Top-N constraint.
    pub top_n: TopNConstraint,
    /// Declared sort order.
    pub sort: Collation,
}

impl Pullups {
    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.now_filter.is_none() && self.top_n.is_empty() && self.sort.is_empty()
    }

    /// Moves every referenced column through `f`, dropping what has no image.
    ///
    /// Top-N and sort are only kept if all their columns map.
    #[must_use]
    pub fn remap(&self, f: impl Fn(usize) -> Option<usize>) -> Self {
        let top_n = if self
            .top_n
            .partition
            .iter()
            .copied()
            .chain(self.top_n.collation.indexes())
            .all(|i| f(i).is_some())
        {
            self.top_n.remap(|i| f(i).unwrap_or(i))
        } else {
            TopNConstraint::empty()
        };
        let sort = if self.sort.indexes().all(|i| f(i).is_some()) {
            self.sort.remap(|i| f(i).unwrap_or(i))
        } else {
            Collation::empty()
        };
        Self {
            now_filter: self.now_filter.and_then(|n| n.remap(&f)),
            top_n,
            sort,
        }
    }
}

/// A base relation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTable {
    /// Table name.
    pub name: String,
    /// Row schema, nested collections included.
    pub fields: Fields,
    /// Number of leading primary-key columns.
    pub num_primary_keys: usize,
    /// Row semantics.
    pub table_type: TableType,
    /// Candidate event-time columns.
    pub timestamp: TimestampProvenance,
    /// Pending constraints.
    pub pullups: Pullups,
    /// Stage that materializes the table, if it was planned.
    pub stage: Option<String>,
}

impl QueryTable {
    /// Creates a table without pending constraints.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        fields: Fields,
        num_primary_keys: usize,
        table_type: TableType,
        timestamp: TimestampProvenance,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            num_primary_keys,
            table_type,
            timestamp,
            pullups: Pullups::default(),
            stage: None,
        }
    }

    /// Attaches pending constraints.
    #[must_use]
    pub fn with_pullups(mut self, pullups: Pullups) -> Self {
        self.pullups = pullups;
        self
    }

    /// Records the materializing stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// Placement of a virtual table in its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKind {
    /// The top level of a query table.
    Root {
        /// Query table id.
        base: usize,
    },
    /// A nested collection.
    Child {
        /// Parent virtual table id.
        parent: usize,
        /// Column of the collection in the parent's full row.
        shred_field: usize,
    },
}

/// Flat view over one level of a query table.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualTable {
    /// Table name.
    pub name: String,
    /// Placement.
    pub kind: VirtualKind,
    /// Full row of this level, nested collections included.
    pub level_fields: Fields,
    /// Leading primary-key columns of the level row.
    pub num_local_pks: usize,
    /// Positions of the non-nested columns in the level row.
    pub own_columns: Vec<usize>,
    /// Number of ancestor primary-key columns preceding the own columns.
    pub num_ancestor_pks: usize,
    /// Exposed schema: ancestor primary keys then own columns.
    pub fields: Fields,
}

impl VirtualTable {
    /// Total primary-key columns (ancestor plus local).
    #[must_use]
    pub fn num_primary_keys(&self) -> usize {
        self.num_ancestor_pks + self.num_local_pks
    }

    /// Whether this is a root view.
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self.kind, VirtualKind::Root { .. })
    }

    /// Parent virtual table, if any.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        match self.kind {
            VirtualKind::Root { .. } => None,
            VirtualKind::Child { parent, .. } => Some(parent),
        }
    }
}

/// Catalog lookup and registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No relation with the name.
    #[error("table '{name}' not found")]
    UnknownTable {
        /// Requested name.
        name: String,
        /// Registered names, for suggestions.
        available: Vec<String>,
    },

    /// The name is already registered.
    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    /// The column is not a nested collection of structs.
    #[error("column '{column}' of '{table}' is not a nested collection")]
    NotNested {
        /// Parent table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// The column does not exist.
    #[error("column '{column}' not found in '{table}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Columns of the table, for suggestions.
        available: Vec<String>,
    },

    /// More primary-key columns than columns.
    #[error("table '{table}' declares {num_primary_keys} primary keys but has {num_columns} columns")]
    InvalidPrimaryKey {
        /// Table name.
        table: String,
        /// Declared count.
        num_primary_keys: usize,
        /// Column count.
        num_columns: usize,
    },
}

/// Registered relations.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    queries: Vec<QueryTable>,
    virtuals: Vec<VirtualTable>,
    names: FxHashMap<String, TableId>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query table and its root view under `view_name`.
    ///
    /// Returns the root virtual table id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if a name is taken or the primary key does
    /// not fit the schema.
    pub fn add_table(&mut self, table: QueryTable, view_name: &str) -> Result<usize, CatalogError> {
        if table.num_primary_keys > table.fields.len() {
            return Err(CatalogError::InvalidPrimaryKey {
                table: table.name.clone(),
                num_primary_keys: table.num_primary_keys,
                num_columns: table.fields.len(),
            });
        }
        self.check_free(&table.name)?;
        if view_name != table.name {
            self.check_free(view_name)?;
        }
        let base = self.queries.len();
        let own_columns: Vec<usize> = table
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| nested_fields(f).is_none())
            .map(|(i, _)| i)
            .collect();
        let fields: Fields = own_columns
            .iter()
            .map(|&i| FieldRef::clone(&table.fields[i]))
            .collect();
        let root = VirtualTable {
            name: view_name.to_string(),
            kind: VirtualKind::Root { base },
            level_fields: table.fields.clone(),
            num_local_pks: table.num_primary_keys,
            own_columns,
            num_ancestor_pks: 0,
            fields,
        };
        self.names.insert(table.name.clone(), TableId::Query(base));
        self.queries.push(table);
        Ok(self.push_virtual(root))
    }

    /// Registers the nested collection `column` of virtual table `parent` as
    /// a child view with `num_local_pks` leading key columns.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the column does not exist, is not a
    /// nested collection, or the name is taken.
    pub fn add_child(
        &mut self,
        parent: usize,
        column: &str,
        name: &str,
        num_local_pks: usize,
    ) -> Result<usize, CatalogError> {
        self.check_free(name)?;
        let p = &self.virtuals[parent];
        let Some(shred_field) = p.level_fields.iter().position(|f| f.name() == column) else {
            return Err(CatalogError::UnknownColumn {
                table: p.name.clone(),
                column: column.to_string(),
                available: p.level_fields.iter().map(|f| f.name().clone()).collect(),
            });
        };
        let Some(level_fields) = nested_fields(&p.level_fields[shred_field]) else {
            return Err(CatalogError::NotNested {
                table: p.name.clone(),
                column: column.to_string(),
            });
        };
        if num_local_pks > level_fields.len() {
            return Err(CatalogError::InvalidPrimaryKey {
                table: name.to_string(),
                num_primary_keys: num_local_pks,
                num_columns: level_fields.len(),
            });
        }
        let num_ancestor_pks = p.num_primary_keys();
        let own_columns: Vec<usize> = level_fields
            .iter()
            .enumerate()
            .filter(|(_, f)| nested_fields(f).is_none())
            .map(|(i, _)| i)
            .collect();
        let fields: Fields = p.fields[..num_ancestor_pks]
            .iter()
            .cloned()
            .chain(own_columns.iter().map(|&i| FieldRef::clone(&level_fields[i])))
            .collect();
        let child = VirtualTable {
            name: name.to_string(),
            kind: VirtualKind::Child {
                parent,
                shred_field,
            },
            level_fields,
            num_local_pks,
            own_columns,
            num_ancestor_pks,
            fields,
        };
        Ok(self.push_virtual(child))
    }

    fn push_virtual(&mut self, table: VirtualTable) -> usize {
        let id = self.virtuals.len();
        self.names.insert(table.name.clone(), TableId::Virtual(id));
        self.virtuals.push(table);
        id
    }

    fn check_free(&self, name: &str) -> Result<(), CatalogError> {
        if self.names.contains_key(name) {
            return Err(CatalogError::DuplicateTable(name.to_string()));
        }
        Ok(())
    }

    /// Resolves a name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTable`] listing the registered names.
    pub fn lookup(&self, name: &str) -> Result<TableId, CatalogError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::UnknownTable {
                name: name.to_string(),
                available: self.table_names(),
            })
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Query table by id.
    ///
    /// # Panics
    ///
    /// Panics on an id the catalog did not hand out.
    #[must_use]
    pub fn query(&self, id: usize) -> &QueryTable {
        &self.queries[id]
    }

    /// Virtual table by id.
    ///
    /// # Panics
    ///
    /// Panics on an id the catalog did not hand out.
    #[must_use]
    pub fn virtual_table(&self, id: usize) -> &VirtualTable {
        &self.virtuals[id]
    }

    /// Virtual table ids from the root down to `id`.
    #[must_use]
    pub fn ancestry(&self, id: usize) -> Vec<usize> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.virtuals[current].parent() {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Query table underlying the entity of virtual table `id`.
    #[must_use]
    pub fn base_of(&self, id: usize) -> usize {
        let root = self.ancestry(id)[0];
        match self.virtuals[root].kind {
            VirtualKind::Root { base } => base,
            VirtualKind::Child { .. } => unreachable!("ancestry starts at a root"),
        }
    }

    /// Root view of query table `base`.
    ///
    /// # Panics
    ///
    /// Panics on an id the catalog did not hand out.
    #[must_use]
    pub fn root_view(&self, base: usize) -> usize {
        self.virtuals
            .iter()
            .position(|v| matches!(v.kind, VirtualKind::Root { base: b } if b == base))
            .unwrap_or_else(|| panic!("query table {base} has no root view"))
    }

    /// Child views of virtual table `id`.
    #[must_use]
    pub fn children(&self, id: usize) -> Vec<usize> {
        self.virtuals
            .iter()
            .enumerate()
            .filter(|(_, v)| v.parent() == Some(id))
            .map(|(i, _)| i)
            .collect()
    }

    /// Schema of a relation.
    #[must_use]
    pub fn fields(&self, id: TableId) -> &Fields {
        match id {
            TableId::Query(i) => &self.queries[i].fields,
            TableId::Virtual(i) => &self.virtuals[i].fields,
        }
    }

    /// Number of query tables.
    #[must_use]
    pub fn num_query_tables(&self) -> usize {
        self.queries.len()
    }
}

/// Struct fields of a `List<Struct>` column.
#[must_use]
pub fn nested_fields(field: &Field) -> Option<Fields> {
    match field.data_type() {
        DataType::List(item) | DataType::LargeList(item) => match item.data_type() {
            DataType::Struct(fields) => Some(fields.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// A `List<Struct>` field over `fields`.
#[must_use]
pub fn nested_field(name: &str, fields: Fields) -> Field {
    Field::new(
        name,
        DataType::List(std::sync::Arc::new(Field::new(
            "item",
            DataType::Struct(fields),
            true,
        ))),
        true,
    )
}
