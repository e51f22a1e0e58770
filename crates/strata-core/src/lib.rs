//! # Strata Core
//!
//! Data carriers for the strata plan annotation engine.
//!
//! This crate provides:
//! - [`index_map`]: dense column-position mappings
//! - [`time`]: timestamp provenance, time predicates and now-filters
//! - [`topn`]: deferred deduplication, ranking and limits
//! - [`lineage`]: join lineage of shredded nested entities
//! - [`execution`]: execution stages, capabilities and their analysis
//! - [`rel`]: the positional relational plan model and a reference evaluator
//! - [`catalog`]: base relations and their flat virtual views

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod catalog;
pub mod execution;
pub mod index_map;
pub mod lineage;
pub mod rel;
pub mod time;
pub mod topn;

pub use catalog::{Catalog, CatalogError, Pullups, QueryTable, TableId, TableType, VirtualTable};
pub use execution::{
    Capability, CapabilityMismatch, EngineKind, ExecutionAnalysis, ExecutionPipeline,
    ExecutionStage, StageKind,
};
pub use index_map::{IndexMap, IndexMapBuilder};
pub use lineage::{JoinLineage, JoinTable, JoinTableId, LineageJoinKind, LineageMapping};
pub use time::{NowFilter, TimePredicate, TimestampProvenance};
pub use topn::TopNConstraint;
