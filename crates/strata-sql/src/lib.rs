//! # Strata SQL
//!
//! Logical plan annotation and rewrite engine.
//!
//! This crate provides:
//! - [`planner::PlanConverter`]: bottom-up conversion of a relational plan
//!   into an [`planner::AnnotatedPlan`] tracking primary keys, event time and
//!   deferred now-filters and Top-N constraints
//! - Specialization of joins into temporal and interval joins, and of
//!   aggregates into tumbling, sliding and running windows
//! - [`planner::stage_selection::find_cheapest`]: per-stage trials ranked by a
//!   [`planner::cost::CostModel`]
//! - [`planner::PlanManifest`]: the hand-off to the physical-plan generator
//! - [`error`]: structured error codes
//!
//! ## Example
//!
//! A stream filtered to the last hour and grouped by key:
//!
//! ```sql
//! SELECT id, COUNT(*)
//! FROM events
//! WHERE ts > now() - INTERVAL '1' HOUR
//! GROUP BY id;
//! ```
//!
//! converts into a sliding-window aggregate with a one hour window whose
//! result keeps the freshest pane per `id`.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::manual_let_else)]
// Rule helpers take `&self` so every rule dispatches the same way
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]

pub mod error;
pub mod planner;

pub use planner::cost::{CostModel, SimpleCostModel};
pub use planner::stage_selection::{find_cheapest, SelectedPlan, StageFailure, StageSelectionError};
pub use planner::{AnnotatedPlan, ConverterConfig, PlanConverter, PlanManifest, PlanningError};

/// Result type for planning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors of this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rewrite rule failed.
    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    /// No stage could run the query.
    #[error("Stage selection error: {0}")]
    StageSelection(#[from] StageSelectionError),

    /// Catalog lookup or registration failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] strata_core::CatalogError),

    /// A manifest could not be rendered.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
