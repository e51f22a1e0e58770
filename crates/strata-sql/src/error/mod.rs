//! Structured error codes for planning failures.
//!
//! Every error surfaced by this crate maps to a stable code (`STR-NNNN`) and
//! an optional hint, rendered as `[STR-NNNN] message (hint: ...)`.
//!
//! # Error Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | `STR-1001`..`STR-1099` | Unsupported operators |
//! | `STR-1100`..`STR-1199` | Catalog errors |
//! | `STR-2000`..`STR-2099` | Time and window errors |
//! | `STR-3000`..`STR-3099` | Join and union errors |
//! | `STR-4000`..`STR-4099` | Stage and capability errors |
//! | `STR-9000`..`STR-9099` | Internal errors |

pub mod suggest;

use strata_core::CatalogError;

use crate::planner::PlanningError;
use crate::planner::stage_selection::StageSelectionError;
use crate::Error;
use suggest::{closest_match, suggest_table};

/// Structured error code constants.
pub mod codes {
    /// Operator or modifier the planner does not support.
    pub const UNSUPPORTED_OPERATOR: &str = "STR-1001";

    /// Table not found.
    pub const TABLE_NOT_FOUND: &str = "STR-1100";
    /// Table name already registered.
    pub const DUPLICATE_TABLE: &str = "STR-1101";
    /// Column not found or not a nested collection.
    pub const COLUMN_INVALID: &str = "STR-1102";
    /// Primary key does not fit the schema.
    pub const PRIMARY_KEY_INVALID: &str = "STR-1103";

    // Time and window errors (2000-2099)
    /// Time constraints cannot hold together.
    pub const UNSATISFIABLE: &str = "STR-2001";
    /// Invalid window specification.
    pub const WINDOW_INVALID: &str = "STR-2002";

    // Join and union errors (3000-3099)
    /// Temporal join shape not met.
    pub const TEMPORAL_JOIN_INVALID: &str = "STR-3001";
    /// Interval join shape not met.
    pub const INTERVAL_JOIN_INVALID: &str = "STR-3002";
    /// Unsupported join type.
    pub const JOIN_TYPE_UNSUPPORTED: &str = "STR-3003";
    /// Union branches do not line up.
    pub const UNION_INCOMPATIBLE: &str = "STR-3004";

    // Stage errors (4000-4099)
    /// Stage lacks a required capability.
    pub const CAPABILITY_MISSING: &str = "STR-4001";
    /// Plan would move to another stage.
    pub const STAGE_CHANGE: &str = "STR-4002";
    /// Every candidate stage failed.
    pub const NO_VIABLE_STAGE: &str = "STR-4003";
    /// Stage configuration is invalid.
    pub const STAGE_INVALID: &str = "STR-4004";

    /// Internal error.
    pub const INTERNAL: &str = "STR-9000";
}

/// A translated error with structured code, message, and optional hint.
#[derive(Debug, Clone)]
pub struct TranslatedError {
    /// Structured error code (e.g. `"STR-3001"`).
    pub code: &'static str,
    /// User-facing message.
    pub message: String,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for TranslatedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl TranslatedError {
    fn new(code: &'static str, message: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Translates a catalog error, suggesting close names where possible.
#[must_use]
pub fn translate_catalog_error(err: &CatalogError) -> TranslatedError {
    match err {
        CatalogError::UnknownTable { name, available } => {
            let t = TranslatedError::new(codes::TABLE_NOT_FOUND, err);
            match suggest_table(name, available) {
                Some(hint) => t.with_hint(hint),
                None => t,
            }
        }
        CatalogError::DuplicateTable(_) => TranslatedError::new(codes::DUPLICATE_TABLE, err),
        CatalogError::UnknownColumn {
            column, available, ..
        } => {
            let t = TranslatedError::new(codes::COLUMN_INVALID, err);
            match closest_match(column, available, 2) {
                Some(m) => t.with_hint(format!("Did you mean '{m}'?")),
                None => t,
            }
        }
        CatalogError::NotNested { .. } => TranslatedError::new(codes::COLUMN_INVALID, err)
            .with_hint("Only List<Struct> columns can be registered as nested tables"),
        CatalogError::InvalidPrimaryKey { .. } => {
            TranslatedError::new(codes::PRIMARY_KEY_INVALID, err)
        }
    }
}

/// Translates a planning error.
#[must_use]
pub fn translate_planning_error(err: &PlanningError) -> TranslatedError {
    let t = TranslatedError::new(err.code(), err);
    match err {
        PlanningError::InvalidTemporalJoin(_) => t.with_hint(
            "A temporal join equates every primary key column of the versioned table",
        ),
        PlanningError::InvalidIntervalJoin(_) => t.with_hint(
            "Bound the join with one lower and at most one upper time comparison",
        ),
        PlanningError::StageChange { .. } => {
            t.with_hint("Enable allow_stage_change to let plans move between stages")
        }
        PlanningError::Unsatisfiable { .. } => {
            t.with_hint("Combine time filters so they keep rows in one direction")
        }
        _ => t,
    }
}

/// Translates any error of this crate.
#[must_use]
pub fn translate(err: &Error) -> TranslatedError {
    match err {
        Error::Planning(e) => translate_planning_error(e),
        Error::Catalog(e) => translate_catalog_error(e),
        Error::StageSelection(e) => match e {
            StageSelectionError::NoViableStage { .. } => {
                TranslatedError::new(codes::NO_VIABLE_STAGE, e)
            }
            StageSelectionError::EmptyPipeline | StageSelectionError::UnknownStage(_) => {
                TranslatedError::new(codes::STAGE_INVALID, e)
            }
        },
        Error::Serialization(e) => TranslatedError::new(codes::INTERNAL, e),
    }
}
