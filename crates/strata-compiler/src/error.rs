//! Error types for the compiler facade.

use strata_core::CatalogError;
use strata_sql::error::{codes, translate};
use strata_sql::{PlanningError, StageSelectionError};

use crate::profile::ProfileError;

/// Errors from compiler operations.
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// Planning, stage selection or catalog error.
    #[error("{}", translate(.0))]
    Sql(#[from] strata_sql::Error),

    /// Profile error.
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for [`crate::CompilerConfig`].
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A query with the name was already compiled.
    #[error("query '{0}' already exists")]
    QueryAlreadyExists(String),

    /// No compiled query with the name.
    #[error("query '{0}' not found")]
    QueryNotFound(String),
}

impl CompilerError {
    /// Structured error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sql(e) => translate(e).code,
            Self::Profile(ProfileError::UnknownStage { .. }) => codes::STAGE_INVALID,
            Self::QueryAlreadyExists(_) => codes::DUPLICATE_TABLE,
            Self::QueryNotFound(_) => codes::TABLE_NOT_FOUND,
            Self::Profile(_) | Self::Config(_) | Self::Io(_) | Self::Toml(_) => codes::INTERNAL,
        }
    }
}

impl From<PlanningError> for CompilerError {
    fn from(e: PlanningError) -> Self {
        Self::Sql(e.into())
    }
}

impl From<StageSelectionError> for CompilerError {
    fn from(e: StageSelectionError) -> Self {
        Self::Sql(e.into())
    }
}

impl From<CatalogError> for CompilerError {
    fn from(e: CatalogError) -> Self {
        Self::Sql(e.into())
    }
}

impl From<serde_json::Error> for CompilerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Sql(e.into())
    }
}
