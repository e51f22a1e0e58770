//! Pipeline profiles for the compiler.
//!
//! A [`PipelineProfile`] names an ordered list of execution stages. Stage
//! selection tries them front to back, so earlier stages win ties.
//!
//! ```text
//! stream_only            stream
//! stream_and_database    stream → database
//! full                   stream → database → server
//! database_only          database
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_core::execution::{ExecutionPipeline, ExecutionStage};

/// Name of the stream stage in every profile that has one.
pub const STREAM_STAGE: &str = "stream";
/// Name of the database stage in every profile that has one.
pub const DATABASE_STAGE: &str = "database";
/// Name of the server stage.
pub const SERVER_STAGE: &str = "server";

/// Which stages a compiler plans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineProfile {
    /// A stream engine alone. Every query must be continuous.
    StreamOnly,
    /// A stream engine feeding a database.
    #[default]
    StreamAndDatabase,
    /// Stream engine, database and an API server stitching results.
    Full,
    /// A database alone. Every query is evaluated on read.
    DatabaseOnly,
}

impl PipelineProfile {
    /// Builds the stages of this profile.
    #[must_use]
    pub fn pipeline(self) -> ExecutionPipeline {
        let stages = match self {
            Self::StreamOnly => vec![ExecutionStage::stream(STREAM_STAGE)],
            Self::StreamAndDatabase => vec![
                ExecutionStage::stream(STREAM_STAGE),
                ExecutionStage::database(DATABASE_STAGE),
            ],
            Self::Full => vec![
                ExecutionStage::stream(STREAM_STAGE),
                ExecutionStage::database(DATABASE_STAGE),
                ExecutionStage::server(SERVER_STAGE),
            ],
            Self::DatabaseOnly => vec![ExecutionStage::database(DATABASE_STAGE)],
        };
        ExecutionPipeline::new(stages)
    }

    /// Names of the stages of this profile, in order.
    #[must_use]
    pub fn stage_names(self) -> &'static [&'static str] {
        match self {
            Self::StreamOnly => &[STREAM_STAGE],
            Self::StreamAndDatabase => &[STREAM_STAGE, DATABASE_STAGE],
            Self::Full => &[STREAM_STAGE, DATABASE_STAGE, SERVER_STAGE],
            Self::DatabaseOnly => &[DATABASE_STAGE],
        }
    }
}

impl FromStr for PipelineProfile {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream_only" | "stream-only" | "stream" => Ok(Self::StreamOnly),
            "stream_and_database" | "stream-and-database" | "default" => {
                Ok(Self::StreamAndDatabase)
            }
            "full" => Ok(Self::Full),
            "database_only" | "database-only" | "database" => Ok(Self::DatabaseOnly),
            _ => Err(ProfileError::UnknownProfileName(s.into())),
        }
    }
}

impl fmt::Display for PipelineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamOnly => write!(f, "stream_only"),
            Self::StreamAndDatabase => write!(f, "stream_and_database"),
            Self::Full => write!(f, "full"),
            Self::DatabaseOnly => write!(f, "database_only"),
        }
    }
}

/// Errors from profile handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// The profile name could not be parsed.
    #[error("unknown profile name: {0}")]
    UnknownProfileName(String),

    /// The configured start stage is not part of the profile.
    #[error("profile '{profile}' has no stage '{stage}'")]
    UnknownStage {
        /// Profile in use.
        profile: PipelineProfile,
        /// Requested stage.
        stage: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_str() {
        assert_eq!(PipelineProfile::from_str("stream_only").unwrap(), PipelineProfile::StreamOnly);
        assert_eq!(PipelineProfile::from_str("stream-only").unwrap(), PipelineProfile::StreamOnly);
        assert_eq!(
            PipelineProfile::from_str("stream_and_database").unwrap(),
            PipelineProfile::StreamAndDatabase
        );
        assert_eq!(PipelineProfile::from_str("FULL").unwrap(), PipelineProfile::Full);
        assert_eq!(PipelineProfile::from_str("database").unwrap(), PipelineProfile::DatabaseOnly);
        assert!(matches!(
            PipelineProfile::from_str("warehouse").unwrap_err(),
            ProfileError::UnknownProfileName(_)
        ));
    }

    #[test]
    fn test_profile_display_parses_back() {
        for profile in [
            PipelineProfile::StreamOnly,
            PipelineProfile::StreamAndDatabase,
            PipelineProfile::Full,
            PipelineProfile::DatabaseOnly,
        ] {
            assert_eq!(PipelineProfile::from_str(&profile.to_string()).unwrap(), profile);
        }
    }

    #[test]
    fn test_pipeline_matches_stage_names() {
        for profile in [PipelineProfile::Full, PipelineProfile::DatabaseOnly] {
            let pipeline = profile.pipeline();
            let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, profile.stage_names());
        }
    }

    #[test]
    fn test_profile_default() {
        assert_eq!(PipelineProfile::default(), PipelineProfile::StreamAndDatabase);
    }
}
