//! Configuration for a [`crate::Compiler`].
//!
//! Loadable from TOML; every field has a default:
//!
//! ```toml
//! profile = "stream_and_database"
//! start_stage = "stream"
//! allow_stage_change = false
//! sliding_window_panes = 50
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_sql::ConverterConfig;

use crate::error::CompilerError;
use crate::profile::{PipelineProfile, ProfileError};

/// Fewest panes a sliding window can have while its slide stays below the
/// window width.
pub const MIN_SLIDING_WINDOW_PANES: u32 = 2;

/// Configuration for a [`crate::Compiler`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Stages to plan for.
    pub profile: PipelineProfile,
    /// Settings handed to every plan conversion.
    #[serde(flatten)]
    pub converter: ConverterConfig,
}

impl CompilerConfig {
    /// Parses a TOML document and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Toml`] on a malformed document and the
    /// validation error otherwise.
    pub fn from_toml_str(s: &str) -> Result<Self, CompilerError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Io`] if the file cannot be read, otherwise
    /// as [`CompilerConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompilerError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, CompilerError> {
        toml::to_string_pretty(self).map_err(|e| CompilerError::Config(e.to_string()))
    }

    /// Checks that the start stage belongs to the profile and that sliding
    /// windows can be split into panes.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Profile`] for an unknown start stage and
    /// [`CompilerError::Config`] for too few panes.
    pub fn validate(&self) -> Result<(), CompilerError> {
        if let Some(stage) = &self.converter.start_stage {
            if !self.profile.stage_names().contains(&stage.as_str()) {
                return Err(ProfileError::UnknownStage {
                    profile: self.profile,
                    stage: stage.clone(),
                }
                .into());
            }
        }
        if self.converter.sliding_window_panes < MIN_SLIDING_WINDOW_PANES {
            return Err(CompilerError::Config(format!(
                "sliding_window_panes must be at least {MIN_SLIDING_WINDOW_PANES}, got {}",
                self.converter.sliding_window_panes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_sql::planner::DEFAULT_SLIDING_WINDOW_PANES;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.profile, PipelineProfile::StreamAndDatabase);
        assert_eq!(config.converter.sliding_window_panes, DEFAULT_SLIDING_WINDOW_PANES);
        assert!(!config.converter.allow_stage_change);
        assert!(config.converter.start_stage.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = CompilerConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
            profile = "full"
            start_stage = "database"
            allow_stage_change = true
            sliding_window_panes = 12
        "#;
        let config = CompilerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.profile, PipelineProfile::Full);
        assert_eq!(config.converter.start_stage.as_deref(), Some("database"));
        assert!(config.converter.allow_stage_change);
        assert_eq!(config.converter.sliding_window_panes, 12);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = CompilerConfig {
            profile: PipelineProfile::StreamOnly,
            ..CompilerConfig::default()
        };
        config.converter.sliding_window_panes = 6;
        let toml_str = config.to_toml_string().unwrap();
        assert_eq!(CompilerConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_start_stage_outside_profile_rejected() {
        let err = CompilerConfig::from_toml_str(
            r#"
            profile = "stream_only"
            start_stage = "database"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompilerError::Profile(ProfileError::UnknownStage { .. })
        ));
    }

    #[test]
    fn test_single_pane_rejected() {
        let err = CompilerConfig::from_toml_str("sliding_window_panes = 1").unwrap_err();
        assert!(matches!(err, CompilerError::Config(_)));
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let err = CompilerConfig::from_toml_str(r#"profile = "warehouse""#).unwrap_err();
        assert!(matches!(err, CompilerError::Toml(_)));
    }
}
