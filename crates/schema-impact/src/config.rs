//! Analysis configuration.
//!
//! Configuration lives in `.schema-impact/config.yaml` and controls traversal
//! bounds and the approval policy:
//!
//! ```yaml
//! max-depth: 10
//! max-paths: 10000
//! approval-threshold: high
//! default-criticality: 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DEFAULT_CRITICALITY, ImpactLevel, MAX_CRITICALITY, MIN_CRITICALITY};

/// Name of the working directory that holds the database and configuration
pub const STATE_DIR_NAME: &str = ".schema-impact";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the database file
pub const DATABASE_FILE_NAME: &str = "impact.db";

/// Default traversal depth for dependents and paths
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default cap on enumerated paths
pub const DEFAULT_MAX_PATHS: usize = 10_000;

/// Upper bound accepted for `max-depth`
pub const MAX_ALLOWED_DEPTH: usize = 32;

/// Tunables for dependency traversal and decisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalysisConfig {
    /// Maximum number of edges between the root and any dependent.
    pub max_depth: usize,

    /// Maximum number of paths kept (and frontier size) during enumeration.
    pub max_paths: usize,

    /// Lowest worst-case impact level that requires human approval.
    pub approval_threshold: ImpactLevel,

    /// Criticality assumed for entities without an annotation.
    pub default_criticality: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_paths: DEFAULT_MAX_PATHS,
            approval_threshold: ImpactLevel::High,
            default_criticality: DEFAULT_CRITICALITY,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from `explicit`, or from the default location
    /// under `workspace`, falling back to defaults when neither exists.
    pub fn discover(workspace: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let default_path = default_config_path(workspace);
        if default_path.is_file() {
            tracing::debug!(path = %default_path.display(), "Loading configuration");
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a YAML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 || self.max_depth > MAX_ALLOWED_DEPTH {
            return Err(Error::Config(format!(
                "max-depth must be between 1 and {MAX_ALLOWED_DEPTH}, got {}",
                self.max_depth
            )));
        }

        if self.max_paths == 0 {
            return Err(Error::Config("max-paths must be at least 1".to_string()));
        }

        if !(MIN_CRITICALITY..=MAX_CRITICALITY).contains(&self.default_criticality) {
            return Err(Error::Config(format!(
                "default-criticality must be between {MIN_CRITICALITY} and {MAX_CRITICALITY}, got {}",
                self.default_criticality
            )));
        }

        Ok(())
    }
}

/// Default database location under a workspace.
#[must_use]
pub fn default_database_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR_NAME).join(DATABASE_FILE_NAME)
}

/// Default configuration location under a workspace.
#[must_use]
pub fn default_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR_NAME).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.max_paths, 10_000);
        assert_eq!(config.approval_threshold, ImpactLevel::High);
        assert_eq!(config.default_criticality, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_keys() {
        let config: AnalysisConfig =
            serde_yaml::from_str("approval-threshold: critical\n").expect("valid yaml");
        assert_eq!(config.approval_threshold, ImpactLevel::Critical);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[rstest]
    #[case::zero_depth("max-depth: 0\n", "max-depth")]
    #[case::huge_depth("max-depth: 100\n", "max-depth")]
    #[case::zero_paths("max-paths: 0\n", "max-paths")]
    #[case::criticality("default-criticality: 9\n", "default-criticality")]
    fn invalid_values_are_rejected(#[case] yaml: &str, #[case] expected: &str) {
        let config: AnalysisConfig = serde_yaml::from_str(yaml).expect("valid yaml");
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(expected), "unexpected error: {err}");
    }

    #[test]
    fn save_then_discover_reads_workspace_config() {
        let dir = TempDir::new().unwrap();
        let config = AnalysisConfig {
            max_depth: 4,
            ..AnalysisConfig::default()
        };
        config.save(&default_config_path(dir.path())).unwrap();

        let loaded = AnalysisConfig::discover(dir.path(), None).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = AnalysisConfig::discover(dir.path(), None).unwrap();
        assert_eq!(loaded, AnalysisConfig::default());
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let result = AnalysisConfig::discover(dir.path(), Some(&dir.path().join("nope.yaml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
