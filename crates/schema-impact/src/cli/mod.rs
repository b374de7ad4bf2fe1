//! CLI command implementations.

mod display;

pub mod catalog_schema;
pub mod deps;
pub mod extract;
pub mod impact;
pub mod import;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use schema_impact::{AnalysisConfig, ProjectId, SchemaImpact, default_database_path};

/// Global options shared by every command.
pub struct Context {
    /// Workspace root
    pub workspace: PathBuf,
    /// Explicit database path
    pub db: Option<PathBuf>,
    /// Explicit configuration path
    pub config: Option<PathBuf>,
    /// Project the command operates on
    pub project: ProjectId,
}

impl Context {
    /// Database path in force.
    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| default_database_path(&self.workspace))
    }

    /// Load the configuration, applying `adjust` before validation.
    pub fn config(&self, adjust: impl FnOnce(&mut AnalysisConfig)) -> Result<AnalysisConfig> {
        let mut config = AnalysisConfig::discover(&self.workspace, self.config.as_deref())
            .context("failed to load configuration")?;
        adjust(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Open the engine with the discovered configuration.
    pub fn open(&self) -> Result<SchemaImpact> {
        self.open_with(self.config(|_| {})?)
    }

    /// Open the engine with an explicit configuration.
    pub fn open_with(&self, config: AnalysisConfig) -> Result<SchemaImpact> {
        let db_path = self.db_path();
        SchemaImpact::open(&db_path, config)
            .with_context(|| format!("failed to open database {}", db_path.display()))
    }
}
