//! # Schema Impact: SQL dependency mining and change-impact analysis
//!
//! Schema Impact reads the SQL definitions of a database schema (procedures,
//! views, functions), mines the tables and routines each one depends on, and
//! answers "what breaks if I change this?" with scored dependency paths, an
//! approval decision and a ranked explanation.
//!
//! ## Design Philosophy
//!
//! - **Static, best-effort** - Definitions are parsed, never executed; unknown syntax is skipped
//! - **Idempotent sync** - Re-syncing a project replaces its edges, it never duplicates them
//! - **Bounded traversal** - Depth and path caps keep dense graphs tractable, and say so when hit
//! - **Explainable scores** - Every score is versioned and every verdict lists its evidence
//! - **Library first, CLI second**
//!
//! ## Quick Start
//!
//! ```no_run
//! use schema_impact::{AnalysisConfig, ChangeType, EntityType, ProjectId, SchemaImpact};
//! use std::path::Path;
//!
//! let engine = SchemaImpact::open(Path::new("impact.db"), AnalysisConfig::default())?;
//! let project = ProjectId(1);
//!
//! engine.import_catalog_file(project, Path::new("catalog.yaml"))?;
//! let report = engine.sync_project(project)?;
//! println!("{} definitions analysed", report.sources_analyzed);
//!
//! let orders = engine.find_entity(project, Some(EntityType::Table), "dbo.Orders")?;
//! let result = engine.analyze_impact(project, &orders, ChangeType::Delete)?;
//! let verdict = engine.impact_verdict(&result);
//! println!("{}", verdict.summary);
//! # Ok::<(), schema_impact::Error>(())
//! ```

mod config;
mod db;
mod error;
mod extract;
mod graph;
mod impact;
mod resolver;
mod types;

pub use config::{
    AnalysisConfig, CONFIG_FILE_NAME, DATABASE_FILE_NAME, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS,
    MAX_ALLOWED_DEPTH, STATE_DIR_NAME, default_config_path, default_database_path,
};
pub use db::{DependencyStore, SchemaCatalog, Store};
pub use error::{Error, ExtractError, Result, SyncFailure, SyncFailureKind};
pub use extract::{DependencyExtractor, Diagnostic, Extraction, MAX_NESTING};
pub use graph::{
    DependencyPath, GraphNode, ImpactGraph, PathEnumeration, PathEnumerator, PathScore,
    TruncationReason,
};
pub use impact::{
    ApprovalPolicy, EntityImpact, HIGH_CRITICALITY, ImpactAnalyzer, ImpactResult, ImpactVerdict,
    OverallImpactSummary, PathRiskEvaluator, ThresholdApprovalPolicy, VerdictReason, aggregate,
    build_verdict, change_factor_percent, dependency_weight, depth_factor_percent,
    impact_level_for,
};
pub use resolver::{
    AmbiguousName, DependencyResolver, Resolution, STATIC_CONFIDENCE, normalize_name,
    resolve_and_store,
};
pub use types::{
    CatalogDocument, CatalogEntry, CatalogObject, ChangeType, ColumnReference, DEFAULT_CRITICALITY,
    DependencyType, DependentRow, EntityRef, EntityType, ImpactLevel, ImportStats,
    JoinConditionInfo, MAX_CRITICALITY, MIN_CRITICALITY, ProjectId, RawDependency,
    ResolvedDependency, SchemaObject, SyncReport, clamp_criticality,
};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, warn};

/// Dependency cache and impact-analysis interface.
///
/// `SchemaImpact` owns the store, the extractor and the analyzer. Syncing a
/// project runs extraction and resolution; analysing a change reads the
/// persisted edges back and never writes.
#[derive(Debug)]
pub struct SchemaImpact {
    store: Store,
    extractor: DependencyExtractor,
    analyzer: ImpactAnalyzer,
}

impl SchemaImpact {
    /// Open (or create) the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid, or a database/IO
    /// error if the store cannot be opened.
    pub fn open(db_path: &Path, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_store(Store::open(db_path)?, config))
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid.
    pub fn open_in_memory(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_store(Store::open_in_memory()?, config))
    }

    fn with_store(store: Store, config: AnalysisConfig) -> Self {
        Self {
            store,
            extractor: DependencyExtractor::new(),
            analyzer: ImpactAnalyzer::new(config),
        }
    }

    /// Replace the approval policy used by [`analyze_impact`](Self::analyze_impact).
    #[must_use]
    pub fn with_approval_policy(mut self, policy: impl ApprovalPolicy + 'static) -> Self {
        self.analyzer = ImpactAnalyzer::with_policy(self.analyzer.config().clone(), policy);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        self.analyzer.config()
    }

    // === Catalog ===

    /// Upsert every object of `document` into `project`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an object without a name (nothing is
    /// imported), or a database error.
    pub fn import_catalog(
        &self,
        project: ProjectId,
        document: &CatalogDocument,
    ) -> Result<ImportStats> {
        self.store.import_catalog(project, document)
    }

    /// Read a catalog document from a `.json`, `.yaml` or `.yml` file and import it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, `Error::Serialization`
    /// if it does not parse, and `Error::Config` for an unknown extension.
    pub fn import_catalog_file(&self, project: ProjectId, path: &Path) -> Result<ImportStats> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let document: CatalogDocument = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "{}: catalog must be a .json, .yaml or .yml file",
                    path.display()
                )));
            }
        };

        self.import_catalog(project, &document)
    }

    /// Look up an entity by name, preferring the `dbo` schema for unqualified names.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no object matches.
    pub fn find_entity(
        &self,
        project: ProjectId,
        entity_type: Option<EntityType>,
        name: &str,
    ) -> Result<EntityRef> {
        self.store
            .find_object(project, entity_type, name)?
            .map(|object| object.entity_ref())
            .ok_or_else(|| Error::NotFound(format!("'{name}' in project {project}")))
    }

    // === Sync ===

    /// Extract, resolve and persist the dependencies of every definition in `project`.
    ///
    /// Definitions are processed one at a time. A definition that is missing,
    /// nests too deep or crashes the extractor is recorded in
    /// [`SyncReport::failures`] and skipped; its previous edges are cleared.
    /// Resolution and persistence then run as a single transaction.
    ///
    /// # Errors
    ///
    /// Fails only when the store itself fails; the error is logged and returned.
    pub fn sync_project(&self, project: ProjectId) -> Result<SyncReport> {
        self.sync_inner(project).inspect_err(|e| {
            error!(project = %project, error = %e, "Schema sync failed");
        })
    }

    fn sync_inner(&self, project: ProjectId) -> Result<SyncReport> {
        let start = Instant::now();
        let definitions = self.store.definitions(project)?;

        let mut report = SyncReport::default();
        let mut sources = Vec::with_capacity(definitions.len());
        let mut raw = Vec::new();

        for object in &definitions {
            let owner = object.entity_ref();
            sources.push(owner.clone());

            let Some(sql) = object.definition.as_deref() else {
                debug!(owner = %owner, "No definition to analyse");
                report.failures.push(SyncFailure::missing_definition(owner));
                continue;
            };

            report.sources_analyzed += 1;
            match self.extract_guarded(sql, &owner) {
                Ok(extraction) => {
                    report.raw_dependencies += extraction.dependencies.len();
                    report.diagnostics += extraction.diagnostics.len();
                    report.join_conditions.extend(extraction.join_conditions);
                    raw.extend(extraction.dependencies);
                }
                Err(failure) => {
                    warn!(
                        owner = %failure.source,
                        kind = %failure.kind,
                        "Skipping definition: {}",
                        failure.message
                    );
                    report.failures.push(failure);
                }
            }
        }

        let resolution = resolve_and_store(&self.store, project, &sources, &raw)?;
        report.resolved_dependencies = resolution.resolved.len();
        report.unresolved_dependencies = resolution.unresolved.len();
        report.duration = start.elapsed();

        info!(
            project = %project,
            sources = report.sources_analyzed,
            failures = report.failure_count(),
            resolved = report.resolved_dependencies,
            unresolved = report.unresolved_dependencies,
            "Schema sync complete"
        );
        Ok(report)
    }

    /// Run the extractor, turning errors and panics into a [`SyncFailure`].
    fn extract_guarded(
        &self,
        sql: &str,
        owner: &EntityRef,
    ) -> std::result::Result<Extraction, SyncFailure> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.extractor.extract(sql, owner))) {
            Ok(Ok(extraction)) => Ok(extraction),
            Ok(Err(e)) => Err(SyncFailure::extraction(owner.clone(), &e)),
            Err(payload) => Err(SyncFailure::panicked(
                owner.clone(),
                panic_message(payload.as_ref()),
            )),
        }
    }

    // === Queries ===

    /// All persisted dependency edges of `project`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub fn dependencies(&self, project: ProjectId) -> Result<Vec<ResolvedDependency>> {
        self.store.dependencies(project)
    }

    /// Analyse the impact of `change` to `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if `root` is not in the catalog, or a
    /// database error.
    pub fn analyze_impact(
        &self,
        project: ProjectId,
        root: &EntityRef,
        change: ChangeType,
    ) -> Result<ImpactResult> {
        self.analyzer.analyze(&self.store, project, root, change)
    }

    /// Explain an analysis result.
    #[must_use]
    pub fn impact_verdict(&self, result: &ImpactResult) -> ImpactVerdict {
        self.analyzer.verdict(result)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
