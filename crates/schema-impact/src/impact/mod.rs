//! Change-impact analysis.
//!
//! Given a changed root entity and its downstream dependents, the analyzer:
//!
//! 1. builds an [`ImpactGraph`] from the dependent rows,
//! 2. enumerates every maximal path from the root (bounded by depth and count),
//! 3. scores each path with the versioned [`PathRiskEvaluator`],
//! 4. folds paths into per-entity impact and an overall summary,
//! 5. lets the [`ApprovalPolicy`] decide whether sign-off is required.
//!
//! Steps 1-5 are pure; only [`ImpactAnalyzer::analyze`] touches the store.

mod aggregate;
mod policy;
pub(crate) mod scoring;
mod verdict;

pub use aggregate::{EntityImpact, OverallImpactSummary, aggregate};
pub use policy::{ApprovalPolicy, ThresholdApprovalPolicy};
pub use scoring::{
    PathRiskEvaluator, change_factor_percent, dependency_weight, depth_factor_percent,
    impact_level_for,
};
pub use verdict::{HIGH_CRITICALITY, ImpactVerdict, VerdictReason, build_verdict};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::db::{DependencyStore, SchemaCatalog};
use crate::error::{Error, Result};
use crate::graph::{DependencyPath, ImpactGraph, PathEnumerator, TruncationReason};
use crate::types::{ChangeType, DependentRow, EntityRef, ImpactLevel, ProjectId};

/// Full outcome of one impact analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactResult {
    /// The changed entity
    pub root: EntityRef,
    /// Kind of change analysed
    pub change_type: ChangeType,
    /// Version of the scoring rules used
    pub scoring_version: u32,
    /// Every scoring constant, for audit trails
    pub policy_snapshot: String,
    /// Description of the approval policy applied
    pub approval_policy: String,
    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
    /// Depth cap in force
    pub max_depth: usize,
    /// Path cap in force
    pub max_paths: usize,
    /// Number of enumerated paths
    pub path_count: usize,
    /// Number of affected entities (root excluded)
    pub entity_count: usize,
    /// Longest path found, in edges
    pub max_depth_reached: usize,
    /// Whether a limit cut the analysis short
    pub is_truncated: bool,
    /// Which limits were hit
    pub truncation: Vec<TruncationReason>,
    /// Worst-case outcome
    pub summary: OverallImpactSummary,
    /// Affected entities, worst first
    pub entities: Vec<EntityImpact>,
    /// Scored paths, in discovery order
    pub paths: Vec<DependencyPath>,
}

impl ImpactResult {
    /// Worst impact level.
    #[must_use]
    pub fn impact_level(&self) -> ImpactLevel {
        self.summary.worst_impact_level
    }

    /// Whether the approval policy requires sign-off.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.summary.requires_approval
    }
}

/// Runs the analysis pipeline with a fixed configuration and approval policy.
pub struct ImpactAnalyzer {
    config: AnalysisConfig,
    evaluator: PathRiskEvaluator,
    policy: Box<dyn ApprovalPolicy>,
}

impl fmt::Debug for ImpactAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpactAnalyzer")
            .field("config", &self.config)
            .field("scoring_version", &self.evaluator.version())
            .field("policy", &self.policy.describe())
            .finish()
    }
}

impl Default for ImpactAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl ImpactAnalyzer {
    /// Create an analyzer using the configured approval threshold.
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        let policy = ThresholdApprovalPolicy::new(config.approval_threshold);
        Self::with_policy(config, policy)
    }

    /// Create an analyzer with a custom approval policy.
    #[must_use]
    pub fn with_policy(config: AnalysisConfig, policy: impl ApprovalPolicy + 'static) -> Self {
        Self {
            config,
            evaluator: PathRiskEvaluator::new(),
            policy: Box::new(policy),
        }
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse a change to `root` against the dependency edges in `store`.
    ///
    /// The root is re-read from the catalog so the result carries its name
    /// and criticality.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the root is not in the catalog, or a
    /// database error if the dependents query fails.
    pub fn analyze<S>(
        &self,
        store: &S,
        project: ProjectId,
        root: &EntityRef,
        change: ChangeType,
    ) -> Result<ImpactResult>
    where
        S: SchemaCatalog + DependencyStore + ?Sized,
    {
        let object = store
            .object(project, root)?
            .ok_or_else(|| Error::NotFound(format!("{root} in project {project}")))?;
        let root = object.entity_ref();

        // One extra level lets the enumerator see that chains continue past the cap.
        let rows = store.downstream_dependents(project, &root, self.config.max_depth + 1)?;
        debug!(root = %root, rows = rows.len(), "Loaded downstream dependents");

        let result = self.analyze_rows(
            &root,
            object.criticality_level.map(i64::from),
            &rows,
            change,
        );
        info!(
            root = %result.root,
            change = %change,
            paths = result.path_count,
            entities = result.entity_count,
            level = %result.impact_level(),
            approval = result.requires_approval(),
            "Impact analysis complete"
        );
        Ok(result)
    }

    /// Analyse pre-loaded dependent rows. Pure; never touches storage.
    #[must_use]
    pub fn analyze_rows(
        &self,
        root: &EntityRef,
        root_criticality: Option<i64>,
        rows: &[DependentRow],
        change: ChangeType,
    ) -> ImpactResult {
        let graph = ImpactGraph::build(
            root,
            root_criticality,
            rows,
            self.config.default_criticality,
        );
        let mut enumeration = PathEnumerator::from_config(&self.config).enumerate(&graph);
        self.evaluator.evaluate_all(&mut enumeration.paths, change);

        let (entities, summary) = aggregate(root, &enumeration.paths);
        let summary = self.policy.apply(summary);

        ImpactResult {
            root: root.clone(),
            change_type: change,
            scoring_version: self.evaluator.version(),
            policy_snapshot: self.evaluator.policy_snapshot(),
            approval_policy: self.policy.describe(),
            analyzed_at: Utc::now(),
            max_depth: self.config.max_depth,
            max_paths: self.config.max_paths,
            path_count: enumeration.paths.len(),
            entity_count: entities.len(),
            max_depth_reached: enumeration.max_depth_reached,
            is_truncated: enumeration.is_truncated(),
            truncation: enumeration.truncation,
            summary,
            entities,
            paths: enumeration.paths,
        }
    }

    /// Explain a result.
    #[must_use]
    pub fn verdict(&self, result: &ImpactResult) -> ImpactVerdict {
        build_verdict(result)
    }
}
