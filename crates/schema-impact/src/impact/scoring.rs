//! Per-path risk scoring.
//!
//! ```text
//! score = weight(max dependency type)
//!       x max criticality (1..=5)
//!       x change factor   (create 50%, modify 100%, delete 150%)
//!       x depth factor    (100% at one hop, -10% per further hop, floor 50%)
//! ```
//!
//! | Score   | Level    |
//! |---------|----------|
//! | 0       | None     |
//! | 1-49    | Low      |
//! | 50-119  | Medium   |
//! | 120-199 | High     |
//! | 200+    | Critical |

use crate::graph::{DependencyPath, PathScore};
use crate::types::{ChangeType, DependencyType, EntityRef, ImpactLevel};

/// Lowest score of each level above `None`.
const LOW_FLOOR: u32 = 1;
const MEDIUM_FLOOR: u32 = 50;
const HIGH_FLOOR: u32 = 120;
const CRITICAL_FLOOR: u32 = 200;

const DEPTH_STEP_PERCENT: u32 = 10;
const DEPTH_FLOOR_PERCENT: u32 = 50;

/// Base weight of a dependency type.
#[must_use]
pub fn dependency_weight(dependency_type: DependencyType) -> u32 {
    match dependency_type {
        DependencyType::Select => 10,
        DependencyType::Exec => 20,
        DependencyType::Insert => 30,
        DependencyType::Update => 35,
        DependencyType::Delete => 40,
        DependencyType::SchemaDependency => 50,
    }
}

/// Percentage applied for the kind of change.
#[must_use]
pub fn change_factor_percent(change: ChangeType) -> u32 {
    match change {
        ChangeType::Create => 50,
        ChangeType::Modify => 100,
        ChangeType::Delete => 150,
    }
}

/// Percentage applied for a path of `depth` edges.
#[must_use]
pub fn depth_factor_percent(depth: usize) -> u32 {
    let hops = u32::try_from(depth.saturating_sub(1)).unwrap_or(u32::MAX);
    100u32
        .saturating_sub(hops.saturating_mul(DEPTH_STEP_PERCENT))
        .max(DEPTH_FLOOR_PERCENT)
}

/// Discrete level of a score.
#[must_use]
pub fn impact_level_for(score: u32) -> ImpactLevel {
    match score {
        0 => ImpactLevel::None,
        s if s >= CRITICAL_FLOOR => ImpactLevel::Critical,
        s if s >= HIGH_FLOOR => ImpactLevel::High,
        s if s >= MEDIUM_FLOOR => ImpactLevel::Medium,
        s if s >= LOW_FLOOR => ImpactLevel::Low,
        _ => ImpactLevel::None,
    }
}

/// Versioned path scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathRiskEvaluator;

impl PathRiskEvaluator {
    /// Scoring version; bump whenever a weight or threshold changes.
    pub const VERSION: u32 = 1;

    /// Create the evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scoring version.
    #[must_use]
    pub fn version(&self) -> u32 {
        Self::VERSION
    }

    /// Every constant the score depends on, for audit trails.
    #[must_use]
    pub fn policy_snapshot(&self) -> String {
        let weights = [
            DependencyType::Select,
            DependencyType::Exec,
            DependencyType::Insert,
            DependencyType::Update,
            DependencyType::Delete,
            DependencyType::SchemaDependency,
        ]
        .iter()
        .map(|t| format!("{}={}", t.as_str(), dependency_weight(*t)))
        .collect::<Vec<_>>()
        .join(",");
        let changes = [ChangeType::Create, ChangeType::Modify, ChangeType::Delete]
            .iter()
            .map(|c| format!("{}={}%", c.as_str(), change_factor_percent(*c)))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "v{};weights[{weights}];criticality=max(1..5);change[{changes}];\
             depth[-{DEPTH_STEP_PERCENT}%/hop,floor={DEPTH_FLOOR_PERCENT}%];\
             levels[low>={LOW_FLOOR},medium>={MEDIUM_FLOOR},high>={HIGH_FLOOR},critical>={CRITICAL_FLOOR}]",
            Self::VERSION
        )
    }

    /// Score one path for `change`.
    ///
    /// The dominant entity is the affected entity with the highest
    /// criticality, ties going to the entity closest to the root.
    #[must_use]
    pub fn evaluate(&self, path: &DependencyPath, change: ChangeType) -> PathScore {
        let raw = u64::from(dependency_weight(path.max_dependency_type))
            * u64::from(path.max_criticality_level)
            * u64::from(change_factor_percent(change))
            * u64::from(depth_factor_percent(path.depth()))
            / 10_000;
        let risk_score = u32::try_from(raw).unwrap_or(u32::MAX);

        let mut dominant: Option<(&EntityRef, u8)> = None;
        for (entity, level, _) in path.affected() {
            if dominant.is_none_or(|(_, best)| level > best) {
                dominant = Some((entity, level));
            }
        }
        let dominant_entity = dominant.map_or_else(|| path.leaf().clone(), |(e, _)| e.clone());

        PathScore {
            risk_score,
            impact_level: impact_level_for(risk_score),
            dominant_entity,
            dominant_dependency_type: path.max_dependency_type,
        }
    }

    /// Score every path in place.
    pub fn evaluate_all(&self, paths: &mut [DependencyPath], change: ChangeType) {
        for path in paths {
            path.score = Some(self.evaluate(path, change));
        }
    }
}
