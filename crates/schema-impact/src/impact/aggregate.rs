//! Folding scored paths into per-entity and overall impact.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::graph::DependencyPath;
use crate::types::{DependencyType, EntityRef, ImpactLevel};

/// Aggregated impact on one affected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityImpact {
    /// The affected entity
    pub entity: EntityRef,
    /// Business criticality (1..=5)
    pub criticality_level: u8,
    /// Fewest edges between the root and this entity over all paths
    pub distance: usize,
    /// Dependency types through which this entity is reached
    pub dependency_types: BTreeSet<DependencyType>,
    /// Highest impact level of any path reaching this entity
    pub worst_impact_level: ImpactLevel,
    /// Highest risk score of any path reaching this entity
    pub worst_risk_score: u32,
    /// Sum of the risk scores of all paths reaching this entity
    pub cumulative_risk_score: u64,
    /// Id of the highest-scoring path reaching this entity
    pub dominant_path_id: String,
    /// Ids of every path reaching this entity, in discovery order
    pub path_ids: Vec<String>,
}

impl EntityImpact {
    /// Whether this entity modifies the data it depends on (an insert,
    /// update or delete edge enters it).
    #[must_use]
    pub fn writes(&self) -> bool {
        self.dependency_types.iter().any(DependencyType::is_write)
    }
}

/// Worst-case outcome of an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverallImpactSummary {
    /// Highest impact level over all paths
    pub worst_impact_level: ImpactLevel,
    /// Highest risk score over all paths
    pub worst_risk_score: u32,
    /// Dominant entity of the worst path; the root itself when nothing is affected
    pub triggering_entity: EntityRef,
    /// Id of the worst path, if any path exists
    pub triggering_path_id: Option<String>,
    /// Set by the approval policy
    pub requires_approval: bool,
}

impl OverallImpactSummary {
    /// Summary for a root with no dependents.
    #[must_use]
    pub fn none(root: &EntityRef) -> Self {
        Self {
            worst_impact_level: ImpactLevel::None,
            worst_risk_score: 0,
            triggering_entity: root.clone(),
            triggering_path_id: None,
            requires_approval: false,
        }
    }
}

/// Fold scored paths into per-entity impact (worst first) and the overall summary.
///
/// The root is not listed as an affected entity.
#[must_use]
pub fn aggregate(
    root: &EntityRef,
    paths: &[DependencyPath],
) -> (Vec<EntityImpact>, OverallImpactSummary) {
    if paths.is_empty() {
        return (Vec::new(), OverallImpactSummary::none(root));
    }

    let mut order: Vec<EntityRef> = Vec::new();
    let mut impacts: HashMap<EntityRef, EntityImpact> = HashMap::new();
    let mut summary = OverallImpactSummary::none(root);

    for path in paths {
        let score = path.risk_score();
        let level = path.impact_level();

        if summary.triggering_path_id.is_none() || score > summary.worst_risk_score {
            summary.worst_risk_score = score;
            summary.worst_impact_level = level;
            summary.triggering_entity = path
                .score
                .as_ref()
                .map_or_else(|| path.leaf().clone(), |s| s.dominant_entity.clone());
            summary.triggering_path_id = Some(path.path_id.clone());
        }

        for (position, (entity, criticality, dependency_type)) in path.affected().enumerate() {
            let distance = position + 1;
            let impact = impacts.entry(entity.clone()).or_insert_with(|| {
                order.push(entity.clone());
                EntityImpact {
                    entity: entity.clone(),
                    criticality_level: criticality,
                    distance,
                    dependency_types: BTreeSet::new(),
                    worst_impact_level: level,
                    worst_risk_score: score,
                    cumulative_risk_score: 0,
                    dominant_path_id: path.path_id.clone(),
                    path_ids: Vec::new(),
                }
            });

            impact.distance = impact.distance.min(distance);
            impact.dependency_types.insert(dependency_type);
            impact.cumulative_risk_score += u64::from(score);
            if score > impact.worst_risk_score {
                impact.worst_risk_score = score;
                impact.worst_impact_level = level;
                impact.dominant_path_id = path.path_id.clone();
            }
            if !impact.path_ids.contains(&path.path_id) {
                impact.path_ids.push(path.path_id.clone());
            }
        }
    }

    let mut entities: Vec<EntityImpact> = order
        .into_iter()
        .filter_map(|entity| impacts.remove(&entity))
        .collect();
    entities.sort_by(|a, b| {
        b.worst_risk_score
            .cmp(&a.worst_risk_score)
            .then(a.distance.cmp(&b.distance))
            .then(a.entity.cmp(&b.entity))
    });

    (entities, summary)
}
