//! Human-readable verdicts.
//!
//! Each reason pairs a fact ("2 stored procedures write to dbo.Orders") with
//! what it means for the change and the entities that back it up. Reasons are
//! ranked by priority, then by how many entities they cover.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{EntityImpact, ImpactResult};
use crate::types::{ChangeType, DependencyType, EntityType, ImpactLevel};

/// Criticality at or above which an affected entity is called out.
pub const HIGH_CRITICALITY: u8 = 4;

/// One ranked explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictReason {
    /// Lower sorts first
    pub priority: u8,
    /// What the analysis found
    pub statement: String,
    /// What that means for the change
    pub implication: String,
    /// Names of the entities behind the statement
    pub evidence: Vec<String>,
}

/// Outcome of an analysis, explained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactVerdict {
    /// Worst impact level
    pub risk_tier: ImpactLevel,
    /// Whether the approval policy requires sign-off
    pub requires_approval: bool,
    /// One-sentence summary
    pub summary: String,
    /// Explanations, most important first
    pub reasons: Vec<VerdictReason>,
    /// What the analysis cannot see
    pub limitations: Vec<String>,
}

/// "2 stored procedures and 1 view", grouped by entity type.
fn count_phrase(entities: &[&EntityImpact]) -> String {
    let mut counts: BTreeMap<EntityType, usize> = BTreeMap::new();
    for impact in entities {
        *counts.entry(impact.entity.entity_type).or_default() += 1;
    }
    let parts: Vec<String> = counts
        .into_iter()
        .map(|(t, n)| format!("{n} {}", t.label(n)))
        .collect();
    match parts.as_slice() {
        [] => "no entities".to_string(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn verb(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

fn evidence(entities: &[&EntityImpact]) -> Vec<String> {
    entities.iter().map(|e| e.entity.label()).collect()
}

fn reason(
    priority: u8,
    statement: String,
    implication: impl Into<String>,
    entities: &[&EntityImpact],
) -> VerdictReason {
    VerdictReason {
        priority,
        statement,
        implication: implication.into(),
        evidence: evidence(entities),
    }
}

/// Build the verdict for an analysis result.
#[must_use]
pub fn build_verdict(result: &ImpactResult) -> ImpactVerdict {
    let root = result.root.label();
    let direct: Vec<&EntityImpact> = result.entities.iter().filter(|e| e.distance == 1).collect();
    let mut reasons = Vec::new();

    let schema_bound: Vec<_> = direct
        .iter()
        .copied()
        .filter(|e| e.dependency_types.contains(&DependencyType::SchemaDependency))
        .collect();
    if !schema_bound.is_empty() {
        reasons.push(reason(
            1,
            format!(
                "{} {} schema-bound to {root}",
                count_phrase(&schema_bound),
                verb(schema_bound.len(), "is", "are")
            ),
            format!("{root} cannot be altered or dropped until these objects are changed first"),
            &schema_bound,
        ));
    }

    let writers: Vec<_> = direct.iter().copied().filter(|e| e.writes()).collect();
    if !writers.is_empty() {
        reasons.push(reason(
            2,
            format!(
                "{} {} to {root}",
                count_phrase(&writers),
                verb(writers.len(), "writes", "write")
            ),
            "column, constraint or key changes can break their INSERT, UPDATE and DELETE statements",
            &writers,
        ));
    }

    let callers: Vec<_> = direct
        .iter()
        .copied()
        .filter(|e| e.dependency_types.contains(&DependencyType::Exec))
        .collect();
    if !callers.is_empty() {
        reasons.push(reason(
            3,
            format!(
                "{} {} {root}",
                count_phrase(&callers),
                verb(callers.len(), "calls", "call")
            ),
            "parameter or result-set changes break their calls",
            &callers,
        ));
    }

    if result.change_type == ChangeType::Delete && !direct.is_empty() {
        reasons.push(reason(
            4,
            format!(
                "{root} is referenced by {}",
                count_phrase(&direct)
            ),
            "dropping it breaks every one of them at run time",
            &direct,
        ));
    }

    let critical: Vec<_> = result
        .entities
        .iter()
        .filter(|e| e.criticality_level >= HIGH_CRITICALITY)
        .collect();
    if !critical.is_empty() {
        reasons.push(reason(
            5,
            format!(
                "{} with criticality {HIGH_CRITICALITY} or higher {} affected",
                count_phrase(&critical),
                verb(critical.len(), "is", "are")
            ),
            "failures there have business impact; involve their owners in the review",
            &critical,
        ));
    }

    let readers: Vec<_> = direct
        .iter()
        .copied()
        .filter(|e| e.dependency_types.contains(&DependencyType::Select))
        .collect();
    if !readers.is_empty() {
        reasons.push(reason(
            6,
            format!(
                "{} {} from {root}",
                count_phrase(&readers),
                verb(readers.len(), "reads", "read")
            ),
            "renamed or removed columns break their queries",
            &readers,
        ));
    }

    let transitive: Vec<_> = result.entities.iter().filter(|e| e.distance > 1).collect();
    if !transitive.is_empty() {
        reasons.push(reason(
            7,
            format!(
                "{} {} on {root} indirectly, up to {} hops away",
                count_phrase(&transitive),
                verb(transitive.len(), "depends", "depend"),
                result.max_depth_reached
            ),
            "regressions may surface far from the change; test end-to-end callers",
            &transitive,
        ));
    }

    if result.is_truncated {
        let causes: Vec<String> = result.truncation.iter().map(ToString::to_string).collect();
        reasons.push(VerdictReason {
            priority: 8,
            statement: format!("the analysis was cut short: {}", causes.join("; ")),
            implication: "the real impact may be larger than reported".to_string(),
            evidence: Vec::new(),
        });
    }

    rank(&mut reasons);

    ImpactVerdict {
        risk_tier: result.summary.worst_impact_level,
        requires_approval: result.summary.requires_approval,
        summary: summary_sentence(result),
        reasons,
        limitations: limitations(result),
    }
}

/// Priority first, then the reason backed by more entities.
fn rank(reasons: &mut [VerdictReason]) {
    reasons.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.evidence.len().cmp(&a.evidence.len()))
    });
}

fn summary_sentence(result: &ImpactResult) -> String {
    let root = result.root.label();
    let action = match result.change_type {
        ChangeType::Create => "Creating",
        ChangeType::Modify => "Modifying",
        ChangeType::Delete => "Deleting",
    };

    if result.entities.is_empty() {
        return format!("{action} {root} has no known downstream impact.");
    }

    let entities = result.entities.len();
    let paths = result.paths.len();
    format!(
        "{action} {root} affects {entities} {} over {paths} dependency {}, with {} worst-case impact{}.",
        verb(entities, "entity", "entities"),
        verb(paths, "path", "paths"),
        result.summary.worst_impact_level,
        if result.summary.requires_approval {
            " and requires approval"
        } else {
            ""
        }
    )
}

fn limitations(result: &ImpactResult) -> Vec<String> {
    let mut limitations = vec![
        "Static analysis cannot see dynamic SQL (EXEC of a string, sp_executesql); \
         dependencies created that way are missing."
            .to_string(),
        "References to objects outside the synced schema (system objects, other \
         databases, linked servers) are not resolved and not shown."
            .to_string(),
    ];

    if result.is_truncated {
        limitations.push(format!(
            "Traversal stopped at {} edges or {} paths; entities beyond that are not scored.",
            result.max_depth, result.max_paths
        ));
    }

    if result.entities.is_empty() {
        limitations.push(
            "No dependents were found, which also happens when the project has not been \
             synced since its definitions last changed."
                .to_string(),
        );
    }

    limitations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::impact::ImpactAnalyzer;
    use crate::types::{DependentRow, EntityRef, EntityType};
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn impact(id: i64, entity_type: EntityType, distance: usize, deps: &[DependencyType]) -> EntityImpact {
        EntityImpact {
            entity: EntityRef::named(entity_type, id, format!("dbo.E{id}")),
            criticality_level: 3,
            distance,
            dependency_types: deps.iter().copied().collect::<BTreeSet<_>>(),
            worst_impact_level: ImpactLevel::Medium,
            worst_risk_score: 60,
            cumulative_risk_score: 60,
            dominant_path_id: format!("p{id}"),
            path_ids: vec![format!("p{id}")],
        }
    }

    #[test]
    fn count_phrase_groups_by_type() {
        let a = impact(1, EntityType::StoredProcedure, 1, &[]);
        let b = impact(2, EntityType::StoredProcedure, 1, &[]);
        let c = impact(3, EntityType::View, 1, &[]);
        assert_eq!(count_phrase(&[&a]), "1 stored procedure");
        assert_eq!(count_phrase(&[&a, &b, &c]), "1 view and 2 stored procedures");
    }

    #[test]
    fn verb_agrees_with_count() {
        assert_eq!(verb(1, "writes", "write"), "writes");
        assert_eq!(verb(2, "writes", "write"), "write");
    }

    #[test]
    fn reason_collects_labels_as_evidence() {
        let a = impact(1, EntityType::StoredProcedure, 1, &[DependencyType::Update]);
        let r = reason(2, "x".to_string(), "y", &[&a]);
        assert_eq!(r.evidence, vec!["dbo.E1".to_string()]);
    }

    /// A procedure depending on entity `target`; id 1 is the root table.
    fn row(source: i64, target: i64, dependency_type: DependencyType, criticality: i64) -> DependentRow {
        let target_type = if target == 1 {
            EntityType::Table
        } else {
            EntityType::StoredProcedure
        };
        DependentRow {
            source_type: EntityType::StoredProcedure,
            source_id: source,
            target_type,
            target_id: target,
            dependency_type,
            depth: 1,
            source_name: Some(format!("dbo.usp_{source}")),
            target_name: None,
            source_criticality: Some(criticality),
        }
    }

    fn verdict_for(rows: &[DependentRow], change: ChangeType, max_depth: usize) -> ImpactVerdict {
        let analyzer = ImpactAnalyzer::new(AnalysisConfig {
            max_depth,
            ..AnalysisConfig::default()
        });
        let root = EntityRef::named(EntityType::Table, 1, "dbo.Orders");
        let result = analyzer.analyze_rows(&root, None, rows, change);
        build_verdict(&result)
    }

    fn reason_with(priority: u8, evidence: usize) -> VerdictReason {
        VerdictReason {
            priority,
            statement: format!("p{priority}e{evidence}"),
            implication: String::new(),
            evidence: (0..evidence).map(|i| format!("dbo.E{i}")).collect(),
        }
    }

    #[test]
    fn exec_only_caller_is_explained() {
        let root = EntityRef::named(EntityType::StoredProcedure, 1, "dbo.GetOrders");
        let rows = [DependentRow {
            target_type: EntityType::StoredProcedure,
            ..row(2, 1, DependencyType::Exec, 3)
        }];
        let result =
            ImpactAnalyzer::default().analyze_rows(&root, None, &rows, ChangeType::Modify);
        let verdict = build_verdict(&result);

        assert_eq!(verdict.risk_tier, ImpactLevel::Medium);
        assert_eq!(verdict.reasons.len(), 1);
        let reason = &verdict.reasons[0];
        assert_eq!(reason.priority, 3);
        assert_eq!(reason.statement, "1 stored procedure calls dbo.GetOrders");
        assert!(reason.implication.contains("parameter"));
        assert_eq!(reason.evidence, vec!["dbo.usp_2".to_string()]);
    }

    #[rstest]
    #[case::writer_critical_reader_transitive(
        vec![
            row(10, 1, DependencyType::Delete, 5),
            row(11, 1, DependencyType::Select, 3),
            row(12, 11, DependencyType::Exec, 3),
        ],
        ChangeType::Modify,
        10,
        vec![2, 5, 6, 7],
    )]
    #[case::schema_bound_writer_on_delete(
        vec![
            row(20, 1, DependencyType::SchemaDependency, 3),
            row(21, 1, DependencyType::Update, 3),
        ],
        ChangeType::Delete,
        10,
        vec![1, 2, 4],
    )]
    #[case::caller_between_writer_and_reader(
        vec![
            row(30, 1, DependencyType::Select, 3),
            row(31, 1, DependencyType::Exec, 3),
            row(32, 1, DependencyType::Update, 3),
        ],
        ChangeType::Modify,
        10,
        vec![2, 3, 6],
    )]
    #[case::truncation_last(
        vec![
            row(40, 1, DependencyType::Select, 3),
            row(41, 40, DependencyType::Exec, 3),
        ],
        ChangeType::Modify,
        1,
        vec![6, 8],
    )]
    fn reasons_are_ranked_by_priority(
        #[case] rows: Vec<DependentRow>,
        #[case] change: ChangeType,
        #[case] max_depth: usize,
        #[case] expected: Vec<u8>,
    ) {
        let verdict = verdict_for(&rows, change, max_depth);
        let priorities: Vec<u8> = verdict.reasons.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, expected);
    }

    #[test]
    fn equal_priorities_prefer_more_evidence() {
        let mut reasons = vec![
            reason_with(5, 1),
            reason_with(2, 1),
            reason_with(5, 3),
            reason_with(2, 2),
        ];
        rank(&mut reasons);
        let order: Vec<&str> = reasons.iter().map(|r| r.statement.as_str()).collect();
        assert_eq!(order, vec!["p2e2", "p2e1", "p5e3", "p5e1"]);
    }
}
