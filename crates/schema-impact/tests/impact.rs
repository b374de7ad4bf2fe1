//! Tests for end-to-end impact analysis and path-enumeration invariants.

use std::collections::HashSet;

use proptest::prelude::*;
use schema_impact::{
    AnalysisConfig, CatalogDocument, CatalogObject, ChangeType, DependencyType, DependentRow,
    EntityRef, EntityType, ImpactGraph, ImpactLevel, PathEnumerator, ProjectId, SchemaImpact,
    ThresholdApprovalPolicy, TruncationReason,
};

const PROJECT: ProjectId = ProjectId(1);

fn table(name: &str, criticality: u8) -> CatalogObject {
    CatalogObject {
        object_type: EntityType::Table,
        schema: Some("dbo".to_string()),
        name: name.to_string(),
        criticality: Some(criticality),
        definition: None,
    }
}

fn procedure(name: &str, criticality: Option<u8>, body: &str) -> CatalogObject {
    CatalogObject {
        object_type: EntityType::StoredProcedure,
        schema: Some("dbo".to_string()),
        name: name.to_string(),
        criticality,
        definition: Some(body.to_string()),
    }
}

fn synced(objects: Vec<CatalogObject>, config: AnalysisConfig) -> SchemaImpact {
    let engine = SchemaImpact::open_in_memory(config).expect("open engine");
    engine
        .import_catalog(PROJECT, &CatalogDocument { objects })
        .expect("import catalog");
    engine.sync_project(PROJECT).expect("sync project");
    engine
}

fn entity(engine: &SchemaImpact, name: &str) -> EntityRef {
    engine
        .find_entity(PROJECT, None, name)
        .expect("entity should exist")
}

// === End-to-end ===

#[test]
fn deleting_a_table_written_by_a_critical_procedure_requires_approval() {
    let engine = synced(
        vec![
            table("Orders", 3),
            procedure("usp_Purge", Some(5), "DELETE FROM dbo.Orders WHERE Closed = 1"),
            procedure("usp_Report", Some(5), "SELECT Id, Total FROM dbo.Orders"),
        ],
        AnalysisConfig::default(),
    );
    let orders = entity(&engine, "dbo.Orders");

    let result = engine
        .analyze_impact(PROJECT, &orders, ChangeType::Delete)
        .unwrap();

    assert_eq!(result.path_count, 2);
    assert_eq!(result.entity_count, 2);
    assert_eq!(result.impact_level(), ImpactLevel::Critical);
    assert!(result.requires_approval());
    assert_eq!(result.summary.triggering_entity, entity(&engine, "usp_Purge"));

    let purge = &result.entities[0];
    let report = &result.entities[1];
    assert_eq!(purge.entity.label(), "dbo.usp_Purge");
    assert!(purge.writes());
    assert_eq!(report.entity.label(), "dbo.usp_Report");
    assert!(
        report.worst_risk_score * 2 < purge.worst_risk_score,
        "a reader should score materially lower than a deleter"
    );
    assert!(report.worst_impact_level < ImpactLevel::Critical);

    let verdict = engine.impact_verdict(&result);
    assert_eq!(verdict.risk_tier, ImpactLevel::Critical);
    assert!(verdict.requires_approval);
    assert!(
        verdict
            .reasons
            .iter()
            .any(|r| r.evidence.contains(&"dbo.usp_Purge".to_string()))
    );
    assert!(verdict.limitations.iter().any(|l| l.contains("dynamic SQL")));
}

#[test]
fn reading_dependents_alone_stay_below_approval() {
    let engine = synced(
        vec![
            table("Orders", 3),
            procedure("usp_Report", Some(5), "SELECT Id, Total FROM dbo.Orders"),
        ],
        AnalysisConfig::default(),
    );
    let orders = entity(&engine, "dbo.Orders");

    let result = engine
        .analyze_impact(PROJECT, &orders, ChangeType::Delete)
        .unwrap();
    assert_eq!(result.impact_level(), ImpactLevel::Medium);
    assert!(!result.requires_approval());
}

#[test]
fn replacing_the_approval_policy_keeps_the_configuration() {
    let config = AnalysisConfig {
        max_depth: 4,
        ..AnalysisConfig::default()
    };
    let engine = synced(
        vec![
            table("Orders", 3),
            procedure("usp_Report", Some(5), "SELECT Id, Total FROM dbo.Orders"),
        ],
        config,
    )
    .with_approval_policy(ThresholdApprovalPolicy::new(ImpactLevel::Medium));
    assert_eq!(engine.config().max_depth, 4);

    let orders = entity(&engine, "dbo.Orders");
    let result = engine
        .analyze_impact(PROJECT, &orders, ChangeType::Delete)
        .unwrap();

    assert_eq!(result.impact_level(), ImpactLevel::Medium);
    assert!(result.requires_approval());
    assert!(result.approval_policy.contains("medium"));
    assert_eq!(result.max_depth, 4);
    assert!(engine.impact_verdict(&result).requires_approval);
}

#[test]
fn entity_without_dependents_has_no_impact() {
    let engine = synced(
        vec![
            table("Orders", 3),
            table("Customers", 5),
            procedure("usp_Report", None, "SELECT Id FROM dbo.Orders"),
        ],
        AnalysisConfig::default(),
    );
    let customers = entity(&engine, "Customers");

    let result = engine
        .analyze_impact(PROJECT, &customers, ChangeType::Delete)
        .unwrap();

    assert_eq!(result.summary.worst_impact_level, ImpactLevel::None);
    assert!(!result.summary.requires_approval);
    assert!(result.entities.is_empty());
    assert!(result.paths.is_empty());
    assert!(!result.is_truncated);

    let verdict = engine.impact_verdict(&result);
    assert!(verdict.reasons.is_empty());
    assert!(verdict.summary.contains("no known downstream impact"));
}

#[test]
fn mutually_recursive_procedures_terminate() {
    let engine = synced(
        vec![
            table("Orders", 3),
            procedure("usp_A", None, "SELECT * FROM dbo.Orders; EXEC dbo.usp_B"),
            procedure("usp_B", None, "EXEC dbo.usp_A"),
        ],
        AnalysisConfig::default(),
    );
    let orders = entity(&engine, "dbo.Orders");

    let result = engine
        .analyze_impact(PROJECT, &orders, ChangeType::Modify)
        .unwrap();

    assert_eq!(result.path_count, 1);
    assert_eq!(result.entity_count, 2);
    let path = &result.paths[0];
    assert_eq!(path.nodes.len(), path.edges.len() + 1);
    assert_eq!(path.edges, vec![DependencyType::Select, DependencyType::Exec]);
    assert!(!result.is_truncated);
}

#[test]
fn depth_cap_is_reported_as_truncation() {
    let config = AnalysisConfig {
        max_depth: 2,
        ..AnalysisConfig::default()
    };
    let engine = synced(
        vec![
            table("Orders", 3),
            procedure("usp_1", None, "SELECT * FROM dbo.Orders"),
            procedure("usp_2", None, "EXEC dbo.usp_1"),
            procedure("usp_3", None, "EXEC dbo.usp_2"),
            procedure("usp_4", None, "EXEC dbo.usp_3"),
        ],
        config,
    );
    let orders = entity(&engine, "dbo.Orders");

    let result = engine
        .analyze_impact(PROJECT, &orders, ChangeType::Modify)
        .unwrap();

    assert!(result.is_truncated);
    assert_eq!(
        result.truncation,
        vec![TruncationReason::DepthLimit { max_depth: 2 }]
    );
    assert_eq!(result.max_depth_reached, 2);
    assert_eq!(result.entity_count, 2);

    let verdict = engine.impact_verdict(&result);
    assert!(verdict.limitations.iter().any(|l| l.contains("Traversal stopped")));
    assert!(verdict.reasons.iter().any(|r| r.statement.contains("cut short")));
}

#[test]
fn unknown_root_is_not_found() {
    let engine = synced(vec![table("Orders", 3)], AnalysisConfig::default());
    let ghost = EntityRef::new(EntityType::Table, 999);
    let result = engine.analyze_impact(PROJECT, &ghost, ChangeType::Delete);
    assert!(matches!(result, Err(schema_impact::Error::NotFound(_))));
}

// === Path invariants ===

const DEPENDENCY_TYPES: [DependencyType; 6] = [
    DependencyType::Select,
    DependencyType::Exec,
    DependencyType::Insert,
    DependencyType::Update,
    DependencyType::Delete,
    DependencyType::SchemaDependency,
];

fn rows_strategy() -> impl Strategy<Value = Vec<DependentRow>> {
    prop::collection::vec((1i64..=8, 1i64..=8, 0usize..6), 0..24).prop_map(|edges| {
        edges
            .into_iter()
            .map(|(source, target, kind)| DependentRow {
                source_type: EntityType::StoredProcedure,
                source_id: source,
                target_type: EntityType::StoredProcedure,
                target_id: target,
                dependency_type: DEPENDENCY_TYPES[kind],
                depth: 1,
                source_name: None,
                target_name: None,
                source_criticality: None,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn paths_are_well_formed_and_bounded(
        rows in rows_strategy(),
        max_depth in 1usize..6,
        max_paths in 1usize..200,
    ) {
        let root = EntityRef::new(EntityType::StoredProcedure, 1);
        let graph = ImpactGraph::build(&root, None, &rows, 3);
        let enumeration = PathEnumerator::new(max_depth, max_paths).enumerate(&graph);

        prop_assert!(enumeration.paths.len() <= max_paths);
        prop_assert!(enumeration.max_depth_reached <= max_depth);

        for path in &enumeration.paths {
            prop_assert_eq!(path.nodes.len(), path.edges.len() + 1);
            prop_assert!(!path.edges.is_empty());
            prop_assert!(path.depth() <= max_depth);
            prop_assert_eq!(path.root(), &root);

            let unique: HashSet<_> = path.nodes.iter().collect();
            prop_assert_eq!(unique.len(), path.nodes.len());
        }
    }

    #[test]
    fn path_ids_are_unique_and_stable(rows in rows_strategy()) {
        let root = EntityRef::new(EntityType::StoredProcedure, 1);
        let graph = ImpactGraph::build(&root, None, &rows, 3);
        let enumerator = PathEnumerator::new(5, 500);
        let first = enumerator.enumerate(&graph);
        let second = enumerator.enumerate(&graph);

        let ids: Vec<_> = first.paths.iter().map(|p| p.path_id.clone()).collect();
        let again: Vec<_> = second.paths.iter().map(|p| p.path_id.clone()).collect();
        prop_assert_eq!(&ids, &again);

        let unique: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(unique.len(), ids.len());
    }
}
