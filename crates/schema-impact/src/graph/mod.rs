//! In-memory impact graph built from downstream-dependent rows.
//!
//! Store rows say "source depends on target". The impact graph stores the
//! reverse: an edge `target -> source` labelled with the dependency type, so
//! that walking outgoing edges from the changed root reaches everything the
//! change can break.
//!
//! ## Design
//!
//! - Nodes live in a petgraph arena and are addressed by `NodeIndex`
//! - `EntityRef -> NodeIndex` lookup is a side map; identity is type + id
//! - Criticality is fixed at construction (first explicit value wins, clamped)

mod paths;

pub use paths::{DependencyPath, PathEnumeration, PathEnumerator, PathScore, TruncationReason};

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::types::{DependencyType, DependentRow, EntityRef, clamp_criticality};

/// An entity in the impact graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// The entity
    pub entity: EntityRef,
    /// Business criticality, clamped to 1..=5
    pub criticality_level: u8,
}

/// Directed impact graph rooted at the changed entity.
#[derive(Debug, Clone)]
pub struct ImpactGraph {
    graph: DiGraph<GraphNode, DependencyType>,
    index: HashMap<EntityRef, NodeIndex>,
    root: NodeIndex,
}

impl ImpactGraph {
    /// Build the graph in a single pass over `rows`.
    ///
    /// `root_criticality` is the root's own annotation, if any; entities
    /// without an annotation get `default_criticality`. Duplicate rows are
    /// folded into one edge.
    #[must_use]
    pub fn build(
        root: &EntityRef,
        root_criticality: Option<i64>,
        rows: &[DependentRow],
        default_criticality: u8,
    ) -> Self {
        let mut criticality: HashMap<EntityRef, i64> = HashMap::new();
        if let Some(level) = root_criticality {
            criticality.insert(root.clone(), level);
        }
        for row in rows {
            if let Some(level) = row.source_criticality {
                criticality.entry(row.source()).or_insert(level);
            }
        }
        let level_of = |entity: &EntityRef| {
            criticality
                .get(entity)
                .map_or(clamp_criticality(i64::from(default_criticality)), |&l| {
                    clamp_criticality(l)
                })
        };

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut node_for = |graph: &mut DiGraph<GraphNode, DependencyType>, entity: EntityRef| {
            *index.entry(entity.clone()).or_insert_with(|| {
                let criticality_level = level_of(&entity);
                graph.add_node(GraphNode {
                    entity,
                    criticality_level,
                })
            })
        };

        let root_idx = node_for(&mut graph, root.clone());
        for row in rows {
            let target = node_for(&mut graph, row.target());
            let source = node_for(&mut graph, row.source());
            let exists = graph
                .edges_connecting(target, source)
                .any(|e| *e.weight() == row.dependency_type);
            if !exists {
                graph.add_edge(target, source, row.dependency_type);
            }
        }

        Self {
            graph,
            index,
            root: root_idx,
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The node at `idx`.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Node of `entity`, if present.
    #[must_use]
    pub fn find(&self, entity: &EntityRef) -> Option<NodeIndex> {
        self.index.get(entity).copied()
    }

    /// Number of entities, the root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of impact edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Entities directly affected by a change to `idx`, ordered by entity and
    /// then dependency type so enumeration is deterministic.
    #[must_use]
    pub fn affected(&self, idx: NodeIndex) -> Vec<(NodeIndex, DependencyType)> {
        let mut next: Vec<_> = self
            .graph
            .edges(idx)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        next.sort_by(|a, b| {
            self.graph[a.0]
                .entity
                .cmp(&self.graph[b.0].entity)
                .then(a.1.cmp(&b.1))
        });
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn row(
        source: i64,
        target: (EntityType, i64),
        dependency_type: DependencyType,
        criticality: Option<i64>,
    ) -> DependentRow {
        DependentRow {
            source_type: EntityType::StoredProcedure,
            source_id: source,
            target_type: target.0,
            target_id: target.1,
            dependency_type,
            depth: 1,
            source_name: Some(format!("dbo.P{source}")),
            target_name: None,
            source_criticality: criticality,
        }
    }

    fn root() -> EntityRef {
        EntityRef::named(EntityType::Table, 1, "dbo.Orders")
    }

    #[test]
    fn edges_point_from_target_to_dependent() {
        let graph = ImpactGraph::build(
            &root(),
            None,
            &[row(10, (EntityType::Table, 1), DependencyType::Update, None)],
            3,
        );
        let affected = graph.affected(graph.root());
        assert_eq!(affected.len(), 1);
        let (node, dep) = affected[0];
        assert_eq!(graph.node(node).entity, EntityRef::new(EntityType::StoredProcedure, 10));
        assert_eq!(dep, DependencyType::Update);
    }

    #[test]
    fn criticality_first_explicit_value_wins_and_is_clamped() {
        let graph = ImpactGraph::build(
            &root(),
            Some(9),
            &[
                row(10, (EntityType::Table, 1), DependencyType::Select, None),
                row(10, (EntityType::Table, 1), DependencyType::Update, Some(4)),
                row(10, (EntityType::Table, 1), DependencyType::Delete, Some(2)),
                row(11, (EntityType::Table, 1), DependencyType::Select, None),
            ],
            3,
        );
        assert_eq!(graph.node(graph.root()).criticality_level, 5);
        let p10 = graph
            .find(&EntityRef::new(EntityType::StoredProcedure, 10))
            .unwrap();
        assert_eq!(graph.node(p10).criticality_level, 4);
        let p11 = graph
            .find(&EntityRef::new(EntityType::StoredProcedure, 11))
            .unwrap();
        assert_eq!(graph.node(p11).criticality_level, 3);
    }

    #[test]
    fn duplicate_rows_fold_into_one_edge() {
        let rows = [
            row(10, (EntityType::Table, 1), DependencyType::Select, None),
            row(10, (EntityType::Table, 1), DependencyType::Select, None),
            row(10, (EntityType::Table, 1), DependencyType::Insert, None),
        ];
        let graph = ImpactGraph::build(&root(), None, &rows, 3);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn affected_is_sorted() {
        let rows = [
            row(12, (EntityType::Table, 1), DependencyType::Select, None),
            row(10, (EntityType::Table, 1), DependencyType::Update, None),
            row(10, (EntityType::Table, 1), DependencyType::Select, None),
        ];
        let graph = ImpactGraph::build(&root(), None, &rows, 3);
        let order: Vec<_> = graph
            .affected(graph.root())
            .into_iter()
            .map(|(n, d)| (graph.node(n).entity.entity_id, d))
            .collect();
        assert_eq!(
            order,
            vec![
                (10, DependencyType::Select),
                (10, DependencyType::Update),
                (12, DependencyType::Select)
            ]
        );
    }

    #[test]
    fn root_only_graph_has_no_edges() {
        let graph = ImpactGraph::build(&root(), Some(5), &[], 3);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.affected(graph.root()).is_empty());
    }
}
