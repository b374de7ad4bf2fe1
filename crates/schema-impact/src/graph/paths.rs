//! Bounded breadth-first enumeration of dependency paths.
//!
//! Every maximal path from the root is kept: a path ends when its tail has no
//! affected entity that is not already on the path, or when it reaches the
//! depth cap. Visited tracking is path-local, so different paths may pass
//! through the same entity.

use std::collections::VecDeque;
use std::fmt;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{GraphNode, ImpactGraph};
use crate::config::{AnalysisConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS};
use crate::types::{DependencyType, EntityRef, ImpactLevel};

/// Why enumeration stopped before exhausting the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TruncationReason {
    /// Some paths could have continued past `max_depth` edges
    DepthLimit {
        /// The depth cap in force
        max_depth: usize,
    },
    /// Enumeration stopped after keeping `max_paths` paths
    PathLimit {
        /// The path cap in force
        max_paths: usize,
    },
}

impl fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthLimit { max_depth } => write!(
                f,
                "dependency chains longer than {max_depth} edges were cut off"
            ),
            Self::PathLimit { max_paths } => {
                write!(f, "path enumeration stopped after {max_paths} paths")
            }
        }
    }
}

/// Risk assigned to one path by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathScore {
    /// Numeric risk score
    pub risk_score: u32,
    /// Discrete tier of `risk_score`
    pub impact_level: ImpactLevel,
    /// Highest-criticality affected entity on the path
    pub dominant_entity: EntityRef,
    /// Most severe dependency type on the path
    pub dominant_dependency_type: DependencyType,
}

/// A chain of entities affected by a change to its first node.
///
/// `nodes[i + 1]` depends on `nodes[i]` through `edges[i]`; there is always
/// one more node than edges and no entity appears twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyPath {
    /// Content hash of the node and edge sequence
    pub path_id: String,
    /// Root first, most distant dependent last
    pub nodes: Vec<EntityRef>,
    /// Criticality of each node, parallel to `nodes`
    pub criticality: Vec<u8>,
    /// Dependency type of each hop
    pub edges: Vec<DependencyType>,
    /// Most severe dependency type along the path
    pub max_dependency_type: DependencyType,
    /// Highest criticality among the affected (non-root) nodes
    pub max_criticality_level: u8,
    /// Set once the path has been evaluated
    pub score: Option<PathScore>,
}

impl DependencyPath {
    /// Build a path, or `None` unless there is at least one edge, exactly one
    /// more node than edges and no repeated entity.
    #[must_use]
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<DependencyType>) -> Option<Self> {
        if edges.is_empty() || nodes.len() != edges.len() + 1 {
            return None;
        }
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|n| n.entity == node.entity) {
                return None;
            }
        }

        let max_dependency_type = edges.iter().copied().max()?;
        let max_criticality_level = nodes[1..].iter().map(|n| n.criticality_level).max()?;
        let path_id = path_id(&nodes, &edges);
        let (nodes, criticality) = nodes
            .into_iter()
            .map(|n| (n.entity, n.criticality_level))
            .unzip();

        Some(Self {
            path_id,
            nodes,
            criticality,
            edges,
            max_dependency_type,
            max_criticality_level,
            score: None,
        })
    }

    /// Number of edges.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.edges.len()
    }

    /// The changed entity.
    #[must_use]
    pub fn root(&self) -> &EntityRef {
        &self.nodes[0]
    }

    /// The most distant affected entity.
    #[must_use]
    pub fn leaf(&self) -> &EntityRef {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Affected entities with their criticality and the dependency type they
    /// were reached through.
    pub fn affected(&self) -> impl Iterator<Item = (&EntityRef, u8, DependencyType)> {
        self.nodes[1..]
            .iter()
            .zip(&self.criticality[1..])
            .zip(&self.edges)
            .map(|((entity, &level), &dep)| (entity, level, dep))
    }

    /// Risk score, or 0 before evaluation.
    #[must_use]
    pub fn risk_score(&self) -> u32 {
        self.score.as_ref().map_or(0, |s| s.risk_score)
    }

    /// Impact level, or `None` before evaluation.
    #[must_use]
    pub fn impact_level(&self) -> ImpactLevel {
        self.score
            .as_ref()
            .map_or(ImpactLevel::None, |s| s.impact_level)
    }
}

fn path_id(nodes: &[GraphNode], edges: &[DependencyType]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nodes[0].entity.key().as_bytes());
    for (node, edge) in nodes[1..].iter().zip(edges) {
        hasher.update(b">");
        hasher.update(edge.as_str().as_bytes());
        hasher.update(b">");
        hasher.update(node.entity.key().as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Result of enumerating the paths of one graph.
#[derive(Debug, Clone, Default)]
pub struct PathEnumeration {
    /// All maximal paths, in breadth-first discovery order
    pub paths: Vec<DependencyPath>,
    /// Longest path found, in edges
    pub max_depth_reached: usize,
    /// Limits that cut enumeration short, each recorded once
    pub truncation: Vec<TruncationReason>,
}

impl PathEnumeration {
    /// Whether any limit cut enumeration short.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        !self.truncation.is_empty()
    }

    fn truncate(&mut self, reason: TruncationReason) {
        if !self.truncation.contains(&reason) {
            tracing::debug!(%reason, "Path enumeration truncated");
            self.truncation.push(reason);
        }
    }
}

/// Frontier item: a partial path.
#[derive(Debug, Clone)]
struct PathState {
    nodes: Vec<NodeIndex>,
    edges: Vec<DependencyType>,
}

impl PathState {
    fn extend(&self, node: NodeIndex, edge: DependencyType) -> Self {
        let mut next = self.clone();
        next.nodes.push(node);
        next.edges.push(edge);
        next
    }

    fn tail(&self) -> NodeIndex {
        self.nodes[self.nodes.len() - 1]
    }

    fn into_path(self, graph: &ImpactGraph) -> Option<DependencyPath> {
        let nodes = self.nodes.iter().map(|&idx| graph.node(idx).clone()).collect();
        DependencyPath::new(nodes, self.edges)
    }
}

/// Breadth-first path enumerator with depth and path-count caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEnumerator {
    max_depth: usize,
    max_paths: usize,
}

impl Default for PathEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_PATHS)
    }
}

impl PathEnumerator {
    /// Create an enumerator. Both caps are at least 1.
    #[must_use]
    pub fn new(max_depth: usize, max_paths: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            max_paths: max_paths.max(1),
        }
    }

    /// Create an enumerator with the configured caps.
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.max_depth, config.max_paths)
    }

    /// Enumerate every maximal path from the graph's root.
    #[must_use]
    pub fn enumerate(&self, graph: &ImpactGraph) -> PathEnumeration {
        let mut result = PathEnumeration::default();
        let mut queue = VecDeque::new();
        queue.push_back(PathState {
            nodes: vec![graph.root()],
            edges: Vec::new(),
        });

        while let Some(state) = queue.pop_front() {
            if result.paths.len() >= self.max_paths {
                result.truncate(TruncationReason::PathLimit {
                    max_paths: self.max_paths,
                });
                break;
            }

            let next: Vec<_> = graph
                .affected(state.tail())
                .into_iter()
                .filter(|(node, _)| !state.nodes.contains(node))
                .collect();

            if next.is_empty() {
                self.emit(graph, state, &mut result);
                continue;
            }

            if state.edges.len() >= self.max_depth {
                result.truncate(TruncationReason::DepthLimit {
                    max_depth: self.max_depth,
                });
                self.emit(graph, state, &mut result);
                continue;
            }

            let mut pushed = 0;
            for (node, edge) in next {
                if queue.len() >= self.max_paths {
                    result.truncate(TruncationReason::PathLimit {
                        max_paths: self.max_paths,
                    });
                    break;
                }
                queue.push_back(state.extend(node, edge));
                pushed += 1;
            }
            if pushed == 0 {
                self.emit(graph, state, &mut result);
            }
        }

        tracing::debug!(
            paths = result.paths.len(),
            max_depth_reached = result.max_depth_reached,
            truncated = result.is_truncated(),
            "Enumerated dependency paths"
        );
        result
    }

    fn emit(&self, graph: &ImpactGraph, state: PathState, result: &mut PathEnumeration) {
        if result.paths.len() >= self.max_paths {
            result.truncate(TruncationReason::PathLimit {
                max_paths: self.max_paths,
            });
            return;
        }
        if let Some(path) = state.into_path(graph) {
            result.max_depth_reached = result.max_depth_reached.max(path.depth());
            result.paths.push(path);
        }
    }
}
