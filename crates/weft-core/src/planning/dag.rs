//! Dependency graph construction and validation for workflow steps.
//!
//! Provides DAG functionality for step dependencies, including cycle
//! detection, topological sorting, and execution level calculation.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::models::Step;

/// Errors that can occur while building a dependency graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    /// A step has an empty id.
    #[error("step at position {0} has an empty id")]
    EmptyStepId(usize),

    /// Two steps share an id.
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    /// A dependency names a step that does not exist.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    DependencyNotFound {
        /// The dependent step.
        step: String,
        /// The missing dependency.
        dependency: String,
    },

    /// A step depends on itself.
    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    /// Circular dependency detected.
    #[error("cyclic dependency: {0}")]
    CycleDetected(String),
}

/// Result type for DAG operations.
pub type Result<T> = std::result::Result<T, DagError>;

/// Dependency graph over workflow steps.
///
/// Edges point from a dependency to its dependent. Node indices follow step
/// declaration order, which keeps level listings stable.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// The underlying graph structure.
    graph: DiGraph<String, ()>,

    /// Mapping from step ID to node index.
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Builds and validates the graph for `steps`.
    ///
    /// # Errors
    /// Returns error if:
    /// - A step id is empty or duplicated
    /// - A dependency reference doesn't exist or points at the step itself
    /// - A circular dependency is detected
    pub fn from_steps(steps: &[Step]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(steps.len(), steps.len());
        let mut node_map = HashMap::with_capacity(steps.len());

        // First pass: one node per step
        for (position, step) in steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(DagError::EmptyStepId(position));
            }
            if node_map.contains_key(&step.id) {
                return Err(DagError::DuplicateStep(step.id.clone()));
            }
            let node = graph.add_node(step.id.clone());
            node_map.insert(step.id.clone(), node);
        }

        // Second pass: dependency edges
        for step in steps {
            let to_node = node_map[&step.id];
            let mut seen = HashSet::new();
            for dep_id in &step.dependencies {
                if dep_id == &step.id {
                    return Err(DagError::SelfDependency(step.id.clone()));
                }
                let from_node = node_map.get(dep_id).ok_or_else(|| DagError::DependencyNotFound {
                    step: step.id.clone(),
                    dependency: dep_id.clone(),
                })?;
                if seen.insert(dep_id) {
                    graph.add_edge(*from_node, to_node, ());
                }
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(DagError::CycleDetected(Self::find_cycle_path(&graph)));
        }

        Ok(Self { graph, node_map })
    }

    /// Finds a cycle in the graph and renders it as `a -> b -> a`.
    fn find_cycle_path(graph: &DiGraph<String, ()>) -> String {
        let mut visited = HashSet::new();
        let mut on_stack = Vec::new();

        for node in graph.node_indices() {
            if visited.contains(&node) {
                continue;
            }
            if let Some(cycle) = Self::dfs_cycle(graph, node, &mut visited, &mut on_stack) {
                return cycle
                    .iter()
                    .map(|idx| graph[*idx].as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ");
            }
        }

        "unknown cycle".to_string()
    }

    /// DFS helper; returns the closed cycle path when one is found.
    fn dfs_cycle(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        on_stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        visited.insert(node);
        on_stack.push(node);

        for neighbor in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(start) = on_stack.iter().position(|n| *n == neighbor) {
                let mut cycle = on_stack[start..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
            if !visited.contains(&neighbor) {
                if let Some(cycle) = Self::dfs_cycle(graph, neighbor, visited, on_stack) {
                    return Some(cycle);
                }
            }
        }

        on_stack.pop();
        None
    }

    /// Returns step ids in an order where all dependencies come first.
    pub fn topological_order(&self) -> Vec<String> {
        // Construction rejected cycles, so toposort cannot fail here.
        toposort(&self.graph, None)
            .map(|sorted| sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .unwrap_or_default()
    }

    /// Groups steps into waves: a step's level is one more than the deepest
    /// of its dependencies. Steps within a level keep declaration order.
    ///
    /// This is the wave plan of a run in which every step succeeds first try.
    pub fn execution_levels(&self) -> Vec<Vec<String>> {
        let mut level_of: HashMap<NodeIndex, usize> = HashMap::new();
        let order = toposort(&self.graph, None).unwrap_or_default();

        for node in order {
            let level = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|dep| level_of.get(&dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(node, level);
        }

        let depth = level_of.values().copied().max().map_or(0, |l| l + 1);
        let mut levels = vec![Vec::new(); depth];
        for node in self.graph.node_indices() {
            if let Some(level) = level_of.get(&node) {
                levels[*level].push(self.graph[node].clone());
            }
        }
        levels
    }

    /// Returns the ids of the steps `step_id` directly depends on.
    pub fn dependencies_of(&self, step_id: &str) -> Vec<String> {
        self.node_map
            .get(step_id)
            .map(|node| {
                let mut deps: Vec<NodeIndex> =
                    self.graph.neighbors_directed(*node, Direction::Incoming).collect();
                deps.sort_unstable();
                deps.into_iter().map(|idx| self.graph[idx].clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Gets the number of nodes (steps) in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Gets the number of edges (dependencies) in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepKind;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, StepKind::AiAgent { agent: "a".to_string(), prompt: "p".to_string() })
            .depends_on(deps.iter().copied())
    }

    #[test]
    fn test_dag_construction() {
        let dag = DependencyGraph::from_steps(&[
            step("t1", &[]),
            step("t2", &["t1"]),
            step("t3", &["t2"]),
        ])
        .unwrap();

        assert_eq!(dag.node_count(), 3);
        assert_eq!(dag.edge_count(), 2);
        assert_eq!(dag.topological_order(), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_dag_cycle_detection() {
        let err = DependencyGraph::from_steps(&[
            step("t1", &["t3"]),
            step("t2", &["t1"]),
            step("t3", &["t2"]),
        ])
        .unwrap_err();

        match err {
            DagError::CycleDetected(path) => {
                assert!(path.contains("t1") && path.contains("t2") && path.contains("t3"));
                let parts: Vec<_> = path.split(" -> ").collect();
                assert_eq!(parts.first(), parts.last());
            }
            other => panic!("Expected CycleDetected error, got {other:?}"),
        }
    }

    #[test]
    fn test_two_step_cycle() {
        let err = DependencyGraph::from_steps(&[step("x", &["y"]), step("y", &["x"])]).unwrap_err();
        assert!(matches!(err, DagError::CycleDetected(_)));
        assert!(err.to_string().starts_with("cyclic dependency"));
    }

    #[test]
    fn test_dag_rejects_bad_references() {
        assert_eq!(
            DependencyGraph::from_steps(&[step("t1", &["missing"])]).unwrap_err(),
            DagError::DependencyNotFound { step: "t1".to_string(), dependency: "missing".to_string() }
        );
        assert_eq!(
            DependencyGraph::from_steps(&[step("t1", &["t1"])]).unwrap_err(),
            DagError::SelfDependency("t1".to_string())
        );
        assert_eq!(
            DependencyGraph::from_steps(&[step("t1", &[]), step("t1", &[])]).unwrap_err(),
            DagError::DuplicateStep("t1".to_string())
        );
        assert_eq!(
            DependencyGraph::from_steps(&[step("", &[])]).unwrap_err(),
            DagError::EmptyStepId(0)
        );
    }

    #[test]
    fn test_duplicate_dependency_adds_one_edge() {
        let dag = DependencyGraph::from_steps(&[step("a", &[]), step("b", &["a", "a"])]).unwrap();
        assert_eq!(dag.edge_count(), 1);
        assert_eq!(dag.dependencies_of("b"), vec!["a"]);
    }

    #[test]
    fn test_dag_execution_levels() {
        // Diamond: t1 -> {t2, t3} -> t4, plus an independent t5
        let dag = DependencyGraph::from_steps(&[
            step("t1", &[]),
            step("t2", &["t1"]),
            step("t3", &["t1"]),
            step("t4", &["t2", "t3"]),
            step("t5", &[]),
        ])
        .unwrap();

        let levels = dag.execution_levels();
        assert_eq!(levels, vec![vec!["t1", "t5"], vec!["t2", "t3"], vec!["t4"]]);
    }

    #[test]
    fn test_empty_graph() {
        let dag = DependencyGraph::from_steps(&[]).unwrap();
        assert!(dag.execution_levels().is_empty());
        assert!(dag.topological_order().is_empty());
    }
}
