//! Dependency graph builder.
//!
//! Turns a node list and an edge list into one pending `Step` per node,
//! each carrying the ids of its upstream dependencies. Rejects duplicate
//! node ids, edges pointing at unknown nodes and cycles. When no edges are
//! given every node is a root.

use dagcore::{Edge, GraphError, NodeId, NodeSpec, Step};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Validated dependency graph plus the initial step records
#[derive(Debug)]
pub struct ExecutionPlan {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    steps: HashMap<NodeId, Step>,
    order: Vec<NodeId>,
}

impl ExecutionPlan {
    pub fn build(nodes: &[NodeSpec], edges: &[Edge]) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        let mut steps = HashMap::new();
        let mut order = Vec::with_capacity(nodes.len());

        // One pending step per node; dependencies are the sources of edges targeting it
        for node in nodes {
            if indices.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
            indices.insert(node.id.clone(), graph.add_node(node.id.clone()));

            let mut step = Step::new(node.id.clone(), node.node_type.clone(), node.config.clone());
            for edge in edges.iter().filter(|e| e.target == node.id) {
                if !step.dependencies.contains(&edge.source) {
                    step.dependencies.push(edge.source.clone());
                }
            }
            steps.insert(node.id.clone(), step);
            order.push(node.id.clone());
        }

        // Every edge endpoint must name a declared node
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !indices.contains_key(endpoint) {
                    return Err(GraphError::DanglingDependency {
                        node_id: endpoint.clone(),
                        edge_id: edge.id.clone(),
                    });
                }
            }
            graph.update_edge(indices[&edge.source], indices[&edge.target], ());
        }

        detect_cycle(&steps, &order)?;

        Ok(Self {
            graph,
            indices,
            steps,
            order,
        })
    }

    pub fn steps(&self) -> &HashMap<NodeId, Step> {
        &self.steps
    }

    /// Node ids in declaration order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn into_parts(self) -> (HashMap<NodeId, Step>, Vec<NodeId>) {
        (self.steps, self.order)
    }

    /// Nodes that depend directly on `node_id`
    pub fn dependents(&self, node_id: &str) -> Vec<NodeId> {
        let Some(&idx) = self.indices.get(node_id) else {
            return Vec::new();
        };
        let mut dependents: Vec<NodeId> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        dependents.sort_by_key(|id| self.position(id));
        dependents
    }

    /// Nodes grouped by scheduling round: level 0 holds the roots, level n
    /// the nodes whose deepest dependency sits at level n - 1
    pub fn levels(&self) -> Vec<Vec<NodeId>> {
        let sorted = match toposort(&self.graph, None) {
            Ok(sorted) => sorted,
            Err(_) => return Vec::new(),
        };

        let mut level_of: HashMap<NodeIndex, usize> = HashMap::new();
        for idx in sorted {
            let level = self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .filter_map(|dep| level_of.get(&dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(idx, level);
        }

        let depth = level_of.values().max().map_or(0, |l| l + 1);
        let mut levels = vec![Vec::new(); depth];
        for id in &self.order {
            levels[level_of[&self.indices[id]]].push(id.clone());
        }
        levels
    }

    fn position(&self, node_id: &str) -> usize {
        self.order
            .iter()
            .position(|id| id == node_id)
            .unwrap_or(usize::MAX)
    }
}

/// Build the step map for a node and edge list
pub fn build_steps(nodes: &[NodeSpec], edges: &[Edge]) -> Result<HashMap<NodeId, Step>, GraphError> {
    ExecutionPlan::build(nodes, edges).map(|plan| plan.into_parts().0)
}

/// Depth-first search over dependency links, roots taken in declaration
/// order. Reaching a node that is still on the current path is a cycle.
fn detect_cycle(steps: &HashMap<NodeId, Step>, order: &[NodeId]) -> Result<(), GraphError> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut visiting: HashSet<&str> = HashSet::new();

    for root in order {
        if visited.contains(root.as_str()) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        visiting.insert(root.as_str());

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            frame.1 += 1;

            match steps[node].dependencies.get(cursor) {
                Some(dep) => {
                    let dep = dep.as_str();
                    if visiting.contains(dep) {
                        return Err(GraphError::Cycle {
                            node_id: dep.to_string(),
                        });
                    }
                    if !visited.contains(dep) {
                        visiting.insert(dep);
                        stack.push((dep, 0));
                    }
                }
                None => {
                    visiting.remove(node);
                    visited.insert(node);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcore::StepStatus;

    fn nodes(ids: &[&str]) -> Vec<NodeSpec> {
        ids.iter().map(|id| NodeSpec::new(*id, "echo")).collect()
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            id: format!("{}->{}", source, target),
            source: source.into(),
            target: target.into(),
        }
    }

    #[test]
    fn records_dependencies_in_edge_order() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let steps = build_steps(
            &nodes(&["a", "b", "c", "d"]),
            &[edge("a", "b"), edge("a", "c"), edge("c", "d"), edge("b", "d")],
        )
        .unwrap();

        assert_eq!(steps["d"].dependencies, vec!["c".to_string(), "b".to_string()]);
        assert!(steps["a"].dependencies.is_empty());
        assert!(steps.values().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn no_edges_means_every_node_is_a_root() {
        let plan = ExecutionPlan::build(&nodes(&["a", "b", "c"]), &[]).unwrap();
        assert!(plan.steps().values().all(|s| s.dependencies.is_empty()));
        assert_eq!(plan.levels(), vec![vec!["a".to_string(), "b".into(), "c".into()]]);
    }

    #[test]
    fn cycle_is_rejected_with_node_id() {
        // a -> b -> c -> a
        let err = build_steps(
            &nodes(&["a", "b", "c"]),
            &[edge("a", "b"), edge("b", "c"), edge("c", "a")],
        )
        .unwrap_err();
        assert_eq!(err, GraphError::Cycle { node_id: "a".into() });
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let err = build_steps(&nodes(&["solo"]), &[edge("solo", "solo")]).unwrap_err();
        assert_eq!(err.node_id(), "solo");
    }

    #[test]
    fn dangling_target_is_rejected() {
        let err = build_steps(&nodes(&["a"]), &[edge("a", "ghost")]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingDependency {
                node_id: "ghost".into(),
                edge_id: "a->ghost".into(),
            }
        );
    }

    #[test]
    fn dangling_source_is_rejected() {
        let err = build_steps(&nodes(&["b"]), &[edge("ghost", "b")]).unwrap_err();
        assert_eq!(err.node_id(), "ghost");
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let err = build_steps(&nodes(&["a", "a"]), &[]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode { node_id: "a".into() });
    }

    #[test]
    fn levels_follow_longest_dependency_chain() {
        let plan = ExecutionPlan::build(
            &nodes(&["a", "b", "c", "d"]),
            &[edge("a", "b"), edge("b", "d"), edge("a", "c"), edge("a", "d")],
        )
        .unwrap();

        assert_eq!(
            plan.levels(),
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
        assert_eq!(plan.dependents("a"), vec!["b".to_string(), "c".into(), "d".into()]);
    }
}
