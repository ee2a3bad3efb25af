// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RundagError};

/// Canonical node identifier, e.g. `"ingest.run"`.
pub type NodeId = String;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    id: NodeId,
    /// Direct dependencies, deduplicated, in declaration order.
    deps: Vec<NodeId>,
    /// Direct dependents, in node insertion order.
    dependents: Vec<NodeId>,
}

/// One dependency edge as exported in checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

/// Validated dependency graph with a precomputed execution order.
///
/// Construction rejects duplicate IDs, unknown or self dependencies and
/// cycles, so every `DagGraph` value is a DAG.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: Vec<DagNode>,
    index: HashMap<NodeId, usize>,
    order: Vec<usize>,
}

impl DagGraph {
    /// Build a graph from `(id, dependencies)` pairs.
    ///
    /// The iteration order of `nodes` is the insertion order used for
    /// tie-breaking in [`DagGraph::topological_order`].
    pub fn new<I>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NodeId, Vec<NodeId>)>,
    {
        let mut dag_nodes: Vec<DagNode> = Vec::new();
        let mut index: HashMap<NodeId, usize> = HashMap::new();

        // First pass: register nodes with their dependency lists.
        for (id, deps) in nodes {
            if index.contains_key(&id) {
                return Err(RundagError::DuplicateNode(id));
            }

            let mut seen = HashSet::new();
            let deps: Vec<NodeId> = deps.into_iter().filter(|d| seen.insert(d.clone())).collect();

            index.insert(id.clone(), dag_nodes.len());
            dag_nodes.push(DagNode {
                id,
                deps,
                dependents: Vec::new(),
            });
        }

        // Second pass: validate references and populate dependents.
        for i in 0..dag_nodes.len() {
            let id = dag_nodes[i].id.clone();
            let deps = dag_nodes[i].deps.clone();

            for dep in deps {
                if dep == id {
                    return Err(RundagError::ConfigError(format!(
                        "node '{}' cannot depend on itself",
                        id
                    )));
                }
                let Some(&dep_idx) = index.get(&dep) else {
                    return Err(RundagError::UnknownDependency {
                        node: id,
                        dependency: dep,
                    });
                };
                dag_nodes[dep_idx].dependents.push(id.clone());
            }
        }

        let mut graph = Self {
            nodes: dag_nodes,
            index,
            order: Vec::new(),
        };
        graph.order = graph.kahn_order()?;
        Ok(graph)
    }

    /// Kahn's algorithm with insertion-order tie-breaking.
    fn kahn_order(&self) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_front() {
            order.push(i);
            for dependent in &self.nodes[i].dependents {
                let j = self.index[dependent];
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push_back(j);
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(RundagError::DagCycle(self.describe_cycle()));
        }

        Ok(order)
    }

    /// Name the nodes of the first non-trivial strongly connected component.
    fn describe_cycle(&self) -> String {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let handles: Vec<_> = (0..self.nodes.len()).map(|i| graph.add_node(i)).collect();

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.deps {
                graph.add_edge(handles[self.index[dep]], handles[i], ());
            }
        }

        let mut members: Vec<usize> = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.into_iter().map(|h| graph[h]).collect())
            .unwrap_or_default();
        members.sort_unstable();

        let names: Vec<String> = members
            .iter()
            .map(|&i| format!("'{}'", self.nodes[i].id))
            .collect();

        format!("cycle detected in node DAG involving {}", names.join(", "))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All node IDs in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Node IDs in execution order: every node after all of its dependencies.
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, id: &str) -> &[NodeId] {
        self.index
            .get(id)
            .map(|&i| self.nodes[i].deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: &str) -> &[NodeId] {
        self.index
            .get(id)
            .map(|&i| self.nodes[i].dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every node that depends on `id` directly or transitively, in
    /// execution order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let mut stack: Vec<&str> = self.dependents_of(id).iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        while let Some(name) = stack.pop() {
            if seen.insert(name) {
                stack.extend(self.dependents_of(name).iter().map(String::as_str));
            }
        }

        self.topological_order()
            .into_iter()
            .filter(|n| seen.contains(n))
            .collect()
    }

    /// Dependency edges, `from` the dependency `to` the dependent.
    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.deps.iter().map(move |dep| Edge {
                    from: dep.clone(),
                    to: node.id.clone(),
                })
            })
            .collect()
    }

    /// Resolve run targets to node IDs, in execution order.
    ///
    /// Targets first match by group (`ingest` selects `ingest.run`). If that
    /// selects nothing, they match by exact ID or short name (`run`).
    pub fn select_targets(&self, targets: &[String]) -> Vec<&str> {
        let wanted: HashSet<&str> = targets.iter().map(String::as_str).collect();
        let order = self.topological_order();

        let by_group: Vec<&str> = order
            .iter()
            .copied()
            .filter(|id| node_group(id).is_some_and(|g| wanted.contains(g)))
            .collect();
        if !by_group.is_empty() {
            return by_group;
        }

        order
            .into_iter()
            .filter(|id| wanted.contains(id) || wanted.contains(short_name(id)))
            .collect()
    }
}

/// Group segment of an ID: the part just before the final `.`.
pub fn node_group(id: &str) -> Option<&str> {
    let (head, _) = id.rsplit_once('.')?;
    Some(head.rsplit('.').next().unwrap_or(head))
}

/// Final segment of an ID.
pub fn short_name(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}
