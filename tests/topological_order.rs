use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rundag::dag::DagGraph;
use rundag::errors::RundagError;
use rundag_test_utils::builders::graph;

// Acyclic by construction: node i may only depend on nodes 0..i. The
// insertion order is then shuffled so ties are not trivially sorted.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_nodes).prop_flat_map(|n| {
        let deps = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n);
        (deps, Just((0..n).collect::<Vec<usize>>()).prop_shuffle()).prop_map(
            |(raw_deps, order)| {
                let mut nodes: Vec<(String, Vec<String>)> = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, candidates)| {
                        let deps: HashSet<usize> = if i == 0 {
                            HashSet::new()
                        } else {
                            candidates.into_iter().map(|d| d % i).collect()
                        };
                        let mut deps: Vec<String> =
                            deps.into_iter().map(|d| format!("n{d}")).collect();
                        deps.sort();
                        (format!("n{i}"), deps)
                    })
                    .collect();
                let mut shuffled = Vec::with_capacity(nodes.len());
                for idx in order {
                    shuffled.push(std::mem::take(&mut nodes[idx]));
                }
                shuffled
            },
        )
    })
}

proptest! {
    #[test]
    fn every_node_follows_its_dependencies(nodes in dag_strategy(12)) {
        let graph = DagGraph::new(nodes.clone()).unwrap();
        let order = graph.topological_order();

        prop_assert_eq!(order.len(), nodes.len());
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        prop_assert_eq!(position.len(), nodes.len());

        for (id, deps) in &nodes {
            for dep in deps {
                prop_assert!(position[dep.as_str()] < position[id.as_str()]);
            }
        }
    }

    #[test]
    fn order_is_deterministic(nodes in dag_strategy(12)) {
        let a = DagGraph::new(nodes.clone()).unwrap();
        let b = DagGraph::new(nodes).unwrap();
        prop_assert_eq!(a.topological_order(), b.topological_order());
    }

    #[test]
    fn closing_a_loop_is_rejected(nodes in dag_strategy(12)) {
        // Take a node with a dependency and make that dependency depend on it.
        let Some((id, dep)) = nodes
            .iter()
            .find_map(|(id, deps)| deps.first().map(|d| (id.clone(), d.clone())))
        else {
            return Ok(());
        };

        let cyclic: Vec<(String, Vec<String>)> = nodes
            .into_iter()
            .map(|(n, mut deps)| {
                if n == dep {
                    deps.push(id.clone());
                }
                (n, deps)
            })
            .collect();

        match DagGraph::new(cyclic) {
            Err(RundagError::DagCycle(msg)) => {
                let (id_quoted, dep_quoted) = (format!("'{}'", id), format!("'{}'", dep));
                prop_assert!(msg.contains(&id_quoted), "{} missing from {}", id_quoted, msg);
                prop_assert!(msg.contains(&dep_quoted), "{} missing from {}", dep_quoted, msg);
            }
            other => prop_assert!(false, "expected a cycle error, got {:?}", other.map(|_| ())),
        }
    }
}

#[test]
fn diamond_keeps_insertion_order_for_ties() {
    let g = graph(&[("A", &[]), ("C", &["A"]), ("B", &["A"]), ("D", &["B", "C"])]);
    assert_eq!(g.topological_order(), vec!["A", "C", "B", "D"]);
    assert_eq!(g.transitive_dependents("C"), vec!["D"]);
}
