//! Deterministic ordering of a dependency graph and cycle reporting.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

/// Order every node after all the nodes it depends on.
///
/// `graph` maps each node to the set of nodes it has an incoming edge from,
/// i.e. the nodes it depends on. Kahn's algorithm always takes the least
/// available source, so the result only depends on the ordering of `N` and
/// never on iteration order.
///
/// Returns `None` if the graph has a cycle or depends on a node that is not
/// a key of `graph`.
pub fn topological_sort<N: Ord + Clone>(graph: &BTreeMap<N, BTreeSet<N>>) -> Option<Vec<N>> {
    let mut sources: BTreeSet<N> = graph
        .iter()
        .filter(|(_, incoming)| incoming.is_empty())
        .map(|(node, _)| node.clone())
        .collect();

    let mut working: BTreeMap<N, BTreeSet<N>> = graph
        .iter()
        .filter(|(_, incoming)| !incoming.is_empty())
        .map(|(node, incoming)| (node.clone(), incoming.clone()))
        .collect();

    let mut sorted = Vec::with_capacity(graph.len());
    while let Some(source) = sources.pop_first() {
        working.retain(|node, incoming| {
            if incoming.remove(&source) && incoming.is_empty() {
                sources.insert(node.clone());
                false
            } else {
                true
            }
        });
        sorted.push(source);
    }

    working.is_empty().then_some(sorted)
}

/// Members of one dependency cycle in `graph`, sorted, if any exists.
///
/// When several cycles exist the lexicographically smallest member list is
/// reported, so error messages are stable across runs.
pub fn find_cycle<N: Ord + Clone>(graph: &BTreeMap<N, BTreeSet<N>>) -> Option<Vec<N>> {
    let mut g: DiGraph<N, ()> = DiGraph::new();
    let index: BTreeMap<N, _> = graph
        .keys()
        .map(|node| (node.clone(), g.add_node(node.clone())))
        .collect();

    for (node, dependencies) in graph {
        for dependency in dependencies {
            if let Some(&to) = index.get(dependency) {
                g.add_edge(index[node], to, ());
            }
        }
    }

    tarjan_scc(&g)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || component.first().is_some_and(|&n| g.contains_edge(n, n))
        })
        .map(|component| {
            let mut members: Vec<N> = component.iter().map(|&idx| g[idx].clone()).collect();
            members.sort();
            members
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a graph from lines like `"A: B C"` (A depends on B and C).
    fn graph(lines: &[&'static str]) -> BTreeMap<&'static str, BTreeSet<&'static str>> {
        lines
            .iter()
            .map(|line| {
                let (node, deps) = line.split_once(':').unwrap();
                (node.trim(), deps.split_whitespace().collect())
            })
            .collect()
    }

    #[test]
    fn diamond_sorts_least_source_first() {
        let g = graph(&["A: B C", "B: D", "C: D", "D:"]);
        assert_eq!(topological_sort(&g), Some(vec!["D", "B", "C", "A"]));
    }

    #[test]
    fn independent_nodes_sort_by_order() {
        let g = graph(&["c:", "a:", "b:"]);
        assert_eq!(topological_sort(&g), Some(vec!["a", "b", "c"]));
    }

    #[test]
    fn empty_graph_sorts_to_empty() {
        let g: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        assert_eq!(topological_sort(&g), Some(vec![]));
    }

    #[test]
    fn self_reference_is_rejected() {
        let g = graph(&["A: A", "B:"]);
        assert_eq!(topological_sort(&g), None);
    }

    #[test]
    fn mutual_reference_is_rejected() {
        let g = graph(&["A: B", "B: A", "C:"]);
        assert_eq!(topological_sort(&g), None);
    }

    #[test]
    fn undefined_node_is_rejected() {
        let g = graph(&["A: Z"]);
        assert_eq!(topological_sort(&g), None);
    }

    #[test]
    fn find_cycle_reports_members() {
        let g = graph(&["A: B", "B: C", "C: A", "D: A"]);
        assert_eq!(find_cycle(&g), Some(vec!["A", "B", "C"]));
    }

    #[test]
    fn find_cycle_reports_self_loop() {
        let g = graph(&["A: A", "B:"]);
        assert_eq!(find_cycle(&g), Some(vec!["A"]));
    }

    #[test]
    fn find_cycle_none_for_dag() {
        let g = graph(&["A: B C", "B: D", "C: D", "D:"]);
        assert_eq!(find_cycle(&g), None);
    }
}
