//! Length-bounded enumeration of simple cycles and simple paths on a directed graph.
//!
//! Both searches are depth-first over edges, so parallel edges between the same
//! two nodes yield distinct results. Every expansion is charged against a
//! [`SearchBudget`]; once it runs out the search unwinds and returns what it has.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::time::{Duration, Instant};

/// Caps the work done by one enumeration
#[derive(Debug, Clone)]
pub struct SearchBudget {
    deadline: Instant,
    max_results: usize,
    found: usize,
    steps: u64,
    exhausted: bool,
}

impl SearchBudget {
    pub fn new(max_results: usize, time_limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + time_limit,
            max_results,
            found: 0,
            steps: 0,
            exhausted: false,
        }
    }

    /// Charges one DFS expansion; returns false once the budget is spent
    fn step(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        self.steps += 1;
        if self.steps % 64 == 0 && Instant::now() >= self.deadline {
            self.exhausted = true;
        }
        !self.exhausted
    }

    /// Records one result; returns false once the result cap is reached
    fn record(&mut self) -> bool {
        self.found += 1;
        if self.found >= self.max_results {
            self.exhausted = true;
        }
        !self.exhausted
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn found(&self) -> usize {
        self.found
    }
}

/// Enumerates simple directed cycles with `2..=max_len` nodes.
///
/// Each cycle is reported once, rotated to start at its lowest node index.
/// Returned as edge sequences in traversal order.
pub fn bounded_simple_cycles<N, E>(
    graph: &DiGraph<N, E>,
    max_len: usize,
    budget: &mut SearchBudget,
) -> Vec<Vec<EdgeIndex>> {
    let mut cycles = Vec::new();
    if max_len < 2 {
        return cycles;
    }

    // Cycles never leave a strongly connected component
    let mut component = vec![usize::MAX; graph.node_count()];
    for (cid, scc) in tarjan_scc(graph).into_iter().enumerate() {
        if scc.len() < 2 {
            continue;
        }
        for node in scc {
            component[node.index()] = cid;
        }
    }

    let mut on_path = vec![false; graph.node_count()];
    for start in graph.node_indices() {
        if component[start.index()] == usize::MAX {
            continue;
        }
        if budget.is_exhausted() {
            break;
        }
        let mut path = Vec::new();
        on_path[start.index()] = true;
        cycle_dfs(graph, start, start, &component, &mut on_path, &mut path, max_len, budget, &mut cycles);
        on_path[start.index()] = false;
    }

    cycles
}

#[allow(clippy::too_many_arguments)]
fn cycle_dfs<N, E>(
    graph: &DiGraph<N, E>,
    start: NodeIndex,
    current: NodeIndex,
    component: &[usize],
    on_path: &mut [bool],
    path: &mut Vec<EdgeIndex>,
    max_len: usize,
    budget: &mut SearchBudget,
    out: &mut Vec<Vec<EdgeIndex>>,
) {
    for edge in graph.edges(current) {
        if !budget.step() {
            return;
        }
        let target = edge.target();
        if component[target.index()] != component[start.index()] {
            continue;
        }

        if target == start {
            if !path.is_empty() && path.len() < max_len {
                let mut cycle = path.clone();
                cycle.push(edge.id());
                out.push(cycle);
                if !budget.record() {
                    return;
                }
            }
            continue;
        }

        // Only extend through higher-indexed nodes so each cycle starts at its minimum
        if target.index() < start.index() || on_path[target.index()] || path.len() + 2 > max_len {
            continue;
        }

        on_path[target.index()] = true;
        path.push(edge.id());
        cycle_dfs(graph, start, target, component, on_path, path, max_len, budget, out);
        path.pop();
        on_path[target.index()] = false;

        if budget.is_exhausted() {
            return;
        }
    }
}

/// Enumerates simple directed paths between every ordered node pair with
/// `min_edges..=max_nodes - 1` edges.
pub fn bounded_simple_paths<N, E>(
    graph: &DiGraph<N, E>,
    min_edges: usize,
    max_nodes: usize,
    budget: &mut SearchBudget,
) -> Vec<Vec<EdgeIndex>> {
    let mut paths = Vec::new();
    if max_nodes < 2 {
        return paths;
    }

    let mut on_path = vec![false; graph.node_count()];
    for start in graph.node_indices() {
        if budget.is_exhausted() {
            break;
        }
        let mut path = Vec::new();
        on_path[start.index()] = true;
        path_dfs(graph, start, &mut on_path, &mut path, min_edges.max(1), max_nodes - 1, budget, &mut paths);
        on_path[start.index()] = false;
    }

    paths
}

#[allow(clippy::too_many_arguments)]
fn path_dfs<N, E>(
    graph: &DiGraph<N, E>,
    current: NodeIndex,
    on_path: &mut [bool],
    path: &mut Vec<EdgeIndex>,
    min_edges: usize,
    max_edges: usize,
    budget: &mut SearchBudget,
    out: &mut Vec<Vec<EdgeIndex>>,
) {
    if path.len() >= max_edges {
        return;
    }
    for edge in graph.edges(current) {
        if !budget.step() {
            return;
        }
        let target = edge.target();
        if on_path[target.index()] {
            continue;
        }

        on_path[target.index()] = true;
        path.push(edge.id());
        if path.len() >= min_edges {
            out.push(path.clone());
            if !budget.record() {
                path.pop();
                on_path[target.index()] = false;
                return;
            }
        }
        path_dfs(graph, target, on_path, path, min_edges, max_edges, budget, out);
        path.pop();
        on_path[target.index()] = false;

        if budget.is_exhausted() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: usize, edges: &[(usize, usize)]) -> DiGraph<usize, ()> {
        let mut g = DiGraph::new();
        let idx: Vec<NodeIndex> = (0..nodes).map(|i| g.add_node(i)).collect();
        for &(a, b) in edges {
            g.add_edge(idx[a], idx[b], ());
        }
        g
    }

    fn budget() -> SearchBudget {
        SearchBudget::new(10_000, Duration::from_secs(5))
    }

    fn node_seq(g: &DiGraph<usize, ()>, cycle: &[EdgeIndex]) -> Vec<usize> {
        cycle
            .iter()
            .map(|&e| g[g.edge_endpoints(e).unwrap().0])
            .collect()
    }

    #[test]
    fn test_triangle_found_once() {
        let g = graph(3, &[(0, 1), (1, 2), (2, 0)]);
        let cycles = bounded_simple_cycles(&g, 5, &mut budget());
        assert_eq!(cycles.len(), 1);
        assert_eq!(node_seq(&g, &cycles[0]), vec![0, 1, 2]);
    }

    #[test]
    fn test_two_cycle_and_length_bound() {
        let g = graph(4, &[(0, 1), (1, 0), (1, 2), (2, 3), (3, 0)]);
        let cycles = bounded_simple_cycles(&g, 5, &mut budget());
        assert_eq!(cycles.len(), 2);

        let short = bounded_simple_cycles(&g, 3, &mut budget());
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].len(), 2);
    }

    #[test]
    fn test_parallel_edges_yield_distinct_cycles() {
        let g = graph(2, &[(0, 1), (0, 1), (1, 0)]);
        let cycles = bounded_simple_cycles(&g, 5, &mut budget());
        assert_eq!(cycles.len(), 2);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        assert!(bounded_simple_cycles(&g, 5, &mut budget()).is_empty());
    }

    #[test]
    fn test_complete_graph_cycle_count() {
        // K4 has 6 two-cycles, 8 three-cycles and 6 four-cycles
        let mut edges = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let g = graph(4, &edges);
        assert_eq!(bounded_simple_cycles(&g, 4, &mut budget()).len(), 20);
        assert_eq!(bounded_simple_cycles(&g, 3, &mut budget()).len(), 14);
    }

    #[test]
    fn test_result_cap_truncates() {
        let mut edges = Vec::new();
        for a in 0..6 {
            for b in 0..6 {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let g = graph(6, &edges);
        let mut capped = SearchBudget::new(5, Duration::from_secs(5));
        let cycles = bounded_simple_cycles(&g, 6, &mut capped);
        assert_eq!(cycles.len(), 5);
        assert!(capped.is_exhausted());
    }

    #[test]
    fn test_simple_paths_on_chain() {
        let g = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        // paths with 2+ edges: 0-1-2, 0-1-2-3, 1-2-3
        let paths = bounded_simple_paths(&g, 2, 5, &mut budget());
        assert_eq!(paths.len(), 3);

        let capped = bounded_simple_paths(&g, 2, 3, &mut budget());
        assert_eq!(capped.len(), 2);
        assert!(capped.iter().all(|p| p.len() == 2));
    }

    #[test]
    fn test_simple_paths_do_not_revisit() {
        let g = graph(3, &[(0, 1), (1, 2), (2, 0)]);
        let paths = bounded_simple_paths(&g, 2, 5, &mut budget());
        // one 2-edge path from each start; closing back to start is never a path
        assert_eq!(paths.len(), 3);
    }
}
