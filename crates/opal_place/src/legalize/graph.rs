//! Constraint DAG construction and transitive reduction.
//!
//! Each axis gets a DAG with a super-source, a super-sink, and one node per
//! cell. DFS-based transitive reduction removes every direct edge whose
//! target is also reachable through at least two hops, leaving the minimal
//! equivalent constraint set for the linear programs.

use crate::legalize::constraints::{ConstraintEdge, Constraints};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::HashSet;

/// A per-axis constraint DAG.
pub(crate) struct ConstraintGraph {
    graph: DiGraph<(), i64>,
    source: NodeIndex,
    sink: NodeIndex,
    cells: Vec<NodeIndex>,
}

impl ConstraintGraph {
    /// Builds the DAG: source to every cell, every cell to sink (weighted by
    /// its extent), plus the generated pair edges.
    pub fn build(num_cells: usize, constraints: &Constraints, extents: &[i64]) -> Self {
        let mut graph = DiGraph::new();
        let source = graph.add_node(());
        let sink = graph.add_node(());
        let cells: Vec<NodeIndex> = (0..num_cells).map(|_| graph.add_node(())).collect();
        for (i, &node) in cells.iter().enumerate() {
            graph.add_edge(source, node, 0);
            graph.add_edge(node, sink, extents[i]);
        }
        for edge in &constraints.edges {
            graph.add_edge(cells[edge.source], cells[edge.target], edge.weight);
        }
        Self {
            graph,
            source,
            sink,
            cells,
        }
    }

    /// Number of edges currently in the DAG.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// DFS-based transitive reduction.
    ///
    /// For every node, any direct successor that is also reachable through a
    /// path of two or more edges is redundant; the direct edge is removed.
    /// Successors are visited in ascending node-index order, which makes the
    /// traversal (and thus tie-breaking) deterministic; the reduction of a
    /// DAG is unique regardless.
    pub fn transitive_reduction(&mut self) {
        let nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        for &u in &nodes {
            let mut succs: Vec<NodeIndex> = self.graph.neighbors(u).collect();
            succs.sort();
            succs.dedup();
            if succs.len() < 2 {
                continue;
            }
            let direct: HashSet<NodeIndex> = succs.iter().cloned().collect();
            let mut redundant: HashSet<NodeIndex> = HashSet::new();
            for &v in &succs {
                let mut dfs = Dfs::new(&self.graph, v);
                while let Some(w) = dfs.next(&self.graph) {
                    if w != v && direct.contains(&w) {
                        redundant.insert(w);
                    }
                }
            }
            let mut targets: Vec<NodeIndex> = redundant.into_iter().collect();
            targets.sort();
            for w in targets {
                while let Some(edge) = self.graph.find_edge(u, w) {
                    self.graph.remove_edge(edge);
                }
            }
        }
    }

    /// The surviving cell-to-cell edges, sorted by (source, target).
    pub fn reduced_edges(&self) -> Vec<ConstraintEdge> {
        let cell_index: std::collections::HashMap<NodeIndex, usize> = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();
        let mut edges: Vec<ConstraintEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                if a == self.source || b == self.sink {
                    return None;
                }
                Some(ConstraintEdge {
                    source: cell_index[&a],
                    target: cell_index[&b],
                    weight: self.graph[e],
                })
            })
            .collect();
        edges.sort_by_key(|e| (e.source, e.target));
        edges
    }
}

/// Builds, reduces, and flattens one axis' constraint graph in one call.
pub(crate) fn reduce_constraints(
    num_cells: usize,
    constraints: &Constraints,
    extents: &[i64],
) -> Vec<ConstraintEdge> {
    let mut graph = ConstraintGraph::build(num_cells, constraints, extents);
    graph.transitive_reduction();
    graph.reduced_edges()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_constraints(n: usize, weight: i64) -> Constraints {
        let mut c = Constraints::default();
        for i in 0..n.saturating_sub(1) {
            c.add_edge(i, i + 1, weight);
        }
        c
    }

    #[test]
    fn build_counts_structural_edges() {
        let c = chain_constraints(3, 10);
        let g = ConstraintGraph::build(3, &c, &[10, 10, 10]);
        // 3 source edges + 3 sink edges + 2 pair edges
        assert_eq!(g.edge_count(), 8);
    }

    #[test]
    fn reduction_removes_shortcut_edge() {
        // a -> b -> c plus the redundant shortcut a -> c
        let mut c = chain_constraints(3, 10);
        c.add_edge(0, 2, 10);
        let edges = reduce_constraints(3, &c, &[10, 10, 10]);
        assert_eq!(
            edges,
            vec![
                ConstraintEdge {
                    source: 0,
                    target: 1,
                    weight: 10
                },
                ConstraintEdge {
                    source: 1,
                    target: 2,
                    weight: 10
                },
            ]
        );
    }

    #[test]
    fn reduction_keeps_necessary_edges() {
        let c = chain_constraints(4, 5);
        let edges = reduce_constraints(4, &c, &[5, 5, 5, 5]);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn reduction_handles_diamond() {
        // a -> b -> d, a -> c -> d, plus redundant a -> d
        let mut c = Constraints::default();
        c.add_edge(0, 1, 1);
        c.add_edge(0, 2, 1);
        c.add_edge(1, 3, 1);
        c.add_edge(2, 3, 1);
        c.add_edge(0, 3, 1);
        let edges = reduce_constraints(4, &c, &[1, 1, 1, 1]);
        assert_eq!(edges.len(), 4);
        assert!(!edges
            .iter()
            .any(|e| e.source == 0 && e.target == 3));
    }

    #[test]
    fn empty_constraints_leave_no_pair_edges() {
        let edges = reduce_constraints(3, &Constraints::default(), &[1, 1, 1]);
        assert!(edges.is_empty());
    }

    #[test]
    fn reduction_is_deterministic() {
        let mut c = Constraints::default();
        c.add_edge(0, 1, 2);
        c.add_edge(1, 2, 2);
        c.add_edge(0, 2, 2);
        c.add_edge(2, 3, 2);
        c.add_edge(0, 3, 2);
        let a = reduce_constraints(4, &c, &[2, 2, 2, 2]);
        let b = reduce_constraints(4, &c, &[2, 2, 2, 2]);
        assert_eq!(a, b);
    }
}
