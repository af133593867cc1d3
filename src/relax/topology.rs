use petgraph::{algo::dijkstra, graph::NodeIndex, Graph, Undirected};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::UNREACHABLE;
use crate::error::{Error, Result};

/// Out-degree of every node in a random topology.
pub const RANDOM_OUT_DEGREE: usize = 2;

/// Who dials whom. An edge `(a, b)` is a dialer on node `a` pointing at the
/// listener of node `b`; once connected it carries messages both ways.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    nodes: usize,
    edges: Vec<(usize, usize)>,
}

impl Topology {
    /// Every node dials two targets drawn uniformly at random. Self-loops and
    /// repeated targets are kept.
    pub fn random(nodes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut edges = Vec::with_capacity(nodes * RANDOM_OUT_DEGREE);
        if nodes > 0 {
            for from in 0..nodes {
                for _ in 0..RANDOM_OUT_DEGREE {
                    edges.push((from, rng.gen_range(0..nodes)));
                }
            }
        }
        Self { nodes, edges }
    }

    pub fn from_edges(
        nodes: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self> {
        let edges: Vec<_> = edges.into_iter().collect();
        if edges.iter().any(|&(a, b)| a >= nodes || b >= nodes) {
            return Err(Error::InvalidState("edge refers to a node outside the topology"));
        }
        Ok(Self { nodes, edges })
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Pipes node `node` ends up with: one per dialer it owns plus one per
    /// dialer aimed at it.
    pub fn expected_pipes(&self, node: usize) -> usize {
        self.edges
            .iter()
            .map(|&(a, b)| usize::from(a == node) + usize::from(b == node))
            .sum()
    }

    /// Hop distances from `source` over the undirected view of the graph,
    /// [`UNREACHABLE`] where there is no path.
    pub fn shortest_hops(&self, source: usize) -> Vec<u32> {
        let mut graph = Graph::<(), (), Undirected>::with_capacity(self.nodes, self.edges.len());
        for _ in 0..self.nodes {
            graph.add_node(());
        }
        for &(a, b) in &self.edges {
            graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
        }
        let mut hops = vec![UNREACHABLE; self.nodes];
        if source < self.nodes {
            for (node, distance) in dijkstra(&graph, NodeIndex::new(source), None, |_| 1u32) {
                hops[node.index()] = distance;
            }
        }
        hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_topology_is_reproducible() {
        let a = Topology::random(50, 7);
        let b = Topology::random(50, 7);
        assert_eq!(a, b);
        assert_eq!(a.edges().len(), 100);
        assert!(a.edges().iter().all(|&(from, to)| from < 50 && to < 50));
        for node in 0..50 {
            let out = a.edges().iter().filter(|&&(from, _)| from == node).count();
            assert_eq!(out, RANDOM_OUT_DEGREE);
        }
    }

    #[test]
    fn expected_pipes_count_both_directions() {
        let topology = Topology::from_edges(3, [(0, 1), (0, 2), (1, 2), (2, 2)]).unwrap();
        assert_eq!(topology.expected_pipes(0), 2);
        assert_eq!(topology.expected_pipes(1), 2);
        assert_eq!(topology.expected_pipes(2), 4);
    }

    #[test]
    fn out_of_range_edges_are_rejected() {
        assert!(Topology::from_edges(2, [(0, 2)]).is_err());
    }

    #[test]
    fn hops_ignore_edge_direction() {
        let topology = Topology::from_edges(4, [(1, 0), (2, 1)]).unwrap();
        assert_eq!(topology.shortest_hops(0), vec![0, 1, 2, UNREACHABLE]);
    }
}
