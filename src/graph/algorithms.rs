//! Graph algorithms over a loaded graph

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{ListError, Result};
use crate::graph::loader::Graph;
use crate::graph::CompressedGraph;
use crate::{EdgeT, NodeT};

/// Union-Find data structure for connected component analysis
pub struct DisjointSets {
    /// Parent pointers (parent[i] = parent of node i)
    parent: Vec<NodeT>,

    /// Size of each set, valid at the roots (for union by size)
    size: Vec<NodeT>,
}

impl DisjointSets {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size as NodeT).collect(),
            size: vec![1; size],
        }
    }

    /// Find the root of the set containing x with path compression
    pub fn find(&mut self, x: NodeT) -> NodeT {
        let root = self.root(x);
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    /// Find the root without compressing the path
    pub fn root(&self, mut x: NodeT) -> NodeT {
        while self.parent[x as usize] != x {
            x = self.parent[x as usize];
        }
        x
    }

    /// Union the sets containing x and y; false if they were already joined
    pub fn union(&mut self, x: NodeT, y: NodeT) -> bool {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return false;
        }

        // Attach the smaller tree under the root of the larger one
        let (large, small) = if self.size[root_x as usize] >= self.size[root_y as usize] {
            (root_x, root_y)
        } else {
            (root_y, root_x)
        };
        self.parent[small as usize] = large;
        self.size[large as usize] += self.size[small as usize];
        true
    }

    /// Get the size of the set containing x
    pub fn size(&mut self, x: NodeT) -> NodeT {
        let root = self.find(x);
        self.size[root as usize]
    }
}

/// Weakly connected components of a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Component of every node. Components are numbered in order of their
    /// smallest node.
    pub component_ids: Vec<NodeT>,

    /// Size of every component
    pub sizes: Vec<NodeT>,
}

impl Components {
    pub fn components_number(&self) -> NodeT {
        self.sizes.len() as NodeT
    }

    pub fn largest_component_size(&self) -> NodeT {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn singletons_number(&self) -> NodeT {
        self.sizes.iter().filter(|&&size| size == 1).count() as NodeT
    }
}

/// Find weakly connected components with union-find
pub fn connected_components(graph: &Graph) -> Components {
    let compressed = graph.compressed();
    let nodes_number = compressed.nodes_number as usize;
    log::debug!("Finding connected components of {} nodes", nodes_number);

    let mut sets = DisjointSets::new(nodes_number);
    for src in 0..compressed.nodes_number {
        for &dst in compressed.outgoing_edges(src) {
            sets.union(src, dst);
        }
    }

    let roots: Vec<NodeT> = (0..compressed.nodes_number)
        .into_par_iter()
        .map(|node| sets.root(node))
        .collect();

    // Number components by first appearance of their root
    const UNASSIGNED: NodeT = NodeT::MAX;
    let mut component_of_root = vec![UNASSIGNED; nodes_number];
    let mut component_ids = Vec::with_capacity(nodes_number);
    let mut sizes = Vec::new();
    for root in roots {
        let component = &mut component_of_root[root as usize];
        if *component == UNASSIGNED {
            *component = sizes.len() as NodeT;
            sizes.push(0);
        }
        sizes[*component as usize] += 1;
        component_ids.push(*component);
    }

    log::debug!("Found {} connected components", sizes.len());
    Components { component_ids, sizes }
}

/// Spanning arborescence (forest) computed with Kruskal over the sorted
/// edge order. Returns the IDs of the selected edges, ascending.
pub fn spanning_arborescence(graph: &Graph) -> Vec<EdgeT> {
    let compressed = graph.compressed();
    let mut sets = DisjointSets::new(compressed.nodes_number as usize);
    let mut tree = Vec::with_capacity(compressed.nodes_number.saturating_sub(1) as usize);
    for (edge, src, dst) in graph.iter_edges() {
        if sets.union(src, dst) {
            tree.push(edge);
        }
    }
    tree
}

/// Edge IDs split in a training and a test set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holdout {
    pub train: Vec<EdgeT>,
    pub test: Vec<EdgeT>,
}

/// ID of the reverse of an undirected edge, with the same type and the same
/// rank among identical edges
fn reverse_edge(graph: &CompressedGraph, edge: EdgeT, src: NodeT, dst: NodeT) -> Option<EdgeT> {
    let edge_type = graph.edge_type(edge);
    let same = |candidate: usize, target: NodeT| {
        graph.destinations[candidate] == target && graph.edge_type(candidate as EdgeT) == edge_type
    };
    let forward = graph.edge_range(src);
    let rank = (forward.start..edge as usize).filter(|&candidate| same(candidate, dst)).count();
    graph
        .edge_range(dst)
        .filter(|&candidate| same(candidate, src))
        .nth(rank)
        .map(|candidate| candidate as EdgeT)
}

/// Seeded random split of the edges.
///
/// Each edge goes to the training set with probability `train_rate`. The two
/// directions of an undirected edge always land in the same set. With
/// `keep_connected` the spanning arborescence is forced into the training
/// set, so the training graph keeps the components of the full graph.
pub fn random_holdout(graph: &Graph, train_rate: f64, seed: u64, keep_connected: bool) -> Result<Holdout> {
    if !(train_rate > 0.0 && train_rate < 1.0) {
        return Err(ListError::configuration(format!(
            "the train rate must be strictly between 0 and 1, got {}",
            train_rate
        )));
    }

    let compressed = graph.compressed();
    let edges_number = compressed.edges_number() as usize;
    let mut forced = vec![false; edges_number];
    if keep_connected {
        for edge in spanning_arborescence(graph) {
            forced[edge as usize] = true;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut in_train = vec![false; edges_number];
    for (edge, src, dst) in graph.iter_edges() {
        let reverse = if graph.is_directed() || src == dst {
            None
        } else if src < dst {
            reverse_edge(compressed, edge, src, dst)
        } else {
            // Decided together with its forward direction
            continue;
        };

        let keep = forced[edge as usize] || rng.gen_bool(train_rate);
        in_train[edge as usize] = keep;
        if let Some(reverse) = reverse {
            in_train[reverse as usize] = keep;
        }
    }

    let (train, test): (Vec<EdgeT>, Vec<EdgeT>) =
        (0..edges_number as EdgeT).partition(|&edge| in_train[edge as usize]);
    log::debug!("Holdout with {} training and {} test edges", train.len(), test.len());
    Ok(Holdout { train, test })
}
