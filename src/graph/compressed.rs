//! Memory-efficient graph representation

use std::mem;
use std::ops::Range;

use crate::{EdgeT, EdgeTypeT, NodeT, WeightT};

/// Compressed sparse row representation of a directed graph.
///
/// Undirected graphs are stored with both directions of every edge.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedGraph {
    /// Number of nodes in the graph
    pub nodes_number: NodeT,

    /// Offset array: `offsets[i]..offsets[i + 1]` is the edge range of node i
    pub offsets: Vec<EdgeT>,

    /// Concatenated, sorted destination lists
    pub destinations: Vec<NodeT>,

    /// Type of every edge, when the graph has edge types
    pub edge_types: Option<Vec<Option<EdgeTypeT>>>,

    /// Weight of every edge, when the graph is weighted
    pub weights: Option<Vec<WeightT>>,
}

impl CompressedGraph {
    /// Create an empty graph with pre-allocated capacity
    pub fn with_capacity(nodes_number: NodeT, edges_number: usize, has_types: bool, has_weights: bool) -> Self {
        Self {
            nodes_number,
            offsets: Vec::with_capacity(nodes_number as usize + 1),
            destinations: Vec::with_capacity(edges_number),
            edge_types: has_types.then(|| Vec::with_capacity(edges_number)),
            weights: has_weights.then(|| Vec::with_capacity(edges_number)),
        }
    }

    pub fn edges_number(&self) -> EdgeT {
        self.destinations.len() as EdgeT
    }

    /// Range of edge IDs leaving `node`
    #[inline]
    pub fn edge_range(&self, node: NodeT) -> Range<usize> {
        let start = self.offsets[node as usize] as usize;
        let end = self.offsets[node as usize + 1] as usize;
        start..end
    }

    /// Get outgoing edges for a node
    #[inline]
    pub fn outgoing_edges(&self, node: NodeT) -> &[NodeT] {
        &self.destinations[self.edge_range(node)]
    }

    /// Get out-degree of a node
    #[inline]
    pub fn out_degree(&self, node: NodeT) -> EdgeT {
        let range = self.edge_range(node);
        (range.end - range.start) as EdgeT
    }

    /// Check if there's an edge from src to dst
    pub fn has_edge(&self, src: NodeT, dst: NodeT) -> bool {
        self.outgoing_edges(src).binary_search(&dst).is_ok()
    }

    /// ID of the first edge from `src` to `dst`
    pub fn edge_id(&self, src: NodeT, dst: NodeT) -> Option<EdgeT> {
        let range = self.edge_range(src);
        let neighbours = &self.destinations[range.clone()];
        let position = neighbours.partition_point(|&neighbour| neighbour < dst);
        (neighbours.get(position) == Some(&dst)).then(|| (range.start + position) as EdgeT)
    }

    /// Source node of an edge ID
    pub fn edge_source(&self, edge: EdgeT) -> NodeT {
        // Last node whose range starts at or before `edge`; empty ranges
        // share their start with the next node and are skipped this way.
        (self.offsets.partition_point(|&offset| offset <= edge) - 1) as NodeT
    }

    /// Source of every edge, in edge ID order
    pub fn sources(&self) -> Vec<NodeT> {
        let mut sources = Vec::with_capacity(self.destinations.len());
        for node in 0..self.nodes_number {
            let degree = self.out_degree(node) as usize;
            sources.extend(std::iter::repeat(node).take(degree));
        }
        sources
    }

    pub fn edge_type(&self, edge: EdgeT) -> Option<EdgeTypeT> {
        self.edge_types.as_ref().and_then(|types| types[edge as usize])
    }

    pub fn edge_weight(&self, edge: EdgeT) -> Option<WeightT> {
        self.weights.as_ref().map(|weights| weights[edge as usize])
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        let base = mem::size_of::<Self>();
        let offsets = self.offsets.capacity() * mem::size_of::<EdgeT>();
        let destinations = self.destinations.capacity() * mem::size_of::<NodeT>();

        let edge_types = self
            .edge_types
            .as_ref()
            .map(|types| types.capacity() * mem::size_of::<Option<EdgeTypeT>>())
            .unwrap_or(0);

        let weights = self
            .weights
            .as_ref()
            .map(|weights| weights.capacity() * mem::size_of::<WeightT>())
            .unwrap_or(0);

        base + offsets + destinations + edge_types + weights
    }
}
