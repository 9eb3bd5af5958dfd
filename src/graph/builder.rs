//! Graph construction module

use crate::error::{ListError, Result};
use crate::graph::CompressedGraph;
use crate::{EdgeT, EdgeTypeT, NodeT, WeightT};

/// Builds a [`CompressedGraph`] from edges streamed in sorted order
pub struct GraphBuilder {
    graph: CompressedGraph,

    /// Key of the last pushed edge
    last: Option<(NodeT, NodeT, Option<EdgeTypeT>)>,
}

impl GraphBuilder {
    pub fn with_capacity(nodes_number: NodeT, edges_number: EdgeT, has_types: bool, has_weights: bool) -> Self {
        Self {
            graph: CompressedGraph::with_capacity(nodes_number, edges_number as usize, has_types, has_weights),
            last: None,
        }
    }

    pub fn edges_number(&self) -> EdgeT {
        self.graph.edges_number()
    }

    /// Append the next edge.
    ///
    /// Edges must arrive sorted by `(src, dst, type)` with node IDs in range;
    /// anything else means the stored layout is corrupt.
    pub fn push_edge(
        &mut self,
        src: NodeT,
        dst: NodeT,
        edge_type: Option<EdgeTypeT>,
        weight: Option<WeightT>,
    ) -> Result<()> {
        let nodes_number = self.graph.nodes_number;
        if src >= nodes_number || dst >= nodes_number {
            return Err(ListError::consistency(format!(
                "edge ({}, {}) refers to a node outside of the {} known nodes",
                src, dst, nodes_number
            )));
        }

        let key = (src, dst, edge_type);
        if let Some(last) = self.last {
            if key < last {
                return Err(ListError::consistency(format!(
                    "edge {:?} follows edge {:?}: the edge list is not sorted",
                    key, last
                )));
            }
        }
        self.last = Some(key);

        // Open the ranges of every node up to the source
        let edges_number = self.graph.edges_number();
        while self.graph.offsets.len() <= src as usize {
            self.graph.offsets.push(edges_number);
        }
        self.graph.destinations.push(dst);

        if let Some(edge_types) = self.graph.edge_types.as_mut() {
            edge_types.push(edge_type);
        }
        if let Some(weights) = self.graph.weights.as_mut() {
            let weight = weight.ok_or_else(|| {
                ListError::consistency(format!("edge ({}, {}) has no weight in a weighted graph", src, dst))
            })?;
            weights.push(weight);
        }
        Ok(())
    }

    /// Build the compressed graph
    pub fn build(mut self) -> CompressedGraph {
        let edges_number = self.graph.edges_number();
        while self.graph.offsets.len() <= self.graph.nodes_number as usize {
            self.graph.offsets.push(edges_number);
        }
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_cover_nodes_without_edges() {
        let mut builder = GraphBuilder::with_capacity(5, 3, false, true);
        builder.push_edge(1, 0, None, Some(1.0)).unwrap();
        builder.push_edge(1, 3, None, Some(2.0)).unwrap();
        builder.push_edge(3, 3, None, Some(0.5)).unwrap();
        let graph = builder.build();

        assert_eq!(graph.offsets, vec![0, 0, 2, 2, 3, 3]);
        assert_eq!(graph.outgoing_edges(1), &[0, 3]);
        assert_eq!(graph.out_degree(4), 0);
        assert_eq!(graph.weights, Some(vec![1.0, 2.0, 0.5]));
    }

    #[test]
    fn unsorted_edges_are_rejected() {
        let mut builder = GraphBuilder::with_capacity(3, 2, true, false);
        builder.push_edge(1, 2, Some(1), None).unwrap();
        builder.push_edge(1, 2, Some(1), None).unwrap();
        let error = builder.push_edge(1, 2, Some(0), None).unwrap_err();
        assert!(error.is_consistency());
    }

    #[test]
    fn out_of_range_nodes_are_rejected() {
        let mut builder = GraphBuilder::with_capacity(2, 1, false, false);
        assert!(builder.push_edge(0, 2, None, None).unwrap_err().is_consistency());
    }

    #[test]
    fn empty_graph_has_one_offset_per_node_plus_one() {
        let graph = GraphBuilder::with_capacity(3, 0, false, false).build();
        assert_eq!(graph.offsets, vec![0, 0, 0, 0]);
        assert_eq!(graph.edges_number(), 0);
    }
}
