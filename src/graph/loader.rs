//! Loading an optimal layout into memory
//!
//! The layout is trusted to be sorted and densely numbered, but every count
//! is checked against the metadata: a mismatch means the cache entry is
//! stale or corrupt and is reported as a consistency error.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{ListError, Result};
use crate::graph::builder::GraphBuilder;
use crate::graph::CompressedGraph;
use crate::storage::{LayoutMetadata, LayoutPaths, NODE_TYPES_SEPARATOR};
use crate::vocabulary::Vocabulary;
use crate::{EdgeT, EdgeTypeT, NodeT, NodeTypeT, WeightT};

/// Which auxiliary structures are built eagerly at load time.
///
/// Disabled structures are built lazily on first use instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tradeoffs {
    /// Source node of every edge, in edge ID order
    pub sources: bool,
    /// Mapping from node names to node IDs
    pub node_name_index: bool,
}

impl Tradeoffs {
    pub fn all() -> Self {
        Self {
            sources: true,
            node_name_index: true,
        }
    }

    pub fn enable_sources(mut self, enable: bool) -> Self {
        self.sources = enable;
        self
    }

    pub fn enable_node_name_index(mut self, enable: bool) -> Self {
        self.node_name_index = enable;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub tradeoffs: Tradeoffs,
    pub verbose: bool,
}

/// A graph loaded from an optimal layout
#[derive(Debug)]
pub struct Graph {
    metadata: LayoutMetadata,
    graph: CompressedGraph,
    node_names: Vec<String>,
    node_types: Option<Vec<Vec<NodeTypeT>>>,
    node_type_names: Option<Vocabulary>,
    edge_type_names: Option<Vocabulary>,
    sources: OnceLock<Vec<NodeT>>,
    node_name_index: OnceLock<HashMap<String, NodeT>>,
}

/// Load the layout described by `paths` and `metadata`
pub fn from_csv(paths: &LayoutPaths, metadata: &LayoutMetadata, options: &LoadOptions) -> Result<Graph> {
    let progress = if options.verbose { log::Level::Info } else { log::Level::Debug };
    log::log!(progress, "Loading graph from {}", paths.edges.display());

    let node_type_names = match (metadata.node_types_number, &paths.node_types) {
        (Some(expected), Some(path)) => Some(load_vocabulary(path, expected as usize, "node types")?),
        (Some(_), None) => {
            return Err(ListError::consistency(
                "the metadata declares node types but no node types file is given",
            ))
        }
        (None, _) => None,
    };
    let edge_type_names = match (metadata.edge_types_number, &paths.edge_types) {
        (Some(expected), Some(path)) => Some(load_vocabulary(path, expected as usize, "edge types")?),
        (Some(_), None) => {
            return Err(ListError::consistency(
                "the metadata declares edge types but no edge types file is given",
            ))
        }
        (None, _) => None,
    };

    let (node_names, node_types) = match &paths.nodes {
        Some(path) => load_nodes(path, metadata)?,
        None => ((0..metadata.nodes_number).map(|id| id.to_string()).collect(), None),
    };

    let graph = load_edges(&paths.edges, metadata)?;

    let self_loops = (0..graph.nodes_number)
        .map(|node| graph.outgoing_edges(node).iter().filter(|&&dst| dst == node).count() as EdgeT)
        .sum::<EdgeT>();
    if self_loops != metadata.self_loops_number {
        return Err(ListError::consistency(format!(
            "the metadata declares {} self-loops but the edge list holds {}",
            metadata.self_loops_number, self_loops
        )));
    }

    let graph = Graph {
        metadata: metadata.clone(),
        graph,
        node_names,
        node_types,
        node_type_names,
        edge_type_names,
        sources: OnceLock::new(),
        node_name_index: OnceLock::new(),
    };

    if options.tradeoffs.sources {
        graph.sources();
    }
    if options.tradeoffs.node_name_index {
        graph.node_name_index();
    }

    log::log!(
        progress,
        "Loaded graph with {} nodes and {} edges ({} bytes)",
        graph.nodes_number(),
        graph.edges_number(),
        graph.memory_usage()
    );
    Ok(graph)
}

fn open_lines(path: &Path) -> Result<impl Iterator<Item = Result<String>> + '_> {
    let file = File::open(path).map_err(ListError::io(path))?;
    Ok(BufReader::with_capacity(1 << 20, file)
        .lines()
        .map(move |line| line.map_err(ListError::io(path))))
}

fn load_vocabulary(path: &Path, expected: usize, label: &str) -> Result<Vocabulary> {
    let names = open_lines(path)?.collect::<Result<Vec<String>>>()?;
    if names.len() != expected {
        return Err(ListError::consistency(format!(
            "the metadata declares {} {} but {} lists {}",
            expected,
            label,
            path.display(),
            names.len()
        )));
    }
    Vocabulary::from_names(names).map_err(|name| {
        ListError::consistency(format!("{} lists `{}` more than once", path.display(), name))
    })
}

fn parse_field<T: std::str::FromStr>(path: &Path, line: usize, field: &str, label: &str) -> Result<T> {
    field.parse().map_err(|_| {
        ListError::consistency(format!(
            "{} line {}: `{}` is not a valid {}",
            path.display(),
            line,
            field,
            label
        ))
    })
}

fn load_nodes(path: &Path, metadata: &LayoutMetadata) -> Result<(Vec<String>, Option<Vec<Vec<NodeTypeT>>>)> {
    let mut names = Vec::with_capacity(metadata.nodes_number as usize);
    let mut node_types = metadata
        .node_types_number
        .map(|_| Vec::with_capacity(metadata.nodes_number as usize));

    for (row, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let (name, types) = line.split_once('\t').unwrap_or((line.as_str(), ""));
        names.push(name.to_string());

        if let (Some(node_types), Some(types_number)) = (node_types.as_mut(), metadata.node_types_number) {
            let mut ids = Vec::new();
            for field in types.split(NODE_TYPES_SEPARATOR).filter(|field| !field.is_empty()) {
                let id: NodeTypeT = parse_field(path, row + 1, field, "node type ID")?;
                if id >= types_number {
                    return Err(ListError::consistency(format!(
                        "{} line {}: node type {} is out of range",
                        path.display(),
                        row + 1,
                        id
                    )));
                }
                ids.push(id);
            }
            node_types.push(ids);
        }
    }

    if names.len() != metadata.nodes_number as usize {
        return Err(ListError::consistency(format!(
            "the metadata declares {} nodes but {} lists {}",
            metadata.nodes_number,
            path.display(),
            names.len()
        )));
    }
    Ok((names, node_types))
}

fn load_edges(path: &Path, metadata: &LayoutMetadata) -> Result<CompressedGraph> {
    let has_types = metadata.edge_types_number.is_some();
    let has_weights = metadata.has_edge_weights;
    let expected_fields = 2 + has_types as usize + has_weights as usize;
    let mut builder = GraphBuilder::with_capacity(metadata.nodes_number, metadata.edges_number, has_types, has_weights);

    for (row, line) in open_lines(path)?.enumerate() {
        let line = line?;
        let line_number = row + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != expected_fields {
            return Err(ListError::consistency(format!(
                "{} line {}: expected {} fields, found {}",
                path.display(),
                line_number,
                expected_fields,
                fields.len()
            )));
        }

        let src: NodeT = parse_field(path, line_number, fields[0], "node ID")?;
        let dst: NodeT = parse_field(path, line_number, fields[1], "node ID")?;
        let edge_type = match (has_types, metadata.edge_types_number) {
            (true, Some(types_number)) if !fields[2].is_empty() => {
                let id: EdgeTypeT = parse_field(path, line_number, fields[2], "edge type ID")?;
                if id >= types_number {
                    return Err(ListError::consistency(format!(
                        "{} line {}: edge type {} is out of range",
                        path.display(),
                        line_number,
                        id
                    )));
                }
                Some(id)
            }
            _ => None,
        };
        let weight: Option<WeightT> = match has_weights {
            true => Some(parse_field(path, line_number, fields[expected_fields - 1], "weight")?),
            false => None,
        };
        builder.push_edge(src, dst, edge_type, weight)?;
    }

    if builder.edges_number() != metadata.edges_number {
        return Err(ListError::consistency(format!(
            "the metadata declares {} edges but {} lists {}",
            metadata.edges_number,
            path.display(),
            builder.edges_number()
        )));
    }
    Ok(builder.build())
}

impl Graph {
    pub fn metadata(&self) -> &LayoutMetadata {
        &self.metadata
    }

    pub fn compressed(&self) -> &CompressedGraph {
        &self.graph
    }

    pub fn is_directed(&self) -> bool {
        self.metadata.directed
    }

    pub fn nodes_number(&self) -> NodeT {
        self.graph.nodes_number
    }

    /// Number of stored edges; undirected edges count once per direction
    pub fn edges_number(&self) -> EdgeT {
        self.graph.edges_number()
    }

    pub fn self_loops_number(&self) -> EdgeT {
        self.metadata.self_loops_number
    }

    pub fn has_node_types(&self) -> bool {
        self.node_types.is_some()
    }

    pub fn has_edge_types(&self) -> bool {
        self.graph.edge_types.is_some()
    }

    pub fn has_edge_weights(&self) -> bool {
        self.graph.weights.is_some()
    }

    pub fn node_name(&self, node: NodeT) -> Option<&str> {
        self.node_names.get(node as usize).map(String::as_str)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeT> {
        self.node_name_index().get(name).copied()
    }

    pub fn node_types(&self, node: NodeT) -> Option<&[NodeTypeT]> {
        self.node_types
            .as_ref()
            .and_then(|types| types.get(node as usize))
            .map(Vec::as_slice)
    }

    pub fn node_type_name(&self, node_type: NodeTypeT) -> Option<&str> {
        self.node_type_names.as_ref().and_then(|names| names.name(node_type))
    }

    pub fn edge_type_name(&self, edge_type: EdgeTypeT) -> Option<&str> {
        self.edge_type_names.as_ref().and_then(|names| names.name(edge_type))
    }

    pub fn neighbours(&self, node: NodeT) -> &[NodeT] {
        self.graph.outgoing_edges(node)
    }

    pub fn out_degree(&self, node: NodeT) -> EdgeT {
        self.graph.out_degree(node)
    }

    pub fn has_edge(&self, src: NodeT, dst: NodeT) -> bool {
        src < self.nodes_number() && self.graph.has_edge(src, dst)
    }

    pub fn edge_id(&self, src: NodeT, dst: NodeT) -> Option<EdgeT> {
        (src < self.nodes_number()).then(|| self.graph.edge_id(src, dst)).flatten()
    }

    pub fn edge_type(&self, edge: EdgeT) -> Option<EdgeTypeT> {
        self.graph.edge_type(edge)
    }

    pub fn edge_weight(&self, edge: EdgeT) -> Option<WeightT> {
        self.graph.edge_weight(edge)
    }

    /// Source of every edge, built on first use unless loaded eagerly
    pub fn sources(&self) -> &[NodeT] {
        self.sources.get_or_init(|| self.graph.sources())
    }

    fn node_name_index(&self) -> &HashMap<String, NodeT> {
        self.node_name_index.get_or_init(|| {
            self.node_names
                .iter()
                .enumerate()
                .map(|(id, name)| (name.clone(), id as NodeT))
                .collect()
        })
    }

    /// Every edge as `(edge ID, source, destination)`
    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeT, NodeT, NodeT)> + '_ {
        (0..self.nodes_number()).flat_map(move |src| {
            let range = self.graph.edge_range(src);
            range.map(move |edge| (edge as EdgeT, src, self.graph.destinations[edge]))
        })
    }

    /// Every edge as a pair of node names
    pub fn iter_edge_node_names(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.iter_edges().map(move |(_, src, dst)| {
            (
                self.node_names[src as usize].as_str(),
                self.node_names[dst as usize].as_str(),
            )
        })
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        let names = self.node_names.iter().map(String::capacity).sum::<usize>()
            + self.node_names.capacity() * std::mem::size_of::<String>();
        let sources = self
            .sources
            .get()
            .map_or(0, |sources| sources.capacity() * std::mem::size_of::<NodeT>());
        self.graph.memory_usage() + names + sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{write_edge_list, write_metadata, write_node_list, write_vocabulary};
    use crate::sort::EdgeRecord;
    use tempfile::TempDir;

    fn metadata() -> LayoutMetadata {
        LayoutMetadata {
            node_types_number: Some(2),
            nodes_number: 3,
            edge_types_number: Some(1),
            edges_number: 3,
            directed: true,
            has_edge_weights: true,
            self_loops_number: 1,
            parallel_edges_number: 0,
            duplicates_removed: 0,
        }
    }

    fn write_layout(dir: &TempDir) -> LayoutPaths {
        let paths = LayoutPaths::in_directory(dir.path());
        let edges = vec![
            EdgeRecord {
                edge_type: Some(0),
                weight: Some(1.5),
                ..EdgeRecord::new(0, 2)
            },
            EdgeRecord {
                weight: Some(2.0),
                ..EdgeRecord::new(1, 1)
            },
            EdgeRecord {
                edge_type: Some(0),
                weight: Some(0.5),
                ..EdgeRecord::new(2, 0)
            },
        ];
        write_vocabulary(paths.node_types.as_deref().unwrap(), &["person", "city"][..]).unwrap();
        write_vocabulary(paths.edge_types.as_deref().unwrap(), &["lives_in"][..]).unwrap();
        let types = vec![vec![0], vec![0, 1], vec![1]];
        write_node_list(paths.nodes.as_deref().unwrap(), ["ann", "bob", "rome"], Some(types.as_slice())).unwrap();
        write_edge_list(&paths.edges, edges.into_iter().map(Ok), true, true).unwrap();
        write_metadata(&paths.metadata, &metadata()).unwrap();
        paths
    }

    #[test]
    fn loads_names_types_and_weights() {
        let dir = TempDir::new().unwrap();
        let paths = write_layout(&dir);
        let graph = from_csv(&paths, &metadata(), &LoadOptions::default()).unwrap();

        assert_eq!(graph.nodes_number(), 3);
        assert_eq!(graph.edges_number(), 3);
        assert_eq!(graph.node_id("rome"), Some(2));
        assert_eq!(graph.node_name(1), Some("bob"));
        assert_eq!(graph.node_types(1), Some(&[0, 1][..]));
        assert_eq!(graph.node_type_name(1), Some("city"));
        assert_eq!(graph.neighbours(0), &[2]);
        assert!(graph.has_edge(2, 0));
        assert!(!graph.has_edge(0, 1));

        let edge = graph.edge_id(2, 0).unwrap();
        assert_eq!(graph.edge_type(edge).and_then(|t| graph.edge_type_name(t)), Some("lives_in"));
        assert_eq!(graph.edge_weight(edge), Some(0.5));
        assert_eq!(graph.edge_type(graph.edge_id(1, 1).unwrap()), None);

        let names: Vec<(&str, &str)> = graph.iter_edge_node_names().collect();
        assert_eq!(names, vec![("ann", "rome"), ("bob", "bob"), ("rome", "ann")]);
    }

    #[test]
    fn tradeoffs_only_change_when_structures_are_built() {
        let dir = TempDir::new().unwrap();
        let paths = write_layout(&dir);
        let options = LoadOptions {
            tradeoffs: Tradeoffs::all(),
            verbose: false,
        };
        let eager = from_csv(&paths, &metadata(), &options).unwrap();
        let lazy = from_csv(&paths, &metadata(), &LoadOptions::default()).unwrap();

        assert!(eager.sources.get().is_some());
        assert!(lazy.sources.get().is_none());
        assert_eq!(eager.sources(), lazy.sources());
        assert_eq!(lazy.sources(), &[0, 1, 2]);
    }

    #[test]
    fn count_mismatch_is_a_consistency_error() {
        let dir = TempDir::new().unwrap();
        let paths = write_layout(&dir);
        let mut wrong = metadata();
        wrong.edges_number = 4;
        assert!(from_csv(&paths, &wrong, &LoadOptions::default()).unwrap_err().is_consistency());

        let mut wrong = metadata();
        wrong.nodes_number = 4;
        assert!(from_csv(&paths, &wrong, &LoadOptions::default()).unwrap_err().is_consistency());
    }

    #[test]
    fn absent_types_are_not_loaded() {
        let dir = TempDir::new().unwrap();
        let paths = LayoutPaths::in_directory(dir.path());
        write_node_list(paths.nodes.as_deref().unwrap(), ["a", "b"], None).unwrap();
        write_edge_list(&paths.edges, vec![Ok(EdgeRecord::new(0, 1))].into_iter(), false, false).unwrap();
        let metadata = LayoutMetadata {
            node_types_number: None,
            nodes_number: 2,
            edge_types_number: None,
            edges_number: 1,
            directed: true,
            has_edge_weights: false,
            self_loops_number: 0,
            parallel_edges_number: 0,
            duplicates_removed: 0,
        };
        let graph = from_csv(&paths, &metadata, &LoadOptions::default()).unwrap();
        assert!(!graph.has_node_types());
        assert!(!graph.has_edge_types());
        assert_eq!(graph.node_types(0), None);
    }
}
