//! Configuration management for the list compiler
//!
//! A [`DatasetDescriptor`] is the record handed over by the retrieval layer:
//! where the raw files come from, how their columns are laid out, and how the
//! edges must be sorted. Every option is optional in the JSON form and falls
//! back to the defaults documented on each field.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ListError, Result};
use crate::{EdgeTypeT, NodeT, NodeTypeT, WeightT};

/// Number of edges kept in memory before a sorted run is spilled to disk.
pub const DEFAULT_IN_MEMORY_EDGES: usize = 10_000_000;

/// Separator used for multi-valued node type columns.
pub const DEFAULT_NODE_TYPES_SEPARATOR: char = '|';

/// Textual layout shared by node lists and edge lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFormat {
    /// Field separator. Detected from the first line when absent.
    pub separator: Option<char>,

    /// Whether the first meaningful line is a header
    pub header: bool,

    /// Rows skipped after the header
    pub rows_to_skip: usize,

    /// Maximum number of rows to read
    pub max_rows_number: Option<usize>,

    /// Lines starting with this symbol are ignored
    pub comment_symbol: Option<String>,

    /// Allow separators inside double-quoted fields
    pub support_balanced_quotes: bool,

    /// Trust the file: skip field count validation
    pub is_correct: bool,

    /// Parse the file in parallel chunks
    pub load_in_parallel: bool,

    /// Strip surrounding `<` and `>` from names
    pub remove_chevrons: bool,

    /// Remove spaces from names
    pub remove_spaces: bool,
}

impl Default for ListFormat {
    fn default() -> Self {
        Self {
            separator: None,
            header: true,
            rows_to_skip: 0,
            max_rows_number: None,
            comment_symbol: None,
            support_balanced_quotes: false,
            is_correct: false,
            load_in_parallel: false,
            remove_chevrons: false,
            remove_spaces: false,
        }
    }
}

/// A list of type names, one per row, fixing the type vocabulary and the
/// order of its IDs before any node or edge is read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeListOptions {
    /// Path of the type list, relative to the dataset cache directory
    pub path: PathBuf,

    #[serde(flatten)]
    pub format: ListFormat,

    pub types_column: Option<String>,
    pub types_column_number: Option<usize>,
}

/// Layout of an original node list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeListOptions {
    /// Path of the node list, relative to the dataset cache directory
    pub path: Option<PathBuf>,

    #[serde(flatten)]
    pub format: ListFormat,

    pub nodes_column: Option<String>,
    pub nodes_column_number: Option<usize>,

    pub node_types_column: Option<String>,
    pub node_types_column_number: Option<usize>,

    /// Separator between the node types of a single node, `|` by default
    pub node_types_separator: Option<char>,

    /// Type assigned to nodes whose type field is empty
    pub default_node_type: Option<String>,

    pub skip_node_types_if_unavailable: bool,

    /// Known node types. Types missing from the list are format errors.
    pub node_type_list: Option<TypeListOptions>,

    /// Node types are integers used directly as IDs
    pub numeric_node_type_ids: bool,

    /// Smallest numeric node type, mapped to node type ID 0
    pub minimum_node_type_id: NodeTypeT,
}

impl NodeListOptions {
    pub fn declares_node_types(&self) -> bool {
        self.node_types_column.is_some() || self.node_types_column_number.is_some()
    }

    pub fn node_types_separator(&self) -> char {
        self.node_types_separator.unwrap_or(DEFAULT_NODE_TYPES_SEPARATOR)
    }
}

/// Layout of an original edge list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeListOptions {
    /// Path of the edge list, relative to the dataset cache directory
    pub path: PathBuf,

    #[serde(flatten)]
    pub format: ListFormat,

    pub sources_column: Option<String>,
    pub sources_column_number: Option<usize>,

    pub destinations_column: Option<String>,
    pub destinations_column_number: Option<usize>,

    pub edge_types_column: Option<String>,
    pub edge_types_column_number: Option<usize>,

    pub weights_column: Option<String>,
    pub weights_column_number: Option<usize>,

    /// Type assigned to edges whose type field is empty
    pub default_edge_type: Option<String>,

    /// Weight assigned to edges whose weight field is empty
    pub default_weight: Option<WeightT>,

    pub skip_edge_types_if_unavailable: bool,
    pub skip_weights_if_unavailable: bool,

    /// Known edge types. Types missing from the list are format errors.
    pub edge_type_list: Option<TypeListOptions>,

    /// Edge types are integers used directly as IDs
    pub numeric_edge_type_ids: bool,

    /// Smallest numeric edge type, mapped to edge type ID 0
    pub minimum_edge_type_id: EdgeTypeT,

    /// Whether node identifiers are plain integers. Detected when absent.
    pub numeric_node_ids: Option<bool>,

    /// Smallest numeric node identifier, mapped to node ID 0
    pub minimum_node_id: NodeT,

    /// Hint that the list may hold duplicated edges. When false, any
    /// duplicate found is reported as a warning.
    pub may_contain_duplicates: bool,
}

impl Default for EdgeListOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            format: ListFormat::default(),
            sources_column: None,
            sources_column_number: None,
            destinations_column: None,
            destinations_column_number: None,
            edge_types_column: None,
            edge_types_column_number: None,
            weights_column: None,
            weights_column_number: None,
            default_edge_type: None,
            default_weight: None,
            skip_edge_types_if_unavailable: false,
            skip_weights_if_unavailable: false,
            edge_type_list: None,
            numeric_edge_type_ids: false,
            minimum_edge_type_id: 0,
            numeric_node_ids: None,
            minimum_node_id: 0,
            may_contain_duplicates: true,
        }
    }
}

impl EdgeListOptions {
    pub fn declares_edge_types(&self) -> bool {
        self.edge_types_column.is_some() || self.edge_types_column_number.is_some()
    }

    pub fn declares_weights(&self) -> bool {
        self.weights_column.is_some() || self.weights_column_number.is_some()
    }
}

/// Behaviour of the sort and deduplication stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOptions {
    /// Where spilled runs are written; the edge list's directory by default
    pub temporary_directory: Option<PathBuf>,

    /// Maximum number of edges sorted in memory at once
    pub in_memory_edges: usize,

    /// Keep exact duplicate edges instead of collapsing them
    pub keep_duplicates: bool,

    pub remove_self_loops: bool,

    /// Keep only the first edge type of every (source, destination) pair
    pub remove_parallel_edges: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            temporary_directory: None,
            in_memory_edges: DEFAULT_IN_MEMORY_EDGES,
            keep_duplicates: false,
            remove_self_loops: false,
            remove_parallel_edges: false,
        }
    }
}

/// Everything the compiler needs to know about the lists of one graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListOptions {
    pub node_list: Option<NodeListOptions>,
    pub edge_list: EdgeListOptions,
    #[serde(default)]
    pub sort: SortOptions,
}

/// Immutable description of one retrievable graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub repository: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,

    /// Remote sources, handed to the downloader untouched
    #[serde(default)]
    pub urls: Vec<String>,

    /// Download targets, relative to the dataset cache directory
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    #[serde(default)]
    pub directed: bool,

    #[serde(flatten)]
    pub lists: ListOptions,
}

fn default_version() -> String {
    "latest".to_string()
}

impl DatasetDescriptor {
    /// Create a descriptor with default list options
    pub fn new(repository: &str, name: &str, version: &str, edge_path: &str) -> Self {
        Self {
            repository: repository.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            urls: Vec::new(),
            paths: Vec::new(),
            directed: false,
            lists: ListOptions {
                edge_list: EdgeListOptions {
                    path: PathBuf::from(edge_path),
                    ..EdgeListOptions::default()
                },
                ..ListOptions::default()
            },
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(ListError::io(path))?;
        serde_json::from_str(&raw).map_err(|e| {
            ListError::configuration(format!(
                "cannot parse dataset descriptor {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Digest of every option that affects the produced layout.
    ///
    /// Two descriptors with the same hash produce the same optimal layout,
    /// so the hash is part of the cache key.
    pub fn config_hash(&self) -> Result<String> {
        // serde_json writes struct fields in declaration order, which makes
        // the serialization canonical for a given crate version.
        let canonical = serde_json::to_vec(&(&self.directed, &self.lists)).map_err(|e| {
            ListError::configuration(format!("cannot serialize the options of {}: {}", self.name, e))
        })?;
        Ok(blake3::hash(&canonical).to_hex().as_str()[..16].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_from_minimal_json() {
        let descriptor: DatasetDescriptor = serde_json::from_str(
            r#"{
                "repository": "snap",
                "name": "EgoFacebook",
                "edge_list": {"path": "facebook_combined.txt", "separator": " ", "header": false}
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.version, "latest");
        assert!(!descriptor.directed);
        assert!(descriptor.lists.node_list.is_none());
        let edges = &descriptor.lists.edge_list;
        assert_eq!(edges.format.separator, Some(' '));
        assert!(!edges.format.header);
        assert!(edges.may_contain_duplicates);
        assert_eq!(descriptor.lists.sort.in_memory_edges, DEFAULT_IN_MEMORY_EDGES);
    }

    #[test]
    fn config_hash_tracks_layout_options_only() {
        let mut first = DatasetDescriptor::new("snap", "Ego", "1", "edges.tsv");
        let mut second = first.clone();
        second.urls.push("https://example.org/edges.tsv.gz".to_string());
        assert_eq!(first.config_hash().unwrap(), second.config_hash().unwrap());

        first.lists.edge_list.format.header = false;
        assert_ne!(first.config_hash().unwrap(), second.config_hash().unwrap());
        assert_eq!(first.config_hash().unwrap().len(), 16);

        second.lists.edge_list.edge_type_list = Some(TypeListOptions {
            path: PathBuf::from("edge_types.tsv"),
            ..TypeListOptions::default()
        });
        assert_ne!(first.config_hash().unwrap(), second.config_hash().unwrap());
    }

    #[test]
    fn type_lists_read_from_json() {
        let options: NodeListOptions = serde_json::from_str(
            r#"{
                "path": "nodes.tsv",
                "node_types_column": "category",
                "node_type_list": {"path": "types.tsv", "header": false, "types_column_number": 1},
                "numeric_node_type_ids": true,
                "minimum_node_type_id": 1
            }"#,
        )
        .unwrap();

        let types = options.node_type_list.unwrap();
        assert_eq!(types.path, PathBuf::from("types.tsv"));
        assert!(!types.format.header);
        assert_eq!(types.types_column_number, Some(1));
        assert!(options.numeric_node_type_ids);
        assert_eq!(options.minimum_node_type_id, 1);
    }

    #[test]
    fn node_types_separator_defaults_to_pipe() {
        let options = NodeListOptions::default();
        assert_eq!(options.node_types_separator(), '|');
        assert!(!options.declares_node_types());
    }
}
