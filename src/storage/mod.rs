//! Optimal layout persistence module
//!
//! The layout is a directory of headerless, tab-separated files plus a JSON
//! metadata record. Each file is written to a temporary file next to its
//! target and renamed into place, so a target file is either complete or
//! absent.

pub mod report;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{ListError, Result};
use crate::sort::EdgeRecord;
use crate::{EdgeT, EdgeTypeT, NodeT, NodeTypeT};

/// Separator between the node types of one node in `nodes.tsv`
pub const NODE_TYPES_SEPARATOR: &str = "|";

/// Target files of one optimal layout
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPaths {
    pub nodes: Option<PathBuf>,
    pub node_types: Option<PathBuf>,
    pub edges: PathBuf,
    pub edge_types: Option<PathBuf>,
    pub metadata: PathBuf,
}

impl LayoutPaths {
    /// Standard file names inside `directory`
    pub fn in_directory<P: AsRef<Path>>(directory: P) -> Self {
        let directory = directory.as_ref();
        Self {
            nodes: Some(directory.join("nodes.tsv")),
            node_types: Some(directory.join("node_types.tsv")),
            edges: directory.join("edges.tsv"),
            edge_types: Some(directory.join("edge_types.tsv")),
            metadata: directory.join("metadata.json"),
        }
    }

    /// Every data file, excluding the metadata
    pub fn data_files(&self) -> impl Iterator<Item = &Path> {
        [
            self.nodes.as_deref(),
            self.node_types.as_deref(),
            Some(self.edges.as_path()),
            self.edge_types.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Summary of a written layout; its presence marks a complete cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetadata {
    /// `None` when the graph has no node types at all
    pub node_types_number: Option<NodeTypeT>,
    pub nodes_number: NodeT,
    /// `None` when the graph has no edge types at all
    pub edge_types_number: Option<EdgeTypeT>,
    pub edges_number: EdgeT,
    pub directed: bool,
    pub has_edge_weights: bool,
    pub self_loops_number: EdgeT,
    pub parallel_edges_number: EdgeT,
    pub duplicates_removed: EdgeT,
}

/// Write `path` through a temporary file in the same directory
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(ListError::io(directory))?;

    let mut file = NamedTempFile::new_in(directory).map_err(ListError::io(directory))?;
    {
        let mut writer = BufWriter::with_capacity(1 << 20, file.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(ListError::io(path))?;
    }
    file.as_file().sync_all().map_err(ListError::io(path))?;
    file.persist(path).map_err(|error| ListError::io(path)(error.error))?;
    Ok(())
}

fn check_name(path: &Path, row: usize, name: &str) -> Result<()> {
    if name.contains(['\t', '\n', '\r']) {
        return Err(ListError::format(
            path,
            row + 1,
            format!("the name `{}` contains a tab or a line break", name.escape_debug()),
        ));
    }
    Ok(())
}

/// One name per row; the row index is the ID
pub fn write_vocabulary<S: AsRef<str>>(path: &Path, names: &[S]) -> Result<()> {
    write_atomically(path, |writer| {
        for (row, name) in names.iter().enumerate() {
            let name = name.as_ref();
            check_name(path, row, name)?;
            writeln!(writer, "{}", name).map_err(ListError::io(path))?;
        }
        Ok(())
    })
}

/// One node per row: its name and its type IDs joined by `|`
pub fn write_node_list<I, S>(path: &Path, names: I, node_types: Option<&[Vec<NodeTypeT>]>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    write_atomically(path, |writer| {
        for (row, name) in names.into_iter().enumerate() {
            let name = name.as_ref();
            check_name(path, row, name)?;
            let types = node_types
                .and_then(|types| types.get(row))
                .map(|types| types.iter().join(NODE_TYPES_SEPARATOR))
                .unwrap_or_default();
            writeln!(writer, "{}\t{}", name, types).map_err(ListError::io(path))?;
        }
        Ok(())
    })
}

/// Write sorted edges as `src\tdst[\ttype][\tweight]`, returning how many
/// were written.
pub fn write_edge_list<I>(path: &Path, edges: I, has_types: bool, has_weights: bool) -> Result<EdgeT>
where
    I: Iterator<Item = Result<EdgeRecord>>,
{
    let mut written = 0;
    write_atomically(path, |writer| {
        for edge in edges {
            let edge = edge?;
            write!(writer, "{}\t{}", edge.src, edge.dst).map_err(ListError::io(path))?;
            if has_types {
                match edge.edge_type {
                    Some(edge_type) => write!(writer, "\t{}", edge_type),
                    None => write!(writer, "\t"),
                }
                .map_err(ListError::io(path))?;
            }
            if has_weights {
                match edge.weight {
                    Some(weight) => write!(writer, "\t{}", weight),
                    None => write!(writer, "\t"),
                }
                .map_err(ListError::io(path))?;
            }
            writeln!(writer).map_err(ListError::io(path))?;
            written += 1;
        }
        Ok(())
    })?;
    Ok(written)
}

pub fn write_metadata(path: &Path, metadata: &LayoutMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|error| ListError::consistency(format!("cannot serialise the metadata: {}", error)))?;
    write_atomically(path, |writer| {
        writer.write_all(json.as_bytes()).map_err(ListError::io(path))
    })
}

pub fn read_metadata(path: &Path) -> Result<LayoutMetadata> {
    let raw = fs::read_to_string(path).map_err(ListError::io(path))?;
    serde_json::from_str(&raw).map_err(|error| {
        ListError::consistency(format!("malformed metadata in {}: {}", path.display(), error))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata() -> LayoutMetadata {
        LayoutMetadata {
            node_types_number: None,
            nodes_number: 3,
            edge_types_number: Some(2),
            edges_number: 4,
            directed: true,
            has_edge_weights: false,
            self_loops_number: 1,
            parallel_edges_number: 0,
            duplicates_removed: 2,
        }
    }

    #[test]
    fn metadata_keeps_absent_counts_as_null() {
        let dir = TempDir::new().unwrap();
        let paths = LayoutPaths::in_directory(dir.path());
        write_metadata(&paths.metadata, &metadata()).unwrap();

        let raw = fs::read_to_string(&paths.metadata).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["node_types_number"].is_null());
        assert_eq!(value["edge_types_number"], 2);
        assert_eq!(read_metadata(&paths.metadata).unwrap(), metadata());
    }

    #[test]
    fn malformed_metadata_is_a_consistency_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, "{\"nodes_number\": 3}").unwrap();
        assert!(read_metadata(&path).unwrap_err().is_consistency());
    }

    #[test]
    fn edge_list_leaves_absent_types_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edges.tsv");
        let edges = vec![
            EdgeRecord::new(0, 1),
            EdgeRecord {
                edge_type: Some(3),
                weight: Some(0.25),
                ..EdgeRecord::new(1, 1)
            },
        ];
        let written = write_edge_list(&path, edges.into_iter().map(Ok), true, true).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\t1\t\t\n1\t1\t3\t0.25\n");
    }

    #[test]
    fn node_list_joins_types_with_pipes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.tsv");
        let types = vec![vec![0, 2], vec![]];
        write_node_list(&path, ["a", "b", "c"], Some(types.as_slice())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\t0|2\nb\t\nc\t\n");
    }

    #[test]
    fn failed_write_leaves_no_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("node_types.tsv");
        let error = write_vocabulary(&path, &["fine", "tab\tinside"][..]).unwrap_err();
        assert!(matches!(error, ListError::Format { line: 2, .. }));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_edge_stream_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edges.tsv");
        fs::write(&path, "previous\n").unwrap();
        let edges = vec![Ok(EdgeRecord::new(0, 1)), Err(ListError::consistency("broken run"))];
        assert!(write_edge_list(&path, edges.into_iter(), false, false).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous\n");
    }
}
