//! Sorted runs spilled to disk
//!
//! A run file starts with the number of records it holds, followed by the
//! records themselves, all encoded with bincode. Run files live in a private
//! temporary directory that is removed with everything in it when the
//! [`RunDirectory`] is dropped.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ListError, Result};
use crate::sort::EdgeRecord;

pub struct RunDirectory {
    directory: TempDir,
    runs: Vec<PathBuf>,
}

impl RunDirectory {
    /// Create a fresh spill directory inside `parent`
    pub fn new_in(parent: &Path) -> Result<Self> {
        let directory = tempfile::Builder::new()
            .prefix(".edge-sort-")
            .tempdir_in(parent)
            .map_err(ListError::io(parent))?;
        Ok(Self {
            directory,
            runs: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.directory.path()
    }

    pub fn runs_number(&self) -> usize {
        self.runs.len()
    }

    /// Write one sorted run and return its index
    pub fn write_run(&mut self, edges: &[EdgeRecord]) -> Result<usize> {
        let index = self.runs.len();
        let path = self.directory.path().join(format!("run-{:05}.bin", index));
        let file = File::create(&path).map_err(ListError::io(&path))?;
        let mut writer = BufWriter::with_capacity(1 << 20, file);

        bincode::serialize_into(&mut writer, &(edges.len() as u64)).map_err(ListError::spill(&path))?;
        for edge in edges {
            bincode::serialize_into(&mut writer, edge).map_err(ListError::spill(&path))?;
        }
        writer.flush().map_err(ListError::io(&path))?;

        self.runs.push(path);
        Ok(index)
    }

    pub fn open_run(&self, index: usize) -> Result<RunReader> {
        let path = self.runs.get(index).ok_or_else(|| {
            ListError::consistency(format!(
                "run {} requested but only {} runs were written",
                index,
                self.runs.len()
            ))
        })?;
        RunReader::open(path)
    }
}

/// Sequential reader over one run file
pub struct RunReader {
    path: PathBuf,
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(ListError::io(path))?;
        let mut reader = BufReader::with_capacity(1 << 16, file);
        let remaining: u64 = bincode::deserialize_from(&mut reader).map_err(ListError::spill(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            remaining,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn next_edge(&mut self) -> Result<Option<EdgeRecord>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let edge = bincode::deserialize_from(&mut self.reader).map_err(ListError::spill(&self.path))?;
        self.remaining -= 1;
        Ok(Some(edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_read_back_in_written_order() {
        let parent = tempfile::TempDir::new().unwrap();
        let mut runs = RunDirectory::new_in(parent.path()).unwrap();
        let first = vec![EdgeRecord::new(0, 1), EdgeRecord::new(2, 3)];
        let second = vec![EdgeRecord {
            edge_type: Some(4),
            weight: Some(0.5),
            ..EdgeRecord::new(1, 1)
        }];
        assert_eq!(runs.write_run(&first).unwrap(), 0);
        assert_eq!(runs.write_run(&second).unwrap(), 1);
        assert!(runs.path().join("run-00001.bin").exists());

        let mut reader = runs.open_run(0).unwrap();
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.next_edge().unwrap(), Some(first[0]));
        assert_eq!(reader.next_edge().unwrap(), Some(first[1]));
        assert_eq!(reader.next_edge().unwrap(), None);

        let mut reader = runs.open_run(1).unwrap();
        assert_eq!(reader.next_edge().unwrap(), Some(second[0]));
        assert!(runs.open_run(2).is_err());
    }

    #[test]
    fn truncated_run_is_an_io_error() {
        let parent = tempfile::TempDir::new().unwrap();
        let mut runs = RunDirectory::new_in(parent.path()).unwrap();
        runs.write_run(&[EdgeRecord::new(0, 1), EdgeRecord::new(1, 2)]).unwrap();
        let path = runs.path().join("run-00000.bin");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let mut reader = runs.open_run(0).unwrap();
        assert!(reader.next_edge().unwrap().is_some());
        assert!(matches!(reader.next_edge(), Err(ListError::Io { .. })));
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let parent = tempfile::TempDir::new().unwrap();
        let mut runs = RunDirectory::new_in(parent.path()).unwrap();
        runs.write_run(&[EdgeRecord::new(0, 1)]).unwrap();
        let path = runs.path().to_path_buf();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with(".edge-sort-"));
        drop(runs);
        assert!(!path.exists());
    }
}
