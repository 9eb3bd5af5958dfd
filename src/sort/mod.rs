//! Sort and deduplication of parsed edges
//!
//! Edges are buffered in memory and sorted in parallel. When the buffer
//! reaches the configured size it is spilled as a sorted run, and the runs
//! are merged back when all edges have been pushed. The sort is stable
//! throughout, so among equal keys the first edge read is the first emitted.

pub mod merge;
pub mod run_file;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SortOptions;
use crate::error::Result;
use crate::{EdgeT, EdgeTypeT, NodeT, WeightT};

pub use merge::{DedupEdges, EdgeStatistics, KWayMerge};
pub use run_file::RunDirectory;

/// One parsed edge with dense IDs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: NodeT,
    pub dst: NodeT,
    pub edge_type: Option<EdgeTypeT>,
    pub weight: Option<WeightT>,
}

impl EdgeRecord {
    pub fn new(src: NodeT, dst: NodeT) -> Self {
        Self {
            src,
            dst,
            edge_type: None,
            weight: None,
        }
    }

    /// Identity of the edge. An absent type sorts before every type.
    #[inline]
    pub fn key(&self) -> (NodeT, NodeT, Option<EdgeTypeT>) {
        (self.src, self.dst, self.edge_type)
    }

    #[inline]
    pub fn is_self_loop(&self) -> bool {
        self.src == self.dst
    }

    #[inline]
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Accumulates edges and produces them back in sorted order
pub struct EdgeSorter {
    buffer: Vec<EdgeRecord>,
    capacity: usize,
    directory: PathBuf,
    runs: Option<RunDirectory>,
    pushed: EdgeT,
}

impl EdgeSorter {
    /// Spill runs go to `options.temporary_directory`, or to
    /// `default_directory` when none is configured.
    pub fn new(options: &SortOptions, default_directory: &Path) -> Self {
        let capacity = options.in_memory_edges.max(1);
        Self {
            buffer: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
            directory: options
                .temporary_directory
                .clone()
                .unwrap_or_else(|| default_directory.to_path_buf()),
            runs: None,
            pushed: 0,
        }
    }

    pub fn push(&mut self, edge: EdgeRecord) -> Result<()> {
        self.buffer.push(edge);
        self.pushed += 1;
        if self.buffer.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    /// Number of edges pushed so far
    pub fn len(&self) -> EdgeT {
        self.pushed
    }

    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    /// Directory holding the spilled runs, once the first run is written
    pub fn spill_directory(&self) -> Option<&Path> {
        self.runs.as_ref().map(RunDirectory::path)
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.runs.is_none() {
            self.runs = Some(RunDirectory::new_in(&self.directory)?);
        }
        if let Some(runs) = self.runs.as_mut() {
            write_sorted_run(runs, &mut self.buffer)?;
        }
        self.buffer.clear();
        Ok(())
    }

    /// Sort what is left and return every edge in sorted order.
    pub fn finish(mut self) -> Result<SortedEdges> {
        let mut buffer = std::mem::take(&mut self.buffer);
        match self.runs.take() {
            None => {
                buffer.par_sort_by(EdgeRecord::cmp_key);
                Ok(SortedEdges::InMemory(buffer.into_iter()))
            }
            Some(mut runs) => {
                if !buffer.is_empty() {
                    write_sorted_run(&mut runs, &mut buffer)?;
                }
                log::debug!("Merging {} sorted runs", runs.runs_number());
                Ok(SortedEdges::Merged(KWayMerge::new(runs)?))
            }
        }
    }
}

fn write_sorted_run(runs: &mut RunDirectory, buffer: &mut [EdgeRecord]) -> Result<()> {
    buffer.par_sort_by(EdgeRecord::cmp_key);
    let index = runs.write_run(buffer)?;
    log::debug!(
        "Spilled run {} with {} edges to {}",
        index,
        buffer.len(),
        runs.path().display()
    );
    Ok(())
}

/// Sorted edges, either still in memory or merged from spilled runs
pub enum SortedEdges {
    InMemory(std::vec::IntoIter<EdgeRecord>),
    Merged(KWayMerge),
}

impl SortedEdges {
    /// Number of runs being merged; zero for an in-memory sort
    pub fn runs_number(&self) -> usize {
        match self {
            SortedEdges::InMemory(_) => 0,
            SortedEdges::Merged(merge) => merge.runs_number(),
        }
    }
}

impl Iterator for SortedEdges {
    type Item = Result<EdgeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedEdges::InMemory(edges) => edges.next().map(Ok),
            SortedEdges::Merged(merge) => merge.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    fn options(in_memory_edges: usize) -> SortOptions {
        SortOptions {
            in_memory_edges,
            ..SortOptions::default()
        }
    }

    fn random_edges(count: usize, seed: u64) -> Vec<EdgeRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| EdgeRecord {
                src: rng.gen_range(0..50),
                dst: rng.gen_range(0..50),
                edge_type: if rng.gen_bool(0.5) { Some(rng.gen_range(0..3)) } else { None },
                weight: Some(i as f32),
            })
            .collect()
    }

    fn sort_all(edges: &[EdgeRecord], in_memory_edges: usize, dir: &Path) -> Vec<EdgeRecord> {
        let mut sorter = EdgeSorter::new(&options(in_memory_edges), dir);
        for edge in edges {
            sorter.push(*edge).unwrap();
        }
        sorter.finish().unwrap().map(|edge| edge.unwrap()).collect()
    }

    #[test]
    fn absent_type_sorts_first() {
        let typed = EdgeRecord {
            edge_type: Some(0),
            ..EdgeRecord::new(1, 2)
        };
        assert_eq!(EdgeRecord::new(1, 2).cmp_key(&typed), Ordering::Less);
        assert_eq!(typed.cmp_key(&EdgeRecord::new(1, 3)), Ordering::Less);
    }

    #[test]
    fn external_sort_matches_in_memory_sort() {
        let dir = TempDir::new().unwrap();
        let edges = random_edges(2_000, 7);

        let in_memory = sort_all(&edges, usize::MAX, dir.path());
        let external = sort_all(&edges, 97, dir.path());

        assert_eq!(in_memory.len(), edges.len());
        assert_eq!(external, in_memory);
        // Stability: equal keys keep their input order, tracked by weight.
        for pair in in_memory.windows(2) {
            if pair[0].key() == pair[1].key() {
                assert!(pair[0].weight < pair[1].weight);
            }
        }
    }

    #[test]
    fn spill_directory_is_removed_after_merge() {
        let dir = TempDir::new().unwrap();
        let mut sorter = EdgeSorter::new(&options(4), dir.path());
        for edge in random_edges(10, 3) {
            sorter.push(edge).unwrap();
        }
        let spill = sorter.spill_directory().unwrap().to_path_buf();
        assert!(spill.starts_with(dir.path()));
        assert!(spill.exists());

        let sorted = sorter.finish().unwrap();
        assert_eq!(sorted.runs_number(), 3);
        assert_eq!(sorted.count(), 10);
        assert!(!spill.exists());
    }

    #[test]
    fn spill_directory_is_removed_when_sort_is_abandoned() {
        let dir = TempDir::new().unwrap();
        let mut sorter = EdgeSorter::new(&options(2), dir.path());
        for edge in random_edges(5, 11) {
            sorter.push(edge).unwrap();
        }
        let spill = sorter.spill_directory().unwrap().to_path_buf();
        drop(sorter);
        assert!(!spill.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn configured_temporary_directory_wins() {
        let default = TempDir::new().unwrap();
        let configured = TempDir::new().unwrap();
        let options = SortOptions {
            temporary_directory: Some(configured.path().to_path_buf()),
            in_memory_edges: 1,
            ..SortOptions::default()
        };
        let mut sorter = EdgeSorter::new(&options, default.path());
        sorter.push(EdgeRecord::new(0, 1)).unwrap();
        assert!(sorter.spill_directory().unwrap().starts_with(configured.path()));
    }
}
