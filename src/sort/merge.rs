//! K-way merge of sorted runs and deduplication of the sorted stream

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::config::SortOptions;
use crate::error::Result;
use crate::sort::run_file::{RunDirectory, RunReader};
use crate::sort::EdgeRecord;
use crate::EdgeT;

/// Heap entry: the next edge of a run plus the run it came from.
///
/// Ties on the edge key break on the run index. Runs are written in input
/// order, so this keeps the merge stable.
struct HeapEntry {
    edge: EdgeRecord,
    run: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.edge
            .cmp_key(&other.edge)
            .then_with(|| self.run.cmp(&other.run))
    }
}

/// Merges every run of a [`RunDirectory`] into one sorted stream.
///
/// Owns the directory, so the spill files disappear once the merge is
/// dropped, whether or not it was read to the end.
pub struct KWayMerge {
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    // Declared last: readers close their files before the directory goes.
    runs: RunDirectory,
}

impl KWayMerge {
    pub fn new(runs: RunDirectory) -> Result<Self> {
        let mut readers = Vec::with_capacity(runs.runs_number());
        let mut heap = BinaryHeap::with_capacity(runs.runs_number());
        for run in 0..runs.runs_number() {
            let mut reader = runs.open_run(run)?;
            if let Some(edge) = reader.next_edge()? {
                heap.push(Reverse(HeapEntry { edge, run }));
            }
            readers.push(reader);
        }
        Ok(Self { readers, heap, runs })
    }

    pub fn runs_number(&self) -> usize {
        self.runs.runs_number()
    }

    fn pop(&mut self) -> Result<Option<EdgeRecord>> {
        let Some(Reverse(HeapEntry { edge, run })) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(next) = self.readers[run].next_edge()? {
            self.heap.push(Reverse(HeapEntry { edge: next, run }));
        }
        Ok(Some(edge))
    }
}

impl Iterator for KWayMerge {
    type Item = Result<EdgeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop().transpose()
    }
}

/// Counters collected while deduplicating a sorted stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeStatistics {
    /// Edges emitted
    pub edges_number: EdgeT,
    /// Self-loops among the emitted edges
    pub self_loops_number: EdgeT,
    /// Emitted edges sharing source and destination with an earlier emitted
    /// edge of a different type
    pub parallel_edges_number: EdgeT,
    /// Exact duplicates found, removed or not
    pub duplicates_number: EdgeT,
    pub duplicates_removed: EdgeT,
    pub self_loops_removed: EdgeT,
    pub parallel_edges_removed: EdgeT,
}

/// Filters a sorted edge stream according to the sort options
pub struct DedupEdges<I> {
    edges: I,
    keep_duplicates: bool,
    remove_self_loops: bool,
    remove_parallel_edges: bool,
    last_seen: Option<EdgeRecord>,
    last_emitted: Option<EdgeRecord>,
    statistics: EdgeStatistics,
}

impl<I> DedupEdges<I>
where
    I: Iterator<Item = Result<EdgeRecord>>,
{
    pub fn new(edges: I, options: &SortOptions) -> Self {
        Self {
            edges,
            keep_duplicates: options.keep_duplicates,
            remove_self_loops: options.remove_self_loops,
            remove_parallel_edges: options.remove_parallel_edges,
            last_seen: None,
            last_emitted: None,
            statistics: EdgeStatistics::default(),
        }
    }

    /// Counters so far; complete once the stream is exhausted
    pub fn statistics(&self) -> &EdgeStatistics {
        &self.statistics
    }

    pub fn into_statistics(self) -> EdgeStatistics {
        self.statistics
    }

    fn accept(&mut self, edge: EdgeRecord) -> bool {
        let duplicate = self.last_seen.map_or(false, |last| last.key() == edge.key());
        self.last_seen = Some(edge);

        if duplicate {
            self.statistics.duplicates_number += 1;
            if !self.keep_duplicates {
                self.statistics.duplicates_removed += 1;
                return false;
            }
        }

        if edge.is_self_loop() && self.remove_self_loops {
            self.statistics.self_loops_removed += 1;
            return false;
        }

        let parallel = self.last_emitted.map_or(false, |last| {
            last.src == edge.src && last.dst == edge.dst && last.edge_type != edge.edge_type
        });
        if parallel {
            if self.remove_parallel_edges {
                self.statistics.parallel_edges_removed += 1;
                return false;
            }
            self.statistics.parallel_edges_number += 1;
        }

        if edge.is_self_loop() {
            self.statistics.self_loops_number += 1;
        }
        self.statistics.edges_number += 1;
        self.last_emitted = Some(edge);
        true
    }
}

impl<I> Iterator for DedupEdges<I>
where
    I: Iterator<Item = Result<EdgeRecord>>,
{
    type Item = Result<EdgeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.edges.next()? {
                Ok(edge) if self.accept(edge) => return Some(Ok(edge)),
                Ok(_) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
