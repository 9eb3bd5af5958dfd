//! Retrieval pipeline: download, preprocess and load one dataset
//!
//! Every dataset is cached under
//! `<cache root>/<name>/<version>/preprocessed/<directed|undirected>/<config hash>`.
//! The metadata file is written last, so its presence marks a complete
//! entry. Two processes preprocessing the same entry at the same time is
//! not supported: the outcome is undefined.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::DatasetDescriptor;
use crate::data::preprocessing::{build_optimal_lists_files, SourcePaths};
use crate::error::{ListError, Result};
use crate::graph::loader::{from_csv, Graph, LoadOptions};
use crate::storage::{read_metadata, write_metadata, LayoutMetadata, LayoutPaths};

/// Where a retrieval stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Downloading,
    Preprocessing,
    Complete,
    Failed,
}

/// Fetches the raw files of a dataset
pub trait Downloader {
    /// Make every target exist, fetching it from `urls` when needed
    fn download(&self, urls: &[String], targets: &[PathBuf]) -> Result<()>;
}

/// Downloader for files that are already on disk: it only checks that
/// every target exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

impl Downloader for LocalFiles {
    fn download(&self, _urls: &[String], targets: &[PathBuf]) -> Result<()> {
        for target in targets {
            if !target.exists() {
                return Err(ListError::io(target)(io::Error::new(
                    io::ErrorKind::NotFound,
                    "the file is not available locally",
                )));
            }
        }
        Ok(())
    }
}

/// Retrieval of one dataset into the cache
pub struct Retrieval<D: Downloader = LocalFiles> {
    descriptor: DatasetDescriptor,
    /// Cache key of the layout options
    config_hash: String,
    cache_root: PathBuf,
    downloader: D,
    state: PipelineState,
    cache: bool,
    verbose: bool,
}

impl<D: Downloader> Retrieval<D> {
    pub fn new<P: AsRef<Path>>(descriptor: DatasetDescriptor, cache_root: P, downloader: D) -> Result<Self> {
        let config_hash = descriptor.config_hash()?;
        Ok(Self {
            descriptor,
            config_hash,
            cache_root: cache_root.as_ref().to_path_buf(),
            downloader,
            state: PipelineState::NotStarted,
            cache: true,
            verbose: false,
        })
    }

    /// With the cache disabled, a previous entry is discarded on the first run
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    /// Directory of the raw files
    pub fn dataset_directory(&self) -> PathBuf {
        self.cache_root
            .join(&self.descriptor.name)
            .join(&self.descriptor.version)
    }

    pub fn preprocessed_directory(&self) -> PathBuf {
        self.dataset_directory()
            .join("preprocessed")
            .join(if self.descriptor.directed { "directed" } else { "undirected" })
            .join(&self.config_hash)
    }

    /// Target files; type vocabularies only when the lists declare types
    pub fn layout_paths(&self) -> LayoutPaths {
        let lists = &self.descriptor.lists;
        let mut paths = LayoutPaths::in_directory(self.preprocessed_directory());
        if !lists.node_list.as_ref().map_or(false, |nodes| nodes.declares_node_types()) {
            paths.node_types = None;
        }
        if !lists.edge_list.declares_edge_types() {
            paths.edge_types = None;
        }
        paths
    }

    pub fn source_paths(&self) -> SourcePaths {
        let directory = self.dataset_directory();
        let lists = &self.descriptor.lists;
        let node_list = lists.node_list.as_ref();
        SourcePaths {
            nodes: node_list.and_then(|nodes| nodes.path.as_ref()).map(|path| directory.join(path)),
            node_types: node_list
                .and_then(|nodes| nodes.node_type_list.as_ref())
                .map(|types| directory.join(&types.path)),
            edges: directory.join(&lists.edge_list.path),
            edge_types: lists
                .edge_list
                .edge_type_list
                .as_ref()
                .map(|types| directory.join(&types.path)),
        }
    }

    pub fn is_preprocessed(&self) -> bool {
        self.layout_paths().metadata.exists()
    }

    /// Attach the dataset identity to a failure, once
    fn dataset_error(&self, stage: &'static str, error: ListError) -> ListError {
        match error {
            ListError::Dataset { .. } => error,
            source => ListError::Dataset {
                stage,
                name: self.descriptor.name.clone(),
                version: self.descriptor.version.clone(),
                repository: self.descriptor.repository.clone(),
                source: Box::new(source),
            },
        }
    }

    fn fail(&mut self, stage: &'static str, error: ListError) -> ListError {
        self.state = PipelineState::Failed;
        self.dataset_error(stage, error)
    }

    /// Bring the cache entry to completion and return its metadata
    pub fn preprocess(&mut self) -> Result<LayoutMetadata> {
        let progress = if self.verbose { log::Level::Info } else { log::Level::Debug };
        let directory = self.preprocessed_directory();
        let paths = self.layout_paths();

        if !self.cache && self.state == PipelineState::NotStarted && directory.exists() {
            log::log!(progress, "Discarding cached entry {}", directory.display());
            fs::remove_dir_all(&directory)
                .map_err(ListError::io(&directory))
                .map_err(|error| self.fail("preprocess", error))?;
        }

        if paths.metadata.exists() {
            log::log!(progress, "Using cached graph {}", self.descriptor.name);
            let metadata = read_metadata(&paths.metadata).map_err(|error| self.fail("load", error))?;
            self.state = PipelineState::Complete;
            return Ok(metadata);
        }

        if !directory.exists() {
            self.state = PipelineState::Downloading;
            let targets: Vec<PathBuf> = self
                .descriptor
                .paths
                .iter()
                .map(|path| self.dataset_directory().join(path))
                .collect();
            log::log!(progress, "Retrieving {} files of {}", targets.len(), self.descriptor.name);
            self.downloader
                .download(&self.descriptor.urls, &targets)
                .map_err(|error| self.fail("download", error))?;
        }

        self.state = PipelineState::Preprocessing;
        fs::create_dir_all(&directory)
            .map_err(ListError::io(&directory))
            .map_err(|error| self.fail("preprocess", error))?;

        let metadata = build_optimal_lists_files(
            &self.source_paths(),
            &paths,
            &self.descriptor.lists,
            self.descriptor.directed,
            self.verbose,
            &self.descriptor.name,
        )
        .and_then(|metadata| write_metadata(&paths.metadata, &metadata).map(|_| metadata))
        .map_err(|error| self.fail("preprocess", error))?;

        self.state = PipelineState::Complete;
        log::log!(
            progress,
            "Preprocessed {}: {} nodes, {} edges",
            self.descriptor.name,
            metadata.nodes_number,
            metadata.edges_number
        );
        Ok(metadata)
    }

    /// Preprocess when needed, then load the graph.
    ///
    /// A failed load leaves the cache entry in place.
    pub fn load(&mut self, options: &LoadOptions) -> Result<Graph> {
        let metadata = self.preprocess()?;
        from_csv(&self.layout_paths(), &metadata, options).map_err(|error| self.dataset_error("load", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Writes the edge list on download and counts calls
    struct Fixture {
        content: &'static str,
        calls: Cell<usize>,
    }

    impl Downloader for &Fixture {
        fn download(&self, _urls: &[String], targets: &[PathBuf]) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            for target in targets {
                fs::create_dir_all(target.parent().unwrap()).unwrap();
                fs::write(target, self.content).unwrap();
            }
            Ok(())
        }
    }

    fn descriptor() -> DatasetDescriptor {
        let mut descriptor = DatasetDescriptor::new("snap", "Toy", "1", "edges.tsv");
        descriptor.paths.push(PathBuf::from("edges.tsv"));
        descriptor.lists.edge_list.format.header = false;
        descriptor
    }

    #[test]
    fn second_run_is_a_cache_hit() {
        let cache = TempDir::new().unwrap();
        let fixture = Fixture {
            content: "a\tb\nb\tc\n",
            calls: Cell::new(0),
        };

        let mut retrieval = Retrieval::new(descriptor(), cache.path(), &fixture).unwrap();
        assert_eq!(retrieval.state(), PipelineState::NotStarted);
        let first = retrieval.preprocess().unwrap();
        assert_eq!(retrieval.state(), PipelineState::Complete);
        assert_eq!(first.edges_number, 4);

        let mut again = Retrieval::new(descriptor(), cache.path(), &fixture).unwrap();
        assert!(again.is_preprocessed());
        assert_eq!(again.preprocess().unwrap(), first);
        assert_eq!(fixture.calls.get(), 1);
        assert!(retrieval
            .preprocessed_directory()
            .starts_with(cache.path().join("Toy").join("1").join("preprocessed").join("undirected")));
    }

    #[test]
    fn failures_carry_the_dataset_identity() {
        let cache = TempDir::new().unwrap();
        let mut retrieval = Retrieval::new(descriptor(), cache.path(), LocalFiles).unwrap();
        let error = retrieval.preprocess().unwrap_err();

        assert_eq!(retrieval.state(), PipelineState::Failed);
        match &error {
            ListError::Dataset { stage, name, .. } => {
                assert_eq!(*stage, "download");
                assert_eq!(name, "Toy");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(error.root_cause(), ListError::Io { .. }));
    }

    #[test]
    fn disabled_cache_rebuilds_the_entry() {
        let cache = TempDir::new().unwrap();
        let fixture = Fixture {
            content: "1\t2\n",
            calls: Cell::new(0),
        };
        Retrieval::new(descriptor(), cache.path(), &fixture)
            .unwrap()
            .preprocess()
            .unwrap();
        Retrieval::new(descriptor(), cache.path(), &fixture)
            .unwrap()
            .with_cache(false)
            .preprocess()
            .unwrap();
        assert_eq!(fixture.calls.get(), 2);
    }
}
