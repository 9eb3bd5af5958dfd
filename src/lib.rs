//! Core library functions for the edge list compiler
//!
//! Raw node and edge lists go in; a sorted, deduplicated, densely numbered
//! layout comes out, ready to be loaded as a CSR graph.

pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod sort;
pub mod storage;
pub mod vocabulary;

/// Dense node identifier
pub type NodeT = u32;
/// Edge counter and CSR offset
pub type EdgeT = u64;
pub type NodeTypeT = u32;
pub type EdgeTypeT = u32;
pub type WeightT = f32;

pub use config::{
    DatasetDescriptor, EdgeListOptions, ListFormat, ListOptions, NodeListOptions, SortOptions, TypeListOptions,
};
pub use data::preprocessing::{build_optimal_lists_files, SourcePaths};
pub use error::{ListError, Result};
pub use graph::loader::{from_csv, Graph, LoadOptions, Tradeoffs};
pub use pipeline::{Downloader, LocalFiles, PipelineState, Retrieval};
pub use storage::{LayoutMetadata, LayoutPaths};
pub use vocabulary::{DenseIds, Vocabulary};
