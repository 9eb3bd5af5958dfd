//! Graph representation, loading and algorithms module

pub mod algorithms;
pub mod builder;
pub mod compressed;
pub mod loader;

pub use algorithms::{connected_components, random_holdout, spanning_arborescence, Components, Holdout};
pub use compressed::CompressedGraph;
pub use loader::{from_csv, Graph, LoadOptions, Tradeoffs};
