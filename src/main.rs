use std::path::Path;

use anyhow::Result;
use clap::Parser;

use graph_list_compiler::graph::connected_components;
use graph_list_compiler::storage::report::save_report;
use graph_list_compiler::{DatasetDescriptor, LoadOptions, LocalFiles, Retrieval, Tradeoffs};

#[derive(Parser, Debug)]
#[clap(
    name = "graph-list-compiler",
    about = "Compile raw node and edge lists into an optimal sorted graph layout"
)]
struct Cli {
    /// Path to the JSON dataset descriptor
    #[clap(long)]
    descriptor: String,

    /// Root of the dataset cache
    #[clap(long, default_value = "graphs")]
    cache_dir: String,

    /// Rebuild the layout even when a cached one exists
    #[clap(long)]
    no_cache: bool,

    /// Load the layout and write a summary report to this directory
    #[clap(long)]
    report: Option<String>,

    /// Number of worker threads (0 = use all available cores)
    #[clap(long, default_value = "0")]
    threads: usize,

    /// Verbose logging
    #[clap(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let num_threads = if args.threads > 0 {
        args.threads
    } else {
        num_cpus::get()
    };

    log::info!("Using {} worker threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let descriptor = DatasetDescriptor::from_json_file(&args.descriptor)?;
    log::info!(
        "Compiling {} ({}) from the {} repository",
        descriptor.name,
        descriptor.version,
        descriptor.repository
    );

    let mut retrieval = Retrieval::new(descriptor, &args.cache_dir, LocalFiles)?
        .with_cache(!args.no_cache)
        .with_verbose(args.verbose);
    let metadata = retrieval.preprocess()?;
    log::info!(
        "Layout ready in {}: {} nodes, {} edges",
        retrieval.preprocessed_directory().display(),
        metadata.nodes_number,
        metadata.edges_number
    );

    if let Some(report_dir) = &args.report {
        let options = LoadOptions {
            tradeoffs: Tradeoffs::all(),
            verbose: args.verbose,
        };
        let graph = retrieval.load(&options)?;
        let components = connected_components(&graph);
        log::info!("Found {} connected components", components.components_number());
        save_report(&graph, &components, Path::new(report_dir))?;
        log::info!("Report saved to {}", report_dir);
    }

    Ok(())
}
