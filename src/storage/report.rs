//! Summary reports of a loaded graph

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde_json::{json, to_string_pretty};

use crate::error::{ListError, Result};
use crate::graph::{Components, Graph};

/// Degrees at or above this value share the last bucket
const DEGREE_BUCKETS: usize = 100;

/// Save the graph summary and degree distribution to `output_dir`
pub fn save_report(graph: &Graph, components: &Components, output_dir: &Path) -> Result<()> {
    log::info!("Saving graph report to {}", output_dir.display());

    fs::create_dir_all(output_dir).map_err(ListError::io(output_dir))?;
    save_summary(graph, components, output_dir)?;
    save_degree_distribution(graph, output_dir)?;

    Ok(())
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let body = to_string_pretty(value)
        .map_err(|error| ListError::consistency(format!("cannot serialise {}: {}", path.display(), error)))?;
    let mut file = File::create(path).map_err(ListError::io(path))?;
    file.write_all(body.as_bytes()).map_err(ListError::io(path))
}

fn average_degree(graph: &Graph) -> f64 {
    if graph.nodes_number() == 0 {
        return 0.0;
    }
    graph.edges_number() as f64 / graph.nodes_number() as f64
}

fn save_summary(graph: &Graph, components: &Components, output_dir: &Path) -> Result<()> {
    let metadata = graph.metadata();
    let summary = json!({
        "graph_stats": {
            "nodes_number": graph.nodes_number(),
            "edges_number": graph.edges_number(),
            "directed": graph.is_directed(),
            "self_loops_number": metadata.self_loops_number,
            "parallel_edges_number": metadata.parallel_edges_number,
            "duplicates_removed": metadata.duplicates_removed,
            "node_types_number": metadata.node_types_number,
            "edge_types_number": metadata.edge_types_number,
            "has_edge_weights": metadata.has_edge_weights,
            "avg_degree": average_degree(graph),
            "memory_usage": graph.memory_usage(),
        },
        "component_stats": {
            "components_number": components.components_number(),
            "largest_component_size": components.largest_component_size(),
            "singletons_number": components.singletons_number(),
        }
    });

    write_json(&output_dir.join("summary.json"), &summary)
}

fn save_degree_distribution(graph: &Graph, output_dir: &Path) -> Result<()> {
    let mut degree_dist = vec![0u64; DEGREE_BUCKETS + 1];
    let mut max_degree = 0;
    for node in 0..graph.nodes_number() {
        let degree = graph.out_degree(node) as usize;
        degree_dist[degree.min(DEGREE_BUCKETS)] += 1;
        max_degree = max_degree.max(degree);
    }

    let stats = json!({
        "nodes_number": graph.nodes_number(),
        "edges_number": graph.edges_number(),
        "degree_distribution": degree_dist,
        "max_degree": max_degree,
        "avg_degree": average_degree(graph),
    });

    write_json(&output_dir.join("graph_stats.json"), &stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{connected_components, from_csv, LoadOptions};
    use crate::sort::EdgeRecord;
    use crate::storage::{write_edge_list, write_node_list, LayoutMetadata, LayoutPaths};
    use tempfile::TempDir;

    #[test]
    fn report_counts_degrees_and_components() {
        let dir = TempDir::new().unwrap();
        let paths = LayoutPaths::in_directory(dir.path().join("layout"));
        write_node_list(paths.nodes.as_deref().unwrap(), ["a", "b", "c"], None).unwrap();
        let edges = vec![Ok(EdgeRecord::new(0, 1)), Ok(EdgeRecord::new(0, 2))];
        write_edge_list(&paths.edges, edges.into_iter(), false, false).unwrap();
        let metadata = LayoutMetadata {
            node_types_number: None,
            nodes_number: 3,
            edge_types_number: None,
            edges_number: 2,
            directed: true,
            has_edge_weights: false,
            self_loops_number: 0,
            parallel_edges_number: 0,
            duplicates_removed: 0,
        };
        let graph = from_csv(&paths, &metadata, &LoadOptions::default()).unwrap();
        let components = connected_components(&graph);

        let output = dir.path().join("report");
        save_report(&graph, &components, &output).unwrap();

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["component_stats"]["components_number"], 1);
        assert!(summary["graph_stats"]["edge_types_number"].is_null());

        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("graph_stats.json")).unwrap()).unwrap();
        assert_eq!(stats["degree_distribution"][0], 2);
        assert_eq!(stats["degree_distribution"][2], 1);
        assert_eq!(stats["max_degree"], 2);
    }
}
