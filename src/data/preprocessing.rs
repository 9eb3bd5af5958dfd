//! Preprocessing of raw node and edge lists into the optimal layout
//!
//! Rows are parsed in shards: a whole chunk when reading in parallel, or a
//! bounded run of rows when reading sequentially. Each shard resolves names
//! to local IDs and is merged into the global vocabularies in file order, so
//! both modes assign exactly the same IDs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{EdgeListOptions, ListOptions, NodeListOptions, TypeListOptions};
use crate::data::reader::ListReader;
use crate::data::schema::{resolve_type_list_column, EdgeColumns, NodeColumns, ParsingPlan};
use crate::error::{ListError, Result};
use crate::sort::{DedupEdges, EdgeRecord, EdgeSorter};
use crate::storage::{self, LayoutMetadata, LayoutPaths};
use crate::vocabulary::{DenseIds, Vocabulary};
use crate::{EdgeTypeT, NodeT, NodeTypeT, WeightT};

/// Rows parsed before a sequential shard is merged
const SEQUENTIAL_SHARD_ROWS: usize = 1 << 16;

/// Raw lists of one graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePaths {
    pub nodes: Option<PathBuf>,
    /// Known node types, read before the node list
    pub node_types: Option<PathBuf>,
    pub edges: PathBuf,
    /// Known edge types, read before the edge list
    pub edge_types: Option<PathBuf>,
}

impl SourcePaths {
    /// Sources made of a single edge list
    pub fn from_edges<P: Into<PathBuf>>(edges: P) -> Self {
        Self {
            edges: edges.into(),
            ..Self::default()
        }
    }
}

/// Removes the target files written so far unless disarmed
struct OutputGuard {
    written: Vec<PathBuf>,
    armed: bool,
}

impl OutputGuard {
    fn new() -> Self {
        Self {
            written: Vec::new(),
            armed: true,
        }
    }

    fn record(&mut self, path: &Path) {
        self.written.push(path.to_path_buf());
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.written {
            if let Err(error) = fs::remove_file(path) {
                log::warn!("Cannot remove partial output {}: {}", path.display(), error);
            }
        }
    }
}

/// Convert the raw lists into the optimal layout at `targets`.
///
/// Returns the metadata describing the written files; writing the metadata
/// file itself is left to the caller. On failure every target file written
/// by this call is removed again.
pub fn build_optimal_lists_files(
    sources: &SourcePaths,
    targets: &LayoutPaths,
    options: &ListOptions,
    directed: bool,
    verbose: bool,
    name: &str,
) -> Result<LayoutMetadata> {
    let progress = if verbose { log::Level::Info } else { log::Level::Debug };
    let node_options = options.node_list.clone().unwrap_or_default();
    validate_configuration(sources, targets, &node_options, &options.edge_list)?;

    log::log!(progress, "Building the optimal lists of {}", name);

    // Node list
    let node_table = match &sources.nodes {
        Some(path) => {
            let node_types = type_ids(
                sources.node_types.as_deref(),
                node_options.node_type_list.as_ref(),
                node_options.numeric_node_type_ids,
                node_options.minimum_node_type_id,
                "node types",
            )?;
            let table = parse_node_list(path, &node_options, node_types)?;
            log::log!(
                progress,
                "Read {} nodes and {} node types from {}",
                table.names.len(),
                table.node_types.len(),
                path.display()
            );
            Some(table)
        }
        None => None,
    };

    // Edge list
    let edge_options = &options.edge_list;
    let (plan, header) = ParsingPlan::resolve(&sources.edges, &edge_options.format)?;
    let columns = EdgeColumns::resolve(&plan, header.as_deref(), edge_options)?;
    let reader = ListReader::new(plan);

    let mut node_ids = match &node_table {
        Some(table) => DenseIds::Interned(table.names.clone()),
        None => {
            let numeric = match edge_options.numeric_node_ids {
                Some(numeric) => numeric,
                None => detect_numeric_ids(&reader, &columns, edge_options.minimum_node_id)?,
            };
            if numeric {
                DenseIds::numeric(edge_options.minimum_node_id)
            } else {
                DenseIds::Interned(Vocabulary::new())
            }
        }
    };
    if !node_ids.is_numeric() && targets.nodes.is_none() {
        return Err(ListError::configuration(
            "node names must be interned but no target node list path is given",
        ));
    }
    log::debug!(
        "Node identifiers of {} are {}",
        name,
        if node_ids.is_numeric() { "numeric" } else { "interned" }
    );

    let default_directory = match sources.edges.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut sorter = EdgeSorter::new(&options.sort, default_directory);
    let mut edge_types = type_ids(
        sources.edge_types.as_deref(),
        edge_options.edge_type_list.as_ref(),
        edge_options.numeric_edge_type_ids,
        edge_options.minimum_edge_type_id,
        "edge types",
    )?;
    let parser = EdgeParser {
        plan: reader.plan(),
        columns: &columns,
        node_ids: node_ids.shard(),
        edge_types: edge_types.shard(),
    };

    parse_in_shards(
        &reader,
        || parser.shard(),
        |shard, line, fields| parser.parse(shard, line, fields),
        |shard| {
            let node_remap = node_ids.merge_shard(&shard.nodes);
            let type_remap = edge_types.merge_shard(&shard.edge_types);
            for mut edge in shard.edges {
                if let Some(remap) = &node_remap {
                    edge.src = remap[edge.src as usize];
                    edge.dst = remap[edge.dst as usize];
                }
                if let Some(remap) = &type_remap {
                    edge.edge_type = edge.edge_type.map(|edge_type| remap[edge_type as usize]);
                }
                sorter.push(edge)?;
                if !directed && !edge.is_self_loop() {
                    sorter.push(EdgeRecord {
                        src: edge.dst,
                        dst: edge.src,
                        ..edge
                    })?;
                }
            }
            Ok(())
        },
    )?;

    let nodes_number = node_ids.len();
    let has_edge_types = columns.edge_types.is_some();
    let has_weights = columns.weights.is_some();
    log::log!(
        progress,
        "Parsed {} directed edges over {} nodes from {}",
        sorter.len(),
        nodes_number,
        reader.plan().path.display()
    );

    // Targets, edges last
    let mut guard = OutputGuard::new();

    let node_types_number = match &node_table {
        Some(table) if table.has_types => {
            if let Some(path) = &targets.node_types {
                storage::write_vocabulary(path, &table.node_types.names())?;
                guard.record(path);
            }
            Some(table.node_types.len() as NodeTypeT)
        }
        _ => None,
    };

    if let Some(path) = &targets.nodes {
        let types = node_table
            .as_ref()
            .filter(|table| table.has_types)
            .map(|table| table.types_of_nodes.as_slice());
        storage::write_node_list(path, (0..nodes_number).map(|id| node_ids.name(id)), types)?;
        guard.record(path);
    }

    let edge_types_number = if has_edge_types {
        if let Some(path) = &targets.edge_types {
            storage::write_vocabulary(path, &edge_types.names())?;
            guard.record(path);
        }
        Some(edge_types.len() as EdgeTypeT)
    } else {
        None
    };

    let sorted = sorter.finish()?;
    if sorted.runs_number() > 0 {
        log::log!(progress, "Merging {} sorted runs", sorted.runs_number());
    }
    let mut edges = DedupEdges::new(sorted, &options.sort);
    let written = storage::write_edge_list(&targets.edges, &mut edges, has_edge_types, has_weights)?;
    guard.record(&targets.edges);
    let statistics = edges.into_statistics();

    if statistics.edges_number != written {
        return Err(ListError::consistency(format!(
            "{} edges were kept but {} were written",
            statistics.edges_number, written
        )));
    }
    if statistics.duplicates_number > 0 && !edge_options.may_contain_duplicates {
        log::warn!(
            "The edge list of {} was declared free of duplicates but holds {} duplicated edges",
            name,
            statistics.duplicates_number
        );
    }

    guard.disarm();
    log::log!(
        progress,
        "Wrote {} edges ({} self-loops, {} duplicates removed) to {}",
        written,
        statistics.self_loops_number,
        statistics.duplicates_removed,
        targets.edges.display()
    );

    Ok(LayoutMetadata {
        node_types_number,
        nodes_number,
        edge_types_number,
        edges_number: written,
        directed,
        has_edge_weights: has_weights,
        self_loops_number: statistics.self_loops_number,
        parallel_edges_number: statistics.parallel_edges_number,
        duplicates_removed: statistics.duplicates_removed,
    })
}

/// Contradictions that can be found without reading any file
fn validate_configuration(
    sources: &SourcePaths,
    targets: &LayoutPaths,
    node_options: &NodeListOptions,
    edge_options: &EdgeListOptions,
) -> Result<()> {
    if sources.nodes.is_some() && targets.nodes.is_none() {
        return Err(ListError::configuration(
            "a node list is given but no target node list path is",
        ));
    }
    if sources.nodes.is_some() && node_options.declares_node_types() && targets.node_types.is_none() {
        return Err(ListError::configuration(
            "a node types column is given but no target node types path is",
        ));
    }
    if edge_options.declares_edge_types() && targets.edge_types.is_none() {
        return Err(ListError::configuration(
            "an edge types column is given but no target edge types path is",
        ));
    }
    if sources.node_types.is_some() && sources.nodes.is_none() {
        return Err(ListError::configuration("a node type list is given without a node list"));
    }
    if sources.node_types.is_some() && !node_options.declares_node_types() {
        return Err(ListError::configuration(
            "a node type list is given but no node types column is",
        ));
    }
    if sources.edge_types.is_some() && !edge_options.declares_edge_types() {
        return Err(ListError::configuration(
            "an edge type list is given but no edge types column is",
        ));
    }
    if sources.nodes.is_some() && edge_options.numeric_node_ids == Some(true) {
        return Err(ListError::configuration(
            "numeric node identifiers cannot be used together with a node list",
        ));
    }
    Ok(())
}

/// Parse rows shard by shard, handing shards to `consume` in file order
fn parse_in_shards<S, N, P, C>(reader: &ListReader, new_shard: N, parse: P, mut consume: C) -> Result<()>
where
    S: Send,
    N: Fn() -> S + Sync,
    P: Fn(&mut S, usize, &[&str]) -> Result<()> + Sync,
    C: FnMut(S) -> Result<()>,
{
    if reader.plan().load_in_parallel {
        return reader.par_map_chunks(
            |chunk| {
                let mut shard = new_shard();
                chunk.for_each_row(|line, fields| parse(&mut shard, line, fields))?;
                Ok(shard)
            },
            consume,
        );
    }

    let mut shard = new_shard();
    let mut rows = 0;
    reader.for_each_row(|line, fields| {
        parse(&mut shard, line, fields)?;
        rows += 1;
        if rows % SEQUENTIAL_SHARD_ROWS == 0 {
            consume(std::mem::replace(&mut shard, new_shard()))?;
        }
        Ok(())
    })?;
    consume(shard)
}

/// Whether `name` is written the way the integer it denotes prints
fn is_canonical_integer(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|byte| byte.is_ascii_digit())
        && (name == "0" || !name.starts_with('0'))
}

/// Whether every source and destination is an integer no smaller than
/// `minimum_node_id`. Rows a trusted list would skip are not looked at.
fn detect_numeric_ids(reader: &ListReader, columns: &EdgeColumns, minimum_node_id: NodeT) -> Result<bool> {
    let plan = reader.plan();
    for row in reader.rows()? {
        let row = row?;
        let names = [columns.sources, columns.destinations]
            .map(|column| plan.normalize(row.fields.get(column).map_or("", String::as_str)));
        if names.iter().any(|name| name.is_empty()) {
            if plan.strict {
                return Ok(false);
            }
            continue;
        }
        for name in &names {
            if !is_canonical_integer(name) {
                return Ok(false);
            }
            // The largest dense ID must leave room for the number of nodes
            match name.parse::<NodeT>() {
                Ok(value) if value >= minimum_node_id && value - minimum_node_id < NodeT::MAX => {}
                _ => return Ok(false),
            }
        }
    }
    Ok(true)
}

/// Field at `column`, empty when a trusted row is too short to hold it
fn field<'f>(fields: &[&'f str], column: usize) -> &'f str {
    fields.get(column).copied().unwrap_or("")
}

/// Dense IDs of a type vocabulary: closed when a type list is given
fn type_ids(
    path: Option<&Path>,
    options: Option<&TypeListOptions>,
    numeric: bool,
    minimum_id: u32,
    label: &str,
) -> Result<DenseIds> {
    match path {
        Some(path) => {
            let default = TypeListOptions::default();
            let vocabulary = parse_type_list(path, options.unwrap_or(&default), label)?;
            log::debug!("Read {} {} from {}", vocabulary.len(), label, path.display());
            Ok(DenseIds::listed(vocabulary, numeric.then_some(minimum_id)))
        }
        None if numeric => Ok(DenseIds::numeric(minimum_id)),
        None => Ok(DenseIds::Interned(Vocabulary::new())),
    }
}

fn parse_type_list(path: &Path, options: &TypeListOptions, label: &str) -> Result<Vocabulary> {
    let (plan, header) = ParsingPlan::resolve(path, &options.format)?;
    let column = resolve_type_list_column(&plan, header.as_deref(), options, label)?;
    let reader = ListReader::new(plan);
    let plan = reader.plan();

    let mut vocabulary = Vocabulary::new();
    reader.for_each_row(|line, fields| {
        let name = plan.normalize(field(fields, column));
        let problem = if name.is_empty() {
            format!("empty name in the {} list", label)
        } else if vocabulary.insert(&name).1 {
            format!("`{}` is listed more than once in the {} list", name, label)
        } else {
            return Ok(());
        };
        if plan.strict {
            return Err(ListError::format(&plan.path, line, problem));
        }
        log::debug!("Skipping line {} of {}: {}", line, plan.path.display(), problem);
        Ok(())
    })?;
    Ok(vocabulary)
}

/// Everything read from a node list
struct NodeTable {
    names: Vocabulary,
    has_types: bool,
    node_types: DenseIds,
    /// Types of every node, indexed by node ID
    types_of_nodes: Vec<Vec<NodeTypeT>>,
}

struct NodeShard {
    /// Line number, name and local type IDs of every row
    rows: Vec<(usize, String, Vec<NodeTypeT>)>,
    node_types: DenseIds,
}

fn parse_node_list(path: &Path, options: &NodeListOptions, node_types: DenseIds) -> Result<NodeTable> {
    let (plan, header) = ParsingPlan::resolve(path, &options.format)?;
    let columns = NodeColumns::resolve(&plan, header.as_deref(), options)?;
    let reader = ListReader::new(plan);
    let plan = reader.plan();

    let shard_types = node_types.shard();
    let mut table = NodeTable {
        names: Vocabulary::new(),
        has_types: columns.node_types.is_some(),
        node_types,
        types_of_nodes: Vec::new(),
    };

    parse_in_shards(
        &reader,
        || NodeShard {
            rows: Vec::new(),
            node_types: shard_types.shard(),
        },
        |shard, line, fields| {
            let name = plan.normalize(field(fields, columns.nodes));
            if name.is_empty() {
                if plan.strict {
                    return Err(ListError::format(&plan.path, line, "empty node name"));
                }
                log::debug!("Skipping line {} of {}: no node name", line, plan.path.display());
                return Ok(());
            }
            let types = match columns.node_types {
                Some(column) => shard
                    .node_types
                    .resolve_all(
                        Some(field(fields, column)),
                        columns.node_types_separator,
                        columns.default_node_type.as_deref(),
                        plan.remove_chevrons,
                        plan.remove_spaces,
                    )
                    .map_err(|message| ListError::format(&plan.path, line, message))?,
                None => Vec::new(),
            };
            shard.rows.push((line, name.into_owned(), types));
            Ok(())
        },
        |shard| {
            let remap = table.node_types.merge_shard(&shard.node_types);
            for (line, name, types) in shard.rows {
                let (_, already_present) = table.names.insert(&name);
                if already_present {
                    if plan.strict {
                        return Err(ListError::format(
                            &plan.path,
                            line,
                            format!("the node `{}` is listed more than once", name),
                        ));
                    }
                    log::debug!("Ignoring repeated node {} at line {}", name, line);
                    continue;
                }
                let types = match &remap {
                    Some(remap) => types.into_iter().map(|node_type| remap[node_type as usize]).collect(),
                    None => types,
                };
                table.types_of_nodes.push(types);
            }
            Ok(())
        },
    )?;

    Ok(table)
}

/// Parses edge rows into shards
struct EdgeParser<'a> {
    plan: &'a ParsingPlan,
    columns: &'a EdgeColumns,
    /// Empty node IDs of the kind every shard uses
    node_ids: DenseIds,
    /// Empty edge type IDs of the kind every shard uses
    edge_types: DenseIds,
}

struct EdgeShard {
    nodes: DenseIds,
    edge_types: DenseIds,
    edges: Vec<EdgeRecord>,
}

impl EdgeParser<'_> {
    fn shard(&self) -> EdgeShard {
        EdgeShard {
            nodes: self.node_ids.shard(),
            edge_types: self.edge_types.shard(),
            edges: Vec::new(),
        }
    }

    fn format_error(&self, line: usize) -> impl Fn(String) -> ListError + '_ {
        move |message| ListError::format(&self.plan.path, line, message)
    }

    /// A row a trusted list can lack the data for. Strict lists fail instead.
    fn skip_row(&self, line: usize, reason: &str) -> Result<()> {
        if self.plan.strict {
            return Err(ListError::format(&self.plan.path, line, reason));
        }
        log::debug!("Skipping line {} of {}: {}", line, self.plan.path.display(), reason);
        Ok(())
    }

    fn parse(&self, shard: &mut EdgeShard, line: usize, fields: &[&str]) -> Result<()> {
        let columns = self.columns;
        let src = self.plan.normalize(field(fields, columns.sources));
        if src.is_empty() {
            return self.skip_row(line, "empty source node");
        }
        let dst = self.plan.normalize(field(fields, columns.destinations));
        if dst.is_empty() {
            return self.skip_row(line, "empty destination node");
        }

        let weight = match columns.weights {
            Some(column) => match self.weight(line, field(fields, column))? {
                Some(weight) => Some(weight),
                None => return self.skip_row(line, "empty weight and no default weight"),
            },
            None => None,
        };

        let edge_type = match columns.edge_types {
            Some(column) => {
                let value = self.plan.normalize(field(fields, column));
                let name = if value.is_empty() {
                    columns.default_edge_type.as_deref()
                } else {
                    Some(value.as_ref())
                };
                match name {
                    Some(name) => Some(shard.edge_types.resolve(name).map_err(self.format_error(line))?),
                    None => None,
                }
            }
            None => None,
        };

        let src = shard.nodes.resolve(&src).map_err(self.format_error(line))?;
        let dst = shard.nodes.resolve(&dst).map_err(self.format_error(line))?;
        shard.edges.push(EdgeRecord {
            src,
            dst,
            edge_type,
            weight,
        });
        Ok(())
    }

    /// Weight of a row; `None` when it is empty and there is no default
    fn weight(&self, line: usize, field: &str) -> Result<Option<WeightT>> {
        if field.is_empty() {
            return Ok(self.columns.default_weight);
        }
        let weight: WeightT = field.trim().parse().map_err(|_| {
            ListError::format(&self.plan.path, line, format!("the weight `{}` is not a number", field))
        })?;
        if !weight.is_finite() {
            return Err(ListError::format(
                &self.plan.path,
                line,
                format!("the weight `{}` is not finite", field),
            ));
        }
        Ok(Some(weight))
    }
}
