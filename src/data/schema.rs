//! Schema resolution: from list options to a concrete parsing plan

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::{EdgeListOptions, ListFormat, NodeListOptions, TypeListOptions};
use crate::data::tokenizer::{detect_separator, normalize_name, FieldSplitter};
use crate::error::{ListError, Result};
use crate::WeightT;

/// Concrete instructions for one parse pass over one file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingPlan {
    pub path: PathBuf,
    /// Always a single ASCII character
    pub separator: char,
    pub header: bool,
    pub rows_to_skip: usize,
    pub max_rows_number: Option<usize>,
    pub comment_symbol: Option<String>,
    pub support_balanced_quotes: bool,

    /// Validate the field count of every row
    pub strict: bool,

    pub load_in_parallel: bool,

    /// Number of fields of the header, or of the first data row without one.
    /// `None` when the file has no such line.
    pub expected_fields: Option<usize>,

    pub remove_chevrons: bool,
    pub remove_spaces: bool,
}

impl ParsingPlan {
    /// Inspect the head of `path` and fix every format decision.
    ///
    /// The separator and the expected width come from the header when the
    /// list has one, otherwise from the first row left after `rows_to_skip`.
    /// Returns the plan and, when the list has one, its header.
    pub fn resolve(path: &Path, format: &ListFormat) -> Result<(Self, Option<Vec<String>>)> {
        let file = File::open(path).map_err(ListError::io(path))?;
        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        let mut line_number = 0;

        let mut next_meaningful_line = || -> Result<Option<(String, usize)>> {
            loop {
                buffer.clear();
                let read = reader.read_until(b'\n', &mut buffer).map_err(ListError::io(path))?;
                if read == 0 {
                    return Ok(None);
                }
                line_number += 1;
                let line = decode_line(&buffer, path, line_number)?;
                if !is_ignored(line, format.comment_symbol.as_deref()) {
                    return Ok(Some((line.to_string(), line_number)));
                }
            }
        };

        let header_line = if format.header { next_meaningful_line()? } else { None };
        let sample = match header_line {
            Some(line) => Some(line),
            None if format.header => None,
            None => {
                for _ in 0..format.rows_to_skip {
                    if next_meaningful_line()?.is_none() {
                        break;
                    }
                }
                next_meaningful_line()?
            }
        };

        let separator = match (format.separator, &sample) {
            (Some(separator), _) => separator,
            (None, Some((line, _))) => detect_separator(line).unwrap_or('\t'),
            (None, None) => '\t',
        };
        if !separator.is_ascii() {
            return Err(ListError::configuration(format!(
                "the separator `{}` of {} is not a single ASCII character",
                separator,
                path.display()
            )));
        }

        let mut plan = Self {
            path: path.to_path_buf(),
            separator,
            header: format.header,
            rows_to_skip: format.rows_to_skip,
            max_rows_number: format.max_rows_number,
            comment_symbol: format.comment_symbol.clone(),
            support_balanced_quotes: format.support_balanced_quotes,
            strict: !format.is_correct,
            load_in_parallel: format.load_in_parallel,
            expected_fields: None,
            remove_chevrons: format.remove_chevrons,
            remove_spaces: format.remove_spaces,
        };

        let mut header = None;
        if let Some((line, line_number)) = &sample {
            let mut splitter = plan.splitter();
            let fields = splitter
                .split(line)
                .map_err(|message| ListError::format(path, *line_number, message))?;
            plan.expected_fields = Some(fields.len());
            if format.header {
                header = Some(fields.into_iter().map(str::to_string).collect());
            }
        }

        Ok((plan, header))
    }

    /// Whether the line carries no row: empty or commented out
    pub fn is_ignored(&self, line: &str) -> bool {
        is_ignored(line, self.comment_symbol.as_deref())
    }

    /// A field splitter for this plan; every reading pass owns one
    pub fn splitter(&self) -> FieldSplitter {
        FieldSplitter::new(self.separator as u8, self.support_balanced_quotes)
    }

    /// Split a data line, enforcing quote balance and the field count in
    /// strict mode.
    ///
    /// Trusted lists are taken as they are: rows may be shorter or longer
    /// than the expected width.
    pub fn split<'s>(&self, splitter: &'s mut FieldSplitter, line: &str, line_number: usize) -> Result<Vec<&'s str>> {
        if self.strict && self.support_balanced_quotes && line.bytes().filter(|&byte| byte == b'"').count() % 2 == 1 {
            return Err(ListError::format(&self.path, line_number, "unbalanced quotes"));
        }
        let fields = splitter
            .split(line)
            .map_err(|message| ListError::format(&self.path, line_number, message))?;

        if let Some(expected) = self.expected_fields {
            if self.strict && fields.len() != expected {
                return Err(ListError::format(
                    &self.path,
                    line_number,
                    format!("expected {} fields, found {}", expected, fields.len()),
                ));
            }
        }
        Ok(fields)
    }

    pub fn normalize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        normalize_name(name, self.remove_chevrons, self.remove_spaces)
    }

    /// Number of leading meaningful lines that carry no data
    pub fn leading_rows(&self) -> usize {
        self.header as usize + self.rows_to_skip
    }
}

pub(crate) fn is_ignored(line: &str, comment_symbol: Option<&str>) -> bool {
    line.is_empty() || comment_symbol.map_or(false, |symbol| line.starts_with(symbol))
}

/// Decode one raw line, dropping the line terminator
pub(crate) fn decode_line<'a>(bytes: &'a [u8], path: &Path, line_number: usize) -> Result<&'a str> {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|_| ListError::format(path, line_number, "the line is not valid UTF-8"))
}

/// A column referenced by name, by number, or both
#[derive(Debug, Clone, Copy)]
pub struct ColumnRef<'a> {
    pub label: &'a str,
    pub name: Option<&'a str>,
    pub number: Option<usize>,
    pub skip_if_unavailable: bool,
}

impl<'a> ColumnRef<'a> {
    pub fn new(label: &'a str, name: Option<&'a str>, number: Option<usize>) -> Self {
        Self {
            label,
            name,
            number,
            skip_if_unavailable: false,
        }
    }

    pub fn skip_if_unavailable(mut self, skip: bool) -> Self {
        self.skip_if_unavailable = skip;
        self
    }

    /// Use `number` when the column is not referenced at all
    pub fn or_number(mut self, number: usize) -> Self {
        if self.name.is_none() && self.number.is_none() {
            self.number = Some(number);
        }
        self
    }
}

/// Resolve a column reference to a 0-based index.
///
/// `Ok(None)` means the column is not present: either never declared, or
/// declared but unavailable and marked as skippable.
pub fn resolve_column(
    column: ColumnRef<'_>,
    header: Option<&[String]>,
    fields: Option<usize>,
) -> Result<Option<usize>> {
    let unavailable = |reason: String| -> Result<Option<usize>> {
        if column.skip_if_unavailable {
            log::info!("Skipping the {} column: {}", column.label, reason);
            Ok(None)
        } else {
            Err(ListError::configuration(format!(
                "the {} column is unavailable: {}",
                column.label, reason
            )))
        }
    };

    let by_name = match column.name {
        None => None,
        Some(name) => {
            let header = header.ok_or_else(|| {
                ListError::configuration(format!(
                    "the {} column is referenced by the name `{}` but the list has no header",
                    column.label, name
                ))
            })?;
            match header.iter().position(|field| field == name) {
                Some(position) => Some(position),
                None => {
                    return unavailable(format!(
                        "`{}` is not in the header {:?}",
                        name, header
                    ))
                }
            }
        }
    };

    match (by_name, column.number) {
        (Some(position), Some(number)) if position != number => Err(ListError::configuration(format!(
            "the {} column is named `{}` (column {}) but its number is given as {}",
            column.label,
            column.name.unwrap_or_default(),
            position,
            number
        ))),
        (Some(position), _) => Ok(Some(position)),
        (None, Some(number)) => match fields {
            Some(fields) if number >= fields => unavailable(format!(
                "column number {} is out of range for rows with {} fields",
                number, fields
            )),
            _ => Ok(Some(number)),
        },
        (None, None) => Ok(None),
    }
}

fn ensure_distinct(columns: &[(&str, Option<usize>)]) -> Result<()> {
    for (i, (label, column)) in columns.iter().enumerate() {
        let Some(column) = column else { continue };
        for (other_label, other) in &columns[i + 1..] {
            if *other == Some(*column) {
                return Err(ListError::configuration(format!(
                    "the {} and {} columns both resolve to column {}",
                    label, other_label, column
                )));
            }
        }
    }
    Ok(())
}

/// Resolved columns of an edge list
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeColumns {
    pub sources: usize,
    pub destinations: usize,
    pub edge_types: Option<usize>,
    pub weights: Option<usize>,
    pub default_edge_type: Option<String>,
    pub default_weight: Option<WeightT>,
}

impl EdgeColumns {
    pub fn resolve(plan: &ParsingPlan, header: Option<&[String]>, options: &EdgeListOptions) -> Result<Self> {
        let fields = plan.expected_fields;
        let sources = resolve_column(
            ColumnRef::new("sources", options.sources_column.as_deref(), options.sources_column_number).or_number(0),
            header,
            fields,
        )?;
        let destinations = resolve_column(
            ColumnRef::new(
                "destinations",
                options.destinations_column.as_deref(),
                options.destinations_column_number,
            )
            .or_number(1),
            header,
            fields,
        )?;
        let edge_types = resolve_column(
            ColumnRef::new(
                "edge types",
                options.edge_types_column.as_deref(),
                options.edge_types_column_number,
            )
            .skip_if_unavailable(options.skip_edge_types_if_unavailable),
            header,
            fields,
        )?;
        let weights = resolve_column(
            ColumnRef::new("weights", options.weights_column.as_deref(), options.weights_column_number)
                .skip_if_unavailable(options.skip_weights_if_unavailable),
            header,
            fields,
        )?;

        // Both are always resolved: they default to columns 0 and 1.
        let (sources, destinations) = match (sources, destinations) {
            (Some(sources), Some(destinations)) => (sources, destinations),
            _ => {
                return Err(ListError::configuration(
                    "the sources and destinations columns are required",
                ))
            }
        };

        ensure_distinct(&[
            ("sources", Some(sources)),
            ("destinations", Some(destinations)),
            ("edge types", edge_types),
            ("weights", weights),
        ])?;

        Ok(Self {
            sources,
            destinations,
            edge_types,
            weights,
            default_edge_type: options.default_edge_type.clone(),
            default_weight: options.default_weight,
        })
    }
}

/// Resolved columns of a node list
#[derive(Debug, Clone, PartialEq)]
pub struct NodeColumns {
    pub nodes: usize,
    pub node_types: Option<usize>,
    pub node_types_separator: char,
    pub default_node_type: Option<String>,
}

impl NodeColumns {
    pub fn resolve(plan: &ParsingPlan, header: Option<&[String]>, options: &NodeListOptions) -> Result<Self> {
        let fields = plan.expected_fields;
        let nodes = resolve_column(
            ColumnRef::new("nodes", options.nodes_column.as_deref(), options.nodes_column_number).or_number(0),
            header,
            fields,
        )?
        .ok_or_else(|| ListError::configuration("the nodes column is required"))?;
        let node_types = resolve_column(
            ColumnRef::new(
                "node types",
                options.node_types_column.as_deref(),
                options.node_types_column_number,
            )
            .skip_if_unavailable(options.skip_node_types_if_unavailable),
            header,
            fields,
        )?;

        ensure_distinct(&[("nodes", Some(nodes)), ("node types", node_types)])?;

        Ok(Self {
            nodes,
            node_types,
            node_types_separator: options.node_types_separator(),
            default_node_type: options.default_node_type.clone(),
        })
    }
}

/// Column of a type list holding the type names, the first by default
pub fn resolve_type_list_column(
    plan: &ParsingPlan,
    header: Option<&[String]>,
    options: &TypeListOptions,
    label: &str,
) -> Result<usize> {
    resolve_column(
        ColumnRef::new(label, options.types_column.as_deref(), options.types_column_number).or_number(0),
        header,
        plan.expected_fields,
    )?
    .ok_or_else(|| ListError::configuration(format!("the {} column is required", label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn header() -> Vec<String> {
        vec!["subject".into(), "object".into(), "predicate".into()]
    }

    #[test]
    fn resolves_by_name_and_number() {
        let header = header();
        let by_name = ColumnRef::new("sources", Some("object"), None);
        assert_eq!(resolve_column(by_name, Some(&header), Some(3)).unwrap(), Some(1));

        let both = ColumnRef::new("sources", Some("object"), Some(1));
        assert_eq!(resolve_column(both, Some(&header), Some(3)).unwrap(), Some(1));

        let by_number = ColumnRef::new("weights", None, Some(2));
        assert_eq!(resolve_column(by_number, None, Some(3)).unwrap(), Some(2));

        let undeclared = ColumnRef::new("weights", None, None);
        assert_eq!(resolve_column(undeclared, None, Some(3)).unwrap(), None);
    }

    #[test]
    fn contradictory_references_are_configuration_errors() {
        let header = header();
        let contradictory = ColumnRef::new("sources", Some("object"), Some(0));
        assert!(resolve_column(contradictory, Some(&header), Some(3))
            .unwrap_err()
            .is_configuration());

        let headerless = ColumnRef::new("sources", Some("object"), None);
        assert!(resolve_column(headerless, None, Some(3)).unwrap_err().is_configuration());
    }

    #[test]
    fn unavailable_columns_degrade_only_when_skippable() {
        let header = header();
        let missing = ColumnRef::new("edge types", Some("label"), None);
        assert!(resolve_column(missing, Some(&header), Some(3)).is_err());
        assert_eq!(
            resolve_column(missing.skip_if_unavailable(true), Some(&header), Some(3)).unwrap(),
            None
        );

        let out_of_range = ColumnRef::new("weights", None, Some(5));
        assert!(resolve_column(out_of_range, None, Some(3)).is_err());
        assert_eq!(
            resolve_column(out_of_range.skip_if_unavailable(true), None, Some(3)).unwrap(),
            None
        );
    }

    #[test]
    fn plan_detects_separator_and_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.csv", "# comment\n\nsrc,dst,weight\na,b,1.0\n");
        let format = ListFormat {
            comment_symbol: Some("#".into()),
            ..ListFormat::default()
        };

        let (plan, header) = ParsingPlan::resolve(&path, &format).unwrap();
        assert_eq!(plan.separator, ',');
        assert_eq!(plan.expected_fields, Some(3));
        assert_eq!(header.unwrap(), vec!["src", "dst", "weight"]);
        assert!(plan.strict);
    }

    #[test]
    fn strict_plans_reject_wrong_field_counts() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.tsv", "a\tb\n");
        let format = ListFormat {
            header: false,
            ..ListFormat::default()
        };
        let (mut plan, _) = ParsingPlan::resolve(&path, &format).unwrap();
        let mut splitter = plan.splitter();

        let error = plan.split(&mut splitter, "a\tb\tc", 7).unwrap_err();
        assert!(matches!(error, ListError::Format { line: 7, .. }));

        plan.strict = false;
        assert_eq!(plan.split(&mut splitter, "a\tb\tc", 7).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(plan.split(&mut splitter, "a", 8).unwrap(), vec!["a"]);
    }

    #[test]
    fn unbalanced_quotes_fail_strict_plans_only() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.csv", "\"a,1\",b\n");
        let format = ListFormat {
            header: false,
            support_balanced_quotes: true,
            ..ListFormat::default()
        };
        let (mut plan, _) = ParsingPlan::resolve(&path, &format).unwrap();
        assert_eq!(plan.expected_fields, Some(2));
        let mut splitter = plan.splitter();

        assert_eq!(plan.split(&mut splitter, "\"c,2\",d", 2).unwrap(), vec!["c,2", "d"]);
        let error = plan.split(&mut splitter, "\"e,f", 3).unwrap_err();
        assert!(matches!(error, ListError::Format { line: 3, .. }));

        plan.strict = false;
        assert!(plan.split(&mut splitter, "\"e,f", 3).is_ok());
    }

    #[test]
    fn skipped_preamble_does_not_shape_the_plan() {
        let dir = TempDir::new().unwrap();
        let format = ListFormat {
            header: false,
            rows_to_skip: 1,
            ..ListFormat::default()
        };

        let path = write(&dir, "edges.tsv", "generated by tool\n0\t1\n1\t2\n");
        let (plan, header) = ParsingPlan::resolve(&path, &format).unwrap();
        assert_eq!(plan.separator, '\t');
        assert_eq!(plan.expected_fields, Some(2));
        assert!(header.is_none());
        let columns = EdgeColumns::resolve(&plan, None, &EdgeListOptions::default()).unwrap();
        assert_eq!((columns.sources, columns.destinations), (0, 1));

        let path = write(&dir, "bipartite.tsv", "% bip unweighted\n0\t1\n1\t2\n");
        let (plan, _) = ParsingPlan::resolve(&path, &format).unwrap();
        assert_eq!(plan.separator, '\t');
        assert_eq!(plan.expected_fields, Some(2));
    }

    #[test]
    fn header_shapes_the_plan_even_with_skipped_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.csv", "src,dst\nskipped\na,b\n");
        let format = ListFormat {
            rows_to_skip: 1,
            ..ListFormat::default()
        };
        let (plan, header) = ParsingPlan::resolve(&path, &format).unwrap();
        assert_eq!(plan.separator, ',');
        assert_eq!(plan.expected_fields, Some(2));
        assert_eq!(header.unwrap(), vec!["src", "dst"]);
    }

    #[test]
    fn non_ascii_separators_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.txt", "a→b\n");
        let format = ListFormat {
            separator: Some('→'),
            ..ListFormat::default()
        };
        assert!(ParsingPlan::resolve(&path, &format).unwrap_err().is_configuration());
    }

    #[test]
    fn edge_columns_default_to_first_two() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "edges.tsv", "a\tb\tlinks\n");
        let format = ListFormat {
            header: false,
            ..ListFormat::default()
        };
        let (plan, header) = ParsingPlan::resolve(&path, &format).unwrap();
        let options = EdgeListOptions {
            edge_types_column_number: Some(2),
            ..EdgeListOptions::default()
        };

        let columns = EdgeColumns::resolve(&plan, header.as_deref(), &options).unwrap();
        assert_eq!((columns.sources, columns.destinations), (0, 1));
        assert_eq!(columns.edge_types, Some(2));
        assert_eq!(columns.weights, None);

        let clashing = EdgeListOptions {
            destinations_column_number: Some(0),
            ..EdgeListOptions::default()
        };
        assert!(EdgeColumns::resolve(&plan, header.as_deref(), &clashing)
            .unwrap_err()
            .is_configuration());
    }
}
