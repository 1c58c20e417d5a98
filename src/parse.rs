use crate::config::ChromosomeSelector;
use crate::error::PipelineError;

use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Placeholder name for unplaced sequence; never processed even when requested.
pub const UNKNOWN_SEQUENCE: &str = "chrUn";

/// Leading token of the header row in a repeat report.
pub const REPORT_HEADER_MARKER: &str = "ID";

const REPORT_SEQ_COL: usize = 0;
const REPORT_START_COL: usize = 5;
const REPORT_END_COL: usize = 6;

/// Sequence name to length, in the order the index lists them.
#[derive(Debug, Clone, Default)]
pub struct GenomeIndex {
    order: Vec<String>,
    lengths: HashMap<String, u64>,
}

impl GenomeIndex {
    pub fn insert(&mut self, name: String, length: u64) {
        if self.lengths.insert(name.clone(), length).is_none() {
            self.order.push(name);
        }
    }

    pub fn length(&self, name: &str) -> Option<u64> {
        self.lengths.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lengths.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub fn is_unknown_sequence(name: &str) -> bool {
    name.eq_ignore_ascii_case(UNKNOWN_SEQUENCE)
}

/// Reads a faidx-style index (`name\tlength\t...`) into a [`GenomeIndex`].
///
/// The unknown-sequence placeholder is logged and skipped. An index that
/// cannot be opened or that ends up with no entries is an error.
pub fn parse_genome_index(path: &Path) -> Result<GenomeIndex, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::MissingChromosome {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut index = GenomeIndex::default();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let name = fields.next().unwrap_or("").trim();
        let length_field = fields.next().ok_or_else(|| {
            PipelineError::Parse(format!(
                "{} line {}: expected at least two tab separated fields",
                path.display(),
                line_num + 1
            ))
        })?;
        let length: u64 = length_field.trim().parse().map_err(|_| {
            PipelineError::Parse(format!(
                "{} line {}: invalid sequence length '{}'",
                path.display(),
                line_num + 1,
                length_field
            ))
        })?;

        if is_unknown_sequence(name) {
            warn!("{} is unknown sequence, skipping", name);
            continue;
        }
        index.insert(name.to_string(), length);
    }

    if index.is_empty() {
        return Err(PipelineError::EmptyIndex(path.to_path_buf()));
    }
    debug!("Loaded {} sequences from {}", index.len(), path.display());
    Ok(index)
}

/// Turns the caller's selector into an ordered chromosome list.
///
/// `all` yields every index key in index order. An explicit list is returned
/// as given, minus blanks and repeated names; membership is checked separately
/// by [`validate_scope`].
pub fn resolve_scope(index: &GenomeIndex, selector: &ChromosomeSelector) -> Vec<String> {
    match selector {
        ChromosomeSelector::All => index.names().to_vec(),
        ChromosomeSelector::Listed(raw) => {
            let mut seen = HashSet::new();
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .filter(|name| seen.insert(name.to_string()))
                .map(String::from)
                .collect()
        }
    }
}

/// Rejects an empty selection, names missing from the index and names that
/// cannot serve as file stems.
pub fn validate_scope(index: &GenomeIndex, scope: &[String]) -> Result<(), PipelineError> {
    if scope.is_empty() {
        return Err(PipelineError::EmptyScope);
    }
    let missing: Vec<String> = scope
        .iter()
        .filter(|name| !index.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::UnknownChromosome(missing));
    }

    if let Some(bad) = scope.iter().find(|name| !is_safe_file_stem(name)) {
        return Err(PipelineError::InvalidChromosomeName(bad.clone()));
    }
    Ok(())
}

fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\\')
}

/// One data row of a repeat report. Coordinates are 1-based inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatRecord {
    pub seq_id: String,
    pub start: u64,
    pub end: u64,
}

/// Parses one report line. Header rows and blank lines yield `Ok(None)`.
pub fn parse_repeat_line(line: &str) -> Result<Option<RepeatRecord>, String> {
    if line.starts_with(REPORT_HEADER_MARKER) {
        return Ok(None);
    }
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() <= REPORT_END_COL {
        return Err(format!(
            "expected at least {} columns, found {}",
            REPORT_END_COL + 1,
            fields.len()
        ));
    }

    let start: u64 = fields[REPORT_START_COL]
        .trim()
        .parse()
        .map_err(|_| format!("invalid start '{}'", fields[REPORT_START_COL]))?;
    let end: u64 = fields[REPORT_END_COL]
        .trim()
        .parse()
        .map_err(|_| format!("invalid end '{}'", fields[REPORT_END_COL]))?;

    Ok(Some(RepeatRecord {
        seq_id: fields[REPORT_SEQ_COL].to_string(),
        start,
        end,
    }))
}

/// Reads every data row of a repeat report in file order.
pub fn parse_repeat_report(path: &Path) -> Result<Vec<RepeatRecord>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::MissingReport(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        match parse_repeat_line(&line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(reason) => {
                return Err(PipelineError::IntervalBuild {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {}", line_num + 1, reason),
                })
            }
        }
    }
    Ok(records)
}
