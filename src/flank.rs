use crate::config::ToolConfig;
use crate::error::PipelineError;
use crate::parse::{parse_repeat_report, GenomeIndex, RepeatRecord};
use crate::process::ChromosomeFiles;
use crate::tools::extract_intervals;

use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Padded window around one repeat, clipped to `[0, chromosome length]`.
///
/// `start`/`end` are written verbatim as BED columns 2 and 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlankWindow {
    pub seq_id: String,
    pub start: u64,
    pub end: u64,
}

impl FlankWindow {
    pub fn around(record: &RepeatRecord, length: u64, pad: u64) -> Self {
        let (start, end) = flank_bounds(record.start, record.end, length, pad);
        FlankWindow {
            seq_id: record.seq_id.clone(),
            start,
            end,
        }
    }
}

/// `(max(0, start - pad), min(length, end + pad))`, with start never past end.
pub fn flank_bounds(start: u64, end: u64, length: u64, pad: u64) -> (u64, u64) {
    let window_end = end.saturating_add(pad).min(length);
    let window_start = start.saturating_sub(pad).min(window_end);
    (window_start, window_end)
}

/// Computes one window per record, in record order. Overlapping windows are kept as is.
pub fn flank_windows(
    records: &[RepeatRecord],
    index: &GenomeIndex,
    pad: u64,
    report: &Path,
) -> Result<Vec<FlankWindow>, PipelineError> {
    records
        .iter()
        .map(|record| -> Result<FlankWindow, PipelineError> {
            let length = index.length(&record.seq_id).ok_or_else(|| PipelineError::IntervalBuild {
                path: report.to_path_buf(),
                reason: format!("sequence '{}' is not in the genome index", record.seq_id),
            })?;
            Ok(FlankWindow::around(record, length, pad))
        })
        .collect()
}

/// Writes `seq\tstart\tend` lines.
pub fn write_interval_file(windows: &[FlankWindow], bed: &Path) -> Result<(), PipelineError> {
    let interval_err = |e: std::io::Error| PipelineError::IntervalBuild {
        path: bed.to_path_buf(),
        reason: e.to_string(),
    };
    let mut writer = BufWriter::new(File::create(bed).map_err(interval_err)?);
    for w in windows {
        writeln!(writer, "{}\t{}\t{}", w.seq_id, w.start, w.end).map_err(interval_err)?;
    }
    writer.flush().map_err(interval_err)?;
    Ok(())
}

/// Stage-3 task: first-pass report -> interval file -> flank FASTA.
pub fn build_flank_fasta(
    tools: &ToolConfig,
    index: &GenomeIndex,
    files: &ChromosomeFiles,
    pad: u64,
) -> Result<(), PipelineError> {
    let records = parse_repeat_report(&files.first_report)?;
    let windows = flank_windows(&records, index, pad, &files.first_report)?;
    write_interval_file(&windows, &files.intervals)?;
    debug!(
        "{}: {} flank windows written to {}",
        files.chromosome,
        windows.len(),
        files.intervals.display()
    );

    extract_intervals(tools, &files.fasta, &files.intervals, &files.flank_fasta)
}
