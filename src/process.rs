use crate::aggregate::{aggregate, AggregateSummary};
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::PipelineError;
use crate::flank::build_flank_fasta;
use crate::parse::{parse_genome_index, resolve_scope, validate_scope, GenomeIndex};
use crate::pool::{StageReport, WorkerPool};
use crate::progress::{print_run_header, print_stage_summary, StageSummary};
use crate::tools::{build_index, ensure_index, extract_region, report_path, run_repeat_scanner, statistics_path};

use colored::*;
use human_bytes::human_bytes;
use itertools::Itertools;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Scratch directory of the running pipeline, if any, and whether it is to be
/// kept. The interrupt handler reads it to clean up before exiting.
pub static SCRATCH_DIR: Lazy<Mutex<Option<(PathBuf, bool)>>> = Lazy::new(|| Mutex::new(None));

pub const SCRATCH_DIR_NAME: &str = "tmp";

/// Removes whatever scratch directory is currently registered, unless the run
/// asked to keep it.
pub fn remove_registered_scratch() {
    if let Some((path, keep)) = SCRATCH_DIR.lock().take() {
        if keep {
            info!("Keeping scratch directory {}", path.display());
            return;
        }
        if let Err(e) = fs::remove_dir_all(&path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Staging area for all per-chromosome files. Removed when dropped unless kept.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    keep: bool,
}

impl ScratchDir {
    /// Creates `<parent>/tmp`. An existing directory is reused only if empty.
    pub fn create(parent: &Path, keep: bool) -> Result<Self, PipelineError> {
        let path = parent.join(SCRATCH_DIR_NAME);
        if path.exists() {
            if !path.is_dir() || fs::read_dir(&path)?.next().is_some() {
                return Err(PipelineError::ScratchInUse(path));
            }
            debug!("Reusing empty scratch directory {}", path.display());
        }
        fs::create_dir_all(&path)?;
        *SCRATCH_DIR.lock() = Some((path.clone(), keep));
        debug!("Scratch directory {}", path.display());
        Ok(ScratchDir { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let mut registered = SCRATCH_DIR.lock();
        if registered.as_ref().map(|(p, _)| p.as_path()) == Some(self.path.as_path()) {
            *registered = None;
        }
        drop(registered);

        if self.keep {
            info!("Keeping scratch directory {}", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Every file a chromosome's worker may write, derived from its name alone.
#[derive(Debug, Clone)]
pub struct ChromosomeFiles {
    pub chromosome: String,
    pub fasta: PathBuf,
    pub first_report: PathBuf,
    pub intervals: PathBuf,
    pub flank_fasta: PathBuf,
    pub flank_report: PathBuf,
    pub flank_statistics: PathBuf,
}

impl ChromosomeFiles {
    pub fn new(scratch: &Path, chromosome: &str) -> Self {
        let fasta = scratch.join(format!("{}.fasta", chromosome));
        let flank_fasta = scratch.join(format!("{}_second.fasta", chromosome));
        ChromosomeFiles {
            chromosome: chromosome.to_string(),
            first_report: report_path(&fasta),
            intervals: scratch.join(format!("{}.bed", chromosome)),
            flank_report: report_path(&flank_fasta),
            flank_statistics: statistics_path(&flank_fasta),
            fasta,
            flank_fasta,
        }
    }
}

/// Per-chromosome file sets for the whole scope.
pub fn partition(scratch: &Path, scope: &[String]) -> HashMap<String, ChromosomeFiles> {
    scope
        .iter()
        .map(|chr| (chr.clone(), ChromosomeFiles::new(scratch, chr)))
        .collect()
}

/// Looks up a chromosome's file set. Every name handed to a stage comes from the scope.
fn files_for<'a>(
    files: &'a HashMap<String, ChromosomeFiles>,
    chr: &str,
) -> Result<&'a ChromosomeFiles, PipelineError> {
    files
        .get(chr)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("no scratch files for {}", chr)))
}

/// Stage 1: own FASTA for the chromosome, re-indexed for the interval extractor.
pub fn split_chromosome(
    config: &PipelineConfig,
    files: &ChromosomeFiles,
) -> Result<(), PipelineError> {
    extract_region(&config.tools, &config.genome, &files.chromosome, &files.fasta)?;
    build_index(&config.tools, &files.fasta)?;
    Ok(())
}

/// Applies the failure policy after a barrier and returns the chromosomes
/// that continue to the next stage.
pub fn apply_policy(
    mut report: StageReport,
    policy: FailurePolicy,
    summaries: &mut Vec<StageSummary>,
) -> Result<Vec<String>, PipelineError> {
    summaries.push(StageSummary {
        stage: report.stage.clone(),
        requested: report.succeeded.len() + report.failed.len(),
        succeeded: report.succeeded.len(),
        failed: report.failed_names(),
    });

    if report.is_clean() {
        return Ok(report.succeeded);
    }
    if let Some((chr, fatal)) = report.take_fatal() {
        warn!("Stage '{}': fatal error for {}", report.stage, chr);
        return Err(fatal);
    }

    match policy {
        FailurePolicy::FailFast => Err(PipelineError::StageFailed {
            stage: report.stage.clone(),
            failed: report.failed_names(),
        }),
        FailurePolicy::BestEffort => {
            warn!(
                "Stage '{}': continuing without {}",
                report.stage,
                report.failed_names().join(", ")
            );
            Ok(report.succeeded)
        }
    }
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunSummary {
    pub scope: Vec<String>,
    pub completed: Vec<String>,
    pub stages: Vec<StageSummary>,
    pub aggregate: AggregateSummary,
    pub elapsed: Duration,
}

impl RunSummary {
    /// End-of-run console report.
    pub fn print(&self) {
        print_stage_summary(&self.stages);
        println!(
            "{} {} of {} chromosomes",
            "Completed:".bold(),
            self.completed.len(),
            self.scope.len()
        );
        println!(
            "{} {} flank sequence, {} repeats, {} statistics files",
            "Outputs:".bold(),
            human_bytes(self.aggregate.fasta_bytes as f64),
            self.aggregate.table_rows,
            self.aggregate.statistics.len()
        );
        println!("{} {:.2}s", "Total time:".bold(), self.elapsed.as_secs_f64());
        println!("{}", "All Done!".green());
    }
}

/// Loads the genome index (building it first if needed) and resolves the scope.
pub fn prepare_scope(config: &PipelineConfig) -> Result<(GenomeIndex, Vec<String>), PipelineError> {
    let fai = ensure_index(&config.tools, &config.genome)?;
    let index = parse_genome_index(&fai)?;
    let scope = resolve_scope(&index, &config.selector);
    validate_scope(&index, &scope)?;
    for chr in &scope {
        if let Some(length) = index.length(chr) {
            info!("{} length: {}", chr, length);
        }
    }
    Ok((index, scope))
}

pub fn run_pipeline(config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
    let start_time = Instant::now();
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let (index, scope) = prepare_scope(config)?;
    let pool = WorkerPool::new(config.threads)?;
    print_run_header(
        &config.genome.display().to_string(),
        &scope,
        pool.threads(),
        &started,
    );

    let scratch = ScratchDir::create(&config.workdir, config.keep_scratch)?;
    let files = partition(scratch.path(), &scope);
    let mut stages = Vec::new();

    info!("{}", "Splitting chromosomes...".cyan());
    let report = pool.run_stage("split", &scope, |chr| {
        split_chromosome(config, files_for(&files, chr)?)
    });
    let mut active = apply_policy(report, config.policy, &mut stages)?;

    if !active.is_empty() {
        info!("{}", "First repeat scan...".cyan());
        let report = pool.run_stage("scan1", &active, |chr| {
            run_repeat_scanner(&config.tools, &files_for(&files, chr)?.fasta).map(|_| ())
        });
        active = apply_policy(report, config.policy, &mut stages)?;
    }

    if !active.is_empty() {
        info!("{}", "Building flank sequences...".cyan());
        let report = pool.run_stage("flank", &active, |chr| {
            build_flank_fasta(&config.tools, &index, files_for(&files, chr)?, config.flank)
        });
        active = apply_policy(report, config.policy, &mut stages)?;
    }

    if !active.is_empty() {
        info!("{}", "Second repeat scan...".cyan());
        let report = pool.run_stage("scan2", &active, |chr| {
            run_repeat_scanner(&config.tools, &files_for(&files, chr)?.flank_fasta).map(|_| ())
        });
        active = apply_policy(report, config.policy, &mut stages)?;
    }

    if active.is_empty() {
        warn!("No chromosome completed every stage; outputs will be empty");
    } else if active.len() < scope.len() {
        warn!(
            "Completed {} of {} chromosomes: {}",
            active.len(),
            scope.len(),
            active.iter().join(",")
        );
    }

    // Aggregate in scope order, over the chromosomes that made it through.
    let completed_files: Vec<ChromosomeFiles> = scope
        .iter()
        .filter(|chr| active.contains(*chr))
        .filter_map(|chr| files.get(chr).cloned())
        .collect();
    let aggregate = aggregate(
        &completed_files,
        &config.fasta_output(),
        &config.table_output(),
        &config.workdir,
    )?;
    drop(scratch);

    Ok(RunSummary {
        scope,
        completed: active,
        stages,
        aggregate,
        elapsed: start_time.elapsed(),
    })
}
