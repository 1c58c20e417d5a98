use crate::error::PipelineError;

use clap::{Parser, ValueEnum};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Default padding added on each side of a repeat before flank extraction.
pub const DEFAULT_FLANK: u64 = 150;

// Define command-line arguments using clap
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Genome-wide SSR search, chromosome by chromosome, with a second pass over repeat flanks",
    long_about = None,
    after_help = "Example:\n  ssrflank -g SFS.fasta -t 4"
)]
pub struct Args {
    /// FASTA genome, should include all sequences from the genome file
    #[arg(short, long)]
    pub genome: PathBuf,

    /// Comma separated chromosome names (chr1A,chr2A,...) or "all"
    #[arg(short, long = "chr", default_value = "all")]
    pub chr: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 1)]
    pub threads: usize,

    /// Working directory for scratch files and relocated statistics
    #[arg(short, long, default_value = ".")]
    pub outdir: PathBuf,

    /// Sequence index tool (faidx compatible)
    #[arg(long, env = "SSRFLANK_SAMTOOLS", default_value = "samtools")]
    pub samtools: PathBuf,

    /// Interval sequence extractor (getfasta compatible)
    #[arg(long, env = "SSRFLANK_BEDTOOLS", default_value = "bedtools")]
    pub bedtools: PathBuf,

    /// Repeat scanner script
    #[arg(long, env = "SSRFLANK_MISA", default_value = "./misa.pl")]
    pub misa: PathBuf,

    /// Interpreter used to run the repeat scanner script
    #[arg(long = "misa-interpreter", env = "SSRFLANK_MISA_INTERPRETER", default_value = "perl")]
    pub misa_interpreter: PathBuf,

    /// Bases added on each side of a repeat for the flank pass
    #[arg(long, default_value_t = DEFAULT_FLANK)]
    pub flank: u64,

    /// What to do when a chromosome fails inside a parallel stage
    #[arg(long = "on-failure", value_enum, default_value_t = FailurePolicy::BestEffort)]
    pub on_failure: FailurePolicy,

    /// Keep the scratch directory after the run
    #[arg(long = "keep-tmp")]
    pub keep_tmp: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// How a stage barrier reacts to per-chromosome failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Log the failure, drop the chromosome from later stages, carry on.
    BestEffort,
    /// Stop the run at the first stage that has any failure.
    FailFast,
}

/// Locations of the external programs the pipeline drives.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub samtools: PathBuf,
    pub bedtools: PathBuf,
    pub misa: PathBuf,
    pub misa_interpreter: PathBuf,
}

/// Chromosome selector given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromosomeSelector {
    All,
    Listed(String),
}

impl ChromosomeSelector {
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "all" {
            ChromosomeSelector::All
        } else {
            ChromosomeSelector::Listed(raw.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub genome: PathBuf,
    pub selector: ChromosomeSelector,
    pub threads: usize,
    pub workdir: PathBuf,
    pub tools: ToolConfig,
    pub flank: u64,
    pub policy: FailurePolicy,
    pub keep_scratch: bool,
}

impl PipelineConfig {
    pub fn from_args(args: &Args) -> Result<Self, PipelineError> {
        if args.threads == 0 {
            return Err(PipelineError::InvalidConfig(
                "--threads must be at least 1".to_string(),
            ));
        }
        let cpus = num_cpus::get();
        if args.threads > cpus {
            warn!(
                "Requested {} threads but only {} logical CPUs are available",
                args.threads, cpus
            );
        }

        if !args.genome.is_file() {
            return Err(PipelineError::InvalidConfig(format!(
                "genome file {} does not exist",
                args.genome.display()
            )));
        }

        if !args.outdir.exists() {
            fs::create_dir_all(&args.outdir)?;
        }

        Ok(PipelineConfig {
            genome: args.genome.clone(),
            selector: ChromosomeSelector::parse(&args.chr),
            threads: args.threads,
            workdir: args.outdir.clone(),
            tools: ToolConfig {
                samtools: args.samtools.clone(),
                bedtools: args.bedtools.clone(),
                misa: args.misa.clone(),
                misa_interpreter: args.misa_interpreter.clone(),
            },
            flank: args.flank,
            policy: args.on_failure,
            keep_scratch: args.keep_tmp,
        })
    }

    /// `<genome>.fai`, the positional index next to the genome.
    pub fn index_path(&self) -> PathBuf {
        append_suffix(&self.genome, ".fai")
    }

    /// `<genome>_second.tsv`
    pub fn table_output(&self) -> PathBuf {
        append_suffix(&self.genome, "_second.tsv")
    }

    /// `<genome>_second_all.fasta`
    pub fn fasta_output(&self) -> PathBuf {
        append_suffix(&self.genome, "_second_all.fasta")
    }
}

/// Appends a suffix to the full file name, keeping any existing extension.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
