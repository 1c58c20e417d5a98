use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to build index for {path}: {reason}")]
    IndexBuild { path: PathBuf, reason: String },

    #[error("cannot open index {path}: {source}")]
    MissingChromosome {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("index {0} has no usable sequences")]
    EmptyIndex(PathBuf),

    #[error("requested chromosome(s) not present in the index: {}", .0.join(", "))]
    UnknownChromosome(Vec<String>),

    #[error("chromosome selection is empty")]
    EmptyScope,

    #[error("chromosome name '{0}' cannot be used as a file name")]
    InvalidChromosomeName(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    ToolFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("repeat report {0} not found")]
    MissingReport(PathBuf),

    #[error("repeat scanner finished but wrote no report at {0}")]
    ScanOutputMissing(PathBuf),

    #[error("cannot build intervals from {path}: {reason}")]
    IntervalBuild { path: PathBuf, reason: String },

    #[error("stage '{stage}' failed for {}", .failed.join(", "))]
    StageFailed { stage: String, failed: Vec<String> },

    #[error("scratch directory {0} already exists and is not empty; remove it or choose another --outdir")]
    ScratchInUse(PathBuf),

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Fatal errors end the run at the next stage barrier no matter which
    /// failure policy is active. Everything else is a per-chromosome failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::IndexBuild { .. }
                | PipelineError::MissingChromosome { .. }
                | PipelineError::EmptyIndex(_)
                | PipelineError::EmptyScope
                | PipelineError::ScratchInUse(_)
                | PipelineError::MissingReport(_)
                | PipelineError::IntervalBuild { .. }
                | PipelineError::InvalidChromosomeName(_)
        )
    }
}

impl From<rayon::ThreadPoolBuildError> for PipelineError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        PipelineError::ThreadPool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal = PipelineError::IndexBuild {
            path: PathBuf::from("chr1.fasta"),
            reason: "exit 1".to_string(),
        };
        assert!(fatal.is_fatal());
        assert!(PipelineError::EmptyIndex(PathBuf::from("g.fa.fai")).is_fatal());
        assert!(PipelineError::EmptyScope.is_fatal());

        let per_task = PipelineError::ToolLaunch {
            tool: "perl".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(!per_task.is_fatal());
        assert!(PipelineError::MissingReport(PathBuf::from("chr1.fasta.misa")).is_fatal());
        assert!(!PipelineError::ScanOutputMissing(PathBuf::from("chr1.fasta.misa")).is_fatal());
    }

    #[test]
    fn test_unknown_chromosome_message_lists_names() {
        let err = PipelineError::UnknownChromosome(vec!["chr9".to_string(), "chrZ".to_string()]);
        assert_eq!(
            err.to_string(),
            "requested chromosome(s) not present in the index: chr9, chrZ"
        );
    }
}
