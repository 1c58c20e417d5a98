//! Bounded worker pool used for every per-chromosome stage.
//!
//! A stage maps one task over the whole chromosome scope and returns only when
//! every invocation has finished. Completion order inside a stage is
//! unspecified; the returned report lists outcomes in input order.

use crate::error::PipelineError;
use crate::progress::StageProgress;

use log::{debug, error};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Outcome of one stage, in the order the inputs were given.
#[derive(Debug)]
pub struct StageReport {
    pub stage: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, PipelineError)>,
}

impl StageReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Removes and returns the first failure that must stop the run
    /// regardless of policy.
    pub fn take_fatal(&mut self) -> Option<(String, PipelineError)> {
        let pos = self.failed.iter().position(|(_, e)| e.is_fatal())?;
        Some(self.failed.remove(pos))
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, PipelineError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ssrflank-worker-{}", i))
            .build()?;
        Ok(WorkerPool { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs `task` once per chromosome on at most `threads` workers and blocks
    /// until all of them have returned.
    pub fn run_stage<F>(&self, stage: &str, chromosomes: &[String], task: F) -> StageReport
    where
        F: Fn(&str) -> Result<(), PipelineError> + Sync,
    {
        debug!(
            "Stage '{}': {} chromosomes on {} workers",
            stage,
            chromosomes.len(),
            self.threads
        );
        let progress = StageProgress::new(stage, chromosomes.len());

        let outcomes: Vec<(String, Result<(), PipelineError>)> = self.pool.install(|| {
            chromosomes
                .par_iter()
                .with_max_len(1)
                .map(|chr| {
                    let result = task(chr.as_str());
                    if let Err(e) = &result {
                        error!("Stage '{}' failed for {}: {}", stage, chr, e);
                    }
                    progress.tick(chr);
                    (chr.clone(), result)
                })
                .collect()
        });
        progress.finish();

        let mut report = StageReport {
            stage: stage.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (chr, result) in outcomes {
            match result {
                Ok(()) => report.succeeded.push(chr),
                Err(e) => report.failed.push((chr, e)),
            }
        }
        report
    }
}
