use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use prettytable::{row, Table};

/// Progress bar for one pool stage.
pub struct StageProgress {
    bar: ProgressBar,
}

impl StageProgress {
    pub fn new(stage: &str, total: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:>8} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_prefix(stage.to_string());
        StageProgress { bar }
    }

    pub fn tick(&self, chromosome: &str) {
        self.bar.set_message(chromosome.to_string());
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Per-stage counts kept for the end-of-run table.
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub stage: String,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
}

pub fn print_run_header(genome: &str, scope: &[String], threads: usize, started: &str) {
    println!("{}", "#".repeat(40));
    println!("{} {}", "genome file:".bold(), genome);
    println!("{} {}", "chromosomes:".bold(), scope.join(","));
    println!("{} {}", "threads:".bold(), threads);
    println!("{} {}", "started:".bold(), started);
    println!("{}", "#".repeat(40));
}

pub fn print_stage_summary(summaries: &[StageSummary]) {
    if summaries.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Stage", "Requested", "Succeeded", "Failed"]);
    for s in summaries {
        let failed = if s.failed.is_empty() {
            "-".to_string()
        } else {
            s.failed.join(",")
        };
        table.add_row(row![s.stage, s.requested, s.succeeded, failed]);
    }
    table.printstd();
}
