//! Wrappers around the external programs: the faidx-style sequence index,
//! the repeat scanner and the interval sequence extractor.

use crate::config::{append_suffix, ToolConfig};
use crate::error::PipelineError;

use log::{debug, error, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Report the repeat scanner writes next to its input.
pub fn report_path(fasta: &Path) -> PathBuf {
    append_suffix(fasta, ".misa")
}

/// Statistics file the repeat scanner writes next to its input.
pub fn statistics_path(fasta: &Path) -> PathBuf {
    append_suffix(fasta, ".statistics")
}

pub fn index_path(fasta: &Path) -> PathBuf {
    append_suffix(fasta, ".fai")
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Runs a command to completion, turning a launch failure or non-zero exit into an error.
fn run_command(cmd: &mut Command) -> Result<(), PipelineError> {
    let command_line = describe(cmd);
    debug!("Running: {}", command_line);

    let output = cmd.output().map_err(|source| PipelineError::ToolLaunch {
        tool: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("{} failed ({}): {}", command_line, output.status, stderr);
        return Err(PipelineError::ToolFailed {
            command: command_line,
            status: output.status,
            stderr,
        });
    }
    Ok(())
}

/// Builds `<fasta>.fai`. Any failure, including a missing index after a
/// successful exit, is reported as [`PipelineError::IndexBuild`].
pub fn build_index(tools: &ToolConfig, fasta: &Path) -> Result<PathBuf, PipelineError> {
    let mut cmd = Command::new(&tools.samtools);
    cmd.arg("faidx").arg(fasta).stdin(Stdio::null());

    run_command(&mut cmd).map_err(|e| PipelineError::IndexBuild {
        path: fasta.to_path_buf(),
        reason: e.to_string(),
    })?;

    let fai = index_path(fasta);
    if !fai.is_file() {
        return Err(PipelineError::IndexBuild {
            path: fasta.to_path_buf(),
            reason: format!("{} was not created", fai.display()),
        });
    }
    Ok(fai)
}

/// Makes sure the genome has a positional index, building one when absent.
pub fn ensure_index(tools: &ToolConfig, genome: &Path) -> Result<PathBuf, PipelineError> {
    let fai = index_path(genome);
    if fai.is_file() {
        debug!("Using existing index {}", fai.display());
        return Ok(fai);
    }
    info!("Indexing {}", genome.display());
    build_index(tools, genome)
}

/// Writes one named sequence of `fasta` into `out`.
pub fn extract_region(
    tools: &ToolConfig,
    fasta: &Path,
    region: &str,
    out: &Path,
) -> Result<(), PipelineError> {
    let sink = File::create(out)?;
    let mut cmd = Command::new(&tools.samtools);
    cmd.arg("faidx")
        .arg(fasta)
        .arg(region)
        .stdin(Stdio::null())
        .stdout(Stdio::from(sink));
    run_command(&mut cmd)
}

/// Runs the repeat scanner on `fasta` and checks that its report appeared.
pub fn run_repeat_scanner(tools: &ToolConfig, fasta: &Path) -> Result<PathBuf, PipelineError> {
    let mut cmd = Command::new(&tools.misa_interpreter);
    cmd.arg(&tools.misa).arg(fasta).stdin(Stdio::null());
    run_command(&mut cmd)?;

    let report = report_path(fasta);
    if !report.is_file() {
        return Err(PipelineError::ScanOutputMissing(report));
    }
    let stats = statistics_path(fasta);
    if !stats.is_file() {
        warn!("Repeat scanner wrote no statistics file {}", stats.display());
    }
    Ok(report)
}

/// Extracts the sequence of every interval in `bed` from `fasta` into `out`.
pub fn extract_intervals(
    tools: &ToolConfig,
    fasta: &Path,
    bed: &Path,
    out: &Path,
) -> Result<(), PipelineError> {
    let mut cmd = Command::new(&tools.bedtools);
    cmd.arg("getfasta")
        .arg("-fi")
        .arg(fasta)
        .arg("-bed")
        .arg(bed)
        .arg("-fo")
        .arg(out)
        .stdin(Stdio::null());
    run_command(&mut cmd)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    // Scripts are written and executed under one lock to avoid ETXTBSY
    // when another test thread forks mid-write.
    static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn tools_with(samtools: PathBuf, bedtools: PathBuf, misa: PathBuf) -> ToolConfig {
        ToolConfig {
            samtools,
            bedtools,
            misa,
            misa_interpreter: PathBuf::from("sh"),
        }
    }

    #[test]
    fn test_sibling_paths() {
        let fasta = Path::new("tmp/chr1.fasta");
        assert_eq!(report_path(fasta), PathBuf::from("tmp/chr1.fasta.misa"));
        assert_eq!(statistics_path(fasta), PathBuf::from("tmp/chr1.fasta.statistics"));
        assert_eq!(index_path(fasta), PathBuf::from("tmp/chr1.fasta.fai"));
    }

    #[test]
    fn test_ensure_index_skips_existing() {
        let _guard = SCRIPT_LOCK.lock();
        let dir = tempdir().unwrap();
        let genome = dir.path().join("g.fa");
        fs::write(&genome, ">chr1\nACGT\n").unwrap();
        fs::write(dir.path().join("g.fa.fai"), "chr1\t4\t6\t4\t5\n").unwrap();
        // A failing indexer proves the existing index is reused.
        let failing = script(dir.path(), "samtools", "exit 1");
        let tools = tools_with(failing, PathBuf::from("true"), PathBuf::from("true"));

        let fai = ensure_index(&tools, &genome).unwrap();
        assert_eq!(fai, dir.path().join("g.fa.fai"));
    }

    #[test]
    fn test_index_build_failures() {
        let _guard = SCRIPT_LOCK.lock();
        let dir = tempdir().unwrap();
        let genome = dir.path().join("g.fa");
        fs::write(&genome, ">chr1\nACGT\n").unwrap();

        let failing = script(dir.path(), "failing_samtools", "echo broken >&2; exit 3");
        let tools = tools_with(failing, PathBuf::from("true"), PathBuf::from("true"));
        match ensure_index(&tools, &genome) {
            Err(PipelineError::IndexBuild { reason, .. }) => assert!(reason.contains("broken")),
            other => panic!("expected IndexBuild, got {:?}", other),
        }

        // Exit 0 without writing an index is still a failure.
        let silent = script(dir.path(), "silent_samtools", "exit 0");
        let tools = tools_with(silent, PathBuf::from("true"), PathBuf::from("true"));
        assert!(matches!(
            ensure_index(&tools, &genome),
            Err(PipelineError::IndexBuild { .. })
        ));
    }

    #[test]
    fn test_extract_region_redirects_stdout() {
        let _guard = SCRIPT_LOCK.lock();
        let dir = tempdir().unwrap();
        let samtools = script(dir.path(), "samtools", "printf '>%s\\nACGT\\n' \"$3\"");
        let tools = tools_with(samtools, PathBuf::from("true"), PathBuf::from("true"));
        let out = dir.path().join("chr7.fasta");

        extract_region(&tools, Path::new("g.fa"), "chr7", &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), ">chr7\nACGT\n");
    }

    #[test]
    fn test_scanner_must_write_report() {
        let _guard = SCRIPT_LOCK.lock();
        let dir = tempdir().unwrap();
        let fasta = dir.path().join("chr1.fasta");
        fs::write(&fasta, ">chr1\nACGT\n").unwrap();

        let lazy = script(dir.path(), "lazy_misa.sh", "exit 0");
        let tools = tools_with(PathBuf::from("true"), PathBuf::from("true"), lazy);
        assert!(matches!(
            run_repeat_scanner(&tools, &fasta),
            Err(PipelineError::ScanOutputMissing(_))
        ));

        let working = script(
            dir.path(),
            "misa.sh",
            "printf 'ID\\tSSR nr.\\n' > \"$1.misa\"; echo stats > \"$1.statistics\"",
        );
        let tools = tools_with(PathBuf::from("true"), PathBuf::from("true"), working);
        let report = run_repeat_scanner(&tools, &fasta).unwrap();
        assert_eq!(report, dir.path().join("chr1.fasta.misa"));
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let tools = ToolConfig {
            samtools: PathBuf::from("true"),
            bedtools: PathBuf::from("/nonexistent/bedtools"),
            misa: PathBuf::from("misa.pl"),
            misa_interpreter: PathBuf::from("perl"),
        };
        let result = extract_intervals(
            &tools,
            Path::new("chr1.fasta"),
            Path::new("chr1.bed"),
            Path::new("chr1_second.fasta"),
        );
        assert!(matches!(result, Err(PipelineError::ToolLaunch { .. })));
    }
}
