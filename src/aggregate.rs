//! Gathers per-chromosome second-pass outputs into genome-level artifacts.

use crate::error::PipelineError;
use crate::process::ChromosomeFiles;

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// What the aggregator produced.
#[derive(Debug, Default)]
pub struct AggregateSummary {
    pub fasta_bytes: u64,
    pub fasta_parts: usize,
    pub table_rows: usize,
    pub table_parts: usize,
    pub statistics: Vec<PathBuf>,
}

/// Byte-wise concatenation of `inputs` into `out`, in the given order.
/// Missing inputs are skipped. Returns `(bytes written, files used)`.
pub fn concat_files(inputs: &[PathBuf], out: &Path) -> Result<(u64, usize), PipelineError> {
    let mut writer = BufWriter::new(File::create(out)?);
    let mut total = 0u64;
    let mut used = 0usize;

    for input in inputs {
        let mut file = match File::open(input) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Skipping missing {}", input.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        total += io::copy(&mut file, &mut writer)?;
        used += 1;
    }
    writer.flush()?;
    Ok((total, used))
}

/// Stacks tab separated reports that share a header into one table.
///
/// The first non-empty header is written once; data rows follow in input
/// order. Returns `(rows written, reports used)`.
pub fn merge_tables(inputs: &[PathBuf], out: &Path) -> Result<(usize, usize), PipelineError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .from_writer(BufWriter::new(File::create(out)?));
    let mut header: Option<StringRecord> = None;
    let mut rows = 0usize;
    let mut used = 0usize;

    for input in inputs {
        if !input.is_file() {
            warn!("Skipping missing {}", input.display());
            continue;
        }
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_path(input)?;

        let this_header = reader.headers()?.clone();
        match &header {
            _ if this_header.is_empty() => {
                debug!("{} has no header", input.display());
            }
            None => {
                writer.write_record(&this_header)?;
                header = Some(this_header);
            }
            Some(first) if *first != this_header => {
                warn!("{} has a different header, rows appended as is", input.display());
            }
            Some(_) => {}
        }

        for result in reader.records() {
            writer.write_record(&result?)?;
            rows += 1;
        }
        used += 1;
        debug!("Merged {}", input.display());
    }
    writer.flush()?;
    Ok((rows, used))
}

/// Moves a file, falling back to copy and remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Moves each chromosome's second-pass statistics into `workdir`, keeping its file name.
pub fn relocate_statistics(
    files: &[ChromosomeFiles],
    workdir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut moved = Vec::new();
    for f in files {
        let source = &f.flank_statistics;
        if !source.is_file() {
            warn!("No statistics for {} at {}", f.chromosome, source.display());
            continue;
        }
        let name = source.file_name().ok_or_else(|| {
            PipelineError::Parse(format!("no file name in {}", source.display()))
        })?;
        let target = workdir.join(name);
        move_file(source, &target)?;
        moved.push(target);
    }
    Ok(moved)
}

/// Writes the genome-level flank FASTA and repeat table, then relocates statistics.
pub fn aggregate(
    files: &[ChromosomeFiles],
    fasta_out: &Path,
    table_out: &Path,
    workdir: &Path,
) -> Result<AggregateSummary, PipelineError> {
    let flank_fastas: Vec<PathBuf> = files.iter().map(|f| f.flank_fasta.clone()).collect();
    let (fasta_bytes, fasta_parts) = concat_files(&flank_fastas, fasta_out)?;
    info!(
        "Wrote {} ({} chromosome files)",
        fasta_out.display(),
        fasta_parts
    );

    let reports: Vec<PathBuf> = files.iter().map(|f| f.flank_report.clone()).collect();
    let (table_rows, table_parts) = merge_tables(&reports, table_out)?;
    info!(
        "Wrote {} ({} repeats from {} reports)",
        table_out.display(),
        table_rows,
        table_parts
    );

    let statistics = relocate_statistics(files, workdir)?;

    Ok(AggregateSummary {
        fasta_bytes,
        fasta_parts,
        table_rows,
        table_parts,
        statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "ID\tSSR nr.\tSSR type\tSSR\tsize\tstart\tend\n";

    #[test]
    fn test_concat_matches_direct_order() {
        let dir = tempdir().unwrap();
        let chr1 = dir.path().join("chr1_second.fasta");
        let chr2 = dir.path().join("chr2_second.fasta");
        fs::write(&chr1, ">chr1:0-270\nACGTACGT\n").unwrap();
        fs::write(&chr2, ">chr2:10-300\nTTTT\n>chr2:400-500\nGG\n").unwrap();

        let out = dir.path().join("all.fasta");
        let (bytes, used) = concat_files(&[chr1.clone(), chr2.clone()], &out).unwrap();

        let mut expected = fs::read(&chr1).unwrap();
        expected.extend(fs::read(&chr2).unwrap());
        assert_eq!(fs::read(&out).unwrap(), expected);
        assert_eq!(bytes, expected.len() as u64);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_concat_skips_missing() {
        let dir = tempdir().unwrap();
        let chr2 = dir.path().join("chr2_second.fasta");
        fs::write(&chr2, ">chr2:0-10\nAC\n").unwrap();
        let out = dir.path().join("all.fasta");

        let (_, used) = concat_files(&[dir.path().join("chr1_second.fasta"), chr2], &out).unwrap();
        assert_eq!(used, 1);
        assert_eq!(fs::read_to_string(&out).unwrap(), ">chr2:0-10\nAC\n");
    }

    #[test]
    fn test_merge_tables_writes_header_once() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("chr1_second.fasta.misa");
        let b = dir.path().join("chr2_second.fasta.misa");
        fs::write(&a, format!("{}chr1:0-270\t1\tp1\t(A)10\t10\t101\t110\n", HEADER)).unwrap();
        fs::write(
            &b,
            format!(
                "{}chr2:0-300\t1\tp2\t(AT)6\t12\t151\t162\nchr2:0-300\t2\tp1\t(C)11\t11\t200\t210\n",
                HEADER
            ),
        )
        .unwrap();

        let out = dir.path().join("genome_second.tsv");
        let (rows, used) = merge_tables(&[a, dir.path().join("absent.misa"), b], &out).unwrap();
        assert_eq!((rows, used), (3, 2));

        let merged = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = merged.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER.trim_end());
        assert!(lines[1].starts_with("chr1:0-270\t"));
        assert!(lines[3].starts_with("chr2:0-300\t2\t"));
    }

    #[test]
    fn test_merge_tables_skips_empty_leading_report() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("chr1_second.fasta.misa");
        let full = dir.path().join("chr2_second.fasta.misa");
        fs::write(&empty, "").unwrap();
        fs::write(&full, format!("{}chr2:0-300\t1\tp2\t(AT)6\t12\t151\t162\n", HEADER)).unwrap();

        let out = dir.path().join("genome_second.tsv");
        let (rows, used) = merge_tables(&[empty, full], &out).unwrap();
        assert_eq!((rows, used), (1, 2));
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            format!("{}chr2:0-300\t1\tp2\t(AT)6\t12\t151\t162\n", HEADER)
        );
    }

    #[test]
    fn test_relocate_statistics() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("tmp");
        fs::create_dir(&scratch).unwrap();
        let files = vec![
            ChromosomeFiles::new(&scratch, "chr1"),
            ChromosomeFiles::new(&scratch, "chr2"),
        ];
        fs::write(&files[0].flank_statistics, "stats").unwrap();

        let moved = relocate_statistics(&files, dir.path()).unwrap();
        assert_eq!(moved, vec![dir.path().join("chr1_second.fasta.statistics")]);
        assert!(!files[0].flank_statistics.exists());
        assert_eq!(fs::read_to_string(&moved[0]).unwrap(), "stats");
    }
}
