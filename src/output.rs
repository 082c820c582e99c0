use std::io::{self, Write};

use serde::Serialize;

use crate::combine::CombineSummary;
use crate::domain::QueryStatus;
use crate::merge::{EnaMergeSummary, SraMergeSummary};
use crate::runner::{ProgressEvent, ProgressSink, RunReport};
use crate::slim::SlimSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_sra_merge(summary: &SraMergeSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_ena_merge(summary: &EnaMergeSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_slim(summary: &SlimSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_combine(summary: &CombineSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints one progress line per query to stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_run(report: &RunReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let totals = &report.totals;
        println!(
            "{cyan}KIRA-MF {} summary ({} -> {}){reset}",
            report.source, report.queries_file, report.out_dir
        );
        println!("{green}saved: {}{reset}", totals.success);
        println!(
            "{yellow}empty: {}  too many hits: {}  malformed rows: {}{reset}",
            totals.empty_result, totals.skipped_too_many_hits, totals.skipped_malformed_row
        );
        println!("{red}failed: {}{reset}", totals.fetch_failed);

        for outcome in &report.outcomes {
            let color = match outcome.status {
                QueryStatus::Success => green,
                QueryStatus::FetchFailed => red,
                _ => yellow,
            };
            match (&outcome.output_path, &outcome.message) {
                (Some(path), _) => println!(
                    "{color}  {} {} rows -> {path}{reset}",
                    outcome.query_id, outcome.row_count
                ),
                (None, Some(message)) => println!(
                    "{color}  {} {}: {message}{reset}",
                    outcome.query_id, outcome.status
                ),
                (None, None) => println!("{color}  {} {}{reset}", outcome.query_id, outcome.status),
            }
        }
    }

    pub fn print_sra_merge(summary: &SraMergeSummary) {
        println!("Input files: {}", summary.files);
        println!("Total rows read: {}", summary.rows_read);
        println!("Unique runs written: {}", summary.runs_written);
        if summary.skipped_missing_run > 0 {
            println!("Rows skipped (missing Run): {}", summary.skipped_missing_run);
        }
        println!("Output: {}", summary.output);
    }

    pub fn print_ena_merge(summary: &EnaMergeSummary) {
        println!("Files processed: {}", summary.files);
        println!("Total input rows read: {}", summary.rows_read);
        println!("Unique {} values: {}", summary.dedup_key, summary.unique_keys);
        println!("Rows written: {}", summary.rows_written);
        println!("Wrote: {}", summary.merged_path);
        println!("Wrote: {}", summary.dedup_path);
        println!("Wrote: {}", summary.summary_path);
    }

    pub fn print_slim(summary: &SlimSummary) {
        let skipped = &summary.skipped;
        println!(
            "Read {} rows, wrote {} rows to {}",
            summary.rows_in, summary.rows_out, summary.output
        );
        println!("Skipped (missing accession): {}", skipped.missing_accession);
        println!("Skipped (too few reads): {}", skipped.low_reads);
        println!("Skipped (library strategy): {}", skipped.strategy);
        println!("Skipped (library selection): {}", skipped.selection);
        println!("Skipped (library source): {}", skipped.source);
        println!("Skipped (scientific name): {}", skipped.scientific_name);
    }

    pub fn print_combine(summary: &CombineSummary) {
        println!(
            "Wrote {} rows ({} SRA, {} ENA) -> {}",
            summary.written, summary.sra_rows, summary.ena_rows, summary.output
        );
        println!(
            "Dedup by run_accession: dropped {} duplicate rows",
            summary.dropped_duplicates
        );
    }
}
