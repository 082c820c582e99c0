use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::KiraError;
use crate::tabular::{Delimiter, Table, TableWriter};

pub const COMBINED_COLUMNS: &[&str] = &[
    "project_accession",
    "run_accession",
    "spots_or_reads",
    "spots_with_mates",
    "library_layout",
    "seq_type",
    "instrument_platform",
    "instrument_model",
    "sequencing_machine",
    "scientific_name",
    "library_strategy",
    "library_selection",
    "library_source",
    "source_db",
];

const SRA_REQUIRED: &[&str] = &[
    "BioProject",
    "Run",
    "spots",
    "ScientificName",
    "LibraryStrategy",
    "LibrarySource",
];

const ENA_REQUIRED: &[&str] = &[
    "study_accession",
    "run_accession",
    "read_count",
    "library_strategy",
    "library_source",
    "library_selection",
    "library_layout",
    "instrument_platform",
    "instrument_model",
    "scientific_name",
];

#[derive(Debug, Clone, Serialize)]
pub struct CombineSummary {
    pub output: String,
    pub sra_rows: u64,
    pub ena_rows: u64,
    pub written: u64,
    pub dropped_duplicates: u64,
}

/// One row of the combined schema, in `COMBINED_COLUMNS` order.
struct CombinedRow<'a> {
    project_accession: &'a str,
    run_accession: &'a str,
    spots_or_reads: &'a str,
    spots_with_mates: &'a str,
    library_layout: &'a str,
    seq_type: &'a str,
    instrument_platform: &'a str,
    instrument_model: &'a str,
    sequencing_machine: &'a str,
    scientific_name: &'a str,
    library_strategy: &'a str,
    library_selection: &'a str,
    library_source: &'a str,
    source_db: &'a str,
}

impl<'a> CombinedRow<'a> {
    fn fields(&self) -> [&'a str; 14] {
        [
            self.project_accession,
            self.run_accession,
            self.spots_or_reads,
            self.spots_with_mates,
            self.library_layout,
            self.seq_type,
            self.instrument_platform,
            self.instrument_model,
            self.sequencing_machine,
            self.scientific_name,
            self.library_strategy,
            self.library_selection,
            self.library_source,
            self.source_db,
        ]
    }
}

/// `A/B` splits into strategy `A` and selection `B`.
pub fn split_strategy(strategy: &str) -> (&str, &str) {
    match strategy.trim().split_once('/') {
        Some((strategy, selection)) => (strategy.trim(), selection.trim()),
        None => (strategy.trim(), ""),
    }
}

pub fn seq_type_from_layout(layout: &str) -> &'static str {
    let layout = layout.trim();
    if layout.eq_ignore_ascii_case("PAIRED") {
        "paired"
    } else if layout.eq_ignore_ascii_case("SINGLE") {
        "single"
    } else {
        ""
    }
}

/// Writes slimmed SRA rows, then slimmed ENA rows, into one comma separated
/// table. A run accession already written is dropped, so SRA wins ties.
pub fn combine(ena: &Path, sra: &Path, output: &Path) -> Result<CombineSummary, KiraError> {
    for input in [ena, sra] {
        if !input.is_file() {
            return Err(KiraError::MissingInput(input.to_path_buf()));
        }
    }

    let mut sra_table = Table::open(sra, Delimiter::Comma)?;
    sra_table.require_columns(SRA_REQUIRED)?;
    let mut ena_table = Table::open(ena, Delimiter::Tab)?;
    ena_table.require_columns(ENA_REQUIRED)?;

    let mut writer = TableWriter::create(output, Delimiter::Comma)?;
    writer.write_row(COMBINED_COLUMNS)?;

    let mut seen = HashSet::new();
    let mut summary = CombineSummary {
        output: output.display().to_string(),
        sra_rows: 0,
        ena_rows: 0,
        written: 0,
        dropped_duplicates: 0,
    };

    while let Some(row) = sra_table.next_row()? {
        let run = sra_table.field(&row, "Run");
        if run.is_empty() {
            continue;
        }
        if !seen.insert(run.to_string()) {
            summary.dropped_duplicates += 1;
            continue;
        }
        let (strategy, selection) = split_strategy(sra_table.field(&row, "LibraryStrategy"));
        let combined = CombinedRow {
            project_accession: sra_table.field(&row, "BioProject"),
            run_accession: run,
            spots_or_reads: sra_table.field(&row, "spots"),
            spots_with_mates: sra_table.field(&row, "spots_with_mates"),
            library_layout: "",
            seq_type: sra_table.field(&row, "SeqType"),
            instrument_platform: "",
            instrument_model: "",
            sequencing_machine: sra_table.field(&row, "SequencingMachine"),
            scientific_name: sra_table.field(&row, "ScientificName"),
            library_strategy: strategy,
            library_selection: selection,
            library_source: sra_table.field(&row, "LibrarySource"),
            source_db: "SRA",
        };
        writer.write_row(combined.fields())?;
        summary.sra_rows += 1;
        summary.written += 1;
    }

    while let Some(row) = ena_table.next_row()? {
        let run = ena_table.field(&row, "run_accession");
        if run.is_empty() {
            continue;
        }
        if !seen.insert(run.to_string()) {
            summary.dropped_duplicates += 1;
            continue;
        }
        let layout = ena_table.field(&row, "library_layout");
        let platform = ena_table.field(&row, "instrument_platform");
        let model = ena_table.field(&row, "instrument_model");
        let combined = CombinedRow {
            project_accession: ena_table.field(&row, "study_accession"),
            run_accession: run,
            spots_or_reads: ena_table.field(&row, "read_count"),
            spots_with_mates: "",
            library_layout: layout,
            seq_type: seq_type_from_layout(layout),
            instrument_platform: platform,
            instrument_model: model,
            sequencing_machine: if model.is_empty() { platform } else { model },
            scientific_name: ena_table.field(&row, "scientific_name"),
            library_strategy: ena_table.field(&row, "library_strategy"),
            library_selection: ena_table.field(&row, "library_selection"),
            library_source: ena_table.field(&row, "library_source"),
            source_db: "ENA",
        };
        writer.write_row(combined.fields())?;
        summary.ena_rows += 1;
        summary.written += 1;
    }
    writer.finish()?;

    info!(
        written = summary.written,
        sra_rows = summary.sra_rows,
        ena_rows = summary.ena_rows,
        dropped_duplicates = summary.dropped_duplicates,
        output = %summary.output,
        "combined SRA and ENA runs"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_strategy_on_slash() {
        assert_eq!(split_strategy("WGS/RANDOM"), ("WGS", "RANDOM"));
        assert_eq!(split_strategy(" WGS "), ("WGS", ""));
    }

    #[test]
    fn seq_type_from_layout_values() {
        assert_eq!(seq_type_from_layout("PAIRED"), "paired");
        assert_eq!(seq_type_from_layout("single"), "single");
        assert_eq!(seq_type_from_layout(""), "");
    }
}
