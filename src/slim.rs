use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::KiraError;
use crate::tabular::{Delimiter, Table, TableWriter, parse_count};

pub const DEFAULT_MIN_READS: u64 = 100_000;

const SRA_REQUIRED: &[&str] = &[
    "Run",
    "BioProject",
    "spots",
    "LibraryStrategy",
    "LibrarySelection",
    "LibrarySource",
    "ScientificName",
];

const SRA_OUTPUT: &[&str] = &[
    "BioProject",
    "Run",
    "spots",
    "spots_with_mates",
    "SeqType",
    "SequencingMachine",
    "ScientificName",
    "LibraryStrategy",
    "LibrarySource",
];

/// Required on input and written, trimmed, in this order.
pub const ENA_COLUMNS: &[&str] = &[
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
    "tax_id",
];

const EXCLUDED_STRATEGY_TERMS: &[&str] = &[
    "amplicon",
    "wxs",
    "targeted-capture",
    "targeted_capture",
    "targeted",
    "wga",
];

/// Which runs survive a slim pass. Text comparisons ignore case and
/// surrounding whitespace.
#[derive(Debug, Clone)]
pub struct SlimFilter {
    pub min_reads: u64,
    pub library_strategy: String,
    pub library_selection: String,
    pub library_source: String,
    pub scientific_name: String,
}

impl Default for SlimFilter {
    fn default() -> Self {
        Self {
            min_reads: DEFAULT_MIN_READS,
            library_strategy: "WGS".to_string(),
            library_selection: "RANDOM".to_string(),
            library_source: "METAGENOMIC".to_string(),
            scientific_name: "Homo sapiens".to_string(),
        }
    }
}

impl SlimFilter {
    fn combined_strategy(&self) -> String {
        format!("{}/{}", self.library_strategy, self.library_selection)
    }

    /// Strategy starts with the wanted one and names no excluded assay.
    fn is_wanted_strategy(&self, strategy: &str) -> bool {
        let strategy = norm(strategy);
        if strategy.is_empty() {
            return false;
        }
        if EXCLUDED_STRATEGY_TERMS
            .iter()
            .any(|term| strategy.contains(term))
        {
            return false;
        }
        strategy.starts_with(&norm(&self.library_strategy))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SkipCounts {
    pub missing_accession: u64,
    pub low_reads: u64,
    pub strategy: u64,
    pub selection: u64,
    pub source: u64,
    pub scientific_name: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlimSummary {
    pub input: String,
    pub output: String,
    pub rows_in: u64,
    pub rows_out: u64,
    pub skipped: SkipCounts,
}

fn norm(value: &str) -> String {
    value.trim().to_lowercase()
}

fn same(left: &str, right: &str) -> bool {
    norm(left) == norm(right)
}

/// `WGS` + `RANDOM` becomes `WGS/RANDOM`; a strategy already holding a `/`
/// is kept as is.
pub fn combined_strategy(strategy: &str, selection: &str) -> String {
    let strategy = strategy.trim();
    let selection = selection.trim();
    if strategy.contains('/') {
        return strategy.to_string();
    }
    match (strategy.is_empty(), selection.is_empty()) {
        (_, true) => strategy.to_string(),
        (true, false) => selection.to_string(),
        (false, false) => format!("{strategy}/{selection}"),
    }
}

/// Slims a merged SRA RunInfo table (comma separated).
pub fn slim_sra(input: &Path, output: &Path, filter: &SlimFilter) -> Result<SlimSummary, KiraError> {
    if !input.is_file() {
        return Err(KiraError::MissingInput(input.to_path_buf()));
    }
    let mut table = Table::open(input, Delimiter::Comma)?;
    table.require_columns(SRA_REQUIRED)?;

    let wanted_strategy = filter.combined_strategy();
    let mut writer = TableWriter::create(output, Delimiter::Comma)?;
    writer.write_row(SRA_OUTPUT)?;

    let mut summary = SlimSummary {
        input: input.display().to_string(),
        output: output.display().to_string(),
        rows_in: 0,
        rows_out: 0,
        skipped: SkipCounts::default(),
    };

    while let Some(row) = table.next_row()? {
        summary.rows_in += 1;
        let run = table.field(&row, "Run");
        let project = table.field(&row, "BioProject");
        if run.is_empty() || project.is_empty() {
            summary.skipped.missing_accession += 1;
            continue;
        }
        if parse_count(table.field(&row, "spots")) < filter.min_reads {
            summary.skipped.low_reads += 1;
            continue;
        }
        let scientific_name = table.field(&row, "ScientificName");
        if !same(scientific_name, &filter.scientific_name) {
            summary.skipped.scientific_name += 1;
            continue;
        }
        let source = table.field(&row, "LibrarySource");
        if !same(source, &filter.library_source) {
            summary.skipped.source += 1;
            continue;
        }
        let strategy = combined_strategy(
            table.field(&row, "LibraryStrategy"),
            table.field(&row, "LibrarySelection"),
        );
        if !same(&strategy, &wanted_strategy) {
            summary.skipped.strategy += 1;
            continue;
        }

        let seq_type = if table.field(&row, "LibraryLayout").eq_ignore_ascii_case("PAIRED") {
            "paired"
        } else {
            "single"
        };
        let model = table.field(&row, "Model");
        let machine = if model.is_empty() {
            table.field(&row, "Platform")
        } else {
            model
        };

        writer.write_row([
            project,
            run,
            table.field(&row, "spots"),
            table.field(&row, "spots_with_mates"),
            seq_type,
            machine,
            scientific_name,
            strategy.as_str(),
            source,
        ])?;
        summary.rows_out += 1;
    }
    writer.finish()?;

    log_summary("SRA", &summary, filter);
    Ok(summary)
}

/// Slims a merged ENA read_run table (tab separated).
pub fn slim_ena(input: &Path, output: &Path, filter: &SlimFilter) -> Result<SlimSummary, KiraError> {
    if !input.is_file() {
        return Err(KiraError::MissingInput(input.to_path_buf()));
    }
    let mut table = Table::open(input, Delimiter::Tab)?;
    table.require_columns(ENA_COLUMNS)?;

    let mut writer = TableWriter::create(output, Delimiter::Tab)?;
    writer.write_row(ENA_COLUMNS)?;

    let mut summary = SlimSummary {
        input: input.display().to_string(),
        output: output.display().to_string(),
        rows_in: 0,
        rows_out: 0,
        skipped: SkipCounts::default(),
    };

    while let Some(row) = table.next_row()? {
        summary.rows_in += 1;
        if table.field(&row, "study_accession").is_empty()
            || table.field(&row, "run_accession").is_empty()
        {
            summary.skipped.missing_accession += 1;
            continue;
        }
        if parse_count(table.field(&row, "read_count")) < filter.min_reads {
            summary.skipped.low_reads += 1;
            continue;
        }
        if !filter.is_wanted_strategy(table.field(&row, "library_strategy")) {
            summary.skipped.strategy += 1;
            continue;
        }
        if !same(table.field(&row, "library_selection"), &filter.library_selection) {
            summary.skipped.selection += 1;
            continue;
        }
        if !same(table.field(&row, "library_source"), &filter.library_source) {
            summary.skipped.source += 1;
            continue;
        }
        if !same(table.field(&row, "scientific_name"), &filter.scientific_name) {
            summary.skipped.scientific_name += 1;
            continue;
        }

        writer.write_row(ENA_COLUMNS.iter().map(|column| table.field(&row, column)))?;
        summary.rows_out += 1;
    }
    writer.finish()?;

    log_summary("ENA", &summary, filter);
    Ok(summary)
}

fn log_summary(label: &str, summary: &SlimSummary, filter: &SlimFilter) {
    info!(
        source = label,
        rows_in = summary.rows_in,
        rows_out = summary.rows_out,
        min_reads = filter.min_reads,
        missing_accession = summary.skipped.missing_accession,
        low_reads = summary.skipped.low_reads,
        strategy = summary.skipped.strategy,
        selection = summary.skipped.selection,
        library_source = summary.skipped.source,
        scientific_name = summary.skipped.scientific_name,
        output = %summary.output,
        "slim pass finished"
    );
}
