use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::Source;
use crate::error::KiraError;
use crate::store::{OutputLayout, query_id_from_output};
use crate::tabular::{Delimiter, Table, TableWriter};

pub const SRA_RUN_COLUMN: &str = "Run";
pub const DEFAULT_ENA_DEDUP_KEY: &str = "run_accession";
/// Key index file name; its first column is named after the dedup key.
pub const DEDUP_INDEX_FILE: &str = "dedup_runs.tsv";

#[derive(Debug, Clone, Serialize)]
pub struct SraMergeSummary {
    pub files: usize,
    pub rows_read: u64,
    pub runs_written: u64,
    pub skipped_missing_run: u64,
    pub output: String,
}

/// Concatenates every `*.runinfo.csv` under `input_dir`, keeping the first
/// row seen per `Run`. The first file's header defines the output columns;
/// extra columns in later files are dropped.
pub fn merge_sra(input_dir: &Path, output: &Path) -> Result<SraMergeSummary, KiraError> {
    let layout = OutputLayout::from_path(input_dir)?;
    let files = layout.list_outputs(Source::Sra)?;
    if files.is_empty() {
        return Err(KiraError::NoInputFiles(format!(
            "{}/*.{}",
            layout.root(),
            Source::Sra.result_suffix()
        )));
    }

    let mut writer = TableWriter::create(output, Delimiter::Comma)?;
    let mut header: Option<Vec<String>> = None;
    let mut seen = HashSet::new();
    let mut summary = SraMergeSummary {
        files: files.len(),
        rows_read: 0,
        runs_written: 0,
        skipped_missing_run: 0,
        output: output.display().to_string(),
    };

    for path in &files {
        let mut table = Table::open(path.as_std_path(), Delimiter::Comma)?;
        if table.headers().is_empty() {
            debug!(path = %path, "skipping file without header");
            continue;
        }
        if header.is_none() {
            table.require_columns(&[SRA_RUN_COLUMN])?;
            writer.write_row(table.headers())?;
            header = Some(table.headers().to_vec());
        }
        let Some(columns) = header.as_ref() else {
            continue;
        };

        while let Some(row) = table.next_row()? {
            let run = table.field(&row, SRA_RUN_COLUMN);
            // efetch repeats the header between result batches
            if run == SRA_RUN_COLUMN {
                continue;
            }
            summary.rows_read += 1;
            if run.is_empty() {
                summary.skipped_missing_run += 1;
                continue;
            }
            if !seen.insert(run.to_string()) {
                continue;
            }
            writer.write_row(columns.iter().map(|column| table.value(&row, column)))?;
            summary.runs_written += 1;
        }
    }
    writer.finish()?;

    info!(
        files = summary.files,
        rows_read = summary.rows_read,
        runs_written = summary.runs_written,
        skipped_missing_run = summary.skipped_missing_run,
        output = %summary.output,
        "merged SRA runinfo"
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct EnaMergeOptions {
    pub dedup_key: String,
    /// Write every row instead of one row per key.
    pub keep_all: bool,
}

impl Default for EnaMergeOptions {
    fn default() -> Self {
        Self {
            dedup_key: DEFAULT_ENA_DEDUP_KEY.to_string(),
            keep_all: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMergeStats {
    pub query_id: String,
    pub input_rows: u64,
    pub written_rows: u64,
    pub unique_keys: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnaMergeSummary {
    pub dedup_key: String,
    pub files: usize,
    pub rows_read: u64,
    pub rows_written: u64,
    pub unique_keys: usize,
    pub merged_path: String,
    pub dedup_path: String,
    pub summary_path: String,
    pub per_query: Vec<QueryMergeStats>,
}

/// Merges every `*.read_run.tsv` under `input_dir` into `out_dir`:
/// `merged_runs.tsv` (rows prefixed with their query id), `dedup_runs.tsv`
/// (each key with the queries that returned it) and `summary.tsv`.
/// All inputs must share the first file's header exactly.
pub fn merge_ena(
    input_dir: &Path,
    out_dir: &Path,
    options: &EnaMergeOptions,
) -> Result<EnaMergeSummary, KiraError> {
    let layout = OutputLayout::from_path(input_dir)?;
    let files = layout.list_outputs(Source::Ena)?;
    if files.is_empty() {
        return Err(KiraError::NoInputFiles(format!(
            "{}/*.{}",
            layout.root(),
            Source::Ena.result_suffix()
        )));
    }

    let key = options.dedup_key.as_str();
    let merged_path = out_dir.join("merged_runs.tsv");
    let dedup_path = out_dir.join(DEDUP_INDEX_FILE);
    let summary_path = out_dir.join("summary.tsv");

    let mut merged = TableWriter::create(&merged_path, Delimiter::Tab)?;
    let mut header_ref: Option<Vec<String>> = None;
    let mut key_to_queries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut per_query = Vec::with_capacity(files.len());
    let mut rows_read = 0u64;
    let mut rows_written = 0u64;

    for path in &files {
        let query_id = query_id_from_output(path, Source::Ena).unwrap_or_default();
        let mut table = Table::open(path.as_std_path(), Delimiter::Tab)?;
        if table.headers().is_empty() {
            debug!(path = %path, "skipping file without header");
            continue;
        }
        match &header_ref {
            None => {
                let mut columns = vec!["query_id".to_string()];
                columns.extend(table.headers().iter().cloned());
                merged.write_row(&columns)?;
                header_ref = Some(table.headers().to_vec());
            }
            Some(expected) if expected.as_slice() != table.headers() => {
                return Err(KiraError::HeaderMismatch {
                    path: path.to_string(),
                    expected: expected.join("\t"),
                    found: table.headers().join("\t"),
                });
            }
            Some(_) => {}
        }

        let mut stats = QueryMergeStats {
            query_id: query_id.clone(),
            input_rows: 0,
            written_rows: 0,
            unique_keys: 0,
        };
        let mut keys_in_file = HashSet::new();

        while let Some(row) = table.next_row()? {
            stats.input_rows += 1;
            rows_read += 1;

            let key_value = table.field(&row, key);
            if !key_value.is_empty() {
                key_to_queries
                    .entry(key_value.to_string())
                    .or_default()
                    .insert(query_id.clone());
                keys_in_file.insert(key_value.to_string());
            }

            if !options.keep_all && (key_value.is_empty() || !seen.insert(key_value.to_string()))
            {
                continue;
            }

            let mut out_row = Vec::with_capacity(table.headers().len() + 1);
            out_row.push(query_id.as_str());
            out_row.extend(table.headers().iter().map(|column| table.value(&row, column)));
            merged.write_row(out_row)?;
            stats.written_rows += 1;
            rows_written += 1;
        }

        stats.unique_keys = keys_in_file.len();
        per_query.push(stats);
    }
    merged.finish()?;

    let mut dedup = TableWriter::create(&dedup_path, Delimiter::Tab)?;
    dedup.write_row([key, "query_ids"])?;
    for (key_value, queries) in &key_to_queries {
        let joined = queries.iter().cloned().collect::<Vec<_>>().join(",");
        dedup.write_row([key_value.as_str(), joined.as_str()])?;
    }
    dedup.finish()?;

    let mut summary = TableWriter::create(&summary_path, Delimiter::Tab)?;
    let unique_column = format!("unique_{key}_in_query");
    summary.write_row(["query_id", "input_rows", "written_rows", unique_column.as_str()])?;
    for stats in &per_query {
        summary.write_row([
            stats.query_id.clone(),
            stats.input_rows.to_string(),
            stats.written_rows.to_string(),
            stats.unique_keys.to_string(),
        ])?;
    }
    summary.finish()?;

    let result = EnaMergeSummary {
        dedup_key: key.to_string(),
        files: files.len(),
        rows_read,
        rows_written,
        unique_keys: key_to_queries.len(),
        merged_path: merged_path.display().to_string(),
        dedup_path: dedup_path.display().to_string(),
        summary_path: summary_path.display().to_string(),
        per_query,
    };
    info!(
        files = result.files,
        rows_read = result.rows_read,
        rows_written = result.rows_written,
        unique_keys = result.unique_keys,
        dedup_key = %result.dedup_key,
        "merged ENA read_run"
    );
    Ok(result)
}
