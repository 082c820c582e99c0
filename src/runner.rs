use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RunSettings;
use crate::domain::{QuerySpec, QueryStatus, Source};
use crate::error::KiraError;
use crate::queries::{QueryRow, read_query_file};
use crate::source::{MetadataSource, parse_hit_count};
use crate::store::{OutputLayout, count_lines};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query_id: String,
    pub line: usize,
    pub status: QueryStatus,
    pub hit_count: Option<u64>,
    /// Data rows, header excluded.
    pub row_count: u64,
    pub output_path: Option<String>,
    pub message: Option<String>,
}

impl QueryOutcome {
    fn new(query_id: &str, line: usize, status: QueryStatus) -> Self {
        Self {
            query_id: query_id.to_string(),
            line,
            status,
            hit_count: None,
            row_count: 0,
            output_path: None,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusTotals {
    pub success: usize,
    pub skipped_too_many_hits: usize,
    pub fetch_failed: usize,
    pub empty_result: usize,
    pub skipped_malformed_row: usize,
}

impl StatusTotals {
    fn from_outcomes(outcomes: &[QueryOutcome]) -> Self {
        let mut totals = Self::default();
        for outcome in outcomes {
            match outcome.status {
                QueryStatus::Success => totals.success += 1,
                QueryStatus::SkippedTooManyHits => totals.skipped_too_many_hits += 1,
                QueryStatus::FetchFailed => totals.fetch_failed += 1,
                QueryStatus::EmptyResult => totals.empty_result += 1,
                QueryStatus::SkippedMalformedRow => totals.skipped_malformed_row += 1,
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: Source,
    pub queries_file: String,
    pub out_dir: String,
    pub started_at: String,
    pub finished_at: String,
    pub totals: StatusTotals,
    pub outcomes: Vec<QueryOutcome>,
}

/// Sequential fetch loop: one query is fully resolved, pause included,
/// before the next one starts. Only a missing query file is fatal.
pub struct QueryRunner<S: MetadataSource> {
    source: S,
    layout: OutputLayout,
    settings: RunSettings,
}

impl<S: MetadataSource> QueryRunner<S> {
    pub fn new(source: S, layout: OutputLayout, settings: RunSettings) -> Self {
        Self {
            source,
            layout,
            settings,
        }
    }

    pub fn run(&self, queries: &Path, sink: &dyn ProgressSink) -> Result<RunReport, KiraError> {
        let rows = read_query_file(queries)?;
        self.layout.ensure()?;

        let source = self.source.source();
        let started_at = Utc::now().to_rfc3339();
        info!(
            %source,
            queries = %queries.display(),
            out_dir = %self.layout.root(),
            rows = rows.len(),
            "starting run"
        );

        let total = rows.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, row) in rows.into_iter().enumerate() {
            let started = Instant::now();
            let outcome = match row {
                QueryRow::Spec(spec) => {
                    let outcome = self.process(&spec);
                    self.pause();
                    outcome
                }
                QueryRow::Malformed {
                    line,
                    raw_id,
                    reason,
                } => {
                    warn!(line, id = %raw_id, %reason, "skipping malformed row");
                    QueryOutcome::new(&raw_id, line, QueryStatus::SkippedMalformedRow)
                        .with_message(reason)
                }
            };
            sink.event(ProgressEvent {
                message: format!(
                    "[{}/{}] {} {}",
                    index + 1,
                    total,
                    outcome.query_id,
                    outcome.status
                ),
                elapsed: Some(started.elapsed()),
            });
            outcomes.push(outcome);
        }

        let totals = StatusTotals::from_outcomes(&outcomes);
        info!(
            %source,
            success = totals.success,
            failed = totals.fetch_failed,
            empty = totals.empty_result,
            too_many_hits = totals.skipped_too_many_hits,
            malformed = totals.skipped_malformed_row,
            "run finished"
        );
        Ok(RunReport {
            source,
            queries_file: queries.display().to_string(),
            out_dir: self.layout.root().to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            totals,
            outcomes,
        })
    }

    /// Resolves one query without pausing afterwards.
    pub fn process(&self, spec: &QuerySpec) -> QueryOutcome {
        let id = spec.id.as_str();
        let mut outcome = QueryOutcome::new(id, spec.line, QueryStatus::Success);
        info!(id, query = %spec.query, "processing query");

        if let Some(raw) = self.source.count(&spec.query) {
            let hits = self.hit_count(id, raw);
            outcome.hit_count = Some(hits);
            if let Some(max_hits) = self.settings.max_hits {
                if hits > max_hits {
                    warn!(id, hits, max_hits, "too many hits, skipping fetch");
                    outcome.status = QueryStatus::SkippedTooManyHits;
                    return outcome.with_message(format!("{hits} hits exceed limit {max_hits}"));
                }
            }
        }

        let temp = match self.layout.temp_file(&spec.id) {
            Ok(temp) => temp,
            Err(err) => {
                warn!(id, error = %err, "cannot create temp file");
                outcome.status = QueryStatus::FetchFailed;
                return outcome.with_message(err.to_string());
            }
        };

        let fetched = self.settings.retry.run(|attempt| {
            if attempt > 0 {
                info!(id, attempt, "retrying fetch");
            }
            self.source.fetch(&spec.query, temp.path())
        });
        if let Err(err) = fetched {
            warn!(
                id,
                attempts = self.settings.retry.retries + 1,
                error = %err,
                "fetch failed, skipping"
            );
            outcome.status = QueryStatus::FetchFailed;
            return outcome.with_message(err.to_string());
        }

        let lines = match count_lines(temp.path()) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(id, error = %err, "cannot read fetched data");
                outcome.status = QueryStatus::FetchFailed;
                return outcome.with_message(err.to_string());
            }
        };
        if lines <= 1 {
            warn!(id, "no data rows returned");
            outcome.status = QueryStatus::EmptyResult;
            return outcome;
        }

        let destination = self.layout.output_path(&spec.id, self.source.source());
        if let Err(err) = OutputLayout::persist(temp, &destination) {
            warn!(id, error = %err, "cannot move result into place");
            outcome.status = QueryStatus::FetchFailed;
            return outcome.with_message(err.to_string());
        }

        outcome.row_count = (lines - 1) as u64;
        outcome.output_path = Some(destination.to_string());
        info!(id, rows = outcome.row_count, path = %destination, "saved");
        outcome
    }

    fn hit_count(&self, id: &str, raw: Result<String, KiraError>) -> u64 {
        let parsed = match raw {
            Ok(text) => parse_hit_count(&text),
            Err(err) => {
                debug!(id, error = %err, "count request failed");
                None
            }
        };
        match parsed {
            Some(hits) => {
                info!(id, hits, "hit count");
                hits
            }
            None => {
                warn!(id, "hit count unavailable, assuming 0");
                0
            }
        }
    }

    fn pause(&self) {
        if !self.settings.delay.is_zero() {
            thread::sleep(self.settings.delay);
        }
    }
}
