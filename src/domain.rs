use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// External metadata source a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Sra,
    Ena,
}

impl Source {
    /// File name suffix of a per-query output, without the leading dot.
    pub fn result_suffix(&self) -> &'static str {
        match self {
            Source::Sra => "runinfo.csv",
            Source::Ena => "read_run.tsv",
        }
    }

    pub fn default_retries(&self) -> u32 {
        match self {
            Source::Sra => 6,
            Source::Ena => 8,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Sra => write!(f, "sra"),
            Source::Ena => write!(f, "ena"),
        }
    }
}

/// Filesystem-safe key of one query. Built by stripping every character
/// outside `[A-Za-z0-9._-]`; distinct raw ids may collapse to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(String);

impl QueryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueryId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let sanitized = sanitize_query_id(value);
        if sanitized.is_empty() {
            return Err(KiraError::InvalidQueryId(value.to_string()));
        }
        Ok(Self(sanitized))
    }
}

pub fn sanitize_query_id(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub id: QueryId,
    /// Passed verbatim to the source.
    pub query: String,
    /// 1-based line in the query file.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    SkippedTooManyHits,
    FetchFailed,
    EmptyResult,
    SkippedMalformedRow,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryStatus::Success => "success",
            QueryStatus::SkippedTooManyHits => "skipped (too many hits)",
            QueryStatus::FetchFailed => "fetch failed",
            QueryStatus::EmptyResult => "empty result",
            QueryStatus::SkippedMalformedRow => "skipped (malformed row)",
        };
        write!(f, "{label}")
    }
}
